//! Card fraud detection pipeline
//!
//! Trains, gates and promotes fraud classifiers and scores transactions.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, PipelineConfig, create_object_store};
use database::{DocumentStore, PgDocumentStore, create_pool, run_migrations};
use fraud_pipeline::commands;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_DIR: &str = "logs";

/// Card fraud detection pipeline
#[derive(Parser)]
#[command(name = "fraud-pipeline")]
#[command(about = "Training and serving pipeline for card fraud detection")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ingestion, validation, training, evaluation and promotion
    Run,

    /// Insert a transactions CSV into the document store
    Seed {
        /// Path to the CSV file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score one transaction with the latest registered model
    Predict {
        /// Transaction as a JSON object
        #[arg(short, long)]
        transaction: String,
    },

    /// Run database migrations
    Migrate,
}

fn init_logging(verbose: bool) -> Result<()> {
    std::fs::create_dir_all(LOG_DIR).context("Failed to create log directory")?;
    let log_path = PathBuf::from(LOG_DIR).join(format!(
        "{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stdout);

    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = Config::from_env()?;
    let pipeline_config = PipelineConfig::from_env();

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to the database")?;

    if matches!(cli.command, Commands::Migrate) {
        run_migrations(&pool).await?;
        info!("Migrations completed successfully");
        return Ok(());
    }

    let document_store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
    let artifact_store = create_object_store(&config.artifact_base_path)?;

    match cli.command {
        Commands::Run => {
            commands::run::run(pipeline_config, artifact_store, document_store).await?;
        }
        Commands::Seed { file } => {
            commands::seed::run(&pipeline_config, document_store.as_ref(), &file).await?;
        }
        Commands::Predict { transaction } => {
            commands::predict::run(
                &pipeline_config,
                artifact_store,
                document_store,
                &transaction,
            )
            .await?;
        }
        Commands::Migrate => {}
    }

    Ok(())
}
