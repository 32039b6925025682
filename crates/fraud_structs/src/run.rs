//! Run namespace and pipeline stage identifiers.

use core::fmt;

use chrono::{Local, NaiveDateTime};
use object_store::path::Path as ObjectStorePath;

/// Root directory holding every run namespace.
pub const ARTIFACT_ROOT: &str = "artifacts";

/// Format of the run identifier derived from its creation time.
pub const RUN_ID_FORMAT: &str = "%d%m%y__%H%M%S";

/// The fixed sequence of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingestion,
    Validation,
    FeatureEngineering,
    Preprocessing,
    Training,
    Evaluation,
    Pusher,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 7] = [
        Self::Ingestion,
        Self::Validation,
        Self::FeatureEngineering,
        Self::Preprocessing,
        Self::Training,
        Self::Evaluation,
        Self::Pusher,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Validation => "validation",
            Self::FeatureEngineering => "feature_engineering",
            Self::Preprocessing => "preprocessing",
            Self::Training => "training",
            Self::Evaluation => "evaluation",
            Self::Pusher => "pusher",
        }
    }

    /// Directory of the stage's files inside a run namespace.
    #[must_use]
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Ingestion => "data_ingestion",
            Self::Validation => "data_validation",
            Self::FeatureEngineering => "feature_engineered",
            Self::Preprocessing => "data_preprocessing",
            Self::Training => "model_training",
            Self::Evaluation => "model_evaluation",
            Self::Pusher => "model_pusher",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline execution, identified by its creation time.
///
/// Created once at the start of a run and never changed afterwards; every
/// stage resolves its output locations through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    id: String,
    created_at: NaiveDateTime,
    root: String,
}

impl Run {
    #[must_use]
    pub fn new(created_at: NaiveDateTime) -> Self {
        let id = created_at.format(RUN_ID_FORMAT).to_string();
        let root = format!("{ARTIFACT_ROOT}/{id}");

        Self {
            id,
            created_at,
            root,
        }
    }

    /// Starts a run stamped with the current local time.
    #[must_use]
    pub fn start() -> Self {
        Self::new(Local::now().naive_local())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    #[must_use]
    pub fn root(&self) -> ObjectStorePath {
        ObjectStorePath::from(self.root.as_str())
    }

    /// Location of a file produced by `stage`, relative to the stage directory.
    #[must_use]
    pub fn stage_path(&self, stage: Stage, relative: &str) -> ObjectStorePath {
        ObjectStorePath::from(format!("{}/{}/{relative}", self.root, stage.directory()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn created_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    #[test]
    fn test_run_id_format() {
        let run = Run::new(created_at());
        assert_eq!(run.id(), "070325__140509");
        assert_eq!(run.root().as_ref(), "artifacts/070325__140509");
    }

    #[test]
    fn test_stage_paths() {
        let run = Run::new(created_at());
        assert_eq!(
            run.stage_path(Stage::Ingestion, "feature_store/main.csv")
                .as_ref(),
            "artifacts/070325__140509/data_ingestion/feature_store/main.csv"
        );
        assert_eq!(
            run.stage_path(Stage::Validation, "report.yml").as_ref(),
            "artifacts/070325__140509/data_validation/report.yml"
        );
    }

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = Stage::ALL.iter().map(|stage| stage.as_str()).collect();
        assert_eq!(names.first(), Some(&"ingestion"));
        assert_eq!(names.last(), Some(&"pusher"));
        assert_eq!(Stage::FeatureEngineering.to_string(), "feature_engineering");
    }
}
