//! Champion/challenger promotion gate.

use fraud_structs::{EvaluationSummary, ModelQualityError, PipelineResult};
use tracing::{info, warn};

use crate::dataset::LabeledDataset;
use crate::gbdt::GradientBoostedTrees;
use crate::metrics::f1_score;

/// Accepts a challenger when no champion exists or when it scores at least
/// as well as the champion.
///
/// # Errors
///
/// Returns [`ModelQualityError::ChampionNotBeaten`] when the challenger scores lower.
pub fn decide_promotion(
    champion_f1: Option<f64>,
    challenger_f1: f64,
) -> Result<EvaluationSummary, ModelQualityError> {
    let Some(champion) = champion_f1 else {
        info!(challenger_f1, "No deployed model found, accepting the trained model");
        return Ok(EvaluationSummary {
            is_model_accepted: true,
            champion_f1: None,
            challenger_f1,
            improved_score: challenger_f1,
        });
    };

    if challenger_f1 < champion {
        warn!(champion_f1 = champion, challenger_f1, "Trained model is worse than the deployed model");
        return Err(ModelQualityError::ChampionNotBeaten {
            champion_f1: champion,
            challenger_f1,
        });
    }

    let improved_score = challenger_f1 - champion;
    info!(
        champion_f1 = champion,
        challenger_f1, improved_score, "Trained model accepted"
    );

    Ok(EvaluationSummary {
        is_model_accepted: true,
        champion_f1: Some(champion),
        challenger_f1,
        improved_score,
    })
}

/// Scores both models on the same held-out split, then applies [`decide_promotion`].
///
/// # Errors
///
/// Returns a quality error when the challenger loses, or an error if a model
/// does not accept the split's features.
pub fn evaluate_models(
    champion: Option<&GradientBoostedTrees>,
    challenger: &GradientBoostedTrees,
    test: &LabeledDataset,
) -> PipelineResult<EvaluationSummary> {
    let champion_f1 = champion
        .map(|model| model.predict(test.features()))
        .transpose()?
        .map(|predictions| f1_score(test.labels(), &predictions));
    let challenger_f1 = f1_score(test.labels(), &challenger.predict(test.features())?);

    Ok(decide_promotion(champion_f1, challenger_f1)?)
}
