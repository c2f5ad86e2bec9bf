pub mod types;
pub mod extract;
pub mod titles;
pub mod prompt;
pub mod entity_extractor;
pub mod article_scorer;
pub mod coverage;
pub mod chunk_filter;
pub mod fact_refinement;
pub mod comparison;
pub mod multi_hop;

use thiserror::Error;

use super::inference::InferenceError;

pub use article_scorer::ArticleScorerJoint;
pub use chunk_filter::{ChunkFilterJoint, FilterMode, FilterOptions};
pub use comparison::ComparisonJoint;
pub use coverage::{verify_coverage, MAX_SUGGESTED_SEARCHES};
pub use entity_extractor::EntityExtractorJoint;
pub use extract::extract_json;
pub use fact_refinement::FactRefinementJoint;
pub use multi_hop::MultiHopResolver;
pub use titles::{fuzzy_match, normalize};
pub use types::*;

/// Why a joint's parse-and-validate step rejected a model response.
///
/// Never escapes a joint's public operation: each joint maps `Err` onto its
/// documented fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JointError {
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Unparseable model output: {0}")]
    Parse(String),

    #[error("Invalid model output: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_errors_convert() {
        let err: JointError = InferenceError::Timeout { secs: 30 }.into();
        assert!(matches!(err, JointError::Inference(InferenceError::Timeout { secs: 30 })));
        assert!(err.to_string().starts_with("Inference failed"));
    }

    #[test]
    fn display_names_the_failure_class() {
        assert_eq!(
            JointError::Parse("no JSON found".into()).to_string(),
            "Unparseable model output: no JSON found"
        );
        assert_eq!(
            JointError::Validation("entity 0 missing name".into()).to_string(),
            "Invalid model output: entity 0 missing name"
        );
    }
}
