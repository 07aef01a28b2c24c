use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors produced while turning a caption into a structured recipe
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The caption was empty or only whitespace
    #[error("Caption text cannot be empty")]
    EmptyCaption,

    /// The language model call failed
    #[error("Extraction provider failed: {0}")]
    Provider(String),

    /// The model answered, but not with a JSON object
    #[error("Extraction response is not valid JSON: {0}")]
    InvalidResponse(String),

    /// The JSON did not match the recipe extraction schema
    #[error("Extraction response failed schema validation: {0}")]
    Schema(String),
}

/// Errors produced while waiting for the video backend to index a video
#[derive(Error, Debug)]
pub enum IndexingError {
    /// The indexing task could not be created
    #[error("Failed to submit indexing task: {0}")]
    Submit(String),

    /// A status check failed
    #[error("Failed to poll indexing task {task_id}: {reason}")]
    Poll { task_id: String, reason: String },

    /// The task reached a terminal status other than ready
    #[error("Video indexing failed with status {status}")]
    Terminal { status: String },

    /// The task reported ready without a video id
    #[error("Indexing task {task_id} is ready but returned no video id")]
    MissingVideoId { task_id: String },

    /// The polling budget ran out before the task finished
    #[error("Video indexing did not finish within {0:?}")]
    TimedOut(Duration),

    /// The caller abandoned the wait
    #[error("Video indexing was cancelled")]
    Cancelled,
}

/// Errors produced by the video analysis call itself
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The backend call failed
    #[error("Video analysis request failed: {0}")]
    Backend(String),

    /// The backend answered without any data
    #[error("No data returned from video analysis")]
    EmptyResponse,

    /// The backend did not answer within the request timeout
    #[error("Video analysis did not answer within {0:?}")]
    TimedOut(Duration),

    /// The caller abandoned the request
    #[error("Video analysis was cancelled")]
    Cancelled,
}

/// The analysis succeeded but its output is not a span list
#[derive(Error, Debug)]
#[error("Failed to parse video analysis response: {reason}")]
pub struct AnalysisParseError {
    pub reason: String,
    /// The raw text returned by the backend
    pub raw: String,
}

/// Any failure on the video-alignment side of the pipeline
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Parse(#[from] AnalysisParseError),

    /// No video backend is configured
    #[error("Video analysis is not configured")]
    Unavailable,
}

/// Errors raised by a recipe store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A recipe with this source URL already exists
    #[error("A recipe already exists for source {0}")]
    DuplicateSource(String),

    /// No recipe with this id
    #[error("Recipe {0} not found in store")]
    NotFound(Uuid),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by the recipe service operations
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// A mutating action was attempted by someone other than the creator
    #[error("Recipe {recipe_id} does not belong to the caller")]
    Ownership { recipe_id: Uuid },

    /// The operation needs a signed-in caller
    #[error("This operation requires an authenticated user")]
    Unauthenticated,

    /// The target recipe does not exist
    #[error("Recipe {0} not found")]
    NotFound(Uuid),

    /// Re-analysis was requested for a recipe without a video
    #[error("Recipe {0} has no video to analyze")]
    NoVideo(Uuid),

    /// The request payload is invalid
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A reconciliation step was requested out of order
    #[error("Invalid reconciliation state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    /// No staged candidate exists for this handle
    #[error("Unknown re-analysis candidate {0}")]
    UnknownCandidate(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Service builder misconfiguration
    #[error("Builder error: {0}")]
    Builder(String),
}

impl From<IndexingError> for RecipeError {
    fn from(err: IndexingError) -> Self {
        RecipeError::Alignment(err.into())
    }
}

impl From<AnalysisError> for RecipeError {
    fn from(err: AnalysisError) -> Self {
        RecipeError::Alignment(err.into())
    }
}

impl From<AnalysisParseError> for RecipeError {
    fn from(err: AnalysisParseError) -> Self {
        RecipeError::Alignment(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_errors_keep_underlying_message() {
        let err: RecipeError = IndexingError::Terminal {
            status: "failed".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Video indexing failed with status failed");

        let err: RecipeError = AnalysisParseError {
            reason: "no JSON array found".to_string(),
            raw: "sorry".to_string(),
        }
        .into();
        assert!(matches!(err, RecipeError::Alignment(AlignmentError::Parse(_))));
        assert!(err.to_string().contains("no JSON array found"));
    }

    #[test]
    fn test_ownership_and_not_found_are_distinct() {
        let id = Uuid::new_v4();
        let forbidden = RecipeError::Ownership { recipe_id: id };
        let missing = RecipeError::NotFound(id);
        assert!(forbidden.to_string().contains("does not belong"));
        assert!(missing.to_string().contains("not found"));
    }
}
