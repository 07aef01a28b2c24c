pub mod alignment;
pub mod builder;
pub mod config;
pub mod error;
pub mod extraction;
pub mod json_text;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod reconcile;
pub mod store;
pub mod video;

pub use alignment::merge;
pub use builder::RecipeServiceBuilder;
pub use config::AppConfig;
pub use error::{
    AlignmentError, AnalysisError, AnalysisParseError, ExtractionError, IndexingError,
    RecipeError, StoreError,
};
pub use extraction::{parse_extraction, LlmRecipeExtractor, StructuredExtractor};
pub use model::{
    Caller, ImportRequest, Ingredient, Recipe, RecipeDraft, RecipeExtraction, RecipeId,
    SourcePlatform, Step, TimeSpan, UserId, VideoHandle,
};
pub use pipeline::{AlignmentOutcome, BatchItem, RecipeService, SaveOutcome};
pub use reconcile::{CandidateHandle, Comparison, Decision, ReanalysisState, ReviewState};
pub use store::{JsonFileStore, MemoryRecipeStore, RecipeStore};
pub use video::{build_prompt, CustomPrompt, PromptPolicy, TwelveLabsClient, VideoBackend};

use log::debug;

use crate::providers::FallbackProvider;

/// Extract a structured recipe from a caption using the configured provider.
///
/// Configuration is read the same way as [`AppConfig::load`].
///
/// # Example
/// ```no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extraction = cooklang_reel::extract_recipe("Boil water. Add pasta. Drain.").await?;
/// for step in &extraction.steps {
///     println!("{}. {}", step.order, step.instruction);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_recipe(caption: &str) -> Result<RecipeExtraction, RecipeError> {
    let config = AppConfig::load()?;
    let provider = FallbackProvider::new(&config)
        .map_err(|e| ExtractionError::Provider(e.to_string()))?;
    debug!("Extracting with default provider '{}'", config.default_provider);

    let extractor = LlmRecipeExtractor::new(Box::new(provider));
    Ok(extractor.extract(caption).await?)
}
