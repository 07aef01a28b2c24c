//! Caption → structured recipe.

mod prompt;

pub use prompt::{
    build_extraction_prompt, ENGLISH_OUTPUT_RULE, EXTRACTION_SCHEMA_PROMPT,
    RECIPE_EXTRACTION_PROMPT,
};

use std::collections::HashSet;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::error::ExtractionError;
use crate::json_text::first_json_object;
use crate::model::{Ingredient, RecipeExtraction, Step};
use crate::providers::LlmProvider;

/// Turns a free-text caption into ingredients and untimed steps
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Model name recorded on recipes created from this extractor
    fn model_name(&self) -> &str;

    async fn extract(&self, caption: &str) -> Result<RecipeExtraction, ExtractionError>;
}

/// Extractor backed by any [`LlmProvider`]
pub struct LlmRecipeExtractor {
    provider: Box<dyn LlmProvider>,
}

impl LlmRecipeExtractor {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StructuredExtractor for LlmRecipeExtractor {
    fn model_name(&self) -> &str {
        self.provider.model()
    }

    async fn extract(&self, caption: &str) -> Result<RecipeExtraction, ExtractionError> {
        if caption.trim().is_empty() {
            return Err(ExtractionError::EmptyCaption);
        }

        info!(
            "Extracting recipe with {} ({})",
            self.provider.provider_name(),
            self.provider.model()
        );

        let reply = self
            .provider
            .complete_with_model(EXTRACTION_SCHEMA_PROMPT, &build_extraction_prompt(caption))
            .await
            .map_err(|e| ExtractionError::Provider(e.to_string()))?;
        debug!("Extraction reply from {}: {}", reply.model, reply.text);

        let mut extraction = parse_extraction(&reply.text)?;
        extraction.model = Some(reply.model);
        Ok(extraction)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    ingredients: Vec<Ingredient>,
    steps: Vec<RawStep>,
    #[serde(default)]
    prep_time_minutes: Option<f64>,
    #[serde(default)]
    cook_time_minutes: Option<f64>,
    #[serde(default)]
    servings: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    order: f64,
    instruction: String,
    #[serde(default)]
    duration_minutes: Option<f64>,
}

/// Parse and validate a model reply against the extraction schema.
///
/// The reply may contain prose around the JSON object. Steps are returned
/// sorted by `order`.
pub fn parse_extraction(reply: &str) -> Result<RecipeExtraction, ExtractionError> {
    let json = first_json_object(reply).ok_or_else(|| {
        ExtractionError::InvalidResponse("no JSON object found in reply".to_string())
    })?;

    let raw: RawExtraction =
        serde_json::from_str(json).map_err(|e| ExtractionError::Schema(e.to_string()))?;

    validate(raw)
}

fn validate(raw: RawExtraction) -> Result<RecipeExtraction, ExtractionError> {
    if raw.steps.is_empty() {
        return Err(ExtractionError::Schema("no steps extracted".to_string()));
    }

    let mut ingredients = Vec::with_capacity(raw.ingredients.len());
    for (index, mut ingredient) in raw.ingredients.into_iter().enumerate() {
        let name = ingredient.name.trim();
        if name.is_empty() {
            return Err(ExtractionError::Schema(format!(
                "ingredient {} has no name",
                index + 1
            )));
        }
        ingredient.name = name.to_string();
        ingredients.push(ingredient);
    }

    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(raw.steps.len());
    for raw_step in raw.steps {
        let order = step_order(raw_step.order)?;
        if !seen.insert(order) {
            return Err(ExtractionError::Schema(format!(
                "step order {} appears more than once",
                order
            )));
        }

        let instruction = raw_step.instruction.trim();
        if instruction.is_empty() {
            return Err(ExtractionError::Schema(format!(
                "step {} has an empty instruction",
                order
            )));
        }

        let mut step = Step::new(order, instruction);
        step.duration_minutes = raw_step
            .duration_minutes
            .filter(|minutes| minutes.is_finite() && *minutes >= 0.0);
        steps.push(step);
    }
    steps.sort_by_key(|step| step.order);

    Ok(RecipeExtraction {
        ingredients,
        steps,
        prep_time_minutes: whole_number(raw.prep_time_minutes),
        cook_time_minutes: whole_number(raw.cook_time_minutes),
        servings: whole_number(raw.servings),
        model: None,
    })
}

fn step_order(value: f64) -> Result<u32, ExtractionError> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(ExtractionError::Schema(format!(
            "step order must be a whole number starting at 1, got {}",
            value
        )))
    }
}

// Estimates such as 7.5 are rounded; nonsense values are dropped
fn whole_number(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round().min(u32::MAX as f64) as u32)
}
