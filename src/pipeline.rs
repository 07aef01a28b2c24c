//! The recipe service: import, reads, manual timing edits and re-analysis.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::builder::RecipeServiceBuilder;
use crate::error::{AlignmentError, RecipeError, StoreError};
use crate::extraction::StructuredExtractor;
use crate::model::{
    Caller, ImportRequest, Recipe, RecipeDraft, RecipeId, SourcePlatform, Step,
};
use crate::reconcile::{
    owned_recipe, require_user, CandidateHandle, Comparison, Decision, ReanalysisState,
    Reconciler,
};
use crate::store::RecipeStore;
use crate::video::{PromptPolicy, VideoAligner};

const TITLE_MAX_CHARS: usize = 200;
const UNTITLED: &str = "Untitled recipe";

/// How the video side of an import went
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    /// Steps were timed; `timed_steps` of them received at least one value
    Aligned { timed_steps: usize },
    /// No video to align, or the recipe already existed
    Skipped,
    /// Alignment failed and the recipe was saved with untimed steps
    Failed(String),
}

/// Result of [`RecipeService::extract_and_save`]
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub recipe_id: RecipeId,
    /// `false` when a recipe for the same source already existed
    pub is_new: bool,
    pub recipe: Recipe,
    pub alignment: AlignmentOutcome,
}

/// One item of a [`RecipeService::stage_batch`] run
#[derive(Debug)]
pub struct BatchItem {
    pub recipe_id: RecipeId,
    pub result: Result<CandidateHandle, RecipeError>,
}

pub struct RecipeService {
    extractor: Arc<dyn StructuredExtractor>,
    store: Arc<dyn RecipeStore>,
    aligner: Option<Arc<VideoAligner>>,
    reconciler: Reconciler,
    import_policy: PromptPolicy,
    batch_pacing: Duration,
}

impl RecipeService {
    pub fn builder() -> RecipeServiceBuilder {
        RecipeServiceBuilder::default()
    }

    pub(crate) fn new(
        extractor: Arc<dyn StructuredExtractor>,
        store: Arc<dyn RecipeStore>,
        aligner: Option<Arc<VideoAligner>>,
        import_policy: PromptPolicy,
        batch_pacing: Duration,
        candidate_retention: Duration,
    ) -> Self {
        RecipeService {
            reconciler: Reconciler::new(store.clone(), aligner.clone(), candidate_retention),
            extractor,
            store,
            aligner,
            import_policy,
            batch_pacing,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecipeStore> {
        &self.store
    }

    /// Whether a video backend is configured
    pub fn can_align(&self) -> bool {
        self.aligner.is_some()
    }

    /// Extract a recipe from a caption, align it to its video and save it.
    ///
    /// Saving is idempotent per source URL: if a recipe already exists for
    /// `request.source_url` it is returned with `is_new = false` and nothing
    /// is extracted. Extraction failures abort the import. Alignment
    /// failures do not; the recipe is saved with untimed steps and the
    /// failure is reported in [`SaveOutcome::alignment`].
    pub async fn extract_and_save(
        &self,
        request: ImportRequest,
        caller: &Caller,
        cancel: &CancellationToken,
    ) -> Result<SaveOutcome, RecipeError> {
        let user = require_user(caller)?.clone();
        let source = parse_http_url("source URL", &request.source_url)?;
        let source_url = request.source_url.trim().to_string();
        let video_url = optional_url("video URL", request.video_url.as_deref())?;
        let thumbnail_url = optional_url("thumbnail URL", request.thumbnail_url.as_deref())?;

        if let Some(existing) = self.store.find_by_source_url(&source_url).await? {
            debug!("Recipe for {} already exists as {}", source_url, existing.id);
            return Ok(existing_outcome(existing));
        }

        let extraction = self.extractor.extract(&request.caption).await?;
        info!(
            "Extracted {} ingredients and {} steps from {}",
            extraction.ingredients.len(),
            extraction.steps.len(),
            source_url
        );

        let (steps, alignment) = match video_url.as_deref() {
            Some(video_url) => self.align_on_import(video_url, &extraction.steps, cancel).await,
            None => (extraction.steps.clone(), AlignmentOutcome::Skipped),
        };

        let draft = RecipeDraft {
            source_platform: SourcePlatform::detect(&source),
            title: title_from_caption(&request.caption),
            description: Some(request.caption.trim().to_string()),
            video_url,
            thumbnail_url,
            ingredients: extraction.ingredients,
            original_steps: steps.clone(),
            steps,
            prep_time_minutes: extraction.prep_time_minutes,
            cook_time_minutes: extraction.cook_time_minutes,
            servings: extraction.servings,
            extraction_model: extraction
                .model
                .or_else(|| Some(self.extractor.model_name().to_string())),
            created_by_user_id: Some(user),
            source_url: source_url.clone(),
        };

        match self.store.insert(draft).await {
            Ok(recipe) => {
                info!("Created recipe {} from {}", recipe.id, source_url);
                Ok(SaveOutcome {
                    recipe_id: recipe.id,
                    is_new: true,
                    recipe,
                    alignment,
                })
            }
            Err(StoreError::DuplicateSource(url)) => {
                // Lost a concurrent first save; the winner's record stands
                debug!("Concurrent import of {} detected", url);
                let existing = self
                    .store
                    .find_by_source_url(&url)
                    .await?
                    .ok_or_else(|| StoreError::DuplicateSource(url.clone()))?;
                Ok(existing_outcome(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn align_on_import(
        &self,
        video_url: &str,
        steps: &[Step],
        cancel: &CancellationToken,
    ) -> (Vec<Step>, AlignmentOutcome) {
        let result = match &self.aligner {
            Some(aligner) => {
                aligner
                    .align(video_url, steps, &self.import_policy, cancel)
                    .await
            }
            None => Err(AlignmentError::Unavailable),
        };

        match result {
            Ok(aligned) => {
                let timed_steps = aligned.iter().filter(|s| s.has_timing()).count();
                info!("Aligned {}/{} steps to {}", timed_steps, aligned.len(), video_url);
                (aligned, AlignmentOutcome::Aligned { timed_steps })
            }
            Err(e) => {
                warn!("Video alignment failed for {}: {}", video_url, e);
                let untimed = steps.iter().map(Step::untimed).collect();
                (untimed, AlignmentOutcome::Failed(e.to_string()))
            }
        }
    }

    pub async fn get_by_id(&self, recipe_id: RecipeId) -> Result<Recipe, RecipeError> {
        self.store
            .find_by_id(recipe_id)
            .await?
            .ok_or(RecipeError::NotFound(recipe_id))
    }

    pub async fn get_by_source_url(&self, source_url: &str) -> Result<Option<Recipe>, RecipeError> {
        Ok(self.store.find_by_source_url(source_url.trim()).await?)
    }

    /// Recipes imported by the caller, newest first
    pub async fn list_imported_by(&self, caller: &Caller) -> Result<Vec<Recipe>, RecipeError> {
        let user = require_user(caller)?;
        Ok(self.store.list_by_creator(user).await?)
    }

    /// Replace the steps of an owned recipe with a manually edited list.
    ///
    /// Every stored step order must still be present; steps cannot be
    /// deleted this way.
    pub async fn update_step_timings(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
        steps: Vec<Step>,
    ) -> Result<Recipe, RecipeError> {
        let recipe = owned_recipe(self.store.as_ref(), recipe_id, caller).await?;
        validate_edited_steps(&recipe.steps, &steps)?;

        let updated = self.store.update_steps(recipe_id, steps).await?;
        info!("Updated step timings of recipe {}", recipe_id);
        Ok(updated)
    }

    /// Restore the steps captured when the recipe was first saved
    pub async fn reset_step_timings(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
    ) -> Result<Recipe, RecipeError> {
        let recipe = owned_recipe(self.store.as_ref(), recipe_id, caller).await?;
        let updated = self
            .store
            .update_steps(recipe_id, recipe.original_steps)
            .await?;
        info!("Reset step timings of recipe {}", recipe_id);
        Ok(updated)
    }

    /// Register a re-analysis without running it
    pub async fn begin_reanalysis(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
        policy: PromptPolicy,
    ) -> Result<CandidateHandle, RecipeError> {
        self.reconciler.begin(recipe_id, caller, policy).await
    }

    pub async fn run_reanalysis(
        &self,
        handle: CandidateHandle,
        cancel: &CancellationToken,
    ) -> Result<(), RecipeError> {
        self.reconciler.run(handle, cancel).await
    }

    /// Re-analyze the stored video and stage the result for review.
    ///
    /// The stored steps are not touched until [`RecipeService::commit`]
    /// applies the candidate.
    pub async fn start_reanalysis(
        &self,
        recipe_id: RecipeId,
        caller: &Caller,
        policy: PromptPolicy,
        cancel: &CancellationToken,
    ) -> Result<CandidateHandle, RecipeError> {
        let handle = self.reconciler.begin(recipe_id, caller, policy).await?;
        self.reconciler.run(handle, cancel).await?;
        Ok(handle)
    }

    pub fn reanalysis_state(&self, handle: CandidateHandle) -> Result<ReanalysisState, RecipeError> {
        self.reconciler.state(handle)
    }

    pub async fn get_comparison(&self, handle: CandidateHandle) -> Result<Comparison, RecipeError> {
        self.reconciler.get_comparison(handle).await
    }

    pub async fn commit(
        &self,
        handle: CandidateHandle,
        caller: &Caller,
        decision: Decision,
    ) -> Result<Recipe, RecipeError> {
        self.reconciler.commit(handle, caller, decision).await
    }

    /// Stage re-analysis candidates for several recipes, one at a time.
    ///
    /// Items are paced by the configured batch delay. Candidates are only
    /// staged; nothing is applied. Cancellation stops before the next item.
    pub async fn stage_batch(
        &self,
        recipe_ids: &[RecipeId],
        caller: &Caller,
        policy: &PromptPolicy,
        cancel: &CancellationToken,
    ) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(recipe_ids.len());

        for (index, recipe_id) in recipe_ids.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.batch_pacing) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            let result = self
                .start_reanalysis(*recipe_id, caller, policy.clone(), cancel)
                .await;
            if let Err(e) = &result {
                warn!("Could not stage re-analysis for {}: {}", recipe_id, e);
            }
            items.push(BatchItem {
                recipe_id: *recipe_id,
                result,
            });
        }

        info!(
            "Staged {} of {} re-analyses",
            items.iter().filter(|item| item.result.is_ok()).count(),
            recipe_ids.len()
        );
        items
    }
}

fn existing_outcome(recipe: Recipe) -> SaveOutcome {
    SaveOutcome {
        recipe_id: recipe.id,
        is_new: false,
        recipe,
        alignment: AlignmentOutcome::Skipped,
    }
}

/// First caption line, at most 200 characters
pub fn title_from_caption(caption: &str) -> String {
    let first_line = caption
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if first_line.is_empty() {
        return UNTITLED.to_string();
    }
    first_line.chars().take(TITLE_MAX_CHARS).collect()
}

fn parse_http_url(field: &str, value: &str) -> Result<Url, RecipeError> {
    let url = Url::parse(value.trim())
        .map_err(|e| RecipeError::InvalidInput(format!("invalid {} '{}': {}", field, value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(RecipeError::InvalidInput(format!(
            "{} must use http or https, got {}",
            field, scheme
        ))),
    }
}

fn optional_url(field: &str, value: Option<&str>) -> Result<Option<String>, RecipeError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => {
            parse_http_url(field, value)?;
            Ok(Some(value.to_string()))
        }
        None => Ok(None),
    }
}

fn validate_edited_steps(stored: &[Step], edited: &[Step]) -> Result<(), RecipeError> {
    let invalid = |message: String| Err(RecipeError::InvalidInput(message));

    let mut orders = HashSet::new();
    for step in edited {
        if step.order < 1 {
            return invalid("step order must be at least 1".to_string());
        }
        if !orders.insert(step.order) {
            return invalid(format!("step order {} appears more than once", step.order));
        }
        if step.instruction.trim().is_empty() {
            return invalid(format!("step {} has an empty instruction", step.order));
        }
        for time in [step.video_start_time, step.video_end_time].into_iter().flatten() {
            if !time.is_finite() || time < 0.0 {
                return invalid(format!("step {} has an invalid time {}", step.order, time));
            }
        }
        if let (Some(start), Some(end)) = step.timing() {
            if end <= start {
                return invalid(format!(
                    "step {} ends at {}s, not after its start at {}s",
                    step.order, end, start
                ));
            }
        }
    }

    if let Some(missing) = stored.iter().find(|step| !orders.contains(&step.order)) {
        return invalid(format!("step {} cannot be removed", missing.order));
    }
    Ok(())
}
