use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::config::{AppConfig, PipelineConfig, VideoConfig};
use crate::error::RecipeError;
use crate::extraction::{LlmRecipeExtractor, StructuredExtractor};
use crate::pipeline::RecipeService;
use crate::providers::FallbackProvider;
use crate::store::{MemoryRecipeStore, RecipeStore};
use crate::video::{
    PromptPolicy, TemporalAnalyzer, TwelveLabsClient, VideoAligner, VideoBackend, VideoIndexer,
};

/// Builder for a [`RecipeService`]
pub struct RecipeServiceBuilder {
    extractor: Option<Arc<dyn StructuredExtractor>>,
    video_backend: Option<Arc<dyn VideoBackend>>,
    index_id: Option<String>,
    store: Option<Arc<dyn RecipeStore>>,
    import_policy: PromptPolicy,
    poll_interval: Duration,
    poll_budget: Duration,
    request_timeout: Duration,
    temperature: f32,
    batch_pacing: Duration,
    candidate_retention: Duration,
}

impl Default for RecipeServiceBuilder {
    fn default() -> Self {
        let video = VideoConfig::default();
        let pipeline = PipelineConfig::default();
        RecipeServiceBuilder {
            extractor: None,
            video_backend: None,
            index_id: None,
            store: None,
            import_policy: PromptPolicy::default(),
            poll_interval: video.poll_interval(),
            poll_budget: video.poll_budget(),
            request_timeout: video.request_timeout(),
            temperature: video.temperature,
            batch_pacing: Duration::from_millis(pipeline.batch_pacing_ms),
            candidate_retention: Duration::from_secs(pipeline.candidate_retention_secs),
        }
    }
}

impl RecipeServiceBuilder {
    /// Set the caption extractor
    pub fn extractor(mut self, extractor: Arc<dyn StructuredExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the video-understanding backend.
    ///
    /// Without one, imports save untimed steps and re-analysis fails.
    pub fn video_backend(mut self, backend: Arc<dyn VideoBackend>) -> Self {
        self.video_backend = Some(backend);
        self
    }

    /// Index that videos are submitted to
    pub fn index_id(mut self, index_id: impl Into<String>) -> Self {
        self.index_id = Some(index_id.into());
        self
    }

    /// Set the recipe store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<dyn RecipeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Prompt policy used when aligning freshly imported recipes
    ///
    /// # Example
    /// ```
    /// use cooklang_reel::{PromptPolicy, RecipeService};
    ///
    /// let builder = RecipeService::builder().import_policy(PromptPolicy::Tolerant);
    /// ```
    pub fn import_policy(mut self, policy: PromptPolicy) -> Self {
        self.import_policy = policy;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Total time to wait for a video to finish indexing
    pub fn poll_budget(mut self, budget: Duration) -> Self {
        self.poll_budget = budget;
        self
    }

    /// Upper bound for a single analysis call
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Pause between items of [`RecipeService::stage_batch`]
    pub fn batch_pacing(mut self, pacing: Duration) -> Self {
        self.batch_pacing = pacing;
        self
    }

    /// How long an unchanged re-analysis candidate is kept before it is
    /// forgotten
    pub fn candidate_retention(mut self, retention: Duration) -> Self {
        self.candidate_retention = retention;
        self
    }

    /// Configure extraction, video analysis and timings from `config`.
    ///
    /// The extractor goes through [`FallbackProvider`]. The Twelve Labs
    /// client is only set up when an API key is available; otherwise the
    /// service runs without video alignment.
    ///
    /// # Example
    /// ```no_run
    /// use cooklang_reel::{AppConfig, RecipeService};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = AppConfig::load()?;
    /// let service = RecipeService::builder().from_config(&config)?.build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(mut self, config: &AppConfig) -> Result<Self, RecipeError> {
        let provider = FallbackProvider::new(config)
            .map_err(|e| RecipeError::Builder(format!("No extraction provider: {}", e)))?;
        self.extractor = Some(Arc::new(LlmRecipeExtractor::new(Box::new(provider))));

        let video = &config.video;
        if video.resolved_api_key().is_some() {
            let client = TwelveLabsClient::from_config(video)
                .map_err(|e| RecipeError::Builder(format!("Video backend: {}", e)))?;
            self.video_backend = Some(Arc::new(client));
            self.index_id = video.resolved_index_id();
        } else {
            warn!("No Twelve Labs API key configured; video alignment is disabled");
        }

        self.import_policy = config.pipeline.import_policy.parse()?;
        self.poll_interval = video.poll_interval();
        self.poll_budget = video.poll_budget();
        self.request_timeout = video.request_timeout();
        self.temperature = video.temperature;
        self.batch_pacing = Duration::from_millis(config.pipeline.batch_pacing_ms);
        self.candidate_retention = Duration::from_secs(config.pipeline.candidate_retention_secs);
        Ok(self)
    }

    pub fn build(self) -> Result<RecipeService, RecipeError> {
        let extractor = self.extractor.ok_or_else(|| {
            RecipeError::Builder("No extractor specified. Use .extractor() or .from_config()".to_string())
        })?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryRecipeStore::new()));

        let aligner = match self.video_backend {
            Some(backend) => {
                let index_id = self.index_id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
                    RecipeError::Builder(
                        "A video index id is required with a video backend (TWELVE_LABS_INDEX_ID)"
                            .to_string(),
                    )
                })?;
                let indexer = VideoIndexer::new(
                    backend.clone(),
                    index_id,
                    self.poll_interval,
                    self.poll_budget,
                );
                let analyzer = TemporalAnalyzer::new(backend, self.temperature, self.request_timeout);
                Some(Arc::new(VideoAligner::new(indexer, analyzer)))
            }
            None => None,
        };

        info!(
            "Recipe service ready (model {}, video alignment {})",
            extractor.model_name(),
            if aligner.is_some() { "on" } else { "off" }
        );

        Ok(RecipeService::new(
            extractor,
            store,
            aligner,
            self.import_policy,
            self.batch_pacing,
            self.candidate_retention,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::model::RecipeExtraction;
    use async_trait::async_trait;

    struct NoopExtractor;

    #[async_trait]
    impl StructuredExtractor for NoopExtractor {
        fn model_name(&self) -> &str {
            "noop"
        }

        async fn extract(&self, _caption: &str) -> Result<RecipeExtraction, ExtractionError> {
            Err(ExtractionError::EmptyCaption)
        }
    }

    #[test]
    fn test_build_requires_extractor() {
        match RecipeService::builder().build() {
            Err(RecipeError::Builder(message)) => assert!(message.contains("extractor")),
            _ => panic!("expected a builder error"),
        }
    }

    #[test]
    fn test_build_without_video_backend() {
        let service = RecipeService::builder()
            .extractor(Arc::new(NoopExtractor))
            .build()
            .unwrap();
        assert!(!service.can_align());
    }

    #[test]
    fn test_video_backend_requires_index_id() {
        let backend = TwelveLabsClient::new("key", "http://localhost", Duration::from_secs(1)).unwrap();
        let result = RecipeService::builder()
            .extractor(Arc::new(NoopExtractor))
            .video_backend(Arc::new(backend))
            .build();
        assert!(matches!(result, Err(RecipeError::Builder(_))));
    }

    #[test]
    fn test_unknown_import_policy_in_config() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".to_string(),
            crate::config::ProviderConfig {
                enabled: true,
                model: "claude-sonnet-4-20250514".to_string(),
                temperature: 0.2,
                max_tokens: 4000,
                api_key: Some("test-key".to_string()),
                base_url: None,
            },
        );
        config.pipeline.import_policy = "aggressive".to_string();

        assert!(matches!(
            RecipeService::builder().from_config(&config),
            Err(RecipeError::InvalidInput(_))
        ));
    }
}
