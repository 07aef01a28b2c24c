#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cooklang_reel::model::TaskId;
use cooklang_reel::providers::ProviderError;
use cooklang_reel::video::{AnalyzeResponse, IndexingState, IndexingStatus};
use cooklang_reel::{
    ExtractionError, Ingredient, MemoryRecipeStore, PromptPolicy, RecipeExtraction, RecipeService,
    RecipeStore, Step, StructuredExtractor, VideoBackend, VideoHandle,
};

pub const PASTA_CAPTION: &str = "Boil water. Add pasta. Drain.";

pub const TOLERANT_REPLY: &str = r#"[
  {"step": 1, "description": "Boil water.", "startSeconds": 0, "endSeconds": 20, "confidence": 0.9},
  {"step": 2, "description": "Add pasta.", "startSeconds": 18, "endSeconds": 90, "confidence": 0.4},
  {"step": 3, "description": "Drain.", "startSeconds": null, "endSeconds": null, "confidence": 0.1}
]"#;

pub fn pasta_extraction() -> RecipeExtraction {
    RecipeExtraction {
        ingredients: vec![Ingredient::new("pasta"), Ingredient::new("water")],
        steps: vec![
            Step::new(1, "Boil water."),
            Step::new(2, "Add pasta."),
            Step::new(3, "Drain."),
        ],
        prep_time_minutes: Some(2),
        cook_time_minutes: Some(12),
        servings: Some(2),
        model: None,
    }
}

/// Extractor returning a fixed result
pub struct FakeExtractor {
    pub result: Result<RecipeExtraction, String>,
    pub calls: AtomicU32,
}

impl FakeExtractor {
    pub fn pasta() -> Arc<Self> {
        Arc::new(FakeExtractor {
            result: Ok(pasta_extraction()),
            calls: AtomicU32::new(0),
        })
    }

    /// Extraction reporting that `model` produced it
    pub fn answered_by(model: &str) -> Arc<Self> {
        let mut extraction = pasta_extraction();
        extraction.model = Some(model.to_string());
        Arc::new(FakeExtractor {
            result: Ok(extraction),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(FakeExtractor {
            result: Err(reason.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredExtractor for FakeExtractor {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    async fn extract(&self, caption: &str) -> Result<RecipeExtraction, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if caption.trim().is_empty() {
            return Err(ExtractionError::EmptyCaption);
        }
        self.result
            .clone()
            .map_err(ExtractionError::Provider)
    }
}

/// How the fake video backend behaves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoMode {
    /// Ready after this many "indexing" polls
    ReadyAfter(u32),
    NeverReady,
    IndexingFails,
    AnalyzeFails,
}

pub struct FakeVideo {
    mode: Mutex<VideoMode>,
    reply: Mutex<String>,
    polls: AtomicU32,
    pub tasks: AtomicU32,
    pub analyze_calls: AtomicU32,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeVideo {
    pub fn new(mode: VideoMode, reply: &str) -> Arc<Self> {
        Arc::new(FakeVideo {
            mode: Mutex::new(mode),
            reply: Mutex::new(reply.to_string()),
            polls: AtomicU32::new(0),
            tasks: AtomicU32::new(0),
            analyze_calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }

    pub fn set_mode(&self, mode: VideoMode) {
        *self.mode.lock().unwrap() = mode;
        self.polls.store(0, Ordering::SeqCst);
    }

    pub fn tasks(&self) -> u32 {
        self.tasks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoBackend for FakeVideo {
    async fn create_task(&self, index_id: &str, _video_url: &str) -> Result<TaskId, ProviderError> {
        assert_eq!(index_id, "idx-test");
        self.polls.store(0, Ordering::SeqCst);
        let n = self.tasks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskId(format!("task-{}", n)))
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<IndexingStatus, ProviderError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        let (status, video_id) = match mode {
            VideoMode::ReadyAfter(n) if polls >= n => ("ready", Some("vid-1".to_string())),
            VideoMode::AnalyzeFails => ("ready", Some("vid-1".to_string())),
            VideoMode::IndexingFails => ("failed", None),
            _ => ("indexing", None),
        };
        Ok(IndexingStatus {
            task_id: task_id.clone(),
            state: IndexingState::from_backend(status),
            raw_status: status.to_string(),
            video_id,
        })
    }

    async fn analyze(
        &self,
        video: &VideoHandle,
        prompt: &str,
        _temperature: f32,
    ) -> Result<AnalyzeResponse, ProviderError> {
        assert_eq!(video.0, "vid-1");
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if *self.mode.lock().unwrap() == VideoMode::AnalyzeFails {
            return Err("analysis service unavailable".into());
        }
        Ok(AnalyzeResponse {
            data: Some(self.reply.lock().unwrap().clone()),
        })
    }
}

pub fn service(
    extractor: Arc<FakeExtractor>,
    video: Option<Arc<FakeVideo>>,
    store: Arc<dyn RecipeStore>,
) -> RecipeService {
    let mut builder = RecipeService::builder()
        .extractor(extractor)
        .store(store)
        .import_policy(PromptPolicy::Tolerant)
        .poll_interval(Duration::from_secs(5))
        .poll_budget(Duration::from_secs(60))
        .request_timeout(Duration::from_secs(30))
        .batch_pacing(Duration::from_millis(500));

    if let Some(video) = video {
        builder = builder.video_backend(video).index_id("idx-test");
    }
    builder.build().unwrap()
}

pub fn memory_store() -> Arc<dyn RecipeStore> {
    Arc::new(MemoryRecipeStore::new())
}
