use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::multipart::Form;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::config::VideoConfig;
use crate::model::{TaskId, VideoHandle};
use crate::providers::ProviderError;

/// Normalized state of an indexing task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexingState {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl IndexingState {
    /// Map a backend status string onto the states this crate reasons about
    pub fn from_backend(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "ready" => IndexingState::Ready,
            "failed" => IndexingState::Failed,
            "uploading" | "validating" | "pending" | "queued" => IndexingState::Queued,
            _ => IndexingState::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexingState::Ready | IndexingState::Failed)
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexingState::Queued => "queued",
            IndexingState::Processing => "processing",
            IndexingState::Ready => "ready",
            IndexingState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One observation of an indexing task
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingStatus {
    pub task_id: TaskId,
    pub state: IndexingState,
    /// Status string exactly as the backend reported it
    pub raw_status: String,
    /// Present once the video is indexed
    pub video_id: Option<String>,
}

/// Raw reply of an analysis call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyzeResponse {
    pub data: Option<String>,
}

/// The video-understanding backend
#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Submit a video URL for indexing into `index_id`
    async fn create_task(&self, index_id: &str, video_url: &str) -> Result<TaskId, ProviderError>;

    /// Current status of an indexing task
    async fn task_status(&self, task_id: &TaskId) -> Result<IndexingStatus, ProviderError>;

    /// Run a free-form prompt against an indexed video
    async fn analyze(
        &self,
        video: &VideoHandle,
        prompt: &str,
        temperature: f32,
    ) -> Result<AnalyzeResponse, ProviderError>;
}

/// [`VideoBackend`] implementation for the Twelve Labs HTTP API
pub struct TwelveLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct TaskCreated {
    #[serde(alias = "id", rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct TaskBody {
    #[serde(alias = "id", rename = "_id")]
    id: String,
    status: String,
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct AnalyzeBody {
    #[serde(default)]
    data: Option<String>,
}

impl TwelveLabsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(TwelveLabsClient {
            client: Client::builder().timeout(request_timeout).build()?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from configuration; the API key is required
    pub fn from_config(config: &VideoConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .resolved_api_key()
            .ok_or("TWELVE_LABS_API_KEY not found in config or environment")?;

        Self::new(api_key, config.base_url.clone(), config.request_timeout())
    }

    async fn check(response: Response) -> Result<Response, ProviderError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await?;
        Err(format!("Twelve Labs API error ({}): {}", status, error_text).into())
    }
}

#[async_trait]
impl VideoBackend for TwelveLabsClient {
    async fn create_task(&self, index_id: &str, video_url: &str) -> Result<TaskId, ProviderError> {
        let form = Form::new()
            .text("index_id", index_id.to_string())
            .text("video_url", video_url.to_string());

        let response = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let created: TaskCreated = Self::check(response).await?.json().await?;
        debug!("Created indexing task {}", created.id);
        Ok(TaskId(created.id))
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<IndexingStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/tasks/{}", self.base_url, task_id))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let body: TaskBody = Self::check(response).await?.json().await?;
        Ok(IndexingStatus {
            task_id: TaskId(body.id),
            state: IndexingState::from_backend(&body.status),
            raw_status: body.status,
            video_id: body.video_id.filter(|id| !id.is_empty()),
        })
    }

    async fn analyze(
        &self,
        video: &VideoHandle,
        prompt: &str,
        temperature: f32,
    ) -> Result<AnalyzeResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "video_id": video.0,
                "prompt": prompt,
                "temperature": temperature,
                "stream": false
            }))
            .send()
            .await?;

        let body: AnalyzeBody = Self::check(response).await?.json().await?;
        Ok(AnalyzeResponse { data: body.data })
    }
}
