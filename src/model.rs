use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifier of a persisted recipe
pub type RecipeId = Uuid;

/// A single ingredient as written in the caption.
///
/// Quantity and unit are free-form strings: captions are informal and unit
/// normalization is requested from the extractor, not enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub quantity: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub notes: Option<String>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>) -> Self {
        Ingredient {
            name: name.into(),
            quantity: None,
            unit: None,
            notes: None,
        }
    }
}

/// A recipe step, optionally anchored to a range of the source video.
///
/// `order` is the join key between extraction and video analysis. Having
/// only one of the two timing fields set is a valid partial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub order: u32,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    /// Seconds from the start of the video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_start_time: Option<f64>,
    /// Seconds from the start of the video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_end_time: Option<f64>,
}

impl Step {
    pub fn new(order: u32, instruction: impl Into<String>) -> Self {
        Step {
            order,
            instruction: instruction.into(),
            duration_minutes: None,
            video_start_time: None,
            video_end_time: None,
        }
    }

    pub fn with_timing(mut self, start: f64, end: f64) -> Self {
        self.video_start_time = Some(start);
        self.video_end_time = Some(end);
        self
    }

    /// The playable range, only when both ends are present and ordered
    pub fn video_range(&self) -> Option<(f64, f64)> {
        match (self.video_start_time, self.video_end_time) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        }
    }

    pub fn has_timing(&self) -> bool {
        self.video_start_time.is_some() || self.video_end_time.is_some()
    }

    pub fn timing(&self) -> (Option<f64>, Option<f64>) {
        (self.video_start_time, self.video_end_time)
    }

    /// A copy of this step with both timing fields removed
    pub fn untimed(&self) -> Step {
        Step {
            video_start_time: None,
            video_end_time: None,
            ..self.clone()
        }
    }
}

/// Result of a single extraction call. Steps carry no timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeExtraction {
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    /// Model that produced the extraction, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A candidate timing for one analyzed step.
///
/// `None` means the analyzer found no visual evidence. It is never the same
/// thing as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpan {
    pub step: u32,
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TimeSpan {
    pub fn new(step: u32, start_seconds: Option<f64>, end_seconds: Option<f64>) -> Self {
        TimeSpan {
            step,
            start_seconds,
            end_seconds,
            confidence: None,
        }
    }
}

/// Backend-assigned identifier of a fully indexed video
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoHandle(pub String);

impl fmt::Display for VideoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a video indexing task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePlatform {
    Tiktok,
    Instagram,
    Youtube,
    Other,
}

impl SourcePlatform {
    /// Guess the platform from the host of a source URL
    pub fn detect(url: &url::Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches("tiktok.com") {
            SourcePlatform::Tiktok
        } else if matches("instagram.com") {
            SourcePlatform::Instagram
        } else if matches("youtube.com") || matches("youtu.be") {
            SourcePlatform::Youtube
        } else {
            SourcePlatform::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourcePlatform::Tiktok => "tiktok",
            SourcePlatform::Instagram => "instagram",
            SourcePlatform::Youtube => "youtube",
            SourcePlatform::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(UserId),
}

impl Caller {
    pub fn user(id: impl Into<String>) -> Self {
        Caller::User(UserId::new(id))
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Caller::Anonymous => None,
            Caller::User(id) => Some(id),
        }
    }
}

/// A persisted recipe. Public once created; only its creator may mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    pub source_url: String,
    pub source_platform: SourcePlatform,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    /// Snapshot of the first merged step list, never overwritten
    pub original_steps: Vec<Step>,
    #[serde(default)]
    pub prep_time_minutes: Option<u32>,
    #[serde(default)]
    pub cook_time_minutes: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub extraction_model: Option<String>,
    #[serde(default)]
    pub created_by_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Recipe {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.created_by_user_id.as_ref() == Some(user)
    }
}

/// Everything the store needs to create a recipe
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub source_url: String,
    pub source_platform: SourcePlatform,
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    pub original_steps: Vec<Step>,
    pub prep_time_minutes: Option<u32>,
    pub cook_time_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub extraction_model: Option<String>,
    pub created_by_user_id: Option<UserId>,
}

impl RecipeDraft {
    pub fn into_recipe(self, id: RecipeId, created_at: DateTime<Utc>) -> Recipe {
        Recipe {
            id,
            source_url: self.source_url,
            source_platform: self.source_platform,
            title: self.title,
            description: self.description,
            video_url: self.video_url,
            thumbnail_url: self.thumbnail_url,
            ingredients: self.ingredients,
            steps: self.steps,
            original_steps: self.original_steps,
            prep_time_minutes: self.prep_time_minutes,
            cook_time_minutes: self.cook_time_minutes,
            servings: self.servings,
            extraction_model: self.extraction_model,
            created_by_user_id: self.created_by_user_id,
            created_at,
        }
    }
}

/// What the upstream URL supplier hands us for one source link
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub source_url: String,
    pub caption: String,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl ImportRequest {
    pub fn new(source_url: impl Into<String>, caption: impl Into<String>) -> Self {
        ImportRequest {
            source_url: source_url.into(),
            caption: caption.into(),
            ..Default::default()
        }
    }

    pub fn video(mut self, video_url: impl Into<String>) -> Self {
        self.video_url = Some(video_url.into());
        self
    }
}

// Models sometimes answer `"quantity": 2` instead of `"quantity": "2"`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}
