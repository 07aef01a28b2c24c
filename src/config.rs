use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Extraction provider to use when not specified
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Fallback configuration for automatic provider switching
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Video indexing and analysis backend
    #[serde(default)]
    pub video: VideoConfig,
    /// Import pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Recipe store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Extraction request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
            fallback: FallbackConfig::default(),
            video: VideoConfig::default(),
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
            timeout: default_timeout(),
        }
    }
}

/// Configuration for a specific LLM provider
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    pub enabled: bool,
    /// Model identifier (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,
    /// Temperature for generation (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key for authentication (can also be set via environment variable)
    pub api_key: Option<String>,
    /// Base URL for API endpoint (for custom or proxy endpoints)
    pub base_url: Option<String>,
}

/// Configuration for provider fallback and retry behavior
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    /// Whether fallback is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Order of providers to try (first to last)
    #[serde(default)]
    pub order: Vec<String>,
    /// Number of retry attempts per provider before fallback
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Initial delay between retries in milliseconds (grows with each attempt)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            order: Vec::new(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Configuration for the video-understanding backend (Twelve Labs)
#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    /// API key (falls back to TWELVE_LABS_API_KEY)
    pub api_key: Option<String>,
    /// Index that videos are submitted to (falls back to TWELVE_LABS_INDEX_ID)
    pub index_id: Option<String>,
    #[serde(default = "default_video_base_url")]
    pub base_url: String,
    /// Seconds between two indexing status checks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Total seconds to wait for a video to become ready
    #[serde(default = "default_poll_budget_secs")]
    pub poll_budget_secs: u64,
    /// Upper bound for a single backend request
    #[serde(default = "default_video_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Sampling temperature for the analysis prompt
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_id: None,
            base_url: default_video_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_budget_secs: default_poll_budget_secs(),
            request_timeout_secs: default_video_request_timeout_secs(),
            temperature: default_analysis_temperature(),
        }
    }
}

impl VideoConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_budget(&self) -> Duration {
        Duration::from_secs(self.poll_budget_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// API key from config, then the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        non_blank(self.api_key.clone())
            .or_else(|| non_blank(std::env::var("TWELVE_LABS_API_KEY").ok()))
    }

    /// Index id from config, then the environment
    pub fn resolved_index_id(&self) -> Option<String> {
        non_blank(self.index_id.clone())
            .or_else(|| non_blank(std::env::var("TWELVE_LABS_INDEX_ID").ok()))
    }
}

/// Configuration for the import pipeline
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Prompt policy used when aligning a freshly imported recipe
    #[serde(default = "default_import_policy")]
    pub import_policy: String,
    /// Pause between records of a batch job, in milliseconds
    #[serde(default = "default_batch_pacing_ms")]
    pub batch_pacing_ms: u64,
    /// How long an untouched re-analysis candidate is kept, in seconds
    #[serde(default = "default_candidate_retention_secs")]
    pub candidate_retention_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            import_policy: default_import_policy(),
            batch_pacing_ms: default_batch_pacing_ms(),
            candidate_retention_secs: default_candidate_retention_secs(),
        }
    }
}

/// Configuration for the JSON file recipe store used by the CLI
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Default value functions
fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    60
}

fn default_video_base_url() -> String {
    "https://api.twelvelabs.io/v1.3".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_budget_secs() -> u64 {
    600
}

fn default_video_request_timeout_secs() -> u64 {
    120
}

fn default_analysis_temperature() -> f32 {
    0.2
}

fn default_import_policy() -> String {
    "strict".to_string()
}

fn default_batch_pacing_ms() -> u64 {
    500
}

fn default_candidate_retention_secs() -> u64 {
    60 * 60
}

fn default_store_path() -> String {
    "recipes.json".to_string()
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with COOKLANG_REEL__ prefix
    /// 2. cooklang-reel.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: COOKLANG_REEL__VIDEO__API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        load_config()
    }
}

/// Load configuration from file and environment variables
///
/// See [`AppConfig::load`] for the precedence rules.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        // Optional config file (can be missing)
        .add_source(File::with_name("cooklang-reel").required(false))
        // Use double underscore for nested: COOKLANG_REEL__PROVIDERS__OPENAI__API_KEY
        .add_source(
            Environment::with_prefix("COOKLANG_REEL")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}
