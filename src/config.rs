use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

pub const DEFAULT_MODEL_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Default `tracing` filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "earnings_war_room=info,war_room=info";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Main configuration structure loaded from war_room.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub data: DataConfig,
    pub generation: GenerationConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// External text-generation endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    pub api_version: String,
    /// Output token budget sent with every request
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_tokens: 1000,
            timeout_ms: 60_000,
        }
    }
}

/// Where the four reference tables live
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Explicit data directory; wins over `search_paths` when set
    pub data_dir: Option<PathBuf>,
    /// Candidate directories, first existing one is used
    pub search_paths: Vec<PathBuf>,
    pub target_metrics_file: String,
    pub peer_metrics_file: String,
    pub analyst_ratings_file: String,
    pub peer_news_file: String,
    pub delimiter: char,
    /// Per-request budget for `http(s)` sources
    pub fetch_timeout_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            search_paths: vec![PathBuf::from("./data"), PathBuf::from("../data")],
            target_metrics_file: "snowflake_ir_metrics.csv".to_string(),
            peer_metrics_file: "data_peer_financial_metrics.csv".to_string(),
            analyst_ratings_file: "analyst_ratings.csv".to_string(),
            peer_news_file: "data_peer_news_snippets.csv".to_string(),
            delimiter: ',',
            fetch_timeout_ms: 30_000,
        }
    }
}

/// Behaviour of the two generation workflows
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub default_question_count: usize,
    pub max_question_count: usize,
    /// Substitute canned artifacts on model/extraction failure instead of surfacing the error
    pub fallback_on_error: bool,
    /// Append loaded reference tables to the question prompt
    pub include_reference_context: bool,
    /// Rows of news/ratings rendered into the reference context
    pub context_rows: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_question_count: 5,
            max_question_count: 10,
            fallback_on_error: true,
            include_reference_context: false,
            context_rows: 5,
        }
    }
}

impl GenerationConfig {
    /// Clamp a caller-supplied question count into `1..=max_question_count`.
    pub fn clamp_count(&self, count: usize) -> usize {
        count.clamp(1, self.max_question_count.max(1))
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_key: Option<String>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            log_level: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses WAR_ROOM_CONFIG environment variable or defaults to "war_room.toml"
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("WAR_ROOM_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path =
            std::env::var("WAR_ROOM_CONFIG").unwrap_or_else(|_| "war_room.toml".to_string());

        let mut config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            self.model.model = model;
        }
        if let Ok(endpoint) = std::env::var("WAR_ROOM_MODEL_ENDPOINT") {
            self.model.endpoint = endpoint;
        }
        if let Some(max_tokens) = std::env::var("WAR_ROOM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.model.max_tokens = max_tokens;
        }
        if let Some(timeout) = std::env::var("WAR_ROOM_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.model.timeout_ms = timeout;
        }
        if let Ok(dir) = std::env::var("WAR_ROOM_DATA_DIR") {
            self.data.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(count) = std::env::var("WAR_ROOM_QUESTION_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.generation.default_question_count = count;
        }
        if let Ok(strict) = std::env::var("WAR_ROOM_STRICT") {
            self.generation.fallback_on_error =
                !(strict == "1" || strict.eq_ignore_ascii_case("true"));
        }
    }

    /// Validate the configuration, clamping soft limits
    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.model.max_tokens == 0 {
            anyhow::bail!("model.max_tokens must be > 0");
        }
        if self.model.timeout_ms == 0 {
            tracing::warn!("model.timeout_ms must be > 0, using 60000");
            self.model.timeout_ms = 60_000;
        }
        if self.data.fetch_timeout_ms == 0 {
            tracing::warn!("data.fetch_timeout_ms must be > 0, using 30000");
            self.data.fetch_timeout_ms = 30_000;
        }
        if !self.data.delimiter.is_ascii() {
            anyhow::bail!(
                "data.delimiter must be a single-byte character, got {:?}",
                self.data.delimiter
            );
        }
        if self.generation.max_question_count == 0 {
            tracing::warn!("generation.max_question_count of 0 raised to 1");
            self.generation.max_question_count = 1;
        }
        if self.generation.default_question_count == 0 {
            anyhow::bail!("generation.default_question_count must be >= 1");
        }
        if self.generation.default_question_count > self.generation.max_question_count {
            tracing::warn!(
                "default_question_count {} exceeds max {}, clamping",
                self.generation.default_question_count,
                self.generation.max_question_count
            );
            self.generation.default_question_count = self.generation.max_question_count;
        }
        if !self.model.endpoint.starts_with("http://")
            && !self.model.endpoint.starts_with("https://")
        {
            tracing::warn!(
                "Model endpoint '{}' doesn't start with http:// or https://",
                self.model.endpoint
            );
        }
        Ok(())
    }
}
