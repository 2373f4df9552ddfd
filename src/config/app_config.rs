use std::path::PathBuf;

use serde::Deserialize;

use crate::domain::{BackendMode, ImageSelectionPolicy};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageSettings,
    pub backend: BackendConfig,
    pub image_search: ImageSearchConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Where workflows and queue items are kept
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// `memory` or `file`
    pub backend: String,
    pub data_dir: PathBuf,
}

/// Execution backend selection and tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Base URL of the OpenAI-compatible text-generation service
    pub api_base_url: String,
    pub api_key: String,
    pub default_model: String,
    pub request_timeout_secs: u64,
    pub simulated_delay_ms: u64,
    pub headless: bool,
    pub profile_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub input_timeout_ms: u64,
    /// How long to wait for the generating indicator to show up
    pub appear_timeout_ms: u64,
    /// How long generation may take once started
    pub max_wait_ms: u64,
    /// Pause used when no generating indicator was seen
    pub fallback_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSearchConfig {
    /// Search endpoint; image enrichment is disabled when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub selection: ImageSelectionPolicy,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Api,
            api_base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            default_model: crate::domain::workflow::DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            simulated_delay_ms: 1500,
            headless: true,
            profile_dir: None,
            poll_interval_ms: 500,
            input_timeout_ms: 15_000,
            appear_timeout_ms: 10_000,
            max_wait_ms: 180_000,
            fallback_delay_ms: 5_000,
        }
    }
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            selection: ImageSelectionPolicy::Random,
            request_timeout_secs: 30,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
