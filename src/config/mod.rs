mod app_config;

pub use app_config::{
    AppConfig, BackendConfig, ImageSearchConfig, LogFormat, LoggingConfig, MetricsConfig,
    ServerConfig, StorageSettings,
};
