//! Prompt Pipeline
//!
//! Replays a queue of inputs through multi-step conversational AI workflows:
//! - Template placeholders linking each step to earlier answers
//! - Interchangeable execution backends (browser, extension, API, simulated)
//! - Response normalization and automatic image insertion
//! - Resumable per-item progress with stop and retry

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use api::state::AppState;
use domain::{QueueItem, Workflow};
use infrastructure::{
    backend::{BackendDependencies, BackendFactory},
    http_client::HttpClient,
    image::{HttpImageSearch, ImageEnricher},
    queue::QueueStore,
    services::{QueueService, WorkflowService},
    storage::{StorageConfig, StorageFactory},
    workflow::{RunController, WorkflowEngine},
};
use tracing::info;

/// Collection names used by the configured storage
const WORKFLOWS_COLLECTION: &str = "workflows";
const QUEUE_COLLECTION: &str = "queue";

/// Wired services shared by the HTTP host and the batch command
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub workflow_service: Arc<WorkflowService>,
    pub queue_service: Arc<QueueService>,
    pub engine: Arc<WorkflowEngine>,
}

/// Create application state from `config/` files and `APP__` variables
pub async fn create_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::load().unwrap_or_default();
    create_app_state_with_config(&config).await
}

/// Create application state with the given configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let pipeline = build_pipeline(config).await?;

    Ok(AppState::new(
        pipeline.workflow_service,
        pipeline.queue_service,
        Arc::new(RunController::new(pipeline.engine)),
    ))
}

/// Builds storage, the queue store, the backend and the engine
pub async fn build_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let storage_config = StorageConfig::from_settings(&config.storage)?;
    info!(storage = ?storage_config.storage_type(), "Initializing storage");

    let workflow_storage =
        StorageFactory::create::<Workflow>(&storage_config, WORKFLOWS_COLLECTION).await?;
    let queue_storage = StorageFactory::create::<QueueItem>(&storage_config, QUEUE_COLLECTION).await?;

    let queue = Arc::new(QueueStore::open(queue_storage).await?);
    info!(items = queue.snapshot().items.len(), "Queue loaded");

    let llm = BackendFactory::create_llm_provider(&config.backend)?;
    let backend = BackendFactory::create(&config.backend, BackendDependencies::new(llm))?;
    info!(mode = %backend.kind(), "Execution backend ready");

    let mut engine = WorkflowEngine::new(backend, queue.clone());

    if let Some(enricher) = create_image_enricher(config)? {
        info!(selection = %config.image_search.selection, "Image enrichment enabled");
        engine = engine.with_enricher(enricher);
    }

    Ok(Pipeline {
        workflow_service: Arc::new(WorkflowService::new(workflow_storage)),
        queue_service: Arc::new(QueueService::new(queue)),
        engine: Arc::new(engine),
    })
}

/// Image enrichment is only wired when a search endpoint is configured
fn create_image_enricher(config: &AppConfig) -> anyhow::Result<Option<Arc<ImageEnricher>>> {
    let settings = &config.image_search;

    let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let client = HttpClient::with_timeout(Duration::from_secs(settings.request_timeout_secs))?;
    let search = HttpImageSearch::new(client, endpoint, settings.api_key.clone());

    Ok(Some(Arc::new(ImageEnricher::new(
        Arc::new(search),
        settings.selection,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::domain::BackendMode;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage = StorageSettings {
            backend: "memory".to_string(),
            ..Default::default()
        };
        config.backend.mode = BackendMode::Simulated;
        config
    }

    #[tokio::test]
    async fn test_build_pipeline_in_memory() {
        let pipeline = build_pipeline(&memory_config()).await.unwrap();

        assert!(pipeline.queue_service.snapshot().items.is_empty());
        assert!(!pipeline.engine.is_running());
        assert!(pipeline.workflow_service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_desktop_mode_without_launcher_fails() {
        let mut config = memory_config();
        config.backend.mode = BackendMode::Desktop;

        assert!(build_pipeline(&config).await.is_err());
    }

    #[test]
    fn test_image_enricher_requires_endpoint() {
        let mut config = memory_config();
        assert!(create_image_enricher(&config).unwrap().is_none());

        config.image_search.endpoint = Some("http://images.local/search".to_string());
        assert!(create_image_enricher(&config).unwrap().is_some());
    }
}
