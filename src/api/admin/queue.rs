//! Queue admin endpoints

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{Progress, QueueItem, QueueItemId};
use crate::infrastructure::services::AddQueueItemRequest;

/// Queue contents at one snapshot version
#[derive(Debug, Clone, Serialize)]
pub struct QueueListResponse {
    pub version: u64,
    pub items: Vec<QueueItem>,
    pub total: usize,
    pub running: bool,
    pub progress: Progress,
}

/// Bulk import body
#[derive(Debug, Clone, Deserialize)]
pub struct ImportQueueApiRequest {
    pub items: Vec<AddQueueItemRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportQueueResponse {
    pub imported: usize,
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditOutputApiRequest {
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectImageApiRequest {
    pub candidate_index: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RerunStepApiRequest {
    /// Defaults to the workflow recorded on the item
    #[serde(default)]
    pub workflow_id: Option<String>,
}

/// GET /admin/queue
pub async fn list_queue(State(state): State<AppState>) -> Json<QueueListResponse> {
    let snapshot = state.queue_service.snapshot();

    Json(QueueListResponse {
        version: snapshot.version,
        total: snapshot.items.len(),
        items: snapshot.items.clone(),
        running: state.runner.is_running(),
        progress: state.runner.progress(),
    })
}

/// POST /admin/queue
pub async fn add_item(
    State(state): State<AppState>,
    Json(request): Json<AddQueueItemRequest>,
) -> Result<Json<QueueItem>, ApiError> {
    debug!("Admin adding queue item");

    let item = state
        .queue_service
        .add(request)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

/// POST /admin/queue/import
pub async fn import_items(
    State(state): State<AppState>,
    Json(request): Json<ImportQueueApiRequest>,
) -> Result<Json<ImportQueueResponse>, ApiError> {
    debug!(count = request.items.len(), "Admin importing queue items");

    let items = state
        .queue_service
        .import(request.items)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ImportQueueResponse {
        imported: items.len(),
        items,
    }))
}

/// DELETE /admin/queue
pub async fn clear_queue(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Admin clearing queue");

    state.queue_service.clear().await.map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({ "cleared": true })))
}

/// POST /admin/queue/reset-failed
pub async fn reset_failed(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let reset = state
        .queue_service
        .reset_failed()
        .await
        .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({ "reset": reset })))
}

/// GET /admin/queue/:item_id
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<QueueItem>, ApiError> {
    let item = state
        .queue_service
        .get(&item_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

/// DELETE /admin/queue/:item_id
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(item_id = %item_id, "Admin deleting queue item");

    state
        .queue_service
        .delete(&item_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": item_id
    })))
}

/// POST /admin/queue/:item_id/reset
pub async fn reset_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<QueueItem>, ApiError> {
    debug!(item_id = %item_id, "Admin resetting queue item");

    let item = state
        .queue_service
        .reset(&item_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

/// PUT /admin/queue/:item_id/steps/:step_id/output
pub async fn edit_output(
    State(state): State<AppState>,
    Path((item_id, step_id)): Path<(String, String)>,
    Json(request): Json<EditOutputApiRequest>,
) -> Result<Json<QueueItem>, ApiError> {
    debug!(item_id = %item_id, step_id = %step_id, "Admin editing step output");

    let item = state
        .queue_service
        .edit_output(&item_id, &step_id, request.response)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

/// POST /admin/queue/:item_id/steps/:step_id/images/:image_index/select
pub async fn select_image(
    State(state): State<AppState>,
    Path((item_id, step_id, image_index)): Path<(String, String, usize)>,
    Json(request): Json<SelectImageApiRequest>,
) -> Result<Json<QueueItem>, ApiError> {
    debug!(
        item_id = %item_id,
        step_id = %step_id,
        image_index,
        candidate_index = request.candidate_index,
        "Admin selecting image candidate"
    );

    let item = state
        .queue_service
        .reselect_image(&item_id, &step_id, image_index, request.candidate_index)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

/// POST /admin/queue/:item_id/steps/:step_id/rerun
pub async fn rerun_step(
    State(state): State<AppState>,
    Path((item_id, step_id)): Path<(String, String)>,
    Json(request): Json<RerunStepApiRequest>,
) -> Result<Json<QueueItem>, ApiError> {
    debug!(item_id = %item_id, step_id = %step_id, "Admin re-running step");

    let item = state
        .queue_service
        .get(&item_id)
        .await
        .map_err(ApiError::from)?;

    let workflow_id = request
        .workflow_id
        .or_else(|| item.workflow_id().map(|id| id.as_str().to_string()))
        .ok_or_else(|| {
            ApiError::bad_request("No workflow given and none recorded on the item")
                .with_param("workflow_id")
        })?;

    let workflow = state
        .workflow_service
        .require(&workflow_id)
        .await
        .map_err(ApiError::from)?;

    let step_index = workflow.step_index(&step_id).ok_or_else(|| {
        ApiError::not_found(format!(
            "Step '{}' not found in workflow '{}'",
            step_id, workflow_id
        ))
    })?;

    let item = state
        .runner
        .engine()
        .rerun_step(&workflow, &QueueItemId::from(item_id), step_index)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_request_deserialization() {
        let json = r#"{
            "items": [
                { "original_prompt": "first" },
                { "original_prompt": "", "mapped_inputs": { "input": "a", "input2": "b" } }
            ]
        }"#;

        let request: ImportQueueApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.items.len(), 2);
        assert_eq!(
            request.items[1].mapped_inputs.as_ref().unwrap().get("input2"),
            Some(&"b".to_string())
        );
    }

    #[test]
    fn test_rerun_request_accepts_empty_body() {
        let request: RerunStepApiRequest = serde_json::from_str("{}").unwrap();
        assert!(request.workflow_id.is_none());
    }
}
