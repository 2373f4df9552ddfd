//! Run control endpoints

use axum::{
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::{Progress, QueueItemId};
use crate::infrastructure::workflow::RunStatus;

/// Body of POST /admin/runs
#[derive(Debug, Clone, Deserialize)]
pub struct StartRunApiRequest {
    pub workflow_id: String,
    /// Items to process in this order; every unfinished item when omitted
    #[serde(default)]
    pub item_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStateResponse {
    pub running: bool,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<RunStatus>,
}

/// POST /admin/runs
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunApiRequest>,
) -> Result<(StatusCode, Json<RunStatus>), ApiError> {
    debug!(workflow_id = %request.workflow_id, "Admin starting run");

    let workflow = state
        .workflow_service
        .require(&request.workflow_id)
        .await
        .map_err(ApiError::from)?;

    let selection = request
        .item_ids
        .map(|ids| ids.into_iter().map(QueueItemId::from).collect());

    // The task keeps running after the response; its outcome lands in `last`
    let (status, _handle) = state
        .runner
        .start(workflow, selection)
        .await
        .map_err(ApiError::from)?;

    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// POST /admin/runs/stop
pub async fn stop_run(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stopped = state.runner.stop().await;

    if stopped {
        info!("Run stop requested through the admin API");
    }

    Json(serde_json::json!({ "stopped": stopped }))
}

/// GET /admin/runs/current
pub async fn current_run(State(state): State<AppState>) -> Json<RunStateResponse> {
    Json(RunStateResponse {
        running: state.runner.is_running(),
        progress: state.runner.progress(),
        last: state.runner.last().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_selection_is_optional() {
        let request: StartRunApiRequest =
            serde_json::from_str(r#"{ "workflow_id": "wf" }"#).unwrap();
        assert!(request.item_ids.is_none());

        let request: StartRunApiRequest =
            serde_json::from_str(r#"{ "workflow_id": "wf", "item_ids": ["b", "a"] }"#).unwrap();
        assert_eq!(request.item_ids.unwrap(), vec!["b", "a"]);
    }
}
