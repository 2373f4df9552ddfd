//! Workflow management admin endpoints

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::workflow::{Workflow, WorkflowStep};
use crate::infrastructure::services::{
    forward_references, CreateWorkflowRequest, UpdateWorkflowRequest,
};

/// Request to create a new workflow
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowApiRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub step_delay_ms: u64,
}

/// Request to update a workflow
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateWorkflowApiRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub steps: Option<Vec<WorkflowStep>>,
    pub system_instruction: Option<Option<String>>,
    pub model: Option<String>,
    pub step_delay_ms: Option<u64>,
}

/// Workflow response for admin API
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
    pub system_instruction: Option<String>,
    pub model: String,
    pub step_delay_ms: u64,
    pub version: u32,
    /// Placeholders pointing at the current or a later step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Workflow> for WorkflowResponse {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id().as_str().to_string(),
            name: workflow.name().to_string(),
            description: workflow.description().map(String::from),
            steps: workflow.steps().to_vec(),
            system_instruction: workflow.system_instruction().map(String::from),
            model: workflow.model().to_string(),
            step_delay_ms: workflow.step_delay_ms(),
            version: workflow.version(),
            warnings: forward_references(workflow),
            created_at: workflow.created_at().to_rfc3339(),
            updated_at: workflow.updated_at().to_rfc3339(),
        }
    }
}

/// List workflows response
#[derive(Debug, Clone, Serialize)]
pub struct ListWorkflowsResponse {
    pub workflows: Vec<WorkflowResponse>,
    pub total: usize,
}

/// GET /admin/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<ListWorkflowsResponse>, ApiError> {
    debug!("Admin listing all workflows");

    let workflows = state.workflow_service.list().await.map_err(ApiError::from)?;

    let workflow_responses: Vec<WorkflowResponse> =
        workflows.iter().map(WorkflowResponse::from).collect();
    let total = workflow_responses.len();

    Ok(Json(ListWorkflowsResponse {
        workflows: workflow_responses,
        total,
    }))
}

/// POST /admin/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkflowApiRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    debug!(workflow_id = %request.id, "Admin creating workflow");

    let create_request = CreateWorkflowRequest {
        id: request.id,
        name: request.name,
        description: request.description,
        steps: request.steps,
        system_instruction: request.system_instruction,
        model: request.model,
        step_delay_ms: request.step_delay_ms,
    };

    let workflow = state
        .workflow_service
        .create(create_request)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(WorkflowResponse::from(&workflow)))
}

/// PUT /admin/workflows/import
///
/// Stores a complete workflow document, replacing any workflow with its id
pub async fn import_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    debug!(workflow_id = %workflow.id(), "Admin importing workflow");

    let workflow = state
        .workflow_service
        .import(workflow)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(WorkflowResponse::from(&workflow)))
}

/// GET /admin/workflows/:workflow_id
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    debug!(workflow_id = %workflow_id, "Admin getting workflow");

    let workflow = state
        .workflow_service
        .get(&workflow_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("Workflow '{}' not found", workflow_id)))?;

    Ok(Json(WorkflowResponse::from(&workflow)))
}

/// PUT /admin/workflows/:workflow_id
pub async fn update_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(request): Json<UpdateWorkflowApiRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    debug!(workflow_id = %workflow_id, "Admin updating workflow");

    let update_request = UpdateWorkflowRequest {
        name: request.name,
        description: request.description,
        steps: request.steps,
        system_instruction: request.system_instruction,
        model: request.model,
        step_delay_ms: request.step_delay_ms,
    };

    let workflow = state
        .workflow_service
        .update(&workflow_id, update_request)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(WorkflowResponse::from(&workflow)))
}

/// DELETE /admin/workflows/:workflow_id
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(workflow_id = %workflow_id, "Admin deleting workflow");

    let deleted = state
        .workflow_service
        .delete(&workflow_id)
        .await
        .map_err(ApiError::from)?;

    if !deleted {
        return Err(ApiError::not_found(format!("Workflow '{}' not found", workflow_id)));
    }

    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": workflow_id
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_workflow_request_deserialization() {
        let json = r#"{
            "id": "article-pipeline",
            "name": "Article pipeline",
            "system_instruction": "Answer in HTML",
            "steps": [
                { "id": "s1", "name": "Outline", "prompt": "Outline {{input}}", "url": "https://chat.example/" },
                { "id": "s2", "name": "Draft", "prompt": "Write from {{prev}}",
                  "image": { "enabled": true, "count": 2, "auto_insert": true } }
            ]
        }"#;

        let request: CreateWorkflowApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.id, "article-pipeline");
        assert_eq!(request.steps.len(), 2);
        assert_eq!(request.steps[1].image().unwrap().count, 2);
        assert_eq!(request.step_delay_ms, 0);
        assert!(request.model.is_none());
    }

    #[test]
    fn test_update_workflow_request_deserialization() {
        let json = r#"{
            "name": "Updated Name",
            "system_instruction": null,
            "step_delay_ms": 250
        }"#;

        let request: UpdateWorkflowApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.name, Some("Updated Name".to_string()));
        assert_eq!(request.step_delay_ms, Some(250));
        assert!(request.steps.is_none());
    }

    #[test]
    fn test_response_lists_forward_references() {
        let workflow = Workflow::new(crate::domain::WorkflowId::new("wf").unwrap(), "WF")
            .with_step(WorkflowStep::new("s1", "First", "Use {{prev2}}"))
            .with_step(WorkflowStep::new("s2", "Second", "Use {{prev}}"));

        let response = WorkflowResponse::from(&workflow);

        assert_eq!(response.steps.len(), 2);
        assert_eq!(response.warnings.len(), 1);
        assert!(response.warnings[0].contains("{{prev2}}"));
    }
}
