//! Workflow service - CRUD operations for workflows

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::storage::Storage;
use crate::domain::workflow::{extract_placeholders, PlaceholderKind};
use crate::domain::{DomainError, Workflow, WorkflowId, WorkflowStep};

/// Maximum length of a step display name
const MAX_STEP_NAME_LENGTH: usize = 100;

/// Request to create a new workflow
#[derive(Debug, Clone)]
pub struct CreateWorkflowRequest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
    pub system_instruction: Option<String>,
    pub model: Option<String>,
    pub step_delay_ms: u64,
}

impl CreateWorkflowRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            system_instruction: None,
            model: None,
            step_delay_ms: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_step_delay_ms(mut self, delay_ms: u64) -> Self {
        self.step_delay_ms = delay_ms;
        self
    }
}

/// Request to update an existing workflow
#[derive(Debug, Clone, Default)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub steps: Option<Vec<WorkflowStep>>,
    pub system_instruction: Option<Option<String>>,
    pub model: Option<String>,
    pub step_delay_ms: Option<u64>,
}

impl UpdateWorkflowRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = Some(instruction);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_step_delay_ms(mut self, delay_ms: u64) -> Self {
        self.step_delay_ms = Some(delay_ms);
        self
    }
}

/// Workflow service for CRUD operations
pub struct WorkflowService {
    storage: Arc<dyn Storage<Workflow>>,
}

impl std::fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowService").finish()
    }
}

impl WorkflowService {
    pub fn new(storage: Arc<dyn Storage<Workflow>>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Workflow>, DomainError> {
        let workflow_id = self.parse_id(id)?;
        self.storage.get(&workflow_id).await
    }

    /// Get a workflow, failing when it does not exist
    pub async fn require(&self, id: &str) -> Result<Workflow, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Workflow '{}' not found", id)))
    }

    /// List all workflows, sorted by id
    pub async fn list(&self) -> Result<Vec<Workflow>, DomainError> {
        let mut workflows = self.storage.list().await?;
        workflows.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
        Ok(workflows)
    }

    pub async fn create(&self, request: CreateWorkflowRequest) -> Result<Workflow, DomainError> {
        let workflow_id = self.parse_id(&request.id)?;

        if self.storage.exists(&workflow_id).await? {
            return Err(DomainError::conflict(format!(
                "Workflow '{}' already exists",
                request.id
            )));
        }

        let mut workflow = Workflow::new(workflow_id, request.name)
            .with_steps(request.steps)
            .with_step_delay_ms(request.step_delay_ms);

        if let Some(description) = request.description {
            workflow = workflow.with_description(description);
        }

        if let Some(instruction) = request.system_instruction {
            workflow = workflow.with_system_instruction(instruction);
        }

        if let Some(model) = request.model {
            workflow = workflow.with_model(model);
        }

        self.validate(&workflow)?;

        debug!(workflow_id = %workflow.id(), steps = workflow.step_count(), "Creating workflow");
        self.storage.create(workflow).await
    }

    pub async fn update(
        &self,
        id: &str,
        request: UpdateWorkflowRequest,
    ) -> Result<Workflow, DomainError> {
        let mut workflow = self.require(id).await?;

        if let Some(name) = request.name {
            workflow.set_name(name);
        }

        if let Some(description) = request.description {
            workflow.set_description(description);
        }

        if let Some(steps) = request.steps {
            workflow.set_steps(steps);
        }

        if let Some(instruction) = request.system_instruction {
            workflow.set_system_instruction(instruction);
        }

        if let Some(model) = request.model {
            workflow.set_model(model);
        }

        if let Some(delay_ms) = request.step_delay_ms {
            workflow.set_step_delay_ms(delay_ms);
        }

        self.validate(&workflow)?;

        self.storage.update(workflow).await
    }

    /// Creates the workflow or replaces it wholesale, e.g. from a workflow file
    pub async fn import(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        self.validate(&workflow)?;
        self.storage.save(workflow).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        let workflow_id = self.parse_id(id)?;
        self.storage.delete(&workflow_id).await
    }

    pub async fn exists(&self, id: &str) -> Result<bool, DomainError> {
        let workflow_id = self.parse_id(id)?;
        self.storage.exists(&workflow_id).await
    }

    fn parse_id(&self, id: &str) -> Result<WorkflowId, DomainError> {
        WorkflowId::new(id).map_err(|e| DomainError::validation(e.to_string()))
    }

    /// Structural checks; references to later steps are only warned about
    fn validate(&self, workflow: &Workflow) -> Result<(), DomainError> {
        if workflow.is_empty() {
            return Err(DomainError::validation(
                "Workflow must have at least one step",
            ));
        }

        workflow.validate()?;

        for step in workflow.steps() {
            if step.name().trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "Step '{}' has an empty name",
                    step.id()
                )));
            }

            if step.name().len() > MAX_STEP_NAME_LENGTH {
                return Err(DomainError::validation(format!(
                    "Step name too long (max {} characters)",
                    MAX_STEP_NAME_LENGTH
                )));
            }

            if let Some(image) = step.image().filter(|i| i.enabled && i.count == 0) {
                return Err(DomainError::validation(format!(
                    "Step '{}' enables images with a count of {}",
                    step.id(),
                    image.count
                )));
            }
        }

        for warning in forward_references(workflow) {
            warn!(workflow_id = %workflow.id(), "{}", warning);
        }

        Ok(())
    }
}

/// Placeholders that point at the current or a later step.
///
/// `{{prevN}}` such references resolve to an empty string and
/// `{{url_prevN}}` ones always fail the step.
pub fn forward_references(workflow: &Workflow) -> Vec<String> {
    let mut warnings = Vec::new();

    for (position, step) in workflow.steps().iter().enumerate() {
        let templates = [step.prompt(), step.url()];

        for placeholder in templates.iter().flat_map(|t| extract_placeholders(t)) {
            let referenced = match (placeholder.kind, placeholder.index) {
                (PlaceholderKind::Input, _) => continue,
                (PlaceholderKind::UrlPrev, None) if position == 0 => 0,
                (_, None) => continue,
                (_, Some(k)) if k == 0 || k > workflow.step_count() => continue,
                (_, Some(k)) => k - 1,
            };

            if referenced >= position {
                warnings.push(format!(
                    "Step {} ('{}') references {} which has not run yet",
                    position + 1,
                    step.id(),
                    placeholder.raw
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::mock::MockStorage;
    use crate::domain::ImageConfig;

    fn step(id: &str) -> WorkflowStep {
        WorkflowStep::new(id, format!("Step {}", id), "{{input}}")
    }

    fn service_with(storage: MockStorage<Workflow>) -> WorkflowService {
        WorkflowService::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn test_create_workflow() {
        let service = service_with(MockStorage::new());

        let request = CreateWorkflowRequest::new("test-workflow", "Test Workflow")
            .with_description("A test workflow")
            .with_system_instruction("Be brief")
            .with_model("gpt-4o")
            .with_step_delay_ms(250)
            .with_step(step("s1"));

        let workflow = service.create(request).await.unwrap();

        assert_eq!(workflow.id().as_str(), "test-workflow");
        assert_eq!(workflow.description(), Some("A test workflow"));
        assert_eq!(workflow.system_instruction(), Some("Be brief"));
        assert_eq!(workflow.model(), "gpt-4o");
        assert_eq!(workflow.step_delay_ms(), 250);
        assert_eq!(workflow.step_count(), 1);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let existing = Workflow::new(WorkflowId::new("existing").unwrap(), "Existing");
        let service = service_with(MockStorage::new().with_entity(existing));

        let result = service
            .create(CreateWorkflowRequest::new("existing", "New").with_step(step("s1")))
            .await;

        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_invalid_id() {
        let service = service_with(MockStorage::new());

        let result = service
            .create(CreateWorkflowRequest::new("no spaces", "Bad").with_step(step("s1")))
            .await;

        assert!(matches!(result.unwrap_err(), DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_get_and_require() {
        let workflow = Workflow::new(WorkflowId::new("test").unwrap(), "Test").with_step(step("s1"));
        let service = service_with(MockStorage::new().with_entity(workflow));

        assert_eq!(service.get("test").await.unwrap().unwrap().name(), "Test");
        assert!(service.get("nonexistent").await.unwrap().is_none());

        let err = service.require("nonexistent").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_workflow_bumps_version() {
        let workflow =
            Workflow::new(WorkflowId::new("test").unwrap(), "Original").with_step(step("s1"));
        let service = service_with(MockStorage::new().with_entity(workflow));

        let request = UpdateWorkflowRequest::new()
            .with_name("Updated")
            .with_description(Some("New description".to_string()))
            .with_steps(vec![step("s1"), step("s2")]);

        let updated = service.update("test", request).await.unwrap();

        assert_eq!(updated.name(), "Updated");
        assert_eq!(updated.description(), Some("New description"));
        assert_eq!(updated.step_count(), 2);
        assert!(updated.version() > 1);
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let service = service_with(MockStorage::new());

        let result = service
            .update("nonexistent", UpdateWorkflowRequest::new().with_name("New"))
            .await;

        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_delete_workflow() {
        let workflow = Workflow::new(WorkflowId::new("test").unwrap(), "Test");
        let service = service_with(MockStorage::new().with_entity(workflow));

        assert!(service.delete("test").await.unwrap());
        assert!(!service.exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_sorted_by_id() {
        let service = service_with(
            MockStorage::new()
                .with_entity(Workflow::new(WorkflowId::new("w2").unwrap(), "W2"))
                .with_entity(Workflow::new(WorkflowId::new("w1").unwrap(), "W1")),
        );

        let workflows = service.list().await.unwrap();
        assert_eq!(workflows[0].id().as_str(), "w1");
        assert_eq!(workflows[1].id().as_str(), "w2");
    }

    #[tokio::test]
    async fn test_validate_empty_steps() {
        let service = service_with(MockStorage::new());

        let result = service.create(CreateWorkflowRequest::new("test", "Test")).await;

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must have at least one step"));
    }

    #[tokio::test]
    async fn test_validate_duplicate_step_ids() {
        let service = service_with(MockStorage::new());

        let request = CreateWorkflowRequest::new("test", "Test")
            .with_step(step("dup"))
            .with_step(step("dup"));

        let result = service.create(request).await;
        assert!(result.unwrap_err().to_string().contains("Duplicate step id"));
    }

    #[tokio::test]
    async fn test_validate_zero_image_count() {
        let service = service_with(MockStorage::new());

        let request = CreateWorkflowRequest::new("test", "Test")
            .with_step(step("s1").with_image(ImageConfig::new(0)));

        let result = service.create(request).await;
        assert!(matches!(result.unwrap_err(), DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_import_replaces_existing() {
        let original =
            Workflow::new(WorkflowId::new("test").unwrap(), "Original").with_step(step("s1"));
        let service = service_with(MockStorage::new().with_entity(original));

        let replacement =
            Workflow::new(WorkflowId::new("test").unwrap(), "Replacement").with_step(step("s9"));
        service.import(replacement).await.unwrap();

        let stored = service.require("test").await.unwrap();
        assert_eq!(stored.name(), "Replacement");
        assert_eq!(stored.steps()[0].id(), "s9");
    }

    #[test]
    fn test_forward_references() {
        let workflow = Workflow::new(WorkflowId::new("test").unwrap(), "Test")
            .with_step(WorkflowStep::new("s1", "One", "{{input}} {{prev2}}").with_url("{{url_prev}}"))
            .with_step(WorkflowStep::new("s2", "Two", "{{prev1}} {{prev}}").with_url("{{url_prev1}}"))
            .with_step(WorkflowStep::new("s3", "Three", "{{prev3}} {{prev9}}"));

        let warnings = forward_references(&workflow);

        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("{{prev2}}"));
        assert!(warnings[1].contains("{{url_prev}}"));
        assert!(warnings[2].contains("Step 3"));
    }
}
