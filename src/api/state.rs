//! Application state for shared services

use std::sync::Arc;

use crate::domain::{DomainError, Workflow};
use crate::infrastructure::services::{
    CreateWorkflowRequest, QueueService, UpdateWorkflowRequest, WorkflowService,
};
use crate::infrastructure::workflow::RunController;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<dyn WorkflowServiceTrait>,
    pub queue_service: Arc<QueueService>,
    pub runner: Arc<RunController>,
}

impl AppState {
    pub fn new(
        workflow_service: Arc<dyn WorkflowServiceTrait>,
        queue_service: Arc<QueueService>,
        runner: Arc<RunController>,
    ) -> Self {
        Self {
            workflow_service,
            queue_service,
            runner,
        }
    }
}

/// Trait for workflow service operations
#[async_trait::async_trait]
pub trait WorkflowServiceTrait: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Workflow>, DomainError>;
    async fn require(&self, id: &str) -> Result<Workflow, DomainError>;
    async fn list(&self) -> Result<Vec<Workflow>, DomainError>;
    async fn create(&self, request: CreateWorkflowRequest) -> Result<Workflow, DomainError>;
    async fn update(&self, id: &str, request: UpdateWorkflowRequest) -> Result<Workflow, DomainError>;
    async fn import(&self, workflow: Workflow) -> Result<Workflow, DomainError>;
    async fn delete(&self, id: &str) -> Result<bool, DomainError>;
}

#[async_trait::async_trait]
impl WorkflowServiceTrait for WorkflowService {
    async fn get(&self, id: &str) -> Result<Option<Workflow>, DomainError> {
        WorkflowService::get(self, id).await
    }

    async fn require(&self, id: &str) -> Result<Workflow, DomainError> {
        WorkflowService::require(self, id).await
    }

    async fn list(&self) -> Result<Vec<Workflow>, DomainError> {
        WorkflowService::list(self).await
    }

    async fn create(&self, request: CreateWorkflowRequest) -> Result<Workflow, DomainError> {
        WorkflowService::create(self, request).await
    }

    async fn update(&self, id: &str, request: UpdateWorkflowRequest) -> Result<Workflow, DomainError> {
        WorkflowService::update(self, id, request).await
    }

    async fn import(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        WorkflowService::import(self, workflow).await
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        WorkflowService::delete(self, id).await
    }
}
