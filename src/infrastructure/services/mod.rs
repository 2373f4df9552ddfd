//! Infrastructure services

mod queue_service;
mod workflow_service;

pub use queue_service::{AddQueueItemRequest, QueueService};
pub use workflow_service::{
    forward_references, CreateWorkflowRequest, UpdateWorkflowRequest, WorkflowService,
};
