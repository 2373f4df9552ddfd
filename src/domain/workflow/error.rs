//! Workflow error types

use thiserror::Error;

use crate::domain::DomainError;

/// Failure reason recorded on an item interrupted by a stop request
pub const STOPPED_BY_USER: &str = "Stopped by user";

/// Errors that can occur while resolving or executing workflow steps
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Missing history for {placeholder}: step {step} has no recorded result")]
    MissingHistory { placeholder: String, step: usize },

    /// Backend failure, rendered verbatim as the item's failure reason
    #[error("{0}")]
    Backend(String),

    #[error("Stopped by user")]
    Stopped,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow has no steps: {0}")]
    EmptyWorkflow(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
}

impl WorkflowError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn step_not_found(id: impl Into<String>) -> Self {
        Self::StepNotFound(id.into())
    }

    pub fn missing_history(placeholder: impl Into<String>, step: usize) -> Self {
        Self::MissingHistory {
            placeholder: placeholder.into(),
            step,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn empty_workflow(id: impl Into<String>) -> Self {
        Self::EmptyWorkflow(id.into())
    }

    pub fn invalid_selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection(message.into())
    }
}

impl From<WorkflowError> for DomainError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::NotFound(_) | WorkflowError::StepNotFound(_) => {
                DomainError::not_found(error.to_string())
            }
            WorkflowError::Validation(_)
            | WorkflowError::EmptyWorkflow(_)
            | WorkflowError::InvalidSelection(_)
            | WorkflowError::MissingHistory { .. } => DomainError::validation(error.to_string()),
            WorkflowError::Backend(message) => DomainError::provider("backend", message),
            WorkflowError::Stopped => DomainError::conflict(error.to_string()),
        }
    }
}
