use thiserror::Error;

use crate::domain::workflow::WorkflowError;
use crate::domain::DomainError;

/// Failures of a single prompt dispatch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Selector not found: {0}")]
    SelectorNotFound(String),

    #[error("Timed out after {0}ms waiting for the response")]
    Timeout(u64),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Execution aborted")]
    Aborted,

    #[error("Script error: {0}")]
    Script(String),
}

impl BackendError {
    pub fn selector_not_found(selector: impl Into<String>) -> Self {
        Self::SelectorNotFound(selector.into())
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }
}

impl From<DomainError> for BackendError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Provider { provider, message } => {
                Self::Provider(format!("{} - {}", provider, message))
            }
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<BackendError> for WorkflowError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Aborted => WorkflowError::Stopped,
            other => WorkflowError::backend(other.to_string()),
        }
    }
}
