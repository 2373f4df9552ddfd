use thiserror::Error;

/// Errors shared by the pipeline services, the engine and the host surfaces.
///
/// Step failures inside a run never surface here: they are written to the
/// queue item and the run continues. These errors reject a whole operation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Unknown workflow, queue item, step or image
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Malformed workflow, queue import entry or run selection
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Chat API or image search collaborator failure
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    /// Backend mode or storage settings that cannot be wired
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A run already holds the engine, or the item is being processed
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Workflow or queue persistence failure
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
