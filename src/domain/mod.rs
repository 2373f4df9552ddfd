//! Domain layer - Core business logic and entities

pub mod backend;
pub mod cancellation;
pub mod content;
pub mod error;
pub mod image;
pub mod llm;
pub mod queue;
pub mod storage;
pub mod workflow;

pub use backend::{
    BackendError, BackendMode, BackendOutput, BackendRequest, ExecutionBackend, PageDriver,
};
pub use cancellation::CancellationToken;
pub use error::DomainError;
pub use image::{ImageSearch, ImageSearchRequest, ImageSearchResponse, ImageSelectionPolicy};
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmRequestBuilder, LlmResponse, Message, MessageRole,
};
pub use queue::{ImageData, LogLine, Progress, QueueItem, QueueItemId, QueueStatus, StepResult};
pub use storage::{Storage, StorageEntity, StorageKey};
pub use workflow::{
    ImageConfig, SelectorConfig, Workflow, WorkflowError, WorkflowId, WorkflowStep,
};
