//! Text-generation collaborator contract used by the direct API backend

mod message;
mod provider;
mod request;
mod response;

pub use message::{Message, MessageRole};
pub use provider::LlmProvider;
pub use request::{LlmRequest, LlmRequestBuilder};
pub use response::{FinishReason, LlmResponse};

#[cfg(test)]
pub use provider::mock::MockLlmProvider;
