use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{
    BackendError, BackendMode, BackendOutput, BackendRequest, CancellationToken, ExecutionBackend,
    LlmProvider, LlmRequest,
};

/// Calls the text-generation service directly
#[derive(Debug)]
pub struct DirectApiBackend {
    provider: Arc<dyn LlmProvider>,
    default_model: String,
}

impl DirectApiBackend {
    pub fn new(provider: Arc<dyn LlmProvider>, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
        }
    }
}

#[async_trait]
impl ExecutionBackend for DirectApiBackend {
    async fn execute(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Aborted);
        }

        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let mut builder = LlmRequest::builder();
        if let Some(instruction) = request.system_instruction.as_deref().filter(|s| !s.trim().is_empty()) {
            builder = builder.system(instruction);
        }
        let llm_request = builder.user(request.prompt.as_str()).build();

        debug!(provider = self.provider.provider_name(), model, "Sending prompt");

        let response = tokio::select! {
            response = self.provider.chat(model, llm_request) => response?,
            _ = cancel.cancelled() => return Err(BackendError::Aborted),
        };

        Ok(BackendOutput::new(response.content(), request.url))
    }

    fn kind(&self) -> BackendMode {
        BackendMode::Api
    }
}
