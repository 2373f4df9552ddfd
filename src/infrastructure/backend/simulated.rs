use std::time::Duration;

use async_trait::async_trait;

use super::direct_api::DirectApiBackend;
use crate::domain::{
    BackendError, BackendMode, BackendOutput, BackendRequest, CancellationToken, ExecutionBackend,
};

/// Waits like a page would, then answers through the direct API
#[derive(Debug)]
pub struct SimulatedBackend {
    delay: Duration,
    api: DirectApiBackend,
}

impl SimulatedBackend {
    pub fn new(delay: Duration, api: DirectApiBackend) -> Self {
        Self { delay, api }
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    async fn execute(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, BackendError> {
        if !cancel.sleep(self.delay).await {
            return Err(BackendError::Aborted);
        }

        self.api.execute(request, cancel).await
    }

    fn kind(&self) -> BackendMode {
        BackendMode::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::llm::MockLlmProvider;

    #[tokio::test]
    async fn test_delegates_after_delay() {
        let provider = Arc::new(MockLlmProvider::new("mock").with_response("simulated"));
        let backend = SimulatedBackend::new(
            Duration::from_millis(5),
            DirectApiBackend::new(provider, "m"),
        );

        let output = backend
            .execute(BackendRequest::new("https://x.example", "Hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.text, "simulated");
        assert_eq!(backend.kind(), BackendMode::Simulated);
    }

    #[tokio::test]
    async fn test_stop_during_delay() {
        let provider = Arc::new(MockLlmProvider::new("mock"));
        let backend = SimulatedBackend::new(
            Duration::from_secs(30),
            DirectApiBackend::new(provider.clone(), "m"),
        );
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = backend.execute(BackendRequest::new("", "Hi"), &cancel).await.unwrap_err();

        assert_eq!(err, BackendError::Aborted);
        assert!(provider.requests().is_empty());
    }
}
