//! Backend selection for a host

use std::sync::Arc;
use std::time::Duration;

use super::automation::PollTiming;
use super::desktop::{BrowserLauncher, DesktopBackend, LaunchOptions};
use super::direct_api::DirectApiBackend;
use super::extension::{ExtensionBackend, TabChannel};
use super::simulated::SimulatedBackend;
use crate::config::BackendConfig;
use crate::domain::{BackendMode, DomainError, ExecutionBackend, LlmProvider};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::llm::OpenAiProvider;

/// Collaborators the backends are built from
#[derive(Debug, Clone)]
pub struct BackendDependencies {
    pub llm: Arc<dyn LlmProvider>,
    pub browser_launcher: Option<Arc<dyn BrowserLauncher>>,
    pub tab_channel: Option<Arc<dyn TabChannel>>,
}

impl BackendDependencies {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            browser_launcher: None,
            tab_channel: None,
        }
    }

    pub fn with_browser_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.browser_launcher = Some(launcher);
        self
    }

    pub fn with_tab_channel(mut self, channel: Arc<dyn TabChannel>) -> Self {
        self.tab_channel = Some(channel);
        self
    }
}

/// Factory for creating the host's execution backend
#[derive(Debug)]
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the backend selected by `config.mode`
    pub fn create(
        config: &BackendConfig,
        deps: BackendDependencies,
    ) -> Result<Arc<dyn ExecutionBackend>, DomainError> {
        let timing = PollTiming::from(config);

        let backend: Arc<dyn ExecutionBackend> = match config.mode {
            BackendMode::Desktop => {
                let launcher = deps.browser_launcher.ok_or_else(|| {
                    DomainError::configuration("Desktop backend requires a browser launcher")
                })?;
                let options = LaunchOptions {
                    headless: config.headless,
                    profile_dir: config.profile_dir.clone(),
                };
                Arc::new(DesktopBackend::new(launcher, options, timing))
            }
            BackendMode::Extension => {
                let channel = deps.tab_channel.ok_or_else(|| {
                    DomainError::configuration("Extension backend requires a tab channel")
                })?;
                Arc::new(ExtensionBackend::new(channel, timing))
            }
            BackendMode::Simulated => Arc::new(SimulatedBackend::new(
                Duration::from_millis(config.simulated_delay_ms),
                DirectApiBackend::new(deps.llm, &config.default_model),
            )),
            BackendMode::Api => Arc::new(DirectApiBackend::new(deps.llm, &config.default_model)),
        };

        Ok(backend)
    }

    /// OpenAI-compatible provider for the configured endpoint
    pub fn create_llm_provider(config: &BackendConfig) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let client = HttpClient::with_timeout(Duration::from_secs(config.request_timeout_secs))?;

        Ok(Arc::new(OpenAiProvider::with_base_url(
            client,
            &config.api_key,
            &config.api_base_url,
        )))
    }
}
