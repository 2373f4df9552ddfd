//! Execution backend contract
//!
//! A backend sends one resolved prompt to a conversational AI surface and
//! returns the generated answer together with the URL the surface ended on.
//! The engine selects one backend per host and never inspects its variant.

mod error;
mod page;
mod selectors;

use std::fmt::{self, Debug};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::cancellation::CancellationToken;
use crate::domain::workflow::SelectorConfig;
use crate::domain::DomainError;

pub use error::BackendError;
#[cfg(test)]
pub use page::mock::MockPage;
pub use page::PageDriver;
pub use selectors::{resolve_selectors, Platform, ResolvedSelectors};

/// Which backend variant a host runs
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Automates a local browser session
    Desktop,
    /// Drives an already-open tab through injected scripts
    Extension,
    /// Artificial delay, then the direct API
    Simulated,
    /// Calls the text-generation service directly
    #[default]
    Api,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Extension => "extension",
            Self::Simulated => "simulated",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desktop" | "browser" => Ok(Self::Desktop),
            "extension" => Ok(Self::Extension),
            "simulated" | "simulation" => Ok(Self::Simulated),
            "api" | "direct" => Ok(Self::Api),
            other => Err(DomainError::configuration(format!(
                "Unknown backend mode '{}'",
                other
            ))),
        }
    }
}

/// One prompt dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendRequest {
    /// Resolved target URL, empty to stay on the current page
    pub url: String,
    pub prompt: String,
    pub selectors: Option<SelectorConfig>,
    pub use_custom_selectors: bool,
    pub system_instruction: Option<String>,
    pub model: String,
}

impl BackendRequest {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_selectors(mut self, selectors: Option<SelectorConfig>, use_custom: bool) -> Self {
        self.selectors = selectors;
        self.use_custom_selectors = use_custom;
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Generated answer and the URL the surface ended on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub text: String,
    pub final_url: String,
}

impl BackendOutput {
    pub fn new(text: impl Into<String>, final_url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            final_url: final_url.into(),
        }
    }
}

/// Interchangeable prompt executor
#[async_trait]
pub trait ExecutionBackend: Send + Sync + Debug {
    /// Sends the prompt and waits for the complete answer.
    /// Waits inside the backend give up with [`BackendError::Aborted`] once
    /// `cancel` fires.
    async fn execute(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, BackendError>;

    /// Destroys the underlying resource (browser, tab binding). Called on stop.
    async fn abort(&self) {}

    fn kind(&self) -> BackendMode;
}
