//! Extension tab backend
//!
//! Every DOM operation is a script evaluated in an already-open tab through
//! a page-messaging channel.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::automation::{run_prompt, PollTiming};
use crate::domain::{
    BackendError, BackendMode, BackendOutput, BackendRequest, CancellationToken, ExecutionBackend,
    PageDriver,
};

/// Messaging channel to a browser tab
#[async_trait]
pub trait TabChannel: Send + Sync + Debug {
    /// Evaluates a script expression in the page and returns its JSON value
    async fn evaluate(&self, script: &str) -> Result<Value, BackendError>;

    async fn navigate(&self, url: &str) -> Result<(), BackendError>;

    /// Drops the tab binding
    async fn detach(&self) {}
}

/// JSON-escaped string literal, valid in JavaScript
fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// [`PageDriver`] implemented with injected scripts
#[derive(Debug)]
pub struct ScriptedTab<'a> {
    channel: &'a dyn TabChannel,
}

impl<'a> ScriptedTab<'a> {
    pub fn new(channel: &'a dyn TabChannel) -> Self {
        Self { channel }
    }

    async fn evaluate_bool(&self, script: String) -> Result<bool, BackendError> {
        match self.channel.evaluate(&script).await? {
            Value::Bool(value) => Ok(value),
            other => Err(BackendError::script(format!("Expected a boolean, got {}", other))),
        }
    }

    async fn evaluate_html(&self, script: String) -> Result<Option<String>, BackendError> {
        match self.channel.evaluate(&script).await? {
            Value::Null => Ok(None),
            Value::String(html) => Ok(Some(html)),
            other => Err(BackendError::script(format!("Expected a string, got {}", other))),
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedTab<'_> {
    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        self.channel.navigate(url).await
    }

    async fn current_url(&self) -> Result<String, BackendError> {
        match self.channel.evaluate("window.location.href").await? {
            Value::String(url) => Ok(url),
            other => Err(BackendError::script(format!("Expected a URL, got {}", other))),
        }
    }

    async fn exists(&self, selector: &str) -> Result<bool, BackendError> {
        self.evaluate_bool(format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        ))
        .await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), BackendError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); \
             if ('value' in el) {{ el.value = {text}; }} else {{ el.textContent = {text}; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()",
            js_string(selector),
            text = js_string(text),
        );

        if self.evaluate_bool(script).await? {
            Ok(())
        } else {
            Err(BackendError::selector_not_found(selector))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BackendError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(selector)
        );

        if self.evaluate_bool(script).await? {
            Ok(())
        } else {
            Err(BackendError::selector_not_found(selector))
        }
    }

    async fn last_inner_html(&self, selector: &str) -> Result<Option<String>, BackendError> {
        self.evaluate_html(format!(
            "(() => {{ const els = document.querySelectorAll({}); \
             return els.length ? els[els.length - 1].innerHTML : null; }})()",
            js_string(selector)
        ))
        .await
    }

    async fn inner_html_within(
        &self,
        scope: &str,
        selector: &str,
    ) -> Result<Option<String>, BackendError> {
        self.evaluate_html(format!(
            "(() => {{ const scopes = document.querySelectorAll({}); if (!scopes.length) return null; \
             const els = scopes[scopes.length - 1].querySelectorAll({}); \
             return els.length ? els[els.length - 1].innerHTML : null; }})()",
            js_string(scope),
            js_string(selector)
        ))
        .await
    }
}

/// Drives a tab that the user already has open
#[derive(Debug)]
pub struct ExtensionBackend {
    channel: Arc<dyn TabChannel>,
    timing: PollTiming,
}

impl ExtensionBackend {
    pub fn new(channel: Arc<dyn TabChannel>, timing: PollTiming) -> Self {
        Self { channel, timing }
    }
}

#[async_trait]
impl ExecutionBackend for ExtensionBackend {
    async fn execute(
        &self,
        request: BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendOutput, BackendError> {
        let tab = ScriptedTab::new(self.channel.as_ref());
        run_prompt(&tab, &request, &self.timing, cancel).await
    }

    async fn abort(&self) {
        self.channel.detach().await;
    }

    fn kind(&self) -> BackendMode {
        BackendMode::Extension
    }
}
