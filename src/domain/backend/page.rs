use async_trait::async_trait;

use super::BackendError;

/// DOM operations the automation routine needs from a page.
///
/// Implemented over a local browser session and over an extension tab; the
/// concrete scripts live with those implementations.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BackendError>;

    async fn current_url(&self) -> Result<String, BackendError>;

    async fn exists(&self, selector: &str) -> Result<bool, BackendError>;

    /// Replaces the content of an input or contenteditable element
    async fn fill(&self, selector: &str, text: &str) -> Result<(), BackendError>;

    async fn click(&self, selector: &str) -> Result<(), BackendError>;

    /// Inner HTML of the last element matching `selector`
    async fn last_inner_html(&self, selector: &str) -> Result<Option<String>, BackendError>;

    /// Inner HTML of the last `selector` match inside the last `scope` match
    async fn inner_html_within(
        &self,
        scope: &str,
        selector: &str,
    ) -> Result<Option<String>, BackendError>;
}
