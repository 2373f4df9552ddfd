use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Query sent to the image search collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSearchRequest {
    pub query: String,

    /// Handle returned by the previous search for the same queue item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ImageSearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_handle: None,
            source: None,
        }
    }

    pub fn with_session_handle(mut self, handle: Option<String>) -> Self {
        self.session_handle = handle;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }
}

/// Candidate image URLs, best match first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSearchResponse {
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_handle: Option<String>,
}

/// Image search service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, request: ImageSearchRequest) -> Result<ImageSearchResponse, DomainError>;
}
