use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{DomainError, ImageSearch, ImageSearchRequest, ImageSearchResponse};
use crate::infrastructure::http_client::HttpClientTrait;

/// Image search over a JSON endpoint.
///
/// Posts `{"query", "session_handle", "source"}` and accepts either
/// `{"images": [...]}` or `{"results": [{"url": ...}]}` in return.
#[derive(Debug)]
pub struct HttpImageSearch<C: HttpClientTrait> {
    client: C,
    endpoint: String,
    auth_header: Option<String>,
}

impl<C: HttpClientTrait> HttpImageSearch<C> {
    pub fn new(client: C, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            auth_header: api_key
                .filter(|key| !key.is_empty())
                .map(|key| format!("Bearer {}", key)),
        }
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![("Content-Type", "application/json")];
        if let Some(ref auth) = self.auth_header {
            headers.push(("Authorization", auth.as_str()));
        }
        headers
    }
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default, alias = "session", alias = "sessionHandle")]
    session_handle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
}

#[async_trait]
impl<C: HttpClientTrait> ImageSearch for HttpImageSearch<C> {
    async fn search(&self, request: ImageSearchRequest) -> Result<ImageSearchResponse, DomainError> {
        let body = serde_json::to_value(&request)
            .map_err(|e| DomainError::internal(format!("Failed to encode search: {}", e)))?;

        let json = self
            .client
            .post_json(&self.endpoint, self.headers(), &body)
            .await?;

        let payload: SearchPayload = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("image_search", format!("Failed to parse response: {}", e))
        })?;

        let mut images = payload.images;
        images.extend(payload.results.into_iter().map(|hit| hit.url));
        images.retain(|url| !url.trim().is_empty());

        Ok(ImageSearchResponse {
            images,
            session_handle: payload.session_handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;
    use serde_json::json;

    const ENDPOINT: &str = "http://images.local/search";

    #[tokio::test]
    async fn test_search_sends_query_and_handle() {
        let client = MockHttpClient::new().with_response(
            ENDPOINT,
            json!({"images": ["https://img/1.jpg", ""], "session_handle": "next"}),
        );
        let search = HttpImageSearch::new(client, ENDPOINT, Some("key".to_string()));

        let response = search
            .search(
                ImageSearchRequest::new("harbour boats").with_session_handle(Some("prev".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(response.images, vec!["https://img/1.jpg"]);
        assert_eq!(response.session_handle.as_deref(), Some("next"));

        let requests = search.client.requests();
        assert_eq!(requests[0].1["query"], "harbour boats");
        assert_eq!(requests[0].1["session_handle"], "prev");
        assert!(requests[0].1.get("source").is_none());
    }

    #[tokio::test]
    async fn test_search_accepts_results_shape() {
        let client = MockHttpClient::new()
            .with_response(ENDPOINT, json!({"results": [{"url": "https://img/a.png"}]}));
        let search = HttpImageSearch::new(client, ENDPOINT, None);

        let response = search.search(ImageSearchRequest::new("a")).await.unwrap();

        assert_eq!(response.images, vec!["https://img/a.png"]);
        assert!(response.session_handle.is_none());
    }

    #[tokio::test]
    async fn test_search_propagates_errors() {
        let client = MockHttpClient::new().with_error(ENDPOINT, "HTTP 500");
        let search = HttpImageSearch::new(client, ENDPOINT, None);

        let err = search.search(ImageSearchRequest::new("a")).await.unwrap_err();
        assert!(matches!(err, DomainError::Provider { .. }));
    }
}
