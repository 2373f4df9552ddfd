//! Replaces `[imageN]` markers with searched pictures

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::domain::image::{alt_text, build_query, find_shortcodes, Shortcode};
use crate::domain::{
    CancellationToken, DomainError, ImageConfig, ImageData, ImageSearch, ImageSearchRequest,
    ImageSelectionPolicy,
};
use crate::infrastructure::observability::record_image_search;

static IMAGE_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img\b[^>]*\bdata-image-index="(\d+)"[^>]*>"#).unwrap());

/// Enriched output and what was inserted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentOutcome {
    pub output: String,
    pub image_data: Vec<ImageData>,
}

/// Image enrichment of step outputs
pub struct ImageEnricher {
    search: Arc<dyn ImageSearch>,
    policy: ImageSelectionPolicy,
}

impl std::fmt::Debug for ImageEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEnricher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ImageEnricher {
    pub fn new(search: Arc<dyn ImageSearch>, policy: ImageSelectionPolicy) -> Self {
        Self { search, policy }
    }

    /// Substitutes every marker it can resolve.
    ///
    /// Prior image data with one entry per marker is reused without searching.
    /// `session_handle` continues the item's search session from earlier steps.
    /// Failed searches and a stop request leave the remaining markers in place.
    pub async fn enrich(
        &self,
        output: &str,
        config: &ImageConfig,
        prior: Option<&[ImageData]>,
        session_handle: Option<&str>,
        cancel: &CancellationToken,
    ) -> EnrichmentOutcome {
        let shortcodes = find_shortcodes(output);

        if shortcodes.is_empty() {
            return EnrichmentOutcome {
                output: output.to_string(),
                image_data: Vec::new(),
            };
        }

        if let Some(prior) = prior.filter(|p| p.len() == shortcodes.len()) {
            debug!(images = prior.len(), "Reusing stored image selections");
            let replacements = shortcodes
                .iter()
                .zip(prior)
                .map(|(shortcode, data)| (shortcode, render_image(data)))
                .collect::<Vec<_>>();

            return EnrichmentOutcome {
                output: substitute(output, &replacements),
                image_data: prior.to_vec(),
            };
        }

        let mut session_handle = session_handle.map(str::to_string);
        let mut image_data = Vec::new();
        let mut replacements = Vec::new();

        for (position, shortcode) in shortcodes.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(remaining = shortcodes.len() - position, "Image enrichment stopped");
                break;
            }

            let query = build_query(&shortcode.context);
            if query.is_empty() {
                warn!(shortcode = %shortcode.text, "No context to search images for");
                continue;
            }

            let request = ImageSearchRequest::new(query.clone())
                .with_session_handle(session_handle.clone())
                .with_source(config.source.clone());

            let response = match self.search.search(request).await {
                Ok(response) => {
                    record_image_search(true);
                    response
                }
                Err(e) => {
                    record_image_search(false);
                    warn!(shortcode = %shortcode.text, error = %e, "Image search failed");
                    continue;
                }
            };

            if response.session_handle.is_some() {
                session_handle = response.session_handle.clone();
            }

            let Some(selected_index) = self.policy.select(response.images.len()) else {
                warn!(shortcode = %shortcode.text, query = %query, "Image search returned no candidates");
                continue;
            };

            let data = ImageData {
                shortcode: shortcode.text.clone(),
                context: shortcode.context.clone(),
                query,
                selected_url: response.images[selected_index].clone(),
                candidates: response.images,
                selected_index,
                image_index: position,
                session_handle: session_handle.clone(),
            };

            replacements.push((shortcode, render_image(&data)));
            image_data.push(data);
        }

        EnrichmentOutcome {
            output: substitute(output, &replacements),
            image_data,
        }
    }
}

/// Points the image with `image_index` at another candidate.
/// Only that `<img>` tag and its entry change.
pub fn reselect(
    output: &str,
    image_data: &mut [ImageData],
    image_index: usize,
    candidate_index: usize,
) -> Result<String, DomainError> {
    let data = image_data
        .iter_mut()
        .find(|d| d.image_index == image_index)
        .ok_or_else(|| DomainError::not_found(format!("Image {} not found", image_index)))?;

    let url = data.candidates.get(candidate_index).cloned().ok_or_else(|| {
        DomainError::validation(format!(
            "Candidate {} out of range, image {} has {} candidates",
            candidate_index,
            image_index,
            data.candidates.len()
        ))
    })?;

    let mut updated = data.clone();
    updated.selected_index = candidate_index;
    updated.selected_url = url;

    let tag = render_tag(&updated);
    let mut found = false;
    let rewritten = IMAGE_TAG_PATTERN.replace_all(output, |caps: &Captures<'_>| {
        if caps[1].parse::<usize>().ok() == Some(image_index) {
            found = true;
            tag.clone()
        } else {
            caps[0].to_string()
        }
    });

    if !found {
        return Err(DomainError::not_found(format!(
            "Image {} is no longer present in the output",
            image_index
        )));
    }

    let rewritten = rewritten.into_owned();
    *data = updated;
    Ok(rewritten)
}

fn render_tag(data: &ImageData) -> String {
    format!(
        r#"<img src="{}" alt="{}" data-image-index="{}" style="max-width: 100%; height: auto;">"#,
        data.selected_url.replace('&', "&amp;").replace('"', "%22"),
        alt_text(&data.context),
        data.image_index
    )
}

fn render_image(data: &ImageData) -> String {
    format!(r#"<div style="text-align: center;">{}</div>"#, render_tag(data))
}

fn substitute(output: &str, replacements: &[(&Shortcode, String)]) -> String {
    let mut result = String::with_capacity(output.len());
    let mut last = 0;

    for (shortcode, replacement) in replacements {
        result.push_str(&output[last..shortcode.start]);
        result.push_str(replacement);
        last = shortcode.end;
    }

    result.push_str(&output[last..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::MockImageSearch;
    use crate::domain::ImageSearchResponse;
    use mockall::predicate::*;
    use mockall::Sequence;

    const TEXT: &str = "<p>The old harbour fills with fishing boats every single morning.</p>\n[image1]\n\
                        <p>At night the lighthouse sweeps its beam across the dark water.</p>\n[image2]\n";

    fn response(images: &[&str], handle: Option<&str>) -> ImageSearchResponse {
        ImageSearchResponse {
            images: images.iter().map(|s| s.to_string()).collect(),
            session_handle: handle.map(str::to_string),
        }
    }

    fn enricher(search: MockImageSearch) -> ImageEnricher {
        ImageEnricher::new(Arc::new(search), ImageSelectionPolicy::First)
    }

    #[tokio::test]
    async fn test_replaces_markers_and_forwards_session_handle() {
        let mut search = MockImageSearch::new();
        let mut seq = Sequence::new();
        search
            .expect_search()
            .withf(|r| r.session_handle.is_none() && r.query.starts_with("The old harbour"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(&["https://img/1.jpg", "https://img/2.jpg"], Some("s-1"))));
        search
            .expect_search()
            .withf(|r| r.session_handle.as_deref() == Some("s-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(&["https://img/3.jpg"], None)));

        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), None, None, &CancellationToken::new())
            .await;

        assert!(!outcome.output.contains("[image1]"));
        assert!(!outcome.output.contains("[image2]"));
        assert!(outcome.output.contains(r#"src="https://img/1.jpg""#));
        assert!(outcome.output.contains(r#"data-image-index="1""#));
        assert_eq!(outcome.image_data.len(), 2);
        assert_eq!(outcome.image_data[0].candidates.len(), 2);
        assert_eq!(outcome.image_data[1].session_handle.as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_continues_session_from_earlier_step() {
        let mut search = MockImageSearch::new();
        search
            .expect_search()
            .withf(|r| r.session_handle.as_deref() == Some("item-session"))
            .times(2)
            .returning(|_| Ok(response(&["https://img/1.jpg"], None)));

        let outcome = enricher(search)
            .enrich(
                TEXT,
                &ImageConfig::new(2),
                None,
                Some("item-session"),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.image_data.len(), 2);
        assert_eq!(
            outcome.image_data[1].session_handle.as_deref(),
            Some("item-session")
        );
    }

    #[tokio::test]
    async fn test_prior_data_reused_without_searching() {
        let mut search = MockImageSearch::new();
        search.expect_search().times(0);

        let prior = vec![
            ImageData {
                shortcode: "[image1]".to_string(),
                selected_url: "https://img/a.jpg".to_string(),
                candidates: vec!["https://img/a.jpg".to_string()],
                image_index: 0,
                session_handle: Some("kept".to_string()),
                ..Default::default()
            },
            ImageData {
                shortcode: "[image2]".to_string(),
                selected_url: "https://img/b.jpg".to_string(),
                candidates: vec!["https://img/b.jpg".to_string()],
                image_index: 1,
                ..Default::default()
            },
        ];

        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), Some(&prior), None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.image_data, prior);
        assert!(outcome.output.contains("https://img/a.jpg"));
        assert!(outcome.output.contains("https://img/b.jpg"));
    }

    #[tokio::test]
    async fn test_prior_data_with_other_count_searches_again() {
        let mut search = MockImageSearch::new();
        search
            .expect_search()
            .times(2)
            .returning(|_| Ok(response(&["https://img/new.jpg"], None)));

        let prior = vec![ImageData::default()];
        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), Some(&prior), None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.image_data.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_search_leaves_marker() {
        let mut search = MockImageSearch::new();
        let mut seq = Sequence::new();
        search
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::provider("images", "HTTP 500")));
        search
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(&[], None)));

        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), None, None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.output, TEXT);
        assert!(outcome.image_data.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_enrichment_keeps_markers() {
        let mut search = MockImageSearch::new();
        search.expect_search().times(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), None, None, &cancel)
            .await;

        assert_eq!(outcome.output, TEXT);
    }

    #[tokio::test]
    async fn test_no_markers() {
        let mut search = MockImageSearch::new();
        search.expect_search().times(0);

        let outcome = enricher(search)
            .enrich("plain", &ImageConfig::new(1), None, None, &CancellationToken::new())
            .await;

        assert_eq!(outcome.output, "plain");
    }

    #[tokio::test]
    async fn test_reselect_rewrites_only_target_image() {
        let mut search = MockImageSearch::new();
        search
            .expect_search()
            .with(always())
            .times(2)
            .returning(|_| Ok(response(&["https://img/x.jpg", "https://img/y.jpg"], None)));

        let outcome = enricher(search)
            .enrich(TEXT, &ImageConfig::new(2), None, None, &CancellationToken::new())
            .await;
        let mut data = outcome.image_data.clone();

        let rewritten = reselect(&outcome.output, &mut data, 1, 1).unwrap();

        assert_eq!(data[1].selected_index, 1);
        assert_eq!(data[1].selected_url, "https://img/y.jpg");
        assert_eq!(data[0], outcome.image_data[0]);
        assert_eq!(rewritten.matches("https://img/x.jpg").count(), 1);
        assert_eq!(rewritten.matches("https://img/y.jpg").count(), 1);
    }

    #[test]
    fn test_reselect_rejects_bad_candidate() {
        let mut data = vec![ImageData {
            candidates: vec!["https://img/only.jpg".to_string()],
            ..Default::default()
        }];

        let err = reselect("<p>x</p>", &mut data, 0, 3).unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = reselect("<p>x</p>", &mut data, 0, 0).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert_eq!(data[0].selected_index, 0);
    }
}
