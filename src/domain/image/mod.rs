//! Image enrichment contracts
//!
//! Models may leave `[imageN]` markers in their answers. The enricher (see
//! `infrastructure::image`) replaces each marker with a picture found by an
//! [`ImageSearch`] collaborator and chosen by an [`ImageSelectionPolicy`].

mod search;
mod selection;
mod shortcode;

#[cfg(test)]
pub use search::MockImageSearch;
pub use search::{ImageSearch, ImageSearchRequest, ImageSearchResponse};
pub use selection::ImageSelectionPolicy;
pub use shortcode::{alt_text, build_query, context_before, find_shortcodes, Shortcode};
