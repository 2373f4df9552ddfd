//! Image enrichment

mod enricher;
mod http_search;

pub use enricher::{reselect, EnrichmentOutcome, ImageEnricher};
pub use http_search::HttpImageSearch;
