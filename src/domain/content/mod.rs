//! Post-processing of backend responses

mod normalizer;

pub use normalizer::normalize;
