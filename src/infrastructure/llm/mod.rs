//! Text-generation provider implementations

mod openai;

pub use openai::{OpenAiProvider, DEFAULT_OPENAI_BASE_URL};
