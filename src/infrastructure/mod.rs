//! Infrastructure layer - External service implementations

pub mod backend;
pub mod http_client;
pub mod image;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod queue;
pub mod services;
pub mod storage;
pub mod workflow;
