//! Workflow execution

mod engine;
mod runner;

pub use engine::{RunReport, WorkflowEngine};
pub use runner::{RunController, RunStatus};
