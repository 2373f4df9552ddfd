//! Workflow domain module
//!
//! A workflow is an ordered list of steps. Each step sends a templated prompt
//! to a target site; later steps may reference earlier answers and URLs:
//! - `{{input}}`, `{{input1}}` .. `{{input19}}` - queue item inputs
//! - `{{prev}}`, `{{prevN}}` - earlier step responses
//! - `{{url_prev}}`, `{{url_prevN}}` - URLs visited by earlier steps

mod entity;
mod error;
mod template;

pub use entity::{
    validate_workflow_id, ImageConfig, SelectorConfig, Workflow, WorkflowId, WorkflowStep,
    DEFAULT_MODEL, MAX_ID_LENGTH,
};
pub use error::{WorkflowError, STOPPED_BY_USER};
pub use template::{
    extract_placeholders, image_instruction, Placeholder, PlaceholderKind, TemplateInputs,
    TemplateResolver, MAX_NAMED_INPUTS,
};
