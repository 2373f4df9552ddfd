//! Workflow domain entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use crate::domain::storage::{StorageEntity, StorageKey};

/// Maximum length for workflow IDs
pub const MAX_ID_LENGTH: usize = 50;

/// Regex pattern for valid workflow IDs: alphanumeric and hyphens
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap());

/// Validated workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Create a new validated workflow ID
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_workflow_id(&id)?;
        Ok(Self(id))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl StorageKey for WorkflowId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validate a workflow ID string
pub fn validate_workflow_id(id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::validation("Workflow ID cannot be empty"));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(WorkflowError::validation(format!(
            "Workflow ID exceeds maximum length of {} characters",
            MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(WorkflowError::validation(format!(
            "Invalid workflow ID '{}': must be alphanumeric with hyphens, start and end with alphanumeric",
            id
        )));
    }

    Ok(())
}

/// Default model used by the direct API backend when a workflow names none
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Page selectors overriding the platform defaults of the automation backends
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Element present while the page is still generating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generating: Option<String>,
}

/// Automatic image insertion settings of a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Number of `[imageN]` markers requested from the model
    #[serde(default = "default_image_count")]
    pub count: u32,

    /// Append the marker instruction to the prompt
    #[serde(default)]
    pub auto_insert: bool,

    /// Image source hint forwarded to the search collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_image_count() -> u32 {
    1
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_image_count(),
            auto_insert: false,
            source: None,
        }
    }
}

impl ImageConfig {
    pub fn new(count: u32) -> Self {
        Self {
            enabled: true,
            count,
            auto_insert: true,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_auto_insert(mut self, auto_insert: bool) -> Self {
        self.auto_insert = auto_insert;
        self
    }

    /// Whether the marker instruction is appended to the prompt
    pub fn wants_markers(&self) -> bool {
        self.enabled && self.auto_insert && self.count > 0
    }
}

/// A step within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// Stable identifier, used to match stored results
    id: String,

    name: String,

    /// Prompt template (`{{input}}`, `{{prev2}}`, ...)
    prompt: String,

    /// Target URL template, may reference `{{url_prev}}`
    #[serde(default)]
    url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    selectors: Option<SelectorConfig>,

    #[serde(default)]
    use_custom_selectors: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<ImageConfig>,
}

impl WorkflowStep {
    /// Create a new workflow step
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
            url: String::new(),
            selectors: None,
            use_custom_selectors: false,
            image: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set custom selectors and enable them
    pub fn with_selectors(mut self, selectors: SelectorConfig) -> Self {
        self.selectors = Some(selectors);
        self.use_custom_selectors = true;
        self
    }

    pub fn with_use_custom_selectors(mut self, enabled: bool) -> Self {
        self.use_custom_selectors = enabled;
        self
    }

    pub fn with_image(mut self, image: ImageConfig) -> Self {
        self.image = Some(image);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn selectors(&self) -> Option<&SelectorConfig> {
        self.selectors.as_ref()
    }

    pub fn use_custom_selectors(&self) -> bool {
        self.use_custom_selectors
    }

    pub fn image(&self) -> Option<&ImageConfig> {
        self.image.as_ref()
    }

    /// Image settings, only when insertion is enabled for this step
    pub fn enabled_image(&self) -> Option<&ImageConfig> {
        self.image.as_ref().filter(|image| image.enabled)
    }
}

/// A workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    id: WorkflowId,

    /// Human-readable name
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Ordered list of workflow steps
    steps: Vec<WorkflowStep>,

    /// Instruction sent as system message by the direct API backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_instruction: Option<String>,

    #[serde(default = "default_model")]
    model: String,

    /// Pause between two steps of the same item
    #[serde(default)]
    step_delay_ms: u64,

    /// Configuration version (increments on changes)
    #[serde(default = "initial_version")]
    version: u32,

    /// When the workflow was created
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    /// When the workflow was last updated
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn initial_version() -> u32 {
    1
}

impl Workflow {
    /// Create a new workflow
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            steps: Vec::new(),
            system_instruction: None,
            model: default_model(),
            step_delay_ms: 0,
            version: initial_version(),
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_step_delay_ms(mut self, delay_ms: u64) -> Self {
        self.step_delay_ms = delay_ms;
        self
    }

    // Getters

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn step_delay_ms(&self) -> u64 {
        self.step_delay_ms
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get a step by position
    pub fn step(&self, index: usize) -> Option<&WorkflowStep> {
        self.steps.get(index)
    }

    /// Get the index of a step by id
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == id)
    }

    /// Checks step ids are non-empty and unique
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut seen = std::collections::HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            if step.id().trim().is_empty() {
                return Err(WorkflowError::validation(format!(
                    "Step {} has an empty id",
                    index + 1
                )));
            }

            if !seen.insert(step.id()) {
                return Err(WorkflowError::validation(format!(
                    "Duplicate step id '{}'",
                    step.id()
                )));
            }
        }

        Ok(())
    }

    // Setters (mutate and update timestamp)

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.increment_version();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.increment_version();
    }

    pub fn set_steps(&mut self, steps: Vec<WorkflowStep>) {
        self.steps = steps;
        self.increment_version();
    }

    pub fn set_system_instruction(&mut self, instruction: Option<String>) {
        self.system_instruction = instruction;
        self.increment_version();
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        self.increment_version();
    }

    pub fn set_step_delay_ms(&mut self, delay_ms: u64) {
        self.step_delay_ms = delay_ms;
        self.increment_version();
    }

    fn increment_version(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

impl StorageEntity for Workflow {
    type Key = WorkflowId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
