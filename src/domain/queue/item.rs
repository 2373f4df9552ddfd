//! Queue item entity and per-step results

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::workflow::{TemplateInputs, WorkflowId};

/// Queue item identifier (UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(String);

impl QueueItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for QueueItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for QueueItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for QueueItemId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a queue item
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether an explicit reset may move the item back to `Queued`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped line of the item's execution log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Image search outcome for one `[imageN]` shortcode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageData {
    pub shortcode: String,
    pub context: String,
    pub query: String,
    #[serde(default)]
    pub candidates: Vec<String>,
    pub selected_url: String,
    pub selected_index: usize,
    /// Value of the `data-image-index` attribute written into the output
    pub image_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_handle: Option<String>,
}

/// Outcome of one executed step for one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_id: String,
    pub step_name: String,
    pub prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    /// Final URL the backend reported after answering
    #[serde(default)]
    pub visited_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_data: Vec<ImageData>,
}

impl StepResult {
    pub fn new(
        step_id: impl Into<String>,
        step_name: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        visited_url: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            step_name: step_name.into(),
            prompt: prompt.into(),
            response: response.into(),
            timestamp: Utc::now(),
            visited_url: visited_url.into(),
            image_data: Vec::new(),
        }
    }

    pub fn with_image_data(mut self, image_data: Vec<ImageData>) -> Self {
        self.image_data = image_data;
        self
    }
}

/// One unit of input replayed through a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    id: QueueItemId,

    /// Queue order, assigned by the store
    #[serde(default)]
    sequence: u64,

    original_prompt: String,

    /// Named inputs (`input`, `input1` .. `input19`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mapped_inputs: Option<BTreeMap<String, String>>,

    #[serde(default)]
    status: QueueStatus,

    #[serde(default)]
    current_step_index: usize,

    #[serde(default)]
    results: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default)]
    logs: Vec<LogLine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    workflow_id: Option<WorkflowId>,
}

impl QueueItem {
    pub fn new(original_prompt: impl Into<String>) -> Self {
        Self {
            id: QueueItemId::generate(),
            sequence: 0,
            original_prompt: original_prompt.into(),
            mapped_inputs: None,
            status: QueueStatus::Queued,
            current_step_index: 0,
            results: Vec::new(),
            final_output: None,
            error: None,
            logs: Vec::new(),
            started_at: None,
            completed_at: None,
            workflow_id: None,
        }
    }

    // Builder methods

    pub fn with_id(mut self, id: impl Into<QueueItemId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mapped_inputs(mut self, inputs: BTreeMap<String, String>) -> Self {
        self.mapped_inputs = Some(inputs);
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: WorkflowId) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    // Getters

    pub fn id(&self) -> &QueueItemId {
        &self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn original_prompt(&self) -> &str {
        &self.original_prompt
    }

    pub fn mapped_inputs(&self) -> Option<&BTreeMap<String, String>> {
        self.mapped_inputs.as_ref()
    }

    pub fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn final_output(&self) -> Option<&str> {
        self.final_output.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn logs(&self) -> &[LogLine] {
        &self.logs
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        self.workflow_id.as_ref()
    }

    /// Inputs visible to the template resolver
    pub fn template_inputs(&self) -> TemplateInputs<'_> {
        TemplateInputs::new(&self.original_prompt, self.mapped_inputs.as_ref())
    }

    pub fn result_for_step(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_id == step_id)
    }

    /// Handle of the latest image search session opened for this item
    pub fn image_session_handle(&self) -> Option<&str> {
        self.results
            .iter()
            .rev()
            .flat_map(|r| r.image_data.iter().rev())
            .find_map(|d| d.session_handle.as_deref())
    }

    /// Steps this item contributes to run progress
    pub fn progress_steps(&self, step_count: usize) -> usize {
        match self.status {
            QueueStatus::Completed => step_count,
            _ => self.current_step_index.min(step_count),
        }
    }

    // State transitions

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogLine {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// `Queued`/`Failed` -> `Running`, keeping already recorded steps
    pub fn start(&mut self) {
        self.status = QueueStatus::Running;
        self.error = None;
        self.completed_at = None;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Stores a step result, replacing any earlier result of the same step
    pub fn record_result(&mut self, result: StepResult) {
        match self.results.iter_mut().find(|r| r.step_id == result.step_id) {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn advance_to(&mut self, step_index: usize) {
        self.current_step_index = step_index;
    }

    pub fn complete(&mut self, final_output: impl Into<String>) {
        self.status = QueueStatus::Completed;
        self.final_output = Some(final_output.into());
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.log(format!("Failed: {}", error));
        self.status = QueueStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Back to `Queued` with no results, output, error or timestamps
    pub fn reset(&mut self) {
        self.status = QueueStatus::Queued;
        self.current_step_index = 0;
        self.results.clear();
        self.final_output = None;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.log("Reset to queue");
    }

    /// Replaces the response text of a recorded step
    pub fn set_step_response(&mut self, step_id: &str, response: impl Into<String>) -> bool {
        match self.results.iter_mut().find(|r| r.step_id == step_id) {
            Some(result) => {
                result.response = response.into();
                true
            }
            None => false,
        }
    }

    pub fn result_for_step_mut(&mut self, step_id: &str) -> Option<&mut StepResult> {
        self.results.iter_mut().find(|r| r.step_id == step_id)
    }

    pub fn set_final_output(&mut self, output: impl Into<String>) {
        self.final_output = Some(output.into());
    }
}

impl StorageEntity for QueueItem {
    type Key = QueueItemId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(step_id: &str, response: &str) -> StepResult {
        StepResult::new(step_id, step_id.to_uppercase(), "prompt", response, "https://chat.example")
    }

    #[test]
    fn test_new_item_is_queued() {
        let item = QueueItem::new("hello");

        assert_eq!(item.status(), QueueStatus::Queued);
        assert_eq!(item.current_step_index(), 0);
        assert!(item.results().is_empty());
        assert!(Uuid::parse_str(item.id().as_str()).is_ok());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&QueueStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        let status: QueueStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(status, QueueStatus::Failed);
    }

    #[test]
    fn test_record_result_replaces_by_step_id() {
        let mut item = QueueItem::new("x");
        item.record_result(result("a", "first"));
        item.record_result(result("b", "second"));
        item.record_result(result("a", "again"));

        assert_eq!(item.results().len(), 2);
        assert_eq!(item.results()[0].response, "again");
        assert_eq!(item.result_for_step("b").unwrap().response, "second");
    }

    #[test]
    fn test_image_session_handle_comes_from_latest_search() {
        let mut item = QueueItem::new("x");
        assert!(item.image_session_handle().is_none());

        let image = |handle: Option<&str>| ImageData {
            session_handle: handle.map(str::to_string),
            ..Default::default()
        };

        item.record_result(result("a", "one").with_image_data(vec![image(Some("first"))]));
        item.record_result(result("b", "plain"));
        assert_eq!(item.image_session_handle(), Some("first"));

        item.record_result(
            result("c", "two").with_image_data(vec![image(Some("second")), image(None)]),
        );
        assert_eq!(item.image_session_handle(), Some("second"));
    }

    #[test]
    fn test_fail_records_error_and_log() {
        let mut item = QueueItem::new("x");
        item.start();
        item.fail("Timeout");

        assert_eq!(item.status(), QueueStatus::Failed);
        assert_eq!(item.error(), Some("Timeout"));
        assert!(item.logs().last().unwrap().message.contains("Timeout"));
    }

    #[test]
    fn test_reset_clears_execution_state() {
        let mut item = QueueItem::new("x");
        item.start();
        item.record_result(result("a", "done"));
        item.advance_to(1);
        item.complete("done");

        item.reset();

        assert_eq!(item.status(), QueueStatus::Queued);
        assert_eq!(item.current_step_index(), 0);
        assert!(item.results().is_empty());
        assert!(item.final_output().is_none());
        assert!(item.started_at().is_none());
        assert!(item.completed_at().is_none());
    }

    #[test]
    fn test_progress_steps() {
        let mut item = QueueItem::new("x");
        item.advance_to(2);
        assert_eq!(item.progress_steps(4), 2);

        item.complete("out");
        assert_eq!(item.progress_steps(4), 4);
    }

    #[test]
    fn test_item_round_trips_through_json() {
        let mut inputs = BTreeMap::new();
        inputs.insert("input1".to_string(), "topic".to_string());
        let mut item = QueueItem::new("raw").with_mapped_inputs(inputs);
        item.record_result(result("a", "answer"));

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"status\":\"QUEUED\""));

        let restored: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id(), item.id());
        assert_eq!(restored.mapped_inputs().unwrap()["input1"], "topic");
        assert_eq!(restored.results().len(), 1);
    }
}
