//! Queue service - user-facing operations on queue items

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::workflow::MAX_NAMED_INPUTS;
use crate::domain::{DomainError, QueueItem, QueueItemId, QueueStatus, WorkflowId};
use crate::infrastructure::image::reselect;
use crate::infrastructure::queue::{QueueSnapshot, QueueStore};

/// A queue item as entered manually or produced by an import
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddQueueItemRequest {
    #[serde(default)]
    pub original_prompt: String,
    #[serde(default)]
    pub mapped_inputs: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

impl AddQueueItemRequest {
    pub fn new(original_prompt: impl Into<String>) -> Self {
        Self {
            original_prompt: original_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mapped_inputs
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }
}

pub struct QueueService {
    store: Arc<QueueStore>,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService").finish()
    }
}

impl QueueService {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Current queue in queue order, with its version
    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.store.snapshot()
    }

    pub async fn get(&self, id: &str) -> Result<QueueItem, DomainError> {
        self.store.require(&QueueItemId::from(id)).await
    }

    pub async fn add(&self, request: AddQueueItemRequest) -> Result<QueueItem, DomainError> {
        let item = build_item(request)?;
        let mut created = self.store.append(vec![item]).await?;

        created
            .pop()
            .ok_or_else(|| DomainError::internal("Queue append returned no item"))
    }

    /// Adds a batch; nothing is added when any entry is invalid
    pub async fn import(
        &self,
        requests: Vec<AddQueueItemRequest>,
    ) -> Result<Vec<QueueItem>, DomainError> {
        let items = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                build_item(request).map_err(|e| {
                    DomainError::validation(format!("Entry {}: {}", index + 1, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(items = items.len(), "Importing queue items");
        self.store.append(items).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), DomainError> {
        let id = QueueItemId::from(id);
        let item = self.store.require(&id).await?;

        if item.status() == QueueStatus::Running {
            return Err(DomainError::conflict(format!(
                "Queue item '{}' is running",
                id
            )));
        }

        self.store.delete(&id).await?;
        Ok(())
    }

    /// Puts a finished item back in the queue, dropping its results
    pub async fn reset(&self, id: &str) -> Result<QueueItem, DomainError> {
        let mut item = self.get(id).await?;

        match item.status() {
            QueueStatus::Failed | QueueStatus::Completed => {}
            QueueStatus::Queued => return Ok(item),
            QueueStatus::Running => {
                return Err(DomainError::conflict(format!(
                    "Queue item '{}' is running",
                    id
                )));
            }
        }

        item.reset();
        debug!(item_id = %id, "Queue item reset");
        self.store.save(item).await
    }

    /// Resets every failed item
    pub async fn reset_failed(&self) -> Result<usize, DomainError> {
        let failed: Vec<QueueItem> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|item| item.status() == QueueStatus::Failed)
            .collect();

        let count = failed.len();
        for mut item in failed {
            item.reset();
            self.store.save(item).await?;
        }

        Ok(count)
    }

    /// Replaces the stored response of one step.
    ///
    /// The final output follows when the step is the item's last result.
    pub async fn edit_output(
        &self,
        id: &str,
        step_id: &str,
        response: impl Into<String>,
    ) -> Result<QueueItem, DomainError> {
        let mut item = self.get(id).await?;
        let response = response.into();
        let is_last = is_last_result(&item, step_id);

        if !item.set_step_response(step_id, response.clone()) {
            return Err(no_result(id, step_id));
        }

        if is_last && item.final_output().is_some() {
            item.set_final_output(response);
        }
        item.log(format!("Output of step '{}' edited", step_id));

        self.store.save(item).await
    }

    /// Points one inserted image of a step at another search candidate
    pub async fn reselect_image(
        &self,
        id: &str,
        step_id: &str,
        image_index: usize,
        candidate_index: usize,
    ) -> Result<QueueItem, DomainError> {
        let mut item = self.get(id).await?;
        let is_last = is_last_result(&item, step_id);

        let result = item
            .result_for_step_mut(step_id)
            .ok_or_else(|| no_result(id, step_id))?;
        let rewritten = reselect(
            &result.response,
            &mut result.image_data,
            image_index,
            candidate_index,
        )?;
        result.response = rewritten.clone();

        if is_last && item.final_output().is_some() {
            item.set_final_output(rewritten);
        }
        item.log(format!(
            "Image {} of step '{}' switched to candidate {}",
            image_index, step_id, candidate_index
        ));

        self.store.save(item).await
    }

    /// Removes every item
    pub async fn clear(&self) -> Result<(), DomainError> {
        let running = self
            .store
            .list()
            .await?
            .iter()
            .any(|item| item.status() == QueueStatus::Running);

        if running {
            return Err(DomainError::conflict("Cannot clear the queue while an item is running"));
        }

        self.store.clear().await
    }
}

fn build_item(request: AddQueueItemRequest) -> Result<QueueItem, DomainError> {
    let has_inputs = request
        .mapped_inputs
        .as_ref()
        .is_some_and(|inputs| inputs.values().any(|v| !v.trim().is_empty()));

    if request.original_prompt.trim().is_empty() && !has_inputs {
        return Err(DomainError::validation("Queue item has no input"));
    }

    let mut item = QueueItem::new(request.original_prompt);

    if let Some(inputs) = request.mapped_inputs {
        if let Some(key) = inputs.keys().find(|key| !is_input_key(key)) {
            return Err(DomainError::validation(format!(
                "Unknown input '{}', expected input or input1..input{}",
                key, MAX_NAMED_INPUTS
            )));
        }
        item = item.with_mapped_inputs(inputs);
    }

    if let Some(workflow_id) = request.workflow_id {
        let workflow_id =
            WorkflowId::new(workflow_id).map_err(|e| DomainError::validation(e.to_string()))?;
        item = item.with_workflow_id(workflow_id);
    }

    Ok(item)
}

fn is_input_key(key: &str) -> bool {
    match key.strip_prefix("input") {
        Some("") => true,
        Some(index) => index
            .parse::<usize>()
            .is_ok_and(|k| (1..=MAX_NAMED_INPUTS).contains(&k) && !index.starts_with('0')),
        None => false,
    }
}

fn is_last_result(item: &QueueItem, step_id: &str) -> bool {
    item.results()
        .last()
        .is_some_and(|result| result.step_id == step_id)
}

fn no_result(id: &str, step_id: &str) -> DomainError {
    DomainError::not_found(format!(
        "Queue item '{}' has no result for step '{}'",
        id, step_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImageData, StepResult};
    use crate::infrastructure::storage::InMemoryStorage;

    async fn service() -> QueueService {
        let store = QueueStore::open(Arc::new(InMemoryStorage::<QueueItem>::new()))
            .await
            .unwrap();
        QueueService::new(Arc::new(store))
    }

    /// Stores a completed two-step item
    async fn completed_item(service: &QueueService) -> QueueItem {
        let mut item = service.add(AddQueueItemRequest::new("topic")).await.unwrap();
        item.start();
        item.record_result(StepResult::new("s1", "One", "p1", "first", "https://a"));
        item.record_result(
            StepResult::new(
                "s2",
                "Two",
                "p2",
                r#"<p>x</p><img src="https://img/a.jpg" alt="x" data-image-index="0">"#,
                "https://b",
            )
            .with_image_data(vec![ImageData {
                shortcode: "[image1]".to_string(),
                candidates: vec!["https://img/a.jpg".to_string(), "https://img/b.jpg".to_string()],
                selected_url: "https://img/a.jpg".to_string(),
                ..Default::default()
            }]),
        );
        item.advance_to(2);
        let output = item.results()[1].response.clone();
        item.complete(output);
        service.store().save(item).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_manual_item() {
        let service = service().await;

        let item = service
            .add(
                AddQueueItemRequest::new("raw")
                    .with_input("input", "primary")
                    .with_input("input3", "third")
                    .with_workflow_id("blog"),
            )
            .await
            .unwrap();

        assert_eq!(item.status(), QueueStatus::Queued);
        assert_eq!(item.template_inputs().primary(), "primary");
        assert_eq!(item.workflow_id().unwrap().as_str(), "blog");
        assert_eq!(service.snapshot().items.len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_empty_and_unknown_inputs() {
        let service = service().await;

        let err = service.add(AddQueueItemRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));

        let err = service
            .add(AddQueueItemRequest::new("x").with_input("input20", "y"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("input20"));

        let err = service
            .add(AddQueueItemRequest::new("x").with_input("title", "y"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[tokio::test]
    async fn test_import_is_all_or_nothing() {
        let service = service().await;

        let err = service
            .import(vec![AddQueueItemRequest::new("a"), AddQueueItemRequest::new("")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Entry 2"));
        assert!(service.snapshot().items.is_empty());

        let items = service
            .import(vec![AddQueueItemRequest::new("a"), AddQueueItemRequest::new("b")])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].sequence() < items[1].sequence());
    }

    #[tokio::test]
    async fn test_reset_completed_item() {
        let service = service().await;
        let item = completed_item(&service).await;

        let reset = service.reset(item.id().as_str()).await.unwrap();

        assert_eq!(reset.status(), QueueStatus::Queued);
        assert_eq!(reset.current_step_index(), 0);
        assert!(reset.results().is_empty());
        assert!(reset.final_output().is_none());
        assert!(reset.started_at().is_none());
    }

    #[tokio::test]
    async fn test_reset_running_item_conflicts() {
        let service = service().await;
        let mut item = service.add(AddQueueItemRequest::new("a")).await.unwrap();
        item.start();
        let item = service.store().save(item).await.unwrap();

        let err = service.reset(item.id().as_str()).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));

        let err = service.delete(item.id().as_str()).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_reset_failed() {
        let service = service().await;
        let mut item = service.add(AddQueueItemRequest::new("a")).await.unwrap();
        item.fail("boom");
        service.store().save(item).await.unwrap();
        service.add(AddQueueItemRequest::new("b")).await.unwrap();

        assert_eq!(service.reset_failed().await.unwrap(), 1);
        assert!(service
            .snapshot()
            .items
            .iter()
            .all(|i| i.status() == QueueStatus::Queued));
    }

    #[tokio::test]
    async fn test_edit_output_of_last_step_updates_final_output() {
        let service = service().await;
        let item = completed_item(&service).await;
        let id = item.id().as_str();

        let edited = service.edit_output(id, "s1", "first, edited").await.unwrap();
        assert_eq!(edited.results()[0].response, "first, edited");
        assert_ne!(edited.final_output(), Some("first, edited"));

        let edited = service.edit_output(id, "s2", "final, edited").await.unwrap();
        assert_eq!(edited.final_output(), Some("final, edited"));

        let err = service.edit_output(id, "s9", "x").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reselect_image() {
        let service = service().await;
        let item = completed_item(&service).await;

        let updated = service
            .reselect_image(item.id().as_str(), "s2", 0, 1)
            .await
            .unwrap();

        let result = updated.result_for_step("s2").unwrap();
        assert_eq!(result.image_data[0].selected_index, 1);
        assert!(result.response.contains("https://img/b.jpg"));
        assert!(updated.final_output().unwrap().contains("https://img/b.jpg"));

        let err = service
            .reselect_image(item.id().as_str(), "s2", 0, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let service = service().await;
        let item = service.add(AddQueueItemRequest::new("a")).await.unwrap();
        service.add(AddQueueItemRequest::new("b")).await.unwrap();

        service.delete(item.id().as_str()).await.unwrap();
        assert_eq!(service.snapshot().items.len(), 1);

        let err = service.get(item.id().as_str()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));

        service.clear().await.unwrap();
        assert!(service.snapshot().items.is_empty());
    }

    #[test]
    fn test_input_keys() {
        assert!(is_input_key("input"));
        assert!(is_input_key("input1"));
        assert!(is_input_key("input19"));
        assert!(!is_input_key("input0"));
        assert!(!is_input_key("input01"));
        assert!(!is_input_key("input20"));
        assert!(!is_input_key("prompt"));
    }
}
