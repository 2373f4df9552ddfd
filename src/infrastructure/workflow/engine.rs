//! Workflow execution engine
//!
//! Replays queue items through the steps of a workflow, one item at a time.
//! Each step resolves its templates against the item's history, goes through
//! the configured [`ExecutionBackend`], is normalized and optionally enriched
//! with images, and is persisted before the next step starts. Items keep
//! their `current_step_index`, so a stopped or failed run resumes where it
//! left off.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::content::normalize;
use crate::domain::workflow::{image_instruction, TemplateResolver, STOPPED_BY_USER};
use crate::domain::{
    BackendRequest, CancellationToken, DomainError, ExecutionBackend, ImageData, Progress,
    QueueItem, QueueItemId, QueueStatus, StepResult, Workflow, WorkflowError,
};
use crate::infrastructure::image::ImageEnricher;
use crate::infrastructure::observability::{record_item_finished, record_step};
use crate::infrastructure::queue::QueueStore;

/// Summary of a finished run
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RunReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// Already completed or deleted while the run was going
    pub skipped: usize,
    pub stopped: bool,
    pub progress: Progress,
}

pub struct WorkflowEngine {
    backend: Arc<dyn ExecutionBackend>,
    queue: Arc<QueueStore>,
    enricher: Option<Arc<ImageEnricher>>,
    active: Mutex<Option<CancellationToken>>,
    progress: watch::Sender<Progress>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("backend", &self.backend.kind())
            .field("images", &self.enricher.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Releases the run slot when dropped
struct RunSlot<'a> {
    active: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

impl WorkflowEngine {
    pub fn new(backend: Arc<dyn ExecutionBackend>, queue: Arc<QueueStore>) -> Self {
        let (progress, _) = watch::channel(Progress::default());

        Self {
            backend,
            queue,
            enricher: None,
            active: Mutex::new(None),
            progress,
        }
    }

    /// Enables `[imageN]` replacement for steps with images turned on
    pub fn with_enricher(mut self, enricher: Arc<ImageEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn is_running(&self) -> bool {
        self.active_token().is_some()
    }

    /// Progress of the current or last run
    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Runs `selection` in the given order, or every item that is not
    /// completed yet in queue order.
    pub async fn run(
        &self,
        workflow: &Workflow,
        selection: Option<&[QueueItemId]>,
    ) -> Result<RunReport, DomainError> {
        if workflow.is_empty() {
            return Err(WorkflowError::empty_workflow(workflow.id().as_str()).into());
        }
        workflow.validate()?;

        let (_slot, cancel) = self.acquire()?;
        let selected = self.select(selection).await?;
        let step_count = workflow.step_count();

        info!(
            workflow_id = %workflow.id(),
            items = selected.len(),
            steps = step_count,
            backend = %self.backend.kind(),
            "Starting run"
        );

        let mut report = RunReport {
            selected: selected.len(),
            ..Default::default()
        };
        self.publish_progress(&selected, step_count);

        for id in &selected {
            if cancel.is_cancelled() {
                break;
            }

            let Some(item) = self.queue.get(id).await? else {
                warn!(item_id = %id, "Queue item disappeared before it could run");
                report.skipped += 1;
                continue;
            };

            if item.status() == QueueStatus::Completed {
                report.skipped += 1;
                continue;
            }

            match self.process_item(workflow, item, &selected, &cancel).await? {
                Some(QueueStatus::Completed) => report.completed += 1,
                Some(_) => report.failed += 1,
                None => report.skipped += 1,
            }
        }

        report.stopped = cancel.is_cancelled();
        report.progress = self.publish_progress(&selected, step_count);

        info!(
            workflow_id = %workflow.id(),
            completed = report.completed,
            failed = report.failed,
            stopped = report.stopped,
            percent = report.progress.percent,
            "Run finished"
        );

        Ok(report)
    }

    /// Cancels the active run and aborts the backend.
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(token) = self.active_token() else {
            return false;
        };

        info!("Stop requested");
        token.cancel();
        self.backend.abort().await;
        true
    }

    /// Executes one step again for an item that already ran it.
    ///
    /// Only that step's result changes, plus `final_output` for the last step.
    /// Stored image selections are reused when the marker count is unchanged.
    pub async fn rerun_step(
        &self,
        workflow: &Workflow,
        item_id: &QueueItemId,
        step_index: usize,
    ) -> Result<QueueItem, DomainError> {
        let step = workflow.step(step_index).ok_or_else(|| {
            WorkflowError::step_not_found(format!("#{} of workflow '{}'", step_index + 1, workflow.id()))
        })?;

        let (_slot, cancel) = self.acquire()?;
        let mut item = self.queue.require(item_id).await?;

        let prior = item
            .result_for_step(step.id())
            .map(|result| result.image_data.clone())
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "Step '{}' has not run yet for queue item '{}'",
                    step.id(),
                    item_id
                ))
            })?;
        let prior = (!prior.is_empty()).then_some(prior);

        debug!(item_id = %item_id, step = step_index + 1, "Re-running step");

        let outcome = self
            .execute_step(workflow, &item, step_index, prior.as_deref(), &cancel)
            .await
            .and_then(|result| {
                if cancel.is_cancelled() {
                    Err(WorkflowError::Stopped)
                } else {
                    Ok(result)
                }
            });

        match outcome {
            Ok(result) => {
                if step_index + 1 == workflow.step_count() {
                    item.set_final_output(result.response.clone());
                }
                item.record_result(result);
                item.log(format!("Re-ran step {} ({})", step_index + 1, step.name()));
                self.queue.save(item).await
            }
            Err(e) => {
                warn!(item_id = %item_id, step = step_index + 1, error = %e, "Re-run failed");
                item.log(format!("Re-run of step {} failed: {}", step_index + 1, e));
                self.queue.save(item).await?;
                Err(e.into())
            }
        }
    }

    async fn process_item(
        &self,
        workflow: &Workflow,
        mut item: QueueItem,
        selected: &[QueueItemId],
        cancel: &CancellationToken,
    ) -> Result<Option<QueueStatus>, DomainError> {
        let step_count = workflow.step_count();
        let first = item.current_step_index().min(step_count);

        item.start();
        item.log(format!("Started at step {} of {}", first + 1, step_count));
        if !self.persist(&item).await? {
            return Ok(None);
        }

        info!(item_id = %item.id(), step = first + 1, "Processing queue item");

        for position in first..step_count {
            if cancel.is_cancelled() {
                return self.fail_item(item, STOPPED_BY_USER).await;
            }

            match self.execute_step(workflow, &item, position, None, cancel).await {
                Ok(result) if cancel.is_cancelled() => {
                    // Enrichment may have been cut short; the step runs again on resume
                    warn!(item_id = %item.id(), step = position + 1, "Stopped after step returned");
                    item.record_result(result);
                    let status = self.fail_item(item, STOPPED_BY_USER).await;
                    self.publish_progress(selected, step_count);
                    return status;
                }
                Ok(result) => {
                    item.log(format!("Step {} ({}) completed", position + 1, result.step_name));
                    item.record_result(result);
                    item.advance_to(position + 1);

                    if !self.persist(&item).await? {
                        return Ok(None);
                    }
                    self.publish_progress(selected, step_count);
                }
                Err(e) => {
                    let reason = if cancel.is_cancelled() {
                        STOPPED_BY_USER.to_string()
                    } else {
                        e.to_string()
                    };

                    error!(item_id = %item.id(), step = position + 1, error = %reason, "Step failed");
                    let status = self.fail_item(item, reason).await;
                    self.publish_progress(selected, step_count);
                    return status;
                }
            }

            if position + 1 < step_count && workflow.step_delay_ms() > 0 {
                cancel
                    .sleep(Duration::from_millis(workflow.step_delay_ms()))
                    .await;
            }
        }

        let final_output = workflow
            .steps()
            .last()
            .and_then(|step| item.result_for_step(step.id()))
            .map(|result| result.response.clone())
            .unwrap_or_default();

        item.complete(final_output);
        item.log("Completed");
        if !self.persist(&item).await? {
            return Ok(None);
        }

        record_item_finished(QueueStatus::Completed);
        self.publish_progress(selected, step_count);
        Ok(Some(QueueStatus::Completed))
    }

    async fn execute_step(
        &self,
        workflow: &Workflow,
        item: &QueueItem,
        position: usize,
        prior_images: Option<&[ImageData]>,
        cancel: &CancellationToken,
    ) -> Result<StepResult, WorkflowError> {
        let step = workflow
            .step(position)
            .ok_or_else(|| WorkflowError::step_not_found(format!("#{}", position + 1)))?;

        let resolver = TemplateResolver::new(workflow.steps(), item.results());
        let mut prompt = resolver.resolve_prompt(step.prompt(), position, &item.template_inputs())?;
        let url = resolver.resolve_url(step.url(), position)?;

        let images = step.enabled_image();
        if let Some(image) = images.filter(|image| image.wants_markers()) {
            prompt.push_str(&image_instruction(image.count));
        }

        let request = BackendRequest::new(url, prompt.clone())
            .with_selectors(step.selectors().cloned(), step.use_custom_selectors())
            .with_system_instruction(workflow.system_instruction().map(str::to_string))
            .with_model(workflow.model());

        debug!(
            item_id = %item.id(),
            step_id = step.id(),
            url = %request.url,
            "Dispatching step"
        );

        let started = Instant::now();
        let outcome = self.backend.execute(request, cancel).await;
        record_step(self.backend.kind(), outcome.is_ok(), started.elapsed());
        let output = outcome?;

        let mut response = normalize(&output.text);
        let mut image_data = Vec::new();

        if let (Some(image), Some(enricher)) = (images, &self.enricher) {
            let enriched = enricher
                .enrich(
                    &response,
                    image,
                    prior_images,
                    item.image_session_handle(),
                    cancel,
                )
                .await;
            response = enriched.output;
            image_data = enriched.image_data;
        }

        Ok(
            StepResult::new(step.id(), step.name(), prompt, response, output.final_url)
                .with_image_data(image_data),
        )
    }

    async fn fail_item(
        &self,
        mut item: QueueItem,
        reason: impl Into<String>,
    ) -> Result<Option<QueueStatus>, DomainError> {
        item.fail(reason);
        if !self.persist(&item).await? {
            return Ok(None);
        }

        record_item_finished(QueueStatus::Failed);
        Ok(Some(QueueStatus::Failed))
    }

    /// Saves the item; `false` when it was deleted in the meantime
    async fn persist(&self, item: &QueueItem) -> Result<bool, DomainError> {
        match self.queue.save(item.clone()).await {
            Ok(_) => Ok(true),
            Err(DomainError::NotFound { .. }) => {
                warn!(item_id = %item.id(), "Queue item was deleted during the run");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn select(&self, selection: Option<&[QueueItemId]>) -> Result<Vec<QueueItemId>, DomainError> {
        let items = self.queue.list().await?;

        let Some(ids) = selection else {
            return Ok(items
                .iter()
                .filter(|item| item.status() != QueueStatus::Completed)
                .map(|item| item.id().clone())
                .collect());
        };

        if ids.is_empty() {
            return Err(WorkflowError::invalid_selection("No queue items selected").into());
        }

        let known: HashSet<&QueueItemId> = items.iter().map(QueueItem::id).collect();
        if let Some(unknown) = ids.iter().find(|id| !known.contains(id)) {
            return Err(
                WorkflowError::invalid_selection(format!("Unknown queue item '{}'", unknown)).into(),
            );
        }

        let mut seen = HashSet::new();
        Ok(ids.iter().filter(|id| seen.insert(*id)).cloned().collect())
    }

    fn publish_progress(&self, selected: &[QueueItemId], step_count: usize) -> Progress {
        let snapshot = self.queue.snapshot();
        let progress = Progress::compute(
            selected.iter().filter_map(|id| snapshot.get(id)),
            step_count,
        );

        self.progress.send_replace(progress);
        progress
    }

    fn acquire(&self) -> Result<(RunSlot<'_>, CancellationToken), DomainError> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| DomainError::internal(format!("Run state poisoned: {}", e)))?;

        if active.is_some() {
            return Err(DomainError::conflict("A run is already in progress"));
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());

        Ok((
            RunSlot {
                active: &self.active,
            },
            token,
        ))
    }

    fn active_token(&self) -> Option<CancellationToken> {
        self.active.lock().ok().and_then(|active| active.clone())
    }
}
