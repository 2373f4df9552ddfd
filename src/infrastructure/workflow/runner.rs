//! Background runs started by a host surface

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::engine::{RunReport, WorkflowEngine};
use crate::domain::{DomainError, Progress, QueueItemId, Workflow, WorkflowError};

/// Outcome of the latest run started through a [`RunController`]
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatus {
    fn started(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            report: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Spawns engine runs on the runtime and remembers how the last one ended
#[derive(Debug)]
pub struct RunController {
    engine: Arc<WorkflowEngine>,
    last: Arc<RwLock<Option<RunStatus>>>,
}

impl RunController {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            last: Arc::new(RwLock::new(None)),
        }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn progress(&self) -> Progress {
        self.engine.progress()
    }

    pub async fn last(&self) -> Option<RunStatus> {
        self.last.read().await.clone()
    }

    /// Starts a run in the background.
    ///
    /// Workflow problems and an already active run are reported here; a bad
    /// selection surfaces in the run's status.
    pub async fn start(
        &self,
        workflow: Workflow,
        selection: Option<Vec<QueueItemId>>,
    ) -> Result<(RunStatus, JoinHandle<()>), DomainError> {
        if workflow.is_empty() {
            return Err(WorkflowError::empty_workflow(workflow.id().as_str()).into());
        }
        workflow.validate()?;

        if self.engine.is_running() {
            return Err(DomainError::conflict("A run is already in progress"));
        }

        let status = RunStatus::started(workflow.id().as_str());
        *self.last.write().await = Some(status.clone());

        let engine = self.engine.clone();
        let last = self.last.clone();

        let handle = tokio::spawn(async move {
            let outcome = engine.run(&workflow, selection.as_deref()).await;

            let mut guard = last.write().await;
            let Some(status) = guard.as_mut() else {
                return;
            };
            status.finished_at = Some(Utc::now());

            match outcome {
                Ok(report) => {
                    info!(
                        workflow_id = %workflow.id(),
                        completed = report.completed,
                        failed = report.failed,
                        "Background run finished"
                    );
                    status.report = Some(report);
                }
                Err(e) => {
                    error!(workflow_id = %workflow.id(), error = %e, "Background run failed");
                    status.error = Some(e.to_string());
                }
            }
        });

        Ok((status, handle))
    }

    /// Requests the active run to stop
    pub async fn stop(&self) -> bool {
        self.engine.stop().await
    }
}
