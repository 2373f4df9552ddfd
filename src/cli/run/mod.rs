//! Run command - processes the queue once with a workflow file

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{QueueItemId, Workflow};
use crate::infrastructure::logging;
use crate::infrastructure::services::{forward_references, AddQueueItemRequest};
use crate::infrastructure::workflow::RunReport;

use super::serve::shutdown_signal;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Workflow JSON file
    #[arg(short, long)]
    pub workflow: PathBuf,

    /// JSON array of queue items to append before running
    #[arg(long)]
    pub import: Option<PathBuf>,

    /// Process only these items, in this order (repeatable)
    #[arg(long = "item")]
    pub items: Vec<String>,

    /// Move failed items back to the queue first
    #[arg(long)]
    pub reset_failed: bool,
}

/// Runs one batch; Ctrl+C stops it after the step in flight is aborted
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let workflow = read_workflow(&args.workflow).await?;
    for warning in forward_references(&workflow) {
        warn!(workflow_id = %workflow.id(), "{}", warning);
    }

    let pipeline = crate::build_pipeline(&config).await?;

    if let Some(path) = &args.import {
        let requests = read_items(path).await?;
        let imported = pipeline.queue_service.import(requests).await?;
        info!(count = imported.len(), "Queue items imported");
    }

    if args.reset_failed {
        let reset = pipeline.queue_service.reset_failed().await?;
        info!(count = reset, "Failed items reset");
    }

    let selection: Option<Vec<QueueItemId>> = if args.items.is_empty() {
        None
    } else {
        Some(args.items.into_iter().map(QueueItemId::from).collect())
    };

    let run = pipeline.engine.run(&workflow, selection.as_deref());
    tokio::pin!(run);

    let report = tokio::select! {
        report = &mut run => report?,
        _ = shutdown_signal() => {
            pipeline.engine.stop().await;
            run.await?
        }
    };

    println!("{}", summary(&report));
    Ok(())
}

async fn read_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = tokio::fs::read_to_string(path).await?;
    let workflow: Workflow = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid workflow file {}: {}", path.display(), e))?;
    Ok(workflow)
}

async fn read_items(path: &Path) -> anyhow::Result<Vec<AddQueueItemRequest>> {
    let content = tokio::fs::read_to_string(path).await?;
    let items = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid queue file {}: {}", path.display(), e))?;
    Ok(items)
}

fn summary(report: &RunReport) -> String {
    let mut line = format!(
        "{} selected, {} completed, {} failed, {} skipped ({}%)",
        report.selected,
        report.completed,
        report.failed,
        report.skipped,
        report.progress.percent
    );

    if report.stopped {
        line.push_str(" - stopped");
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Progress;

    #[test]
    fn test_summary() {
        let report = RunReport {
            selected: 5,
            completed: 2,
            failed: 1,
            skipped: 0,
            stopped: true,
            progress: Progress::from_counts(2, 5),
        };

        assert_eq!(
            summary(&report),
            "5 selected, 2 completed, 1 failed, 0 skipped (40%) - stopped"
        );
    }

    #[tokio::test]
    async fn test_read_workflow_file() {
        let path = std::env::temp_dir().join(format!("workflow-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"{ "id": "from-file", "name": "From file",
                 "steps": [ { "id": "s1", "name": "Ask", "prompt": "{{input}}" } ] }"#,
        )
        .await
        .unwrap();

        let workflow = read_workflow(&path).await.unwrap();
        assert_eq!(workflow.id().as_str(), "from-file");
        assert_eq!(workflow.step_count(), 1);

        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = read_workflow(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid workflow file"));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
