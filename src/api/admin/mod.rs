//! Admin API endpoints for workflows, the queue and runs

pub mod queue;
pub mod runs;
pub mod workflows;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use super::state::AppState;

/// Create admin API router
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        // Workflow management
        .route("/workflows", get(workflows::list_workflows))
        .route("/workflows", post(workflows::create_workflow))
        .route("/workflows/import", put(workflows::import_workflow))
        .route("/workflows/{workflow_id}", get(workflows::get_workflow))
        .route("/workflows/{workflow_id}", put(workflows::update_workflow))
        .route("/workflows/{workflow_id}", delete(workflows::delete_workflow))
        // Queue
        .route("/queue", get(queue::list_queue))
        .route("/queue", post(queue::add_item))
        .route("/queue", delete(queue::clear_queue))
        .route("/queue/import", post(queue::import_items))
        .route("/queue/reset-failed", post(queue::reset_failed))
        .route("/queue/{item_id}", get(queue::get_item))
        .route("/queue/{item_id}", delete(queue::delete_item))
        .route("/queue/{item_id}/reset", post(queue::reset_item))
        .route(
            "/queue/{item_id}/steps/{step_id}/output",
            put(queue::edit_output),
        )
        .route(
            "/queue/{item_id}/steps/{step_id}/rerun",
            post(queue::rerun_step),
        )
        .route(
            "/queue/{item_id}/steps/{step_id}/images/{image_index}/select",
            post(queue::select_image),
        )
        // Runs
        .route("/runs", post(runs::start_run))
        .route("/runs/stop", post(runs::stop_run))
        .route("/runs/current", get(runs::current_run))
}
