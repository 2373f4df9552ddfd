//! Observability infrastructure - Prometheus metrics

mod metrics;

pub use metrics::{
    create_metrics_router, init_metrics, record_http_request, record_image_search,
    record_item_finished, record_step, PrometheusMetrics,
};
