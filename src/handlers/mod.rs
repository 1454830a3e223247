//! HTTP handlers for health, status, and metrics endpoints.

pub mod status;

pub use status::{
    health_handler, metrics_handler, readiness_handler, status_handler, status_router,
    HealthResponse, LatencyHistogram, LatencyMetrics, MemoryMetrics, StatusResponse,
    SERVER_NAME, SERVER_VERSION,
};
