//! Tracing setup for trainflow services.

use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

use crate::request::PipelineId;

/// Initializes the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info` for this crate.
/// Calling twice is harmless; the second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trainflow=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Creates the span a pipeline run executes under.
#[must_use]
pub fn pipeline_span(pipeline_id: PipelineId) -> Span {
    tracing::info_span!("pipeline", pipeline_id = %pipeline_id)
}
