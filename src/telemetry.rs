//! Telemetry and structured logging for the converter client.
//!
//! [`Telemetry`] is handed to every component at construction instead of
//! being looked up from process-wide state. It emits structured `tracing`
//! events and OpenTelemetry spans for job and probe outcomes.

use crate::error::Result;
use crate::job::{JobRecord, JobStatus};
use crate::probe::ServerInfo;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Instrumentation scope name used for spans.
pub const TRACER_NAME: &str = "remote-converter";

/// Injectable telemetry sink.
#[derive(Clone)]
pub struct Telemetry {
    tracer: Arc<BoxedTracer>,
}

impl Telemetry {
    pub fn new(tracer: BoxedTracer) -> Self {
        Self {
            tracer: Arc::new(tracer),
        }
    }

    /// Uses the globally installed tracer provider; a no-op if none is set.
    pub fn global() -> Self {
        Self::new(global::tracer(TRACER_NAME))
    }

    /// Records telemetry for a job that reached a terminal state.
    ///
    /// Emits a `conversion_job` span with job id, priority, status, queue
    /// wait, total duration and the error message if the job failed.
    pub fn record_job(&self, job: &JobRecord) {
        let mut span = self.tracer.start("conversion_job");

        span.set_attribute(KeyValue::new("job_id", job.job_id.to_string()));
        span.set_attribute(KeyValue::new("priority", job.priority.value() as i64));
        span.set_attribute(KeyValue::new("status", job.status.to_string()));

        if let Some(wait_ms) = job.queue_wait_ms() {
            span.set_attribute(KeyValue::new("queue_wait_ms", wait_ms));
        }

        if let Some(duration_ms) = job.processing_duration_ms() {
            span.set_attribute(KeyValue::new("duration_ms", duration_ms));

            info!(
                job_id = %job.job_id,
                priority = %job.priority,
                duration_ms = duration_ms,
                status = %job.status,
                "Conversion job finished"
            );
        }

        if job.status == JobStatus::Failed {
            if let Some(ref error) = job.error {
                span.set_attribute(KeyValue::new("error", error.clone()));
                warn!(
                    job_id = %job.job_id,
                    error = %error,
                    "Conversion job failed"
                );
            }
        }

        span.end();
    }

    /// Records a worker picking up a job.
    pub fn record_dispatch(&self, worker_id: usize, job: &JobRecord, queue_length: usize) {
        debug!(
            worker_id = worker_id,
            job_id = %job.job_id,
            priority = %job.priority,
            queue_length = queue_length,
            "Dispatching conversion job"
        );
    }

    /// Records the outcome of a handshake probe.
    pub fn record_probe(&self, endpoint: &str, result: &Result<ServerInfo>) {
        let mut span = self.tracer.start("handshake_probe");
        span.set_attribute(KeyValue::new("endpoint", endpoint.to_string()));

        match result {
            Ok(server_info) => {
                span.set_attribute(KeyValue::new("operational", server_info.operational));
                span.set_attribute(KeyValue::new(
                    "protocol_version",
                    server_info.protocol_version as i64,
                ));
            }
            Err(e) => {
                span.set_attribute(KeyValue::new("error", e.to_string()));
            }
        }

        span.end();
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::global()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

/// Installs a `tracing` subscriber honouring `RUST_LOG` (default: info).
///
/// `LOG_FORMAT=json` switches to JSON lines. Does nothing if a global
/// subscriber is already installed.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_ok() {
        debug!("Tracing initialized");
    }
}
