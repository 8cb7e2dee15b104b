use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: op, status (`ok` or the error kind).
pub const OPERATIONS_TOTAL: &str = "rotaplan_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "rotaplan_operation_duration_seconds";

/// Counter: slot lock waits that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "rotaplan_lock_timeouts_total";

/// Counter: occupancies written with a label no roster entry matches.
pub const UNRESOLVED_LABELS_TOTAL: &str = "rotaplan_unresolved_labels_total";

/// Counter: decrements that hit the zero floor.
pub const CLAMPED_DECREMENTS_TOTAL: &str = "rotaplan_clamped_decrements_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: day schedules held in memory.
pub const DAYS_ACTIVE: &str = "rotaplan_days_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rotaplan_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rotaplan_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Run an engine operation, recording its count and latency.
pub(crate) async fn timed<T>(
    op: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());
    result
}
