//! Prometheus metrics for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Requests dispatched to completion
    pub requests_processed: AtomicU64,
    /// Requests that ended in an error response
    pub errors_count: AtomicU64,
    /// Notifications received
    pub notifications_received: AtomicU64,
    /// Tool executions
    pub tool_calls: AtomicU64,
    /// Resource reads
    pub resource_reads: AtomicU64,
    /// Prompt renders
    pub prompt_renders: AtomicU64,
    /// Currently connected transports
    pub active_connections: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment processed requests.
    pub fn inc_requests(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment error responses.
    pub fn inc_errors(&self) {
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment received notifications.
    pub fn inc_notifications(&self) {
        self.notifications_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment tool executions.
    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment resource reads.
    pub fn inc_resource_reads(&self) {
        self.resource_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment prompt renders.
    pub fn inc_prompt_renders(&self) {
        self.prompt_renders.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the connected transport count.
    pub fn set_active_connections(&self, count: u64) {
        self.active_connections.store(count, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            errors_count: self.errors_count.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            resource_reads: self.resource_reads.load(Ordering::Relaxed),
            prompt_renders: self.prompt_renders.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP switchboard_requests_processed Requests dispatched to completion
# TYPE switchboard_requests_processed counter
switchboard_requests_processed {}

# HELP switchboard_errors_count Requests that ended in an error response
# TYPE switchboard_errors_count counter
switchboard_errors_count {}

# HELP switchboard_notifications_received Notifications received
# TYPE switchboard_notifications_received counter
switchboard_notifications_received {}

# HELP switchboard_tool_calls Tool executions
# TYPE switchboard_tool_calls counter
switchboard_tool_calls {}

# HELP switchboard_resource_reads Resource reads
# TYPE switchboard_resource_reads counter
switchboard_resource_reads {}

# HELP switchboard_prompt_renders Prompt renders
# TYPE switchboard_prompt_renders counter
switchboard_prompt_renders {}

# HELP switchboard_active_connections Currently connected transports
# TYPE switchboard_active_connections gauge
switchboard_active_connections {}
"#,
            s.requests_processed,
            s.errors_count,
            s.notifications_received,
            s.tool_calls,
            s.resource_reads,
            s.prompt_renders,
            s.active_connections
        )
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_processed: u64,
    pub errors_count: u64,
    pub notifications_received: u64,
    pub tool_calls: u64,
    pub resource_reads: u64,
    pub prompt_renders: u64,
    pub active_connections: u64,
}

/// Timer for measuring durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Get elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Resident set size of this process in bytes, when the platform exposes it.
#[cfg(target_os = "linux")]
pub fn memory_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn memory_rss_bytes() -> Option<u64> {
    None
}
