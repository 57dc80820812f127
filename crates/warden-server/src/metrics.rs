//! Prometheus-compatible metrics for the governance API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    http_errors_total: AtomicU64,
    /// Total policy evaluations performed.
    evaluations_total: AtomicU64,
    /// Total evaluations that ended in denial.
    denials_total: AtomicU64,
    /// Total approval gates opened.
    gates_requested_total: AtomicU64,
    /// Total gates approved.
    gates_approved_total: AtomicU64,
    /// Total gates denied.
    gates_denied_total: AtomicU64,
    /// Total Monte Carlo simulations run.
    simulations_total: AtomicU64,
    /// Total incidents opened (manual + auto-detected).
    incidents_opened_total: AtomicU64,
    /// Total memory receipts emitted over HTTP.
    receipts_emitted_total: AtomicU64,
    /// Server start time for uptime calculation.
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                evaluations_total: AtomicU64::new(0),
                denials_total: AtomicU64::new(0),
                gates_requested_total: AtomicU64::new(0),
                gates_approved_total: AtomicU64::new(0),
                gates_denied_total: AtomicU64::new(0),
                simulations_total: AtomicU64::new(0),
                incidents_opened_total: AtomicU64::new(0),
                receipts_emitted_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_evaluations(&self, denied: bool) {
        self.inner.evaluations_total.fetch_add(1, Ordering::Relaxed);
        if denied {
            self.inner.denials_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_gates_requested(&self) {
        self.inner
            .gates_requested_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_gates_resolved(&self, approved: bool) {
        if approved {
            self.inner
                .gates_approved_total
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner
                .gates_denied_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_simulations(&self) {
        self.inner.simulations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_incidents_opened(&self, count: u64) {
        self.inner
            .incidents_opened_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_receipts_emitted(&self) {
        self.inner
            .receipts_emitted_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let m = &self.inner;
        let uptime = m.started_at.elapsed().as_secs();

        format!(
            r#"# HELP warden_uptime_seconds Time since the server started.
# TYPE warden_uptime_seconds gauge
warden_uptime_seconds {}

# HELP warden_http_requests_total Total HTTP requests served.
# TYPE warden_http_requests_total counter
warden_http_requests_total {}

# HELP warden_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE warden_http_errors_total counter
warden_http_errors_total {}

# HELP warden_evaluations_total Total policy evaluations performed.
# TYPE warden_evaluations_total counter
warden_evaluations_total {}

# HELP warden_denials_total Total evaluations that ended in denial.
# TYPE warden_denials_total counter
warden_denials_total {}

# HELP warden_gates_requested_total Total approval gates opened.
# TYPE warden_gates_requested_total counter
warden_gates_requested_total {}

# HELP warden_gates_approved_total Total gates approved by an operator.
# TYPE warden_gates_approved_total counter
warden_gates_approved_total {}

# HELP warden_gates_denied_total Total gates denied by an operator.
# TYPE warden_gates_denied_total counter
warden_gates_denied_total {}

# HELP warden_simulations_total Total Monte Carlo simulations run.
# TYPE warden_simulations_total counter
warden_simulations_total {}

# HELP warden_incidents_opened_total Total incidents opened.
# TYPE warden_incidents_opened_total counter
warden_incidents_opened_total {}

# HELP warden_receipts_emitted_total Total memory receipts emitted over HTTP.
# TYPE warden_receipts_emitted_total counter
warden_receipts_emitted_total {}
"#,
            uptime,
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.evaluations_total.load(Ordering::Relaxed),
            m.denials_total.load(Ordering::Relaxed),
            m.gates_requested_total.load(Ordering::Relaxed),
            m.gates_approved_total.load(Ordering::Relaxed),
            m.gates_denied_total.load(Ordering::Relaxed),
            m.simulations_total.load(Ordering::Relaxed),
            m.incidents_opened_total.load(Ordering::Relaxed),
            m.receipts_emitted_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
