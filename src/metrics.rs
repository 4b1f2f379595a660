//! Process-level counters exposed on the admin `/metrics` surface.
//!
//! Grounded in this codebase's `namerd::Stats` (a `tacho::Scope` labeled
//! per concern, holding `Counter`/`Stat` handles) and `admin.rs`'s
//! Prometheus-text `/metrics` route.

use std::sync::Mutex;

pub struct Metrics {
    pub scale_up_total: tacho::Counter,
    pub scale_down_total: tacho::Counter,
    pub failover_total: tacho::Counter,
    pub distribute_total: tacho::Counter,
    pub role_post_failures_total: tacho::Counter,
    pub controller_poll_latency_ms: tacho::Stat,
    reporter: Mutex<tacho::Reporter>,
}

impl Metrics {
    pub fn new() -> Metrics {
        let (scope, reporter) = tacho::new();
        let scope = scope.labeled("service".into(), "sdn-supervisor".into());
        Metrics {
            scale_up_total: scope.counter("scale_up_total".into()),
            scale_down_total: scope.counter("scale_down_total".into()),
            failover_total: scope.counter("failover_total".into()),
            distribute_total: scope.counter("distribute_total".into()),
            role_post_failures_total: scope.counter("role_post_failures_total".into()),
            controller_poll_latency_ms: scope.stat("controller_poll_latency_ms".into()),
            reporter: Mutex::new(reporter),
        }
    }

    /// Renders the current counters as Prometheus text exposition, the body
    /// served by `GET /metrics` on the admin surface.
    pub fn render(&self) -> String {
        tacho::prometheus::format(&self.reporter.lock().unwrap().peek())
    }
}

impl Default for Metrics {
    fn default() -> Metrics {
        Metrics::new()
    }
}
