use std::sync::{
    atomic::{AtomicI64, AtomicU64, Ordering},
    Arc, OnceLock,
};

/// Process-wide relay counters, rendered in Prometheus text format.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    active_connections: AtomicI64,
    session_joins_total: AtomicU64,
    deltas_relayed_total: AtomicU64,
    full_syncs_relayed_total: AtomicU64,
    abandonment_timers_armed_total: AtomicU64,
    abandonment_timers_cancelled_total: AtomicU64,
    sessions_terminated_total: AtomicU64,
    sessions_submitted_total: AtomicU64,
    persistence_failures_total: AtomicU64,
}

static GLOBAL_METRICS: OnceLock<Arc<RelayMetrics>> = OnceLock::new();

pub fn set_global_metrics(metrics: Arc<RelayMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<RelayMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn connection_opened() {
    if let Some(metrics) = global_metrics() {
        metrics.active_connections.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn connection_closed() {
    if let Some(metrics) = global_metrics() {
        metrics.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn increment_session_joins() {
    bump(|metrics| &metrics.session_joins_total);
}

pub fn increment_deltas_relayed() {
    bump(|metrics| &metrics.deltas_relayed_total);
}

pub fn increment_full_syncs_relayed() {
    bump(|metrics| &metrics.full_syncs_relayed_total);
}

pub fn increment_timers_armed() {
    bump(|metrics| &metrics.abandonment_timers_armed_total);
}

pub fn increment_timers_cancelled() {
    bump(|metrics| &metrics.abandonment_timers_cancelled_total);
}

pub fn increment_sessions_terminated() {
    bump(|metrics| &metrics.sessions_terminated_total);
}

pub fn increment_sessions_submitted() {
    bump(|metrics| &metrics.sessions_submitted_total);
}

pub fn increment_persistence_failures() {
    bump(|metrics| &metrics.persistence_failures_total);
}

fn bump(counter: impl FnOnce(&RelayMetrics) -> &AtomicU64) {
    if let Some(metrics) = global_metrics() {
        counter(metrics).fetch_add(1, Ordering::SeqCst);
    }
}

impl RelayMetrics {
    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP relay_active_connections Currently open websocket connections.\n");
        output.push_str("# TYPE relay_active_connections gauge\n");
        output.push_str(&format!(
            "relay_active_connections {}\n",
            self.active_connections.load(Ordering::SeqCst)
        ));

        let counters: [(&str, &str, &AtomicU64); 8] = [
            ("relay_session_joins_total", "Total join-session events.", &self.session_joins_total),
            (
                "relay_deltas_relayed_total",
                "Total code deltas forwarded to peers.",
                &self.deltas_relayed_total,
            ),
            (
                "relay_full_syncs_relayed_total",
                "Total full-document replies delivered.",
                &self.full_syncs_relayed_total,
            ),
            (
                "relay_abandonment_timers_armed_total",
                "Total abandonment timers armed.",
                &self.abandonment_timers_armed_total,
            ),
            (
                "relay_abandonment_timers_cancelled_total",
                "Total abandonment timers cancelled before expiry.",
                &self.abandonment_timers_cancelled_total,
            ),
            (
                "relay_sessions_terminated_total",
                "Total sessions terminated for abandonment.",
                &self.sessions_terminated_total,
            ),
            (
                "relay_sessions_submitted_total",
                "Total sessions completed by submission.",
                &self.sessions_submitted_total,
            ),
            (
                "relay_persistence_failures_total",
                "Total failed submission calls to the persistence API.",
                &self.persistence_failures_total,
            ),
        ];

        for (name, help, counter) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {}\n", counter.load(Ordering::SeqCst)));
        }

        output
    }
}
