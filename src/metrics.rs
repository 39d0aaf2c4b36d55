//! Prometheus metrics collection for parleyd.
//!
//! Metrics are exposed on the `/metrics` HTTP endpoint (see [`crate::http`]).
//! Recording helpers are no-ops until [`init`] has run, so library users that
//! never call it pay nothing.
//!
//! - `parley_matches_total{kind}` - Matches committed, `pair` or `solo`
//! - `parley_messages_total{kind}` - Messages posted by `human` or `automated` slots
//! - `parley_automated_fallbacks_total{reason}` - Automated turns that fell back
//! - `parley_operation_duration_seconds{operation}` - Lobby operation latency

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Fresh admissions (idempotent re-admissions are not counted).
pub static ADMISSIONS: OnceLock<IntCounter> = OnceLock::new();

/// Withdrawals by outcome (`removed`, `not_waiting`, `already_matched`).
pub static WITHDRAWALS: OnceLock<IntCounterVec> = OnceLock::new();

/// Committed matches by kind.
pub static MATCHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Sessions created by matching passes.
pub static SESSIONS_CREATED: OnceLock<IntCounter> = OnceLock::new();

/// Messages appended to session logs, by slot kind.
pub static MESSAGES: OnceLock<IntCounterVec> = OnceLock::new();

/// Automated turns that posted the fallback line, by failure reason.
pub static AUTOMATED_FALLBACKS: OnceLock<IntCounterVec> = OnceLock::new();

/// Lobby operation errors by operation and error code.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Participants currently in the admission queue.
pub static WAITING_PARTICIPANTS: OnceLock<IntGauge> = OnceLock::new();

/// Sessions currently registered.
pub static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Lobby operation latency.
pub static OPERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Latency of completion calls, including ones that failed.
pub static AUTOMATED_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(ADMISSIONS, IntCounter::new("parley_admissions_total", "Participants admitted to the queue"));
    register!(WITHDRAWALS, IntCounterVec::new(Opts::new("parley_withdrawals_total", "Withdrawal requests by outcome"), &["outcome"]));
    register!(MATCHES, IntCounterVec::new(Opts::new("parley_matches_total", "Matches committed by kind"), &["kind"]));
    register!(SESSIONS_CREATED, IntCounter::new("parley_sessions_created_total", "Sessions created by matching passes"));
    register!(MESSAGES, IntCounterVec::new(Opts::new("parley_messages_total", "Messages posted by slot kind"), &["kind"]));
    register!(AUTOMATED_FALLBACKS, IntCounterVec::new(Opts::new("parley_automated_fallbacks_total", "Automated turns answered with the fallback line"), &["reason"]));
    register!(OPERATION_ERRORS, IntCounterVec::new(Opts::new("parley_operation_errors_total", "Lobby operation errors"), &["operation", "error"]));
    register!(WAITING_PARTICIPANTS, IntGauge::new("parley_waiting_participants", "Participants currently waiting"));
    register!(ACTIVE_SESSIONS, IntGauge::new("parley_active_sessions", "Sessions currently registered"));
    register!(OPERATION_LATENCY, HistogramVec::new(
        HistogramOpts::new("parley_operation_duration_seconds", "Lobby operation latency")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["operation"]));
    register!(AUTOMATED_LATENCY, Histogram::with_opts(
        HistogramOpts::new("parley_automated_latency_seconds", "Completion call latency")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for lobby metric updates
// ============================================================================

#[inline]
fn inc_labeled(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(c) = metric.get() {
        c.with_label_values(labels).inc();
    }
}

#[inline]
pub fn record_admission() {
    if let Some(c) = ADMISSIONS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_withdrawal(outcome: &str) {
    inc_labeled(&WITHDRAWALS, &[outcome]);
}

/// Record a committed match and the session it created.
#[inline]
pub fn record_match(kind: &str) {
    inc_labeled(&MATCHES, &[kind]);
    if let Some(c) = SESSIONS_CREATED.get() {
        c.inc();
    }
}

#[inline]
pub fn record_message(kind: &str) {
    inc_labeled(&MESSAGES, &[kind]);
}

#[inline]
pub fn record_fallback(reason: &str) {
    inc_labeled(&AUTOMATED_FALLBACKS, &[reason]);
}

/// Record an operation execution with latency.
#[inline]
pub fn record_operation(operation: &str, duration_secs: f64) {
    if let Some(h) = OPERATION_LATENCY.get() {
        h.with_label_values(&[operation]).observe(duration_secs);
    }
}

/// Record an operation error.
#[inline]
pub fn record_operation_error(operation: &str, error: &str) {
    inc_labeled(&OPERATION_ERRORS, &[operation, error]);
}

#[inline]
pub fn record_automated_latency(duration_secs: f64) {
    if let Some(h) = AUTOMATED_LATENCY.get() {
        h.observe(duration_secs);
    }
}

#[inline]
pub fn set_waiting(count: usize) {
    if let Some(g) = WAITING_PARTICIPANTS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

#[inline]
pub fn set_active_sessions(count: usize) {
    if let Some(g) = ACTIVE_SESSIONS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
