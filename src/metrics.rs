//! Metric names and recording helpers, mirroring the teacher's
//! `names`-module-of-constants convention (`src/metrics/mod.rs`), plus the
//! same `PrometheusBuilder::install_recorder` bootstrap the teacher uses
//! in `init_metrics`.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub mod names {
    pub const ORDERS_PLACED: &str = "matcher_orders_placed_total";
    pub const ORDERS_CANCELED: &str = "matcher_orders_canceled_total";
    pub const ORDERS_REJECTED: &str = "matcher_orders_rejected_total";
    pub const ORDERS_EXPIRED: &str = "matcher_orders_expired_total";
    pub const TRADES_EXECUTED: &str = "matcher_trades_executed_total";
    pub const TRADE_AMOUNT: &str = "matcher_trade_amount";
    pub const MATCH_ITERATIONS: &str = "matcher_match_iterations";
    pub const MATCH_LOOP_OVERRUNS: &str = "matcher_match_loop_overruns_total";
    pub const JOURNAL_WRITES: &str = "matcher_journal_writes_total";
    pub const JOURNAL_WRITE_FAILURES: &str = "matcher_journal_write_failures_total";
    pub const SNAPSHOTS_SAVED: &str = "matcher_snapshots_saved_total";
    pub const RECOVERY_EVENTS_REPLAYED: &str = "matcher_recovery_events_replayed";
    pub const MAILBOX_DEPTH: &str = "matcher_mailbox_depth";
}

/// Installs a process-global Prometheus recorder with histogram buckets
/// tuned for this crate's own metrics, the same shape as the teacher's
/// `init_metrics` (`src/metrics/mod.rs`). Call once, at process startup;
/// the returned handle renders the `/metrics` text exposition for
/// whatever HTTP surface the embedder puts in front of it (out of this
/// crate's scope, per spec.md §1's Non-goals).
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::MATCH_ITERATIONS.to_string()),
            &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0],
        )?
        .set_buckets_for_metric(
            Matcher::Full(names::TRADE_AMOUNT.to_string()),
            &[1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0],
        )?
        .install_recorder()
}

pub fn record_order_placed(pair: &str) {
    metrics::counter!(names::ORDERS_PLACED, "pair" => pair.to_string()).increment(1);
}

pub fn record_order_canceled(pair: &str) {
    metrics::counter!(names::ORDERS_CANCELED, "pair" => pair.to_string()).increment(1);
}

pub fn record_order_rejected(pair: &str, reason: &'static str) {
    metrics::counter!(names::ORDERS_REJECTED, "pair" => pair.to_string(), "reason" => reason).increment(1);
}

pub fn record_order_expired(pair: &str) {
    metrics::counter!(names::ORDERS_EXPIRED, "pair" => pair.to_string()).increment(1);
}

pub fn record_trade_executed(pair: &str, trade_amount: u64) {
    metrics::counter!(names::TRADES_EXECUTED, "pair" => pair.to_string()).increment(1);
    metrics::histogram!(names::TRADE_AMOUNT, "pair" => pair.to_string()).record(trade_amount as f64);
}

pub fn record_match_iterations(pair: &str, iterations: usize) {
    metrics::histogram!(names::MATCH_ITERATIONS, "pair" => pair.to_string()).record(iterations as f64);
}

pub fn record_match_loop_overrun(pair: &str) {
    metrics::counter!(names::MATCH_LOOP_OVERRUNS, "pair" => pair.to_string()).increment(1);
}

pub fn record_journal_write(pair: &str) {
    metrics::counter!(names::JOURNAL_WRITES, "pair" => pair.to_string()).increment(1);
}

pub fn record_journal_write_failure(pair: &str) {
    metrics::counter!(names::JOURNAL_WRITE_FAILURES, "pair" => pair.to_string()).increment(1);
}

pub fn record_snapshot_saved(pair: &str) {
    metrics::counter!(names::SNAPSHOTS_SAVED, "pair" => pair.to_string()).increment(1);
}

pub fn record_recovery_replayed(pair: &str, count: usize) {
    metrics::gauge!(names::RECOVERY_EVENTS_REPLAYED, "pair" => pair.to_string()).set(count as f64);
}

pub fn record_mailbox_depth(pair: &str, depth: usize) {
    metrics::gauge!(names::MAILBOX_DEPTH, "pair" => pair.to_string()).set(depth as f64);
}
