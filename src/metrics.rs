/// Metrics and telemetry
///
/// Prometheus counters for access decisions, role changes, bulk items and
/// audit writes, exposed in text format at `/metrics`.

use crate::access::Decision;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Permission decisions by operation and outcome
    pub static ref ACCESS_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "access_decisions_total",
        "Total number of permission decisions",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Single role changes by result (committed, denied)
    pub static ref ROLE_CHANGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "role_changes_total",
        "Total number of role change attempts",
        &["result"]
    )
    .unwrap();

    /// Bulk items by action and result
    pub static ref BULK_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "bulk_items_total",
        "Total number of bulk action items processed",
        &["action", "result"]
    )
    .unwrap();

    /// Audit entries persisted, by action; counted after commit
    pub static ref AUDIT_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "audit_entries_total",
        "Total number of audit entries written",
        &["action"]
    )
    .unwrap();
}

/// Count a permission decision
pub fn record_decision(operation: &str, decision: &Decision) {
    let outcome = if decision.is_allowed() { "allow" } else { "deny" };
    ACCESS_DECISIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Count one persisted audit entry
pub fn record_audit_entry(action: &str) {
    AUDIT_ENTRIES_TOTAL.with_label_values(&[action]).inc();
}

/// Render all registered metrics in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
