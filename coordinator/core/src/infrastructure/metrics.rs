// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Node metrics.
//!
//! Counters and gauges for membership churn and the work/report pipeline.
//! Recording is a no-op until a recorder (the Prometheus exporter installed
//! by the CLI) is registered.

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::domain::node::NodeRole;

// ============================================================================
// Metric Names
// ============================================================================

/// Subordinates accepted by a superior.
pub const JOINS_TOTAL: &str = "troops_joins_total";

/// Subordinates evicted for missing their liveness deadline.
pub const EVICTIONS_TOTAL: &str = "troops_evictions_total";

/// Reports sent upward by a relay, or pushed to a sink by the root.
pub const REPORTS_FORWARDED_TOTAL: &str = "troops_reports_forwarded_total";

/// Reports lost because transmission failed or no superior was attached.
pub const REPORTS_DROPPED_TOTAL: &str = "troops_reports_dropped_total";

/// Work items buffered by a relay.
pub const WORK_ACCEPTED_TOTAL: &str = "troops_work_accepted_total";

/// Failed sink pushes on the root.
pub const SINK_FAILURES_TOTAL: &str = "troops_sink_failures_total";

/// Current subordinate count.
pub const SUBORDINATES: &str = "troops_subordinates";

/// Register metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(JOINS_TOTAL, "Total subordinates accepted");
    describe_counter!(EVICTIONS_TOTAL, "Total subordinates evicted by the liveness monitor");
    describe_counter!(REPORTS_FORWARDED_TOTAL, "Total reports forwarded upward or to a sink");
    describe_counter!(REPORTS_DROPPED_TOTAL, "Total reports dropped after a failed transmission");
    describe_counter!(WORK_ACCEPTED_TOTAL, "Total work items buffered for rollup");
    describe_counter!(SINK_FAILURES_TOTAL, "Total failed sink pushes");
    describe_gauge!(SUBORDINATES, "Current number of registered subordinates");
}

pub fn record_join(role: NodeRole, members: usize) {
    counter!(JOINS_TOTAL, "role" => role.to_string()).increment(1);
    gauge!(SUBORDINATES, "role" => role.to_string()).set(members as f64);
}

pub fn record_eviction(role: NodeRole, members: usize) {
    counter!(EVICTIONS_TOTAL, "role" => role.to_string()).increment(1);
    gauge!(SUBORDINATES, "role" => role.to_string()).set(members as f64);
}

pub fn record_report_forwarded(role: NodeRole, purpose: &str) {
    counter!(REPORTS_FORWARDED_TOTAL, "role" => role.to_string(), "purpose" => purpose.to_string())
        .increment(1);
}

pub fn record_report_dropped(role: NodeRole, purpose: &str) {
    counter!(REPORTS_DROPPED_TOTAL, "role" => role.to_string(), "purpose" => purpose.to_string())
        .increment(1);
}

pub fn record_work_accepted(purpose: &str) {
    counter!(WORK_ACCEPTED_TOTAL, "purpose" => purpose.to_string()).increment(1);
}

pub fn record_sink_failure(destination: &str) {
    counter!(SINK_FAILURES_TOTAL, "destination" => destination.to_string()).increment(1);
}
