//! Structured observability hooks for batch lifecycle events.
//!
//! This module provides:
//! - A case-scoped tracing span via [`case_span`], attached to each case's
//!   future with `tracing::Instrument`
//! - Emission functions for key lifecycle events: batch start, phase change,
//!   case finish, sub-test fault, store save, batch finish
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use tracing::{info, warn, Span};

/// Span tagging every event of one case run with its name and worker.
///
/// # Example
///
/// ```ignore
/// run_case(id).instrument(case_span("T_014splitting_by_size", 3)).await;
/// ```
pub fn case_span(case: &str, worker: usize) -> Span {
    tracing::info_span!("case", case = %case, worker = worker)
}

/// Emit event: batch started with the selection size and pool size.
pub fn emit_batch_started(selected: usize, jobs: usize) {
    info!(event = "batch.started", selected = selected, jobs = jobs);
}

/// Emit event: controller moved to a new phase.
pub fn emit_phase(phase: &str) {
    tracing::debug!(event = "controller.phase", phase = %phase);
}

/// Emit event: case finished with its outcome and wall-clock duration.
pub fn emit_case_finished(case: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "case.finished",
        case = %case,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Emit event: one declarative sub-test faulted (warning level).
pub fn emit_subtest_fault(case: &str, sub_test: &str, error: &dyn std::fmt::Display) {
    warn!(event = "subtest.fault", case = %case, sub_test = %sub_test, error = %error);
}

/// Emit event: results store persisted.
pub fn emit_store_saved(path: &str, records: usize) {
    info!(event = "store.saved", path = %path, records = records);
}

/// Emit event: batch finished with tallies.
pub fn emit_batch_finished(total: usize, passed: usize, failed: usize, new: usize, duration_ms: u64) {
    info!(
        event = "batch.finished",
        total = total,
        passed = passed,
        failed = failed,
        new = new,
        duration_ms = duration_ms,
    );
}
