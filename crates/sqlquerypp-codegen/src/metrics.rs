//! Process-wide compile counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter of `compile()` calls.
static SQLQUERYPP_COMPILES_TOTAL: AtomicU64 = AtomicU64::new(0);
/// Monotonic counter of failed `compile()` calls.
static SQLQUERYPP_COMPILE_ERRORS_TOTAL: AtomicU64 = AtomicU64::new(0);
/// Monotonic counter of blocks lowered by successful calls.
static SQLQUERYPP_BLOCKS_LOWERED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time snapshot of compile metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileMetricsSnapshot {
    pub compiles_total: u64,
    pub compile_errors_total: u64,
    pub blocks_lowered_total: u64,
}

/// Take a point-in-time snapshot of compile metrics.
#[must_use]
pub fn compile_metrics_snapshot() -> CompileMetricsSnapshot {
    CompileMetricsSnapshot {
        compiles_total: SQLQUERYPP_COMPILES_TOTAL.load(Ordering::Relaxed),
        compile_errors_total: SQLQUERYPP_COMPILE_ERRORS_TOTAL.load(Ordering::Relaxed),
        blocks_lowered_total: SQLQUERYPP_BLOCKS_LOWERED_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset compile metrics.
pub fn reset_compile_metrics() {
    SQLQUERYPP_COMPILES_TOTAL.store(0, Ordering::Relaxed);
    SQLQUERYPP_COMPILE_ERRORS_TOTAL.store(0, Ordering::Relaxed);
    SQLQUERYPP_BLOCKS_LOWERED_TOTAL.store(0, Ordering::Relaxed);
}

pub(crate) fn record_compile() {
    SQLQUERYPP_COMPILES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_error() {
    SQLQUERYPP_COMPILE_ERRORS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_blocks(count: usize) {
    SQLQUERYPP_BLOCKS_LOWERED_TOTAL.fetch_add(count as u64, Ordering::Relaxed);
}
