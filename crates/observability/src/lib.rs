//! Tracing/logging setup shared by binaries and tests.

/// Initialize process-wide observability.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;
