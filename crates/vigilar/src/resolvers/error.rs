//! Global error resolver.
//!
//! An uncaught exception or unhandled rejection invalidates every in-flight
//! expectation on the page, so the whole pending set fails with the error's
//! message.

use crate::assertion::{complete, Assertion, CompletedAssertion};
use crate::signal::ErrorInfo;

/// Fail every pending assertion with the error message
pub fn resolve_global_error(
    error: &ErrorInfo,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    assertions
        .iter_mut()
        .filter(|a| a.is_pending())
        .filter_map(|a| complete(a, false, &error.message, now_ms))
        .collect()
}
