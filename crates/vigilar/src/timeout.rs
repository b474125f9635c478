//! Deadline tracking for pending assertions.
//!
//! Instead of per-assertion callbacks the scheduler keeps a side table of
//! absolute deadlines (`start_time + effective timeout`) and the host pumps
//! it with [`TimeoutScheduler::fire_due`]. A deadline fires an assertion as
//! failed with a type-specific reason; settlement through any resolver
//! clears its deadline first, so a timer can never fire for an assertion
//! that already settled.

use std::collections::BTreeMap;

use crate::assertion::{complete, Assertion, AssertionId, AssertionType, CompletedAssertion};
use crate::config::CORRELATION_KEY;

#[derive(Debug, Clone, Copy)]
struct Deadline {
    fire_at: u64,
    timeout: u64,
}

/// Side table of armed assertion deadlines.
#[derive(Debug, Default)]
pub struct TimeoutScheduler {
    deadlines: BTreeMap<AssertionId, Deadline>,
}

impl TimeoutScheduler {
    /// Create an empty scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline for an assertion.
    ///
    /// The deadline is anchored to the assertion's `start_time`, not the
    /// current time, so assertions restored from storage keep their
    /// original budget across a page load.
    pub fn arm(&mut self, assertion: &Assertion, global_timeout: u64) {
        let timeout = assertion.effective_timeout(global_timeout);
        self.deadlines.insert(
            assertion.id(),
            Deadline {
                fire_at: assertion.start_time + timeout,
                timeout,
            },
        );
    }

    /// Clear the deadline for an assertion; clearing an unarmed id is a
    /// no-op
    pub fn clear(&mut self, id: &AssertionId) {
        self.deadlines.remove(id);
    }

    /// Clear every armed deadline
    pub fn clear_all(&mut self) {
        self.deadlines.clear();
    }

    /// Whether a deadline is armed for the given id
    #[must_use]
    pub fn is_armed(&self, id: &AssertionId) -> bool {
        self.deadlines.contains_key(id)
    }

    /// Number of armed deadlines
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no deadlines are armed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Fail every assertion whose deadline has passed.
    ///
    /// Fired deadlines are removed whether or not the completion took (an
    /// assertion settled through another path is skipped).
    pub fn fire_due(
        &mut self,
        now_ms: u64,
        assertions: &mut [Assertion],
    ) -> Vec<CompletedAssertion> {
        let due: Vec<AssertionId> = self
            .deadlines
            .iter()
            .filter(|(_, d)| d.fire_at <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();

        let mut completed = Vec::new();
        for id in due {
            let Some(deadline) = self.deadlines.remove(&id) else {
                continue;
            };
            let Some(assertion) = assertions.iter_mut().find(|a| a.id() == id) else {
                continue;
            };
            if !assertion.is_pending() {
                continue;
            }
            let reason = timeout_reason(assertion, deadline.timeout);
            if let Some(done) = complete(assertion, false, &reason, now_ms) {
                completed.push(done);
            }
        }
        completed
    }
}

fn timeout_reason(assertion: &Assertion, timeout: u64) -> String {
    let value = &assertion.type_value;
    match assertion.kind {
        AssertionType::Added => format!("Expected {value} to be added within {timeout}ms."),
        AssertionType::Removed => format!("Expected {value} to be removed within {timeout}ms."),
        AssertionType::Updated => format!("Expected {value} to be updated within {timeout}ms."),
        AssertionType::Visible => format!("Expected {value} to be visible within {timeout}ms."),
        AssertionType::Hidden => format!("Expected {value} to be hidden within {timeout}ms."),
        AssertionType::Loaded => format!("Expected {value} to be loaded within {timeout}ms."),
        AssertionType::ResponseStatus | AssertionType::ResponseHeaders => format!(
            "HTTP response not received within {timeout}ms. Make sure the server responds \
             with the header \"{CORRELATION_KEY}: {key}\" or the outgoing request has a \
             \"{CORRELATION_KEY}={key}\" parameter.",
            key = assertion.assertion_key,
        ),
        AssertionType::Defer => format!(
            "Expected {value} to be resolved by a conditional element within {timeout}ms."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::test_assertion;
    use crate::config::DEFAULT_TIMEOUT_MS;

    const START: u64 = 1_230_000_000_000;

    #[test]
    fn deadline_fires_exactly_at_start_plus_timeout() {
        let mut scheduler = TimeoutScheduler::new();
        let mut assertions = vec![test_assertion("k", AssertionType::Added, "#panel")];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);

        assert!(scheduler.fire_due(START + 999, &mut assertions).is_empty());
        let fired = scheduler.fire_due(START + 1_000, &mut assertions);
        assert_eq!(fired.len(), 1);
        assert_eq!(
            fired[0].status_reason(),
            "Expected #panel to be added within 1000ms."
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn per_assertion_timeout_overrides_global() {
        let mut scheduler = TimeoutScheduler::new();
        let mut a = test_assertion("k", AssertionType::Visible, ".toast");
        a.timeout = 250;
        let mut assertions = vec![a];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);

        let fired = scheduler.fire_due(START + 250, &mut assertions);
        assert_eq!(
            fired[0].status_reason(),
            "Expected .toast to be visible within 250ms."
        );
    }

    #[test]
    fn cleared_deadline_never_fires() {
        let mut scheduler = TimeoutScheduler::new();
        let mut assertions = vec![test_assertion("k", AssertionType::Added, "#panel")];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);
        scheduler.clear(&assertions[0].id());
        assert!(scheduler.fire_due(START + 10_000, &mut assertions).is_empty());
        // clearing again is harmless
        scheduler.clear(&assertions[0].id());
    }

    #[test]
    fn settled_assertion_is_skipped_when_deadline_fires() {
        let mut scheduler = TimeoutScheduler::new();
        let mut assertions = vec![test_assertion("k", AssertionType::Added, "#panel")];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);
        complete(&mut assertions[0], true, "", START + 10).unwrap();

        assert!(scheduler.fire_due(START + 2_000, &mut assertions).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn rearming_replaces_the_deadline() {
        let mut scheduler = TimeoutScheduler::new();
        let mut assertions = vec![test_assertion("k", AssertionType::Added, "#panel")];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);
        assertions[0].start_time = START + 500;
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);
        assert_eq!(scheduler.len(), 1);

        assert!(scheduler.fire_due(START + 1_000, &mut assertions).is_empty());
        assert_eq!(scheduler.fire_due(START + 1_500, &mut assertions).len(), 1);
    }

    #[test]
    fn http_timeout_names_the_correlation_contract() {
        let mut scheduler = TimeoutScheduler::new();
        let mut assertions = vec![test_assertion(
            "order-created",
            AssertionType::ResponseStatus,
            "200",
        )];
        scheduler.arm(&assertions[0], DEFAULT_TIMEOUT_MS);
        let fired = scheduler.fire_due(START + 1_000, &mut assertions);
        assert_eq!(
            fired[0].status_reason(),
            "HTTP response not received within 1000ms. Make sure the server responds \
             with the header \"fs-resp-for: order-created\" or the outgoing request has a \
             \"fs-resp-for=order-created\" parameter."
        );
    }
}
