//! Event resolver: `loaded` settlement from load/error events.

use crate::assertion::{complete, Assertion, AssertionType, CompletedAssertion};
use crate::dom::{Document, Selector};
use crate::signal::DomEvent;

/// Settle pending `loaded` assertions whose selector matches the event
/// target: a `load` event passes, an `error` event fails.
pub fn resolve_event(
    doc: &Document,
    event: &DomEvent,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if assertion.kind != AssertionType::Loaded {
            continue;
        }
        let Ok(selector) = Selector::parse(&assertion.type_value) else {
            continue;
        };
        if !selector.matches(doc, event.target) {
            continue;
        }
        let done = match event.event_type.as_str() {
            "load" => complete(assertion, true, "", now_ms),
            "error" => {
                let src = doc.attr(event.target, "src").unwrap_or_default().to_string();
                let reason = format!(
                    "Expected {} ({src}) to be loaded but onerror was triggered",
                    assertion.type_value
                );
                complete(assertion, false, &reason, now_ms)
            }
            _ => None,
        };
        completed.extend(done);
    }
    completed
}
