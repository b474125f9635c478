//! DOM resolver: mutation buckets, document scans, the modifier chain, and
//! deferred ("when") conditional resolution.
//!
//! The element resolver answers "did this mutation batch satisfy a pending
//! DOM assertion"; the document-scan variants answer "is the condition true
//! right now". Both funnel through the same modifier chain: the base
//! visibility check implied by the assertion type, then each declared
//! modifier in order, short-circuiting on the first failure.

use regex::Regex;
use serde_json::Value;

use crate::assertion::{complete, Assertion, AssertionType, CompletedAssertion, Modifier, Modifiers};
use crate::config::WHEN_ATTR;
use crate::declare::parse_metadata;
use crate::dom::{Document, NodeId, Selector};
use crate::signal::MutationBatch;

/// Which link of the modifier chain failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureCode {
    Visible,
    Hidden,
    TextMatches,
    AttrsMatch,
    Classlist,
}

fn failure_reason(code: FailureCode, assertion: &Assertion) -> String {
    let modifier_value = |m: Modifier| assertion.modifier(m).unwrap_or_default();
    match code {
        FailureCode::Visible => format!(
            "Expected {} to be visible (found but hidden).",
            assertion.type_value
        ),
        FailureCode::Hidden => format!(
            "Expected {} to be hidden (found but visible).",
            assertion.type_value
        ),
        FailureCode::TextMatches => format!(
            "Text does not match \"{}\"",
            modifier_value(Modifier::TextMatches)
        ),
        FailureCode::AttrsMatch => format!(
            "Attributes do not match all: \"{}\"",
            modifier_value(Modifier::AttrsMatch)
        ),
        FailureCode::Classlist => format!(
            "Expected classlist does not match: \"{}\"",
            modifier_value(Modifier::Classlist)
        ),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Base visibility check plus declared modifiers, in order, stopping at the
/// first failure. Malformed modifier values (bad regex, bad JSON) fail the
/// check they belong to rather than affecting the others.
fn run_chain(
    doc: &Document,
    element: NodeId,
    kind: AssertionType,
    modifiers: &Modifiers,
) -> Option<FailureCode> {
    match kind {
        AssertionType::Visible if !doc.is_visible(element) => return Some(FailureCode::Visible),
        AssertionType::Hidden if doc.is_visible(element) => return Some(FailureCode::Hidden),
        _ => {}
    }

    for (modifier, value) in modifiers {
        let passed = match modifier {
            Modifier::Mpa | Modifier::Timeout => continue,
            Modifier::TextMatches => {
                let text = doc.text_content(element);
                !text.is_empty() && Regex::new(value).is_ok_and(|re| re.is_match(&text))
            }
            Modifier::AttrsMatch => serde_json::from_str::<Value>(value)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .is_some_and(|attrs| {
                    attrs.iter().all(|(name, expected)| match expected {
                        Value::String(s) => doc.attr(element, name) == Some(s.as_str()),
                        _ => false,
                    })
                }),
            Modifier::Classlist => serde_json::from_str::<Value>(value)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .is_some_and(|classes| {
                    classes
                        .iter()
                        .all(|(class, expected)| doc.has_class(element, class) == truthy(expected))
                }),
        };
        if !passed {
            return Some(match modifier {
                Modifier::TextMatches => FailureCode::TextMatches,
                Modifier::AttrsMatch => FailureCode::AttrsMatch,
                _ => FailureCode::Classlist,
            });
        }
    }
    None
}

fn parse_selector(assertion: &Assertion) -> Option<Selector> {
    match Selector::parse(&assertion.type_value) {
        Ok(selector) => Some(selector),
        Err(err) => {
            tracing::warn!(
                assertion = %assertion.assertion_key,
                "unusable selector: {err}"
            );
            None
        }
    }
}

/// Settle one matched element through the chain
fn complete_against(
    doc: &Document,
    element: NodeId,
    assertion: &mut Assertion,
    now_ms: u64,
) -> Option<CompletedAssertion> {
    match run_chain(doc, element, assertion.kind, &assertion.modifiers.clone()) {
        None => complete(assertion, true, "", now_ms),
        Some(code) => {
            let reason = failure_reason(code, assertion);
            complete(assertion, false, &reason, now_ms)
        }
    }
}

/// Resolve pending DOM assertions against a mutation batch.
///
/// Bucket selection follows the assertion type: `added` scans entered
/// elements, `removed` scans detached ones, `updated` scans mutation
/// targets, and `visible`/`hidden` scan both entered elements and targets.
/// `updated` also matches descendants of the selector's current document
/// match, so a child mutation satisfies a parent-selector assertion.
/// Deferred assertions scan entered elements and targets for conditional
/// elements naming their key.
pub fn resolve_elements(
    doc: &Document,
    batch: &MutationBatch,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if assertion.kind == AssertionType::Defer {
            let candidates: Vec<NodeId> = batch
                .added
                .iter()
                .chain(batch.updated.iter())
                .copied()
                .collect();
            if let Some(done) = resolve_defer(doc, &candidates, assertion, now_ms) {
                completed.push(done);
            }
            continue;
        }
        if !assertion.kind.is_dom() {
            continue;
        }

        let bucket: Vec<NodeId> = match assertion.kind {
            AssertionType::Added => batch.added.clone(),
            AssertionType::Removed => batch.removed.clone(),
            AssertionType::Updated => batch.updated.clone(),
            AssertionType::Visible | AssertionType::Hidden => batch
                .added
                .iter()
                .chain(batch.updated.iter())
                .copied()
                .collect(),
            // load settlement comes from the event and property resolvers
            _ => Vec::new(),
        };
        let Some(selector) = parse_selector(assertion) else {
            continue;
        };

        // the updated matcher widens to descendants of the current
        // document match for the selector
        let subtree_root = if assertion.kind == AssertionType::Updated {
            doc.query(&selector)
        } else {
            None
        };
        let matched = bucket.into_iter().find(|el| {
            selector.matches(doc, *el)
                || subtree_root.is_some_and(|root| doc.contains(root, *el))
        });

        if let Some(element) = matched {
            if let Some(done) = complete_against(doc, element, assertion, now_ms) {
                completed.push(done);
            }
        }
    }
    completed
}

/// Pass-only document scan for one assertion, run right after enqueueing to
/// catch conditions already true before any further mutation. Failures are
/// ignored: this check can only settle early, never force a fail.
pub fn immediate_check(
    doc: &Document,
    assertion: &mut Assertion,
    now_ms: u64,
) -> Option<CompletedAssertion> {
    if !assertion.is_pending() || !assertion.kind.is_dom() {
        return None;
    }
    let selector = parse_selector(assertion)?;
    match (assertion.kind, doc.query(&selector)) {
        (AssertionType::Removed, None) => complete(assertion, true, "", now_ms),
        (AssertionType::Removed, Some(_)) | (_, None) => None,
        (_, Some(element)) => {
            match run_chain(doc, element, assertion.kind, &assertion.modifiers.clone()) {
                None => complete(assertion, true, "", now_ms),
                Some(_) => None,
            }
        }
    }
}

/// One-shot document scan that settles both ways. Used for assertions
/// restored from storage, whose trigger fired on the previous page;
/// `mpa_only` restricts the scan to those.
pub fn resolve_document(
    doc: &Document,
    assertions: &mut [Assertion],
    mpa_only: bool,
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let mut completed = Vec::new();
    for assertion in assertions
        .iter_mut()
        .filter(|a| a.is_pending() && (!mpa_only || a.mpa_mode))
    {
        if !assertion.kind.is_dom() {
            continue;
        }
        let Some(selector) = parse_selector(assertion) else {
            continue;
        };
        let done = match (assertion.kind, doc.query(&selector)) {
            (AssertionType::Removed, None) => complete(assertion, true, "", now_ms),
            (AssertionType::Removed, Some(_)) | (_, None) => None,
            (_, Some(element)) => complete_against(doc, element, assertion, now_ms),
        };
        completed.extend(done);
    }
    completed
}

/// Document-wide deferred resolution: scan every conditional element for
/// each pending `defer` assertion
pub fn resolve_defer_in_document(
    doc: &Document,
    assertions: &mut [Assertion],
    now_ms: u64,
) -> Vec<CompletedAssertion> {
    let candidates = doc.elements_with_attr(WHEN_ATTR);
    let mut completed = Vec::new();
    for assertion in assertions.iter_mut().filter(|a| a.is_pending()) {
        if assertion.kind != AssertionType::Defer {
            continue;
        }
        completed.extend(resolve_defer(doc, &candidates, assertion, now_ms));
    }
    completed
}

/// Try each conditional element naming the deferred assertion's key, in the
/// order given; the first one whose embedded assertion passes wins. A
/// non-passing conditional leaves the assertion pending for its timeout.
fn resolve_defer(
    doc: &Document,
    candidates: &[NodeId],
    assertion: &mut Assertion,
    now_ms: u64,
) -> Option<CompletedAssertion> {
    for &element in candidates {
        if doc.attr(element, WHEN_ATTR) != Some(assertion.assertion_key.as_str()) {
            continue;
        }
        if let Some((kind, value)) = evaluate_conditional(doc, element) {
            // rewrite the audited value to the condition that resolved it
            assertion.type_value = format!("{kind}:{value}");
            return complete(assertion, true, "", now_ms);
        }
    }
    None
}

/// Evaluate a conditional element's own embedded assertion in isolation,
/// returning the `(type, value)` that passed
fn evaluate_conditional(doc: &Document, element: NodeId) -> Option<(AssertionType, String)> {
    let metadata = parse_metadata(doc, element);
    for (kind, value) in &metadata.types {
        if !kind.is_dom() {
            continue;
        }
        let Ok(selector) = Selector::parse(value) else {
            continue;
        };
        let passed = match (kind, doc.query(&selector)) {
            (AssertionType::Removed, None) => true,
            (AssertionType::Removed, Some(_)) | (_, None) => false,
            (_, Some(target)) => run_chain(doc, target, *kind, &metadata.modifiers).is_none(),
        };
        if passed {
            return Some((*kind, value.clone()));
        }
    }
    None
}
