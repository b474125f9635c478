//! Declaration parsing: HTML attributes → assertion records.
//!
//! A declaring element carries `fs-trigger` plus detail attributes
//! (`fs-feature`, `fs-assert`, ...) and one `fs-assert-<type>` attribute per
//! declared type, so one element fans out into one [`Assertion`] per type.
//! Parsing keeps raw attribute strings; casting is deferred to the point of
//! use, so a malformed modifier value fails its own check instead of
//! poisoning the whole declaration.

use std::collections::BTreeMap;

use crate::assertion::{Assertion, AssertionType, Modifier, Modifiers};
use crate::config::{ASSERT_PREFIX, DETAIL_PREFIX, TRIGGER_ATTR};
use crate::dom::{Document, NodeId};

/// Detail attribute names, without the `fs-` prefix
const DETAIL_KEYS: &[&str] = &["feature", "feature-label", "assert", "assert-label", "trigger"];

/// Raw assertion metadata scraped from one element.
#[derive(Debug, Clone, Default)]
pub struct ElementMetadata {
    /// Detail name → raw value (`feature`, `assert`, `trigger`, ...)
    pub details: BTreeMap<String, String>,
    /// Declared type → raw value
    pub types: BTreeMap<AssertionType, String>,
    /// Declared modifier → raw value
    pub modifiers: Modifiers,
}

/// Whether the element declares one of the given triggers
#[must_use]
pub fn is_processable(doc: &Document, element: NodeId, triggers: &[String]) -> bool {
    doc.attr(element, TRIGGER_ATTR)
        .is_some_and(|value| triggers.iter().any(|t| t == value))
}

/// Scrape the raw assertion metadata from one element
#[must_use]
pub fn parse_metadata(doc: &Document, element: NodeId) -> ElementMetadata {
    let mut metadata = ElementMetadata::default();
    for key in DETAIL_KEYS {
        if let Some(value) = doc.attr(element, &format!("{DETAIL_PREFIX}{key}")) {
            metadata.details.insert((*key).to_string(), value.to_string());
        }
    }
    for kind in AssertionType::ALL {
        if let Some(value) = doc.attr(element, &format!("{ASSERT_PREFIX}{kind}")) {
            metadata.types.insert(*kind, value.to_string());
        }
    }
    for modifier in Modifier::ALL {
        if let Some(value) = doc.attr(element, &format!("{ASSERT_PREFIX}{}", modifier.as_str())) {
            metadata.modifiers.insert(*modifier, value.to_string());
        }
    }
    metadata
}

/// Extract assertions from target elements.
///
/// In event mode only the exact target element is considered; otherwise each
/// target's subtree is scanned for further elements carrying [`TRIGGER_ATTR`].
/// Elements whose trigger is not in `triggers` are skipped either way.
#[must_use]
pub fn process_elements(
    doc: &Document,
    targets: &[NodeId],
    triggers: &[String],
    event_mode: bool,
    now_ms: u64,
) -> Vec<Assertion> {
    let mut assertions = Vec::new();
    for &target in targets {
        let mut elements = Vec::new();
        if is_processable(doc, target, triggers) {
            elements.push(target);
        } else if !event_mode {
            elements.extend(
                doc.descendants(target)
                    .into_iter()
                    .filter(|el| is_processable(doc, *el, triggers)),
            );
        }
        for element in elements {
            let metadata = parse_metadata(doc, element);
            assertions.extend(create_assertions(doc, element, &metadata, now_ms));
        }
    }
    assertions
}

fn is_valid_metadata(metadata: &ElementMetadata, snapshot: &str) -> bool {
    if !metadata.details.get("feature").is_some_and(|v| !v.is_empty()) {
        tracing::error!(element = %snapshot, "missing 'fs-feature' on assertion");
        return false;
    }
    if !metadata.details.get("assert").is_some_and(|v| !v.is_empty()) {
        tracing::error!(element = %snapshot, "missing 'fs-assert' on assertion");
        return false;
    }
    if metadata.types.is_empty() {
        tracing::error!(element = %snapshot, "an assertion type must be provided");
        return false;
    }
    if let Some(raw) = metadata.types.get(&AssertionType::ResponseHeaders) {
        if !serde_json::from_str::<serde_json::Value>(raw).is_ok_and(|v| v.is_object()) {
            tracing::error!(
                element = %snapshot,
                "'response-headers' must be a valid JSON object"
            );
            return false;
        }
    }
    true
}

/// Create one assertion per declared type; an invalid declaration produces
/// none at all
#[must_use]
pub fn create_assertions(
    doc: &Document,
    element: NodeId,
    metadata: &ElementMetadata,
    now_ms: u64,
) -> Vec<Assertion> {
    let snapshot = doc.outer_html(element);
    if !is_valid_metadata(metadata, &snapshot) {
        return Vec::new();
    }

    let detail = |key: &str| metadata.details.get(key).cloned().unwrap_or_default();
    let assertion_key = detail("assert");
    let mpa_mode = metadata
        .modifiers
        .get(&Modifier::Mpa)
        .is_some_and(|v| !v.is_empty());
    let timeout = metadata
        .modifiers
        .get(&Modifier::Timeout)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    metadata
        .types
        .iter()
        .map(|(kind, raw_value)| {
            // a bare `fs-assert-defer` waits on its own assertion key
            let type_value = if *kind == AssertionType::Defer && raw_value.is_empty() {
                assertion_key.clone()
            } else {
                raw_value.clone()
            };
            Assertion {
                feature_key: detail("feature"),
                feature_label: detail("feature-label"),
                assertion_key: assertion_key.clone(),
                assertion_label: detail("assert-label"),
                element_snapshot: snapshot.clone(),
                mpa_mode,
                trigger: detail("trigger"),
                timeout,
                start_time: now_ms,
                kind: *kind,
                type_value,
                end_time: None,
                status: None,
                status_reason: None,
                modifiers: metadata.modifiers.clone(),
                previous_start_time: None,
                previous_end_time: None,
                previous_status: None,
                previous_status_reason: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_230_000_000_000;

    fn clicks() -> Vec<String> {
        vec!["click".to_string()]
    }

    fn declaring_button(doc: &mut Document) -> NodeId {
        doc.build("button")
            .attr("fs-trigger", "click")
            .attr("fs-feature", "checkout")
            .attr("fs-assert", "panel-opens")
            .attr("fs-assert-added", "#panel")
            .append_to_root()
    }

    #[test]
    fn declaring_element_produces_one_assertion_per_type() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-assert-visible", "#panel .title");

        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        assert_eq!(assertions.len(), 2);
        let kinds: Vec<AssertionType> = assertions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AssertionType::Added, AssertionType::Visible]);
        for a in &assertions {
            assert_eq!(a.assertion_key, "panel-opens");
            assert_eq!(a.feature_key, "checkout");
            assert_eq!(a.trigger, "click");
            assert_eq!(a.start_time, NOW);
            assert!(a.is_pending());
        }
    }

    #[test]
    fn event_mode_ignores_descendants() {
        let mut doc = Document::new();
        let wrapper = doc.build("div").append_to_root();
        let inner = doc.build("button").append_to(wrapper);
        doc.set_attr(inner, "fs-trigger", "click");
        doc.set_attr(inner, "fs-feature", "f");
        doc.set_attr(inner, "fs-assert", "a");
        doc.set_attr(inner, "fs-assert-added", "#x");

        assert!(process_elements(&doc, &[wrapper], &clicks(), true, NOW).is_empty());
        assert_eq!(
            process_elements(&doc, &[wrapper], &clicks(), false, NOW).len(),
            1
        );
    }

    #[test]
    fn trigger_must_match_exactly() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-trigger", "submit");
        assert!(process_elements(&doc, &[button], &clicks(), true, NOW).is_empty());
    }

    #[test]
    fn missing_feature_or_assert_drops_declaration() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.remove_attr(button, "fs-feature");
        assert!(process_elements(&doc, &[button], &clicks(), true, NOW).is_empty());

        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.remove_attr(button, "fs-assert");
        assert!(process_elements(&doc, &[button], &clicks(), true, NOW).is_empty());
    }

    #[test]
    fn response_headers_must_be_a_json_object() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-assert-response-headers", "[1, 2]");
        // the invalid declaration drops every type from the element
        assert!(process_elements(&doc, &[button], &clicks(), true, NOW).is_empty());

        doc.set_attr(
            button,
            "fs-assert-response-headers",
            r#"{"content-type": "application/json"}"#,
        );
        assert_eq!(
            process_elements(&doc, &[button], &clicks(), true, NOW).len(),
            2
        );
    }

    #[test]
    fn modifiers_are_parsed_lazily() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-assert-timeout", "250");
        doc.set_attr(button, "fs-assert-mpa", "true");
        doc.set_attr(button, "fs-assert-text-matches", "Welcome \\w+");

        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        let a = &assertions[0];
        assert_eq!(a.timeout, 250);
        assert!(a.mpa_mode);
        assert_eq!(a.modifier(Modifier::TextMatches), Some("Welcome \\w+"));
    }

    #[test]
    fn unparsable_timeout_falls_back_to_zero() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-assert-timeout", "soon");
        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        assert_eq!(assertions[0].timeout, 0);
    }

    #[test]
    fn empty_mpa_attribute_stays_single_page() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        doc.set_attr(button, "fs-assert-mpa", "");
        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        assert!(!assertions[0].mpa_mode);
    }

    #[test]
    fn bare_defer_defaults_type_value_to_assertion_key() {
        let mut doc = Document::new();
        let button = doc
            .build("button")
            .attr("fs-trigger", "click")
            .attr("fs-feature", "login")
            .attr("fs-assert", "login-result")
            .attr("fs-assert-defer", "")
            .append_to_root();
        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        assert_eq!(assertions.len(), 1);
        assert_eq!(assertions[0].kind, AssertionType::Defer);
        assert_eq!(assertions[0].type_value, "login-result");
    }

    #[test]
    fn snapshot_captures_declaring_element() {
        let mut doc = Document::new();
        let button = declaring_button(&mut doc);
        let assertions = process_elements(&doc, &[button], &clicks(), true, NOW);
        assert!(assertions[0].element_snapshot.starts_with("<button"));
        assert!(assertions[0].element_snapshot.contains("fs-assert=\"panel-opens\""));
    }
}
