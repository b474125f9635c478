//! The assertion record and its settlement predicates.
//!
//! An [`Assertion`] is one declared expectation, identified by
//! `(assertion_key, kind)`. It is either pending (`end_time` and `status`
//! both absent) or settled (both present) — never anything in between.
//! [`complete`] is the single choke point that performs the transition;
//! [`to_settle`] is the dedup gate in front of the collector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a settled assertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionStatus {
    /// The declared outcome occurred
    Passed,
    /// The declared outcome did not occur (mismatch, timeout, or error)
    Failed,
}

/// The declared expectation kind
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionType {
    /// A matching element enters the DOM
    Added,
    /// A matching element leaves the DOM
    Removed,
    /// A matching element (or its subtree) mutates
    Updated,
    /// A matching element renders
    Visible,
    /// A matching element stops rendering
    Hidden,
    /// A matching resource element fires its load event
    Loaded,
    /// A correlated HTTP response carries the expected status code
    ResponseStatus,
    /// A correlated HTTP response carries the expected headers
    ResponseHeaders,
    /// Resolved later by a separately-tagged conditional element
    Defer,
}

impl AssertionType {
    /// All recognized assertion types, in declaration-surface order
    pub const ALL: &'static [Self] = &[
        Self::Added,
        Self::Removed,
        Self::Updated,
        Self::Visible,
        Self::Hidden,
        Self::Loaded,
        Self::ResponseStatus,
        Self::ResponseHeaders,
        Self::Defer,
    ];

    /// Kebab-case name as used in HTML attributes and payloads
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Updated => "updated",
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Loaded => "loaded",
            Self::ResponseStatus => "response-status",
            Self::ResponseHeaders => "response-headers",
            Self::Defer => "defer",
        }
    }

    /// Types resolved against DOM state
    #[must_use]
    pub const fn is_dom(&self) -> bool {
        matches!(
            self,
            Self::Added | Self::Removed | Self::Updated | Self::Visible | Self::Hidden | Self::Loaded
        )
    }

    /// Types resolved against HTTP exchanges
    #[must_use]
    pub const fn is_http(&self) -> bool {
        matches!(self, Self::ResponseStatus | Self::ResponseHeaders)
    }
}

impl std::fmt::Display for AssertionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Modifier names layered on top of a base assertion type.
///
/// Ordering defines the evaluation order of the modifier chain
/// (`text-matches`, then `attrs-match`, then `classlist`; `mpa` and
/// `timeout` carry no check).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Modifier {
    /// Survive a page navigation via persisted storage
    Mpa,
    /// Per-assertion timeout override in milliseconds
    Timeout,
    /// Regex tested against the matched element's text content
    TextMatches,
    /// JSON object of attribute → expected value; all must equal
    AttrsMatch,
    /// JSON object of class → boolean; present iff true
    Classlist,
}

impl Modifier {
    /// All recognized modifiers
    pub const ALL: &'static [Self] = &[
        Self::Mpa,
        Self::Timeout,
        Self::TextMatches,
        Self::AttrsMatch,
        Self::Classlist,
    ];

    /// Kebab-case name as used in HTML attributes and payloads
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mpa => "mpa",
            Self::Timeout => "timeout",
            Self::TextMatches => "text-matches",
            Self::AttrsMatch => "attrs-match",
            Self::Classlist => "classlist",
        }
    }
}

/// Modifier name → raw attribute value
pub type Modifiers = BTreeMap<Modifier, String>;

/// Identity of an assertion within a page-load scope.
///
/// The key pair disambiguates concurrent assertions of different types
/// under the same logical check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssertionId {
    /// The declared assertion key
    pub key: String,
    /// The declared assertion type
    pub kind: AssertionType,
}

/// One declared expectation, pending or settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    /// Feature grouping key
    pub feature_key: String,
    /// Human-readable feature label
    pub feature_label: String,
    /// Assertion identity key
    pub assertion_key: String,
    /// Human-readable assertion label
    pub assertion_label: String,
    /// Serialized HTML of the declaring element, for diagnostics
    pub element_snapshot: String,
    /// Whether the assertion survives a page navigation
    pub mpa_mode: bool,
    /// Originating event/lifecycle name
    pub trigger: String,
    /// Per-assertion timeout override in ms; zero falls back to the
    /// global config
    pub timeout: u64,
    /// Creation or retry-reset timestamp, ms epoch
    pub start_time: u64,
    /// The declared type
    #[serde(rename = "type")]
    pub kind: AssertionType,
    /// Selector or expected value; semantics depend on `kind`
    pub type_value: String,
    /// Settlement timestamp; present iff settled
    pub end_time: Option<u64>,
    /// Settlement outcome; present iff settled
    pub status: Option<AssertionStatus>,
    /// Failure reason; empty on success
    pub status_reason: Option<String>,
    /// Modifier name → raw value
    pub modifiers: Modifiers,
    /// `start_time` before the last retry
    pub previous_start_time: Option<u64>,
    /// `end_time` before the last retry
    pub previous_end_time: Option<u64>,
    /// `status` before the last retry
    pub previous_status: Option<AssertionStatus>,
    /// `status_reason` before the last retry
    pub previous_status_reason: Option<String>,
}

impl Assertion {
    /// Identity within the in-flight collection
    #[must_use]
    pub fn id(&self) -> AssertionId {
        AssertionId {
            key: self.assertion_key.clone(),
            kind: self.kind,
        }
    }

    /// True iff `end_time` and `status` are both absent
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.end_time.is_none() && self.status.is_none()
    }

    /// True iff `end_time` and `status` are both present
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.end_time.is_some() && self.status.is_some()
    }

    /// Modifier value, if declared
    #[must_use]
    pub fn modifier(&self, modifier: Modifier) -> Option<&str> {
        self.modifiers.get(&modifier).map(String::as_str)
    }

    /// Effective timeout given the global default
    #[must_use]
    pub const fn effective_timeout(&self, global_timeout: u64) -> u64 {
        if self.timeout > 0 {
            self.timeout
        } else {
            global_timeout
        }
    }
}

/// A snapshot of an assertion narrowed to the settled state.
///
/// Only constructible through [`complete`], so `status` and `end_time`
/// are always present.
#[derive(Debug, Clone)]
pub struct CompletedAssertion {
    inner: Assertion,
    status: AssertionStatus,
    end_time: u64,
}

impl CompletedAssertion {
    fn new(inner: Assertion, status: AssertionStatus, end_time: u64) -> Self {
        Self {
            inner,
            status,
            end_time,
        }
    }

    /// The underlying assertion snapshot
    #[must_use]
    pub const fn assertion(&self) -> &Assertion {
        &self.inner
    }

    /// Identity within the in-flight collection
    #[must_use]
    pub fn id(&self) -> AssertionId {
        self.inner.id()
    }

    /// Settlement outcome
    #[must_use]
    pub const fn status(&self) -> AssertionStatus {
        self.status
    }

    /// Settlement timestamp
    #[must_use]
    pub const fn end_time(&self) -> u64 {
        self.end_time
    }

    /// Failure reason; empty on success
    #[must_use]
    pub fn status_reason(&self) -> &str {
        self.inner.status_reason.as_deref().unwrap_or("")
    }
}

/// Transition an assertion to settled.
///
/// No-op returning `None` if the assertion is already settled with the
/// identical status — the single gate against duplicate completions from
/// the same resolver pass. A previously-settled assertion may still
/// transition to the *other* status.
pub fn complete(
    assertion: &mut Assertion,
    success: bool,
    failure_reason: &str,
    now_ms: u64,
) -> Option<CompletedAssertion> {
    let new_status = if success {
        AssertionStatus::Passed
    } else {
        AssertionStatus::Failed
    };
    if assertion.status == Some(new_status) {
        return None;
    }
    assertion.status = Some(new_status);
    assertion.end_time = Some(now_ms);
    assertion.status_reason = Some(if success {
        String::new()
    } else {
        failure_reason.to_string()
    });
    Some(CompletedAssertion::new(
        assertion.clone(),
        new_status,
        now_ms,
    ))
}

/// Reopen a settled assertion for a fresh timeout/resolution cycle.
///
/// Fields that may legitimately change between invocations are copied from
/// the fresh declaration; the settled outcome is shifted into the
/// `previous_*` fields so [`to_settle`] can detect "no real change".
pub fn retry(existing: &mut Assertion, fresh: &Assertion, now_ms: u64) {
    existing.modifiers = fresh.modifiers.clone();
    existing.type_value = fresh.type_value.clone();
    existing.element_snapshot = fresh.element_snapshot.clone();

    existing.previous_status = existing.status.take();
    existing.previous_status_reason = existing.status_reason.take();
    existing.previous_start_time = Some(existing.start_time);
    existing.previous_end_time = existing.end_time.take();

    existing.start_time = now_ms;
}

/// Dedup gate before any collector call: keep only completions whose
/// `(status, status_reason)` pair differs from the pre-retry
/// `(previous_status, previous_status_reason)` pair.
#[must_use]
pub fn to_settle(completed: &[CompletedAssertion]) -> Vec<CompletedAssertion> {
    completed
        .iter()
        .filter(|c| {
            let a = c.assertion();
            (a.status, a.status_reason.as_deref())
                != (a.previous_status, a.previous_status_reason.as_deref())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) fn test_assertion(key: &str, kind: AssertionType, type_value: &str) -> Assertion {
    Assertion {
        feature_key: "feature".to_string(),
        feature_label: String::new(),
        assertion_key: key.to_string(),
        assertion_label: String::new(),
        element_snapshot: String::new(),
        mpa_mode: false,
        trigger: "click".to_string(),
        timeout: 0,
        start_time: 1_230_000_000_000,
        kind,
        type_value: type_value.to_string(),
        end_time: None,
        status: None,
        status_reason: None,
        modifiers: Modifiers::new(),
        previous_start_time: None,
        previous_end_time: None,
        previous_status: None,
        previous_status_reason: None,
    }
}
