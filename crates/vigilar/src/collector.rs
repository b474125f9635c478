//! Collector transport: payload mapping and delivery.
//!
//! Settlement and delivery are decoupled: an assertion is already settled
//! before delivery is attempted, so delivery failures are logged and never
//! retried, and they never affect assertion state.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use crate::assertion::{AssertionStatus, AssertionType, CompletedAssertion, Modifier};
use crate::config::Configuration;
use crate::result::VigilarResult;

/// User-supplied collector callback
pub type CollectorFn = Arc<dyn Fn(&ReportPayload) + Send + Sync>;

/// Where settled assertions are reported.
#[derive(Clone)]
pub enum CollectorTarget {
    /// POST each payload as JSON to this URL with an API-key header
    Endpoint(String),
    /// Invoke a user-supplied callback for each payload
    Function(CollectorFn),
}

impl std::fmt::Debug for CollectorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Endpoint(url) => f.debug_tuple("Endpoint").field(url).finish(),
            Self::Function(_) => f.debug_tuple("Function").field(&"<callback>").finish(),
        }
    }
}

/// Injected HTTP seam for endpoint delivery.
///
/// The core never owns an HTTP client; the host supplies whatever transport
/// fits its runtime.
pub trait Transport: Send + Sync {
    /// POST a JSON body to the collector endpoint.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and never retried.
    fn post(&self, url: &str, api_key: &str, body: &str) -> VigilarResult<()>;
}

/// The wire payload for one settled assertion.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    /// Assertion identity key
    pub assertion_key: String,
    /// Human-readable assertion label
    pub assertion_label: String,
    /// Originating trigger name
    pub assertion_trigger: String,
    /// Selector or expected value
    pub assertion_type_value: String,
    /// The declared type
    pub assertion_type: AssertionType,
    /// Declared modifiers
    pub assertion_type_modifiers: BTreeMap<Modifier, String>,
    /// Serialized HTML of the declaring element
    pub element_snapshot: String,
    /// Feature grouping key
    pub feature_key: String,
    /// Human-readable feature label
    pub feature_label: String,
    /// Release label from the configuration
    pub release_label: String,
    /// Failure reason; empty on success
    pub status_reason: String,
    /// Settlement outcome
    pub status: AssertionStatus,
    /// ISO-8601 rendering of the assertion's start time
    pub timestamp: String,
}

/// Map a settled assertion to its wire payload
#[must_use]
pub fn to_payload(completed: &CompletedAssertion, config: &Configuration) -> ReportPayload {
    let assertion = completed.assertion();
    ReportPayload {
        assertion_key: assertion.assertion_key.clone(),
        assertion_label: assertion.assertion_label.clone(),
        assertion_trigger: assertion.trigger.clone(),
        assertion_type_value: assertion.type_value.clone(),
        assertion_type: assertion.kind,
        assertion_type_modifiers: assertion.modifiers.clone(),
        element_snapshot: assertion.element_snapshot.clone(),
        feature_key: assertion.feature_key.clone(),
        feature_label: assertion.feature_label.clone(),
        release_label: config.release_label.clone(),
        status_reason: completed.status_reason().to_string(),
        status: completed.status(),
        timestamp: iso_timestamp(assertion.start_time),
    }
}

fn iso_timestamp(epoch_ms: u64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Deliver newly-settled assertions to the configured collector.
///
/// Missing configuration and transport failures are logged; assertion
/// state is unaffected either way.
pub fn deliver(
    assertions: &[CompletedAssertion],
    config: &Configuration,
    transport: Option<&dyn Transport>,
) {
    match &config.collector {
        CollectorTarget::Function(callback) => {
            if config.release_label.is_empty() {
                tracing::error!("missing release_label configuration for custom collector");
                return;
            }
            for completed in assertions {
                callback(&to_payload(completed, config));
            }
        }
        CollectorTarget::Endpoint(url) => {
            if url.is_empty() || config.api_key.is_empty() || config.release_label.is_empty() {
                tracing::error!("missing configuration for sending assertions to the collector");
                return;
            }
            let Some(transport) = transport else {
                tracing::error!("no transport injected for endpoint collector {url}");
                return;
            };
            for completed in assertions {
                let payload = to_payload(completed, config);
                let body = match serde_json::to_string(&payload) {
                    Ok(body) => body,
                    Err(err) => {
                        tracing::error!("failed to encode collector payload: {err}");
                        continue;
                    }
                };
                if let Err(err) = transport.post(url, &config.api_key, &body) {
                    tracing::error!("collector delivery failed: {err}");
                }
            }
        }
    }
}

/// A collector callback that logs each payload through `tracing`, for
/// development and debugging.
#[must_use]
pub fn console_collector() -> CollectorFn {
    Arc::new(|payload: &ReportPayload| {
        tracing::info!(
            status = ?payload.status,
            trigger = %payload.assertion_trigger,
            kind = %payload.assertion_type,
            type_value = %payload.assertion_type_value,
            feature = %payload.feature_key,
            assertion = %payload.assertion_key,
            timestamp = %payload.timestamp,
            release = %payload.release_label,
            reason = %payload.status_reason,
            "assertion settled"
        );
    })
}
