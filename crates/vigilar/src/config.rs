//! Agent configuration and the declaration-surface constants.
//!
//! Validation is fail-fast: a configuration that does not validate prevents
//! the agent from starting at all — there is no partial operation.

use crate::collector::CollectorTarget;
use crate::result::{VigilarError, VigilarResult};

/// Global default assertion timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

/// Prefix of detail attributes (`fs-feature`, `fs-assert`, ...)
pub const DETAIL_PREFIX: &str = "fs-";

/// Prefix of type and modifier attributes (`fs-assert-added`, ...)
pub const ASSERT_PREFIX: &str = "fs-assert-";

/// Attribute naming the trigger of a declaring element
pub const TRIGGER_ATTR: &str = "fs-trigger";

/// Attribute marking a conditional element able to resolve a deferred
/// assertion; its value names the `assertion_key` it can resolve
pub const WHEN_ATTR: &str = "fs-when";

/// Header (or URL/body parameter) whose value correlates an HTTP exchange
/// to a declared assertion key
pub const CORRELATION_KEY: &str = "fs-resp-for";

/// Header carrying the API key on collector POSTs
pub const API_KEY_HEADER: &str = "X-Vigilar-Api-Key";

/// Storage key under which pending MPA-mode assertions persist across
/// page loads
pub const STORAGE_KEY: &str = "vigilar-active-assertions";

/// DOM events the host is expected to forward to the agent
pub const SUPPORTED_EVENTS: &[&str] =
    &["click", "dblclick", "change", "blur", "submit", "load", "error"];

/// Trigger names derived from an event type.
///
/// An `error` event on a resource element is treated as a `load`-family
/// trigger for declaration purposes: the same `fs-trigger="load"` element
/// declares the assertion whichever way the resource settles.
#[must_use]
pub fn trigger_aliases(event_type: &str) -> Vec<String> {
    match event_type {
        "error" => vec!["load".to_string()],
        other => vec![other.to_string()],
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// API key sent with collector POSTs
    pub api_key: String,
    /// Release label attached to every payload
    pub release_label: String,
    /// Global assertion timeout in milliseconds
    pub timeout: u64,
    /// Where settled assertions are reported
    pub collector: CollectorTarget,
    /// Enable verbose diagnostics
    pub debug: bool,
}

impl Configuration {
    /// Create a configuration with defaults for everything but the
    /// collector target
    #[must_use]
    pub fn new(collector: CollectorTarget) -> Self {
        Self {
            api_key: String::new(),
            release_label: String::new(),
            timeout: DEFAULT_TIMEOUT_MS,
            collector,
            debug: false,
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the release label
    #[must_use]
    pub fn with_release_label(mut self, release_label: impl Into<String>) -> Self {
        self.release_label = release_label.into();
        self
    }

    /// Set the global timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// Enable verbose diagnostics
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VigilarError::Config`] naming the first offending field.
    /// The API key is only required for endpoint collectors.
    pub fn validate(&self) -> VigilarResult<()> {
        if self.release_label.is_empty() {
            return Err(VigilarError::Config {
                field: "release_label",
                message: "a non-empty release label is required".to_string(),
            });
        }
        if self.timeout == 0 {
            return Err(VigilarError::Config {
                field: "timeout",
                message: "timeout must be greater than zero".to_string(),
            });
        }
        match &self.collector {
            CollectorTarget::Endpoint(url) => {
                if url.is_empty() {
                    return Err(VigilarError::Config {
                        field: "collector",
                        message: "a non-empty collector URL is required".to_string(),
                    });
                }
                if self.api_key.is_empty() {
                    return Err(VigilarError::Config {
                        field: "api_key",
                        message: "an API key is required for endpoint collectors".to_string(),
                    });
                }
            }
            CollectorTarget::Function(_) => {}
        }
        Ok(())
    }
}
