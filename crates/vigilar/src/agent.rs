//! The host-facing agent surface.
//!
//! The host owns the interception mechanics (event listeners, mutation
//! observation, HTTP middleware, error hooks) and forwards signals through
//! these methods. The agent validates configuration once at construction
//! and fails fast; after that no error path ever surfaces to the host page,
//! every failure degrades to a failed assertion or a log line.

use std::sync::Arc;

use crate::clock::{SystemClock, TimeSource};
use crate::collector::Transport;
use crate::config::{Configuration, TRIGGER_ATTR};
use crate::dom::Document;
use crate::manager::AssertionManager;
use crate::network::{is_response_too_large, should_process};
use crate::result::VigilarResult;
use crate::signal::{DomEvent, ErrorInfo, HttpErrorInfo, MutationRecord, RequestInfo, ResponseInfo};
use crate::storage::{MemoryStorage, Storage};

/// Builder for an [`Agent`] with injectable seams.
pub struct AgentBuilder {
    config: Configuration,
    storage: Box<dyn Storage>,
    transport: Option<Box<dyn Transport>>,
    clock: Arc<dyn TimeSource>,
}

impl AgentBuilder {
    /// Start from a configuration with in-memory storage and the system
    /// clock
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            storage: Box::new(MemoryStorage::new()),
            transport: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Inject the persistence backend for MPA-mode assertions
    #[must_use]
    pub fn with_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    /// Inject the HTTP transport used for endpoint collector delivery
    #[must_use]
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject a time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and build the agent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VigilarError::Config`] if validation fails; the
    /// agent does not start at all.
    pub fn build(self) -> VigilarResult<Agent> {
        self.config.validate()?;
        tracing::debug!(release = %self.config.release_label, "initializing agent");
        Ok(Agent {
            manager: AssertionManager::new(self.config, self.storage, self.transport, self.clock),
        })
    }
}

/// The instrumentation agent.
pub struct Agent {
    manager: AssertionManager,
}

impl Agent {
    /// Initialize with defaults (in-memory storage, system clock).
    ///
    /// # Errors
    ///
    /// Returns [`crate::VigilarError::Config`] if validation fails.
    pub fn init(config: Configuration) -> VigilarResult<Self> {
        AgentBuilder::new(config).build()
    }

    /// Initial document scan: admit declarations on elements already
    /// carrying a `mount` or `load` trigger, then run a one-shot check for
    /// conditions that are already true.
    pub fn start(&mut self, doc: &Document) {
        let lifecycle = vec!["mount".to_string(), "load".to_string()];
        let targets: Vec<_> = doc
            .elements_with_attr(TRIGGER_ATTR)
            .into_iter()
            .filter(|el| {
                doc.attr(*el, TRIGGER_ATTR)
                    .is_some_and(|t| lifecycle.iter().any(|l| l == t))
            })
            .collect();
        self.manager.process_elements(doc, &targets, &lifecycle);
        self.manager.check_assertions(doc);
    }

    /// Forward a DOM event
    pub fn on_event(&mut self, doc: &Document, event: &DomEvent) {
        self.manager.handle_event(doc, event);
    }

    /// Forward a mutation batch
    pub fn on_mutations(&mut self, doc: &Document, records: &[MutationRecord]) {
        self.manager.handle_mutations(doc, records);
    }

    /// Forward a successful HTTP exchange. Exchanges without assertion
    /// markers, and oversized responses, are skipped at the door.
    pub fn on_http_response(&mut self, request: &RequestInfo, response: &ResponseInfo) {
        if !should_process(request, &response.response_headers) {
            return;
        }
        if is_response_too_large(&response.response_headers, &request.url) {
            return;
        }
        self.manager.handle_http_response(request, response);
    }

    /// Forward a failed HTTP exchange. HTTP-status failures get the same
    /// admission check as responses; connection-level failures (status
    /// zero) always go through, the resolver's correlation filter decides.
    pub fn on_http_error(&mut self, error: &HttpErrorInfo) {
        if error.status > 0 {
            let request = RequestInfo {
                url: error.url.clone(),
                params: None,
                headers: error.request_headers.clone(),
            };
            let response_headers = error.response_headers.clone().unwrap_or_default();
            if !should_process(&request, &response_headers) {
                return;
            }
        }
        self.manager.handle_http_error(error);
    }

    /// Forward an uncaught page error or unhandled rejection
    pub fn on_global_error(&mut self, error: &ErrorInfo) {
        self.manager.handle_global_error(error);
    }

    /// Page navigation or refresh: persist MPA state, stop timers
    pub fn on_page_unload(&mut self) {
        self.manager.handle_page_unload();
    }

    /// Pump timers and phase-two checks; the host calls this whenever time
    /// may have passed
    pub fn tick(&mut self, doc: &Document) {
        self.manager.tick(doc);
    }

    /// One-shot scan of current document state
    pub fn check(&mut self, doc: &Document) {
        self.manager.check_assertions(doc);
    }

    /// Drop all in-flight assertions and timers
    pub fn shutdown(&mut self) {
        self.manager.clear_active_assertions();
    }

    /// Register a pending-count observer
    pub fn set_assertion_count_callback(
        &mut self,
        callback: Box<dyn Fn(usize) + Send + Sync>,
    ) {
        self.manager.set_assertion_count_callback(callback);
    }

    /// Number of currently pending assertions
    #[must_use]
    pub fn pending_assertion_count(&self) -> usize {
        self.manager.pending_assertion_count()
    }
}
