//! The assertion manager: admission, signal routing, and the settle funnel.
//!
//! The manager owns the in-flight assertion set and is the only place that
//! reports to the collector. Every signal handler follows the same shape:
//! admit any newly-declared assertions, run the matching resolver against
//! the pending set, settle, then drain the deferred-check queue. Deferred
//! checks are the second phase of signal processing — conditions that may
//! have become true as a side effect of the signal (visibility state,
//! pre-existing conditional elements) are re-checked after the synchronous
//! phase completes, and can only settle early, never force a fail.

use std::sync::Arc;

use crate::assertion::{
    retry, to_settle, Assertion, AssertionId, AssertionType, CompletedAssertion,
};
use crate::clock::TimeSource;
use crate::collector::{deliver, Transport};
use crate::config::{trigger_aliases, Configuration};
use crate::declare::process_elements;
use crate::dom::Document;
use crate::resolvers::dom::{
    immediate_check, resolve_defer_in_document, resolve_document, resolve_elements,
};
use crate::resolvers::error::resolve_global_error;
use crate::resolvers::event::resolve_event;
use crate::resolvers::http::{resolve_error, resolve_response};
use crate::resolvers::property::resolve_properties;
use crate::signal::{DomEvent, ErrorInfo, HttpErrorInfo, MutationBatch, MutationRecord, RequestInfo, ResponseInfo};
use crate::storage::{load_assertions, store_assertions, Storage};
use crate::timeout::TimeoutScheduler;

type CountCallback = Box<dyn Fn(usize) + Send + Sync>;

/// Owns the in-flight assertion set and routes signals to resolvers.
pub struct AssertionManager {
    config: Configuration,
    clock: Arc<dyn TimeSource>,
    storage: Box<dyn Storage>,
    transport: Option<Box<dyn Transport>>,
    assertions: Vec<Assertion>,
    scheduler: TimeoutScheduler,
    deferred_checks: Vec<AssertionId>,
    count_callback: Option<CountCallback>,
}

impl AssertionManager {
    /// Create a manager, adopting any assertions persisted by a previous
    /// page load. Restored assertions keep their original `start_time`, so
    /// their timeout budget spans the navigation.
    pub fn new(
        config: Configuration,
        storage: Box<dyn Storage>,
        transport: Option<Box<dyn Transport>>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let assertions = load_assertions(storage.as_ref());
        let mut scheduler = TimeoutScheduler::new();
        for assertion in &assertions {
            scheduler.arm(assertion, config.timeout);
        }
        Self {
            config,
            clock,
            storage,
            transport,
            assertions,
            scheduler,
            deferred_checks: Vec::new(),
            count_callback: None,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Admit newly-declared assertions.
    ///
    /// MPA-mode assertions skip the in-flight set and go straight to
    /// storage for the next page load. Others are matched against the
    /// existing set by `(assertionKey, type)`: a settled duplicate is
    /// reopened for a fresh cycle, a pending duplicate is dropped, anything
    /// else joins the set with an armed deadline. Every admitted or
    /// reopened assertion is queued for a deferred already-true check.
    fn enqueue(&mut self, new_assertions: Vec<Assertion>) {
        let (mpa, rest): (Vec<Assertion>, Vec<Assertion>) =
            new_assertions.into_iter().partition(|a| a.mpa_mode);
        store_assertions(self.storage.as_ref(), &mpa);

        let now = self.now();
        for fresh in rest {
            let id = fresh.id();
            match self.assertions.iter().position(|a| a.id() == id) {
                Some(idx) if self.assertions[idx].is_completed() => {
                    retry(&mut self.assertions[idx], &fresh, now);
                    self.scheduler.arm(&self.assertions[idx], self.config.timeout);
                    self.deferred_checks.push(id);
                }
                Some(_) => {}
                None => {
                    self.scheduler.arm(&fresh, self.config.timeout);
                    self.assertions.push(fresh);
                    self.deferred_checks.push(id);
                }
            }
        }
        self.notify_count();
    }

    /// Handle a forwarded DOM event: admit declarations on the exact event
    /// target, then settle `loaded` assertions.
    pub fn handle_event(&mut self, doc: &Document, event: &DomEvent) {
        let now = self.now();
        let triggers = trigger_aliases(&event.event_type);
        let created = process_elements(doc, &[event.target], &triggers, true, now);
        self.enqueue(created);

        let completed = resolve_event(doc, event, &mut self.assertions, now);
        self.settle(completed);
        self.drain_deferred(doc);
    }

    /// Handle a mutation batch: admit `mount`-triggered declarations on
    /// entered elements, then resolve DOM assertions against the buckets.
    pub fn handle_mutations(&mut self, doc: &Document, records: &[MutationRecord]) {
        let now = self.now();
        let batch = MutationBatch::partition(records);
        let created = process_elements(
            doc,
            &batch.added,
            &["mount".to_string()],
            false,
            now,
        );
        let declared_loaded = created.iter().any(|a| a.kind == AssertionType::Loaded);
        self.enqueue(created);

        // an element declared on mount may already be loaded
        if declared_loaded {
            self.check_assertions(doc);
        }

        let completed = resolve_elements(doc, &batch, &mut self.assertions, now);
        self.settle(completed);
        self.drain_deferred(doc);
    }

    /// Handle a successful HTTP exchange
    pub fn handle_http_response(&mut self, request: &RequestInfo, response: &ResponseInfo) {
        let now = self.now();
        let completed = resolve_response(request, response, &mut self.assertions, now);
        self.settle(completed);
    }

    /// Handle a failed HTTP exchange
    pub fn handle_http_error(&mut self, error: &HttpErrorInfo) {
        let now = self.now();
        let completed = resolve_error(error, &mut self.assertions, now);
        self.settle(completed);
    }

    /// Handle an uncaught page error: fails the whole pending set
    pub fn handle_global_error(&mut self, error: &ErrorInfo) {
        let now = self.now();
        let completed = resolve_global_error(error, &mut self.assertions, now);
        self.settle(completed);
    }

    /// One-shot scan of current document state: restored MPA assertions,
    /// already-loaded media, and pre-existing conditional elements.
    pub fn check_assertions(&mut self, doc: &Document) {
        if self.pending_assertion_count() == 0 {
            return;
        }
        let now = self.now();
        let completed = resolve_document(doc, &mut self.assertions, true, now);
        self.settle(completed);
        let completed = resolve_properties(doc, &mut self.assertions, now);
        self.settle(completed);
        let completed = resolve_defer_in_document(doc, &mut self.assertions, now);
        self.settle(completed);
    }

    /// Admit declarations from the given elements (descendant search
    /// included) for the given triggers. Used for the initial scan of
    /// `mount`/`load` elements already in the document.
    pub fn process_elements(&mut self, doc: &Document, targets: &[crate::dom::NodeId], triggers: &[String]) {
        let now = self.now();
        let created = process_elements(doc, targets, triggers, false, now);
        let declared_loaded = created.iter().any(|a| a.kind == AssertionType::Loaded);
        self.enqueue(created);
        if declared_loaded {
            self.check_assertions(doc);
        }
        self.drain_deferred(doc);
    }

    /// Fire due deadlines, re-checking queued conditions first: a condition
    /// that is already true must never lose to its own deadline.
    pub fn tick(&mut self, doc: &Document) {
        self.drain_deferred(doc);
        let now = self.now();
        let completed = self.scheduler.fire_due(now, &mut self.assertions);
        self.settle(completed);
    }

    /// Persist pending MPA-mode assertions for the next page load
    pub fn save_active_assertions(&mut self) {
        let to_store: Vec<Assertion> = self
            .assertions
            .iter()
            .filter(|a| a.is_pending() && a.mpa_mode)
            .cloned()
            .collect();
        store_assertions(self.storage.as_ref(), &to_store);
    }

    /// Page navigation or refresh: stop every timer and persist MPA state
    pub fn handle_page_unload(&mut self) {
        self.scheduler.clear_all();
        self.save_active_assertions();
    }

    /// Drop the whole in-flight set and its timers
    pub fn clear_active_assertions(&mut self) {
        self.scheduler.clear_all();
        self.assertions.clear();
        self.deferred_checks.clear();
        self.notify_count();
    }

    /// Register a callback invoked with the pending count after every
    /// admission or settlement
    pub fn set_assertion_count_callback(&mut self, callback: CountCallback) {
        self.count_callback = Some(callback);
    }

    /// Number of currently pending assertions
    #[must_use]
    pub fn pending_assertion_count(&self) -> usize {
        self.assertions.iter().filter(|a| a.is_pending()).count()
    }

    /// Phase two of signal processing: re-check queued assertions against
    /// current document state. Pass-only.
    fn drain_deferred(&mut self, doc: &Document) {
        if self.deferred_checks.is_empty() {
            return;
        }
        let queued: Vec<AssertionId> = self.deferred_checks.drain(..).collect();
        let now = self.now();
        let mut completed = Vec::new();
        for id in queued {
            let Some(assertion) = self.assertions.iter_mut().find(|a| a.id() == id) else {
                continue;
            };
            if !assertion.is_pending() {
                continue;
            }
            match assertion.kind {
                // visibility can flip without a further mutation signal
                AssertionType::Visible | AssertionType::Hidden => {
                    completed.extend(immediate_check(doc, assertion, now));
                }
                // a conditional element may already satisfy a fresh defer
                AssertionType::Defer => {
                    completed.extend(resolve_defer_in_document(
                        doc,
                        std::slice::from_mut(assertion),
                        now,
                    ));
                }
                _ => {}
            }
        }
        self.settle(completed);
    }

    /// The single reporting funnel. Timers are cleared for the whole batch
    /// (an assertion settled by any resolver must never time out later);
    /// the dedup gate then drops completions whose outcome is unchanged
    /// since the pre-retry settlement.
    fn settle(&mut self, completed: Vec<CompletedAssertion>) {
        if completed.is_empty() {
            return;
        }
        for done in &completed {
            self.scheduler.clear(&done.id());
        }
        let reportable = to_settle(&completed);
        if !reportable.is_empty() {
            deliver(&reportable, &self.config, self.transport.as_deref());
        }
        self.notify_count();
    }

    fn notify_count(&self) {
        if let Some(callback) = &self.count_callback {
            callback(self.pending_assertion_count());
        }
    }

    #[cfg(test)]
    pub(crate) fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }
}
