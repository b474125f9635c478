//! Vigilar: in-page assertion instrumentation agent.
//!
//! Vigilar (Spanish: "to watch over") turns declarative HTML attributes
//! into runtime assertions about what a page should do: an element should
//! appear after a click, an HTTP response should carry a status, an image
//! should load. The host forwards DOM, network, and error signals; the
//! agent matches them against the in-flight assertion set and reports each
//! settlement to a collector exactly once per meaningful state change.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       VIGILAR Agent                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  host signals          core                     outputs      │
//! │  ┌───────────┐   ┌───────────────┐   ┌────────────────────┐  │
//! │  │ events    │──►│ Assertion     │──►│ Collector          │  │
//! │  │ mutations │   │ Manager       │   │ (endpoint/callback)│  │
//! │  │ http      │   │  + resolvers  │   └────────────────────┘  │
//! │  │ errors    │   │  + timeouts   │   ┌────────────────────┐  │
//! │  │ ticks     │   │  + retry/dedup│──►│ Storage (MPA mode) │  │
//! │  └───────────┘   └───────────────┘   └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vigilar::{Agent, CollectorTarget, Configuration, DomEvent, Document};
//!
//! let config = Configuration::new(CollectorTarget::Function(Arc::new(|payload| {
//!     println!("{}: {:?}", payload.assertion_key, payload.status);
//! })))
//! .with_release_label("1.0.0");
//!
//! let mut agent = Agent::init(config).expect("valid configuration");
//!
//! let mut doc = Document::new();
//! let button = doc
//!     .build("button")
//!     .attr("fs-trigger", "click")
//!     .attr("fs-feature", "checkout")
//!     .attr("fs-assert", "panel-opens")
//!     .attr("fs-assert-added", "#panel")
//!     .append_to_root();
//!
//! agent.start(&doc);
//! agent.on_event(&doc, &DomEvent::new("click", button));
//! assert_eq!(agent.pending_assertion_count(), 1);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod agent;
pub mod assertion;
pub mod clock;
pub mod collector;
pub mod config;
pub mod declare;
pub mod dom;
pub mod manager;
pub mod network;
pub mod resolvers;
pub mod result;
pub mod signal;
pub mod storage;
pub mod timeout;

pub use agent::{Agent, AgentBuilder};
pub use assertion::{
    Assertion, AssertionId, AssertionStatus, AssertionType, CompletedAssertion, Modifier,
    Modifiers,
};
pub use clock::{FakeClock, SystemClock, TimeSource};
pub use collector::{console_collector, CollectorFn, CollectorTarget, ReportPayload, Transport};
pub use config::Configuration;
pub use dom::{Document, ElementBuilder, Layout, MediaState, NodeId, Selector};
pub use manager::AssertionManager;
pub use result::{VigilarError, VigilarResult};
pub use signal::{
    DomEvent, ErrorInfo, HttpErrorInfo, MutationBatch, MutationRecord, RequestInfo, ResponseInfo,
};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use timeout::TimeoutScheduler;
