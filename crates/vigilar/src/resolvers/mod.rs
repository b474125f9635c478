//! Signal → completion resolvers.
//!
//! Each resolver is a pure function over `(signal, pending assertions)`
//! producing zero or more completions. Resolvers never report — the manager
//! owns the settle funnel (timer cleanup, dedup, delivery).

pub mod dom;
pub mod error;
pub mod event;
pub mod http;
pub mod property;
