//! Domain layer for the habitloop sync engine.
//!
//! This crate holds the record models, the idempotency key scheme, the
//! completion merge rules, and the contracts for every externally-owned
//! collaborator (identity, settings, XP rules, event and metric sinks).
//! It performs no I/O of its own.

pub mod errors;
pub mod events;
pub mod habits;
pub mod identity;
pub mod metrics;
pub mod sync;
pub mod xp;

pub use errors::{Result, SyncError};
