//! Bidirectional sync engine for the habitloop app.
//!
//! Reconciles the local, always-available store with a shared remote
//! document store across devices and intermittent connectivity, while
//! guaranteeing no duplicate XP grants, no resurrected deletions, and no
//! silent data loss. The UI, the stores, authentication, and XP rules are
//! external collaborators injected through the traits in
//! [`store`] and [`habitloop_core`].

mod deleted;
mod engine;
mod pull;
mod push;
mod scheduler;
mod single_flight;
pub mod store;

pub use deleted::RecentlyDeletedGuard;
pub use engine::{EngineDeps, SyncEngine};
pub use scheduler::{SchedulerCadence, SyncScheduler};
pub use single_flight::SingleFlight;
