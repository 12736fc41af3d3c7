//! Sync domain models, key scheme, and merge rules.

mod keys;
mod merge;
mod model;

pub use keys::*;
pub use merge::*;
pub use model::*;
