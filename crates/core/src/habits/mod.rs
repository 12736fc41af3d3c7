//! Habit domain records.

mod model;

pub use model::*;
