//! Generic helpers.

/// Deadline-bounded mapping.
pub mod deadline;

pub use deadline::map_with_deadline;
