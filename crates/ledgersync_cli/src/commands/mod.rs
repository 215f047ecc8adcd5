//! CLI command implementations.

pub mod add;
pub mod days;
pub mod delete;
pub mod merge;
pub mod queue;
pub mod sync;
