//! Participant document schema
//!
//! This module defines the per-participant JSON document written by the
//! experiment and the adapter that flattens it into the four analysis tables.

mod adapter;
mod document;

pub use adapter::*;
pub use document::*;
