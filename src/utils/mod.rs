//! Utility functions and helpers

pub mod stats;
pub mod time;
