//! Data models

pub mod benchmark;
pub mod history;
pub mod test_case;

pub use benchmark::*;
pub use history::*;
pub use test_case::*;
