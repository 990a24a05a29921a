//! The Vigil deduplication engine.
//!
//! [`Engine`] drives one candidate at a time through canonicalization,
//! matching, merge planning and a single atomic store write. [`worker`] wraps
//! it in the single-writer queue consumer that collectors feed.

mod engine;
pub mod error;
pub mod report;
pub mod worker;

pub use engine::{Engine, EngineConfig, Intake};
pub use error::{Error, Result};
pub use report::{BatchReport, Failure, Outcome, Processed};

#[cfg(test)]
mod tests;
