//! Core types, pure decision logic and the persistence trait for the Vigil
//! incident deduplication engine.
//!
//! Nothing here performs I/O. Matching, merge planning and history tracking
//! are pure functions of their inputs; storage backends implement
//! [`store::EventStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod canonical;
pub mod entity;
pub mod error;
pub mod event;
pub mod history;
pub mod matcher;
pub mod merge;
pub mod similarity;
pub mod store;
pub mod text;

#[cfg(test)]
mod test_helpers;

pub use error::{Error, Result};
