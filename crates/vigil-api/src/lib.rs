//! JSON query API for Vigil.
//!
//! Exposes an axum [`Router`] backed by any [`vigil_core::store::EventStore`].
//! The API is read-mostly: events change only through the engine, so the
//! single-writer discipline is never bypassed over HTTP. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vigil_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod events;
pub mod mappings;

use std::sync::Arc;

use axum::{Router, routing::get};
use vigil_core::store::EventStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: EventStore + 'static,
{
  Router::new()
    // Events
    .route("/events", get(events::list::<S>))
    .route("/events/{id}", get(events::get_one::<S>))
    .route("/events/{id}/history", get(events::history::<S>))
    .route("/events/{id}/replay", get(events::replay_one::<S>))
    // Entity mappings
    .route("/mappings", get(mappings::list::<S>).post(mappings::put::<S>))
    .with_state(store)
}
