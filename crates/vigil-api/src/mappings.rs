//! Handlers for `/mappings` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/mappings` | Every alias → canonical mapping |
//! | `POST` | `/mappings` | Body: [`EntityMapping`]; upserts by `source_entity` |
//!
//! A running ingest only sees mapping changes at its next refresh.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use vigil_core::{entity::EntityMapping, store::EventStore};

use crate::error::ApiError;

/// `GET /mappings`
pub async fn list<S: EventStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<EntityMapping>>, ApiError> {
  let mappings = store.entity_mappings().await.map_err(ApiError::store)?;
  Ok(Json(mappings))
}

/// `POST /mappings`, body: `{"source_entity":"Ticketmaster LLC",
/// "canonical_entity":"Live Nation Entertainment, Inc",
/// "relationship_type":"subsidiary"}`
pub async fn put<S: EventStore>(
  State(store): State<Arc<S>>,
  Json(mapping): Json<EntityMapping>,
) -> Result<impl IntoResponse, ApiError> {
  if mapping.source_entity.trim().is_empty() || mapping.canonical_entity.trim().is_empty() {
    return Err(ApiError::BadRequest("entity names must not be empty".into()));
  }
  store
    .put_entity_mapping(mapping.clone())
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(mapping)))
}
