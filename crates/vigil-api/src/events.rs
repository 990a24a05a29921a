//! Handlers for `/events` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/events` | Optional `from`, `to`, `status`, `severity`, `event_type`, `entity`, `limit`, `offset` |
//! | `GET`  | `/events/{id}` | Event with its entities and sources; 404 if not found |
//! | `GET`  | `/events/{id}/history` | Ledger in write order; optional `?attribute=` |
//! | `GET`  | `/events/{id}/replay` | Attribute values reconstructed from the ledger; optional `?as_of=` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  event::EventView,
  history::{AttributeHistoryEntry, AttributeName, AttributeSnapshot, replay},
  store::{EventQuery, EventStore},
};

use crate::error::ApiError;

/// Upper bound on `limit` for one page.
pub const MAX_PAGE: usize = 500;

async fn require_event<S: EventStore>(store: &S, id: Uuid) -> Result<EventView, ApiError> {
  store
    .get_event(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("event {id} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /events[?from=...][&to=...][&status=...][&entity=...][&limit=...][&offset=...]`
pub async fn list<S: EventStore>(
  State(store): State<Arc<S>>,
  Query(mut query): Query<EventQuery>,
) -> Result<Json<Vec<EventView>>, ApiError> {
  if let (Some(from), Some(to)) = (query.from, query.to)
    && from > to
  {
    return Err(ApiError::BadRequest(format!("`from` ({from}) is after `to` ({to})")));
  }
  query.limit = Some(query.limit.map_or(MAX_PAGE, |l| l.min(MAX_PAGE)));

  let events = store.query_events(&query).await.map_err(ApiError::store)?;
  Ok(Json(events))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /events/{id}`
pub async fn get_one<S: EventStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EventView>, ApiError> {
  Ok(Json(require_event(store.as_ref(), id).await?))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub attribute: Option<AttributeName>,
}

/// `GET /events/{id}/history[?attribute=records_affected]`
pub async fn history<S: EventStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<AttributeHistoryEntry>>, ApiError> {
  require_event(store.as_ref(), id).await?;
  let mut entries = store.history(id).await.map_err(ApiError::store)?;
  if let Some(attribute) = params.attribute {
    entries.retain(|e| e.attribute_name == attribute);
  }
  Ok(Json(entries))
}

// ─── Replay ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReplayParams {
  /// Reconstruct the values as they stood at this instant. Defaults to now.
  pub as_of: Option<DateTime<Utc>>,
}

/// `GET /events/{id}/replay[?as_of=2025-03-01T00:00:00Z]`
pub async fn replay_one<S: EventStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ReplayParams>,
) -> Result<Json<AttributeSnapshot>, ApiError> {
  require_event(store.as_ref(), id).await?;
  let entries = store.history(id).await.map_err(ApiError::store)?;
  let snapshot = match params.as_of {
    Some(as_of) => replay(entries.iter().filter(|e| e.changed_at <= as_of))?,
    None => replay(&entries)?,
  };
  Ok(Json(snapshot))
}
