//! The `EventStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `vigil-store-sqlite`).
//! The engine and the query API depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::EntityMapping,
  event::{EventSource, EventStatus, EventType, EventView, Severity},
  history::AttributeHistoryEntry,
  merge::{EventCreation, EventUpdate},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`EventStore::query_events`]. Every filter is optional;
/// `from`/`to` are inclusive bounds on `event_date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
  pub from:       Option<NaiveDate>,
  pub to:         Option<NaiveDate>,
  pub status:     Option<EventStatus>,
  pub severity:   Option<Severity>,
  pub event_type: Option<EventType>,
  /// Canonical name of any linked entity.
  pub entity:     Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// How a backend failure should be handled by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
  /// A uniqueness constraint or optimistic guard rejected the write. Worth
  /// one re-read and retry.
  Conflict,
  /// The store cannot be reached at all. Fatal to a run.
  Unavailable,
  Other,
}

pub trait GatewayError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> GatewayErrorKind;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Vigil event store backend.
///
/// Canonical events are never deleted. Sources and attribute history are
/// append-only. [`create_event`](Self::create_event) and
/// [`apply_update`](Self::apply_update) must each be atomic.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait EventStore: Send + Sync {
  type Error: GatewayError;

  // ── Entity mappings ───────────────────────────────────────────────────

  /// Snapshot of the administered alias table.
  fn entity_mappings(
    &self,
  ) -> impl Future<Output = Result<Vec<EntityMapping>, Self::Error>> + Send + '_;

  /// Insert or replace the mapping for `mapping.source_entity`.
  fn put_entity_mapping(
    &self,
    mapping: EntityMapping,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The source with this URL, on whichever event it is attached to.
  fn find_source_by_url<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Option<EventSource>, Self::Error>> + Send + 'a;

  /// The Active event holding `dedup_key`, if any.
  fn find_active_by_dedup_key<'a>(
    &'a self,
    dedup_key: &'a str,
  ) -> impl Future<Output = Result<Option<EventView>, Self::Error>> + Send + 'a;

  /// Active events whose `event_date` lies in `[from, to]`.
  fn active_events_between(
    &self,
    from: NaiveDate,
    to: NaiveDate,
  ) -> impl Future<Output = Result<Vec<EventView>, Self::Error>> + Send + '_;

  /// Materialise one event with its entities and sources. Returns `None` if
  /// it does not exist.
  fn get_event(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Option<EventView>, Self::Error>> + Send + '_;

  /// Events matching `query`, ordered by `event_date` then `event_id`.
  fn query_events<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<Vec<EventView>, Self::Error>> + Send + 'a;

  /// The attribute history of one event in chronological (append) order.
  fn history(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AttributeHistoryEntry>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new event with its first source, entity links and initial
  /// history. A conflicting Active dedup key or source URL is a
  /// [`GatewayErrorKind::Conflict`].
  fn create_event(
    &self,
    creation: EventCreation,
  ) -> impl Future<Output = Result<EventView, Self::Error>> + Send + '_;

  /// Apply a planned update. Fails with [`GatewayErrorKind::Conflict`] when
  /// the stored `updated_at` differs from `update.expected_updated_at`.
  fn apply_update(
    &self,
    update: EventUpdate,
  ) -> impl Future<Output = Result<EventView, Self::Error>> + Send + '_;
}
