//! Merge planning: turning a matched (or unmatched) candidate into the exact
//! set of writes a store must apply.
//!
//! Planning is pure. The resulting [`EventCreation`] or [`EventUpdate`] is
//! applied by a store in one atomic step, so a canonical event is never left
//! half-merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  canonical::{ResolvedCandidate, ResolvedEntity},
  event::{CanonicalEvent, EventSource, EventView},
  history::{AttributeHistoryEntry, AttributeName, AttributeValue, Tracker, initial_entries},
  matcher::GateOutcome,
  text::dedup_key,
};

/// Floating-point slack when comparing confidences.
const TOLERANCE: f64 = 1e-9;

// ─── Policy ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
  /// Confidence added per corroborating source beyond the first.
  pub corroboration_step:  f64,
  /// Multiplier on the corroboration bonus when the entity gate was skipped.
  pub skipped_gate_factor: f64,
  /// How much a secondary entity's confidence must exceed the primary's to
  /// take over as primary.
  pub primary_margin:      f64,
  /// Slack below the stored confidence at which an incoming value still
  /// overwrites.
  pub epsilon:             f64,
}

impl Default for MergePolicy {
  fn default() -> Self {
    Self {
      corroboration_step:  0.1,
      skipped_gate_factor: 0.5,
      primary_margin:      0.1,
      epsilon:             0.01,
    }
  }
}

impl MergePolicy {
  /// `min(1, old + step * (distinct_sources - 1) * factor)`, never below
  /// `old`.
  pub fn corroborated_confidence(
    &self,
    old: f64,
    distinct_sources: usize,
    gate: GateOutcome,
  ) -> f64 {
    let factor = if gate.is_skipped() { self.skipped_gate_factor } else { 1.0 };
    let bonus =
      self.corroboration_step * distinct_sources.saturating_sub(1) as f64 * factor;
    (old + bonus.max(0.0)).min(1.0).max(old)
  }

  /// Whether a value reported with `incoming` confidence may overwrite one
  /// stored at `stored` confidence. Equal confidence overwrites.
  pub fn accepts(&self, incoming: f64, stored: f64) -> bool {
    incoming + TOLERANCE >= stored - self.epsilon
  }
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// An entity to link to an event. The store upserts the entity by
/// `canonical_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLinkPlan {
  pub canonical_name: String,
  pub entity_type:    Option<String>,
  pub industry:       Option<String>,
  pub confidence:     f64,
  pub is_primary:     bool,
}

impl EntityLinkPlan {
  fn from_resolved(entity: &ResolvedEntity, is_primary: bool) -> Self {
    Self {
      canonical_name: entity.canonical_name.clone(),
      entity_type: entity.entity_type.clone(),
      industry: entity.industry.clone(),
      confidence: entity.confidence,
      is_primary,
    }
  }
}

/// Everything needed to create a new canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCreation {
  pub event:   CanonicalEvent,
  pub source:  EventSource,
  pub links:   Vec<EntityLinkPlan>,
  pub history: Vec<AttributeHistoryEntry>,
}

/// Everything needed to update an existing canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUpdate {
  /// The event as it must look after the update.
  pub event:               CanonicalEvent,
  /// `updated_at` of the row this update was planned against. A store must
  /// refuse the update if the row has moved on.
  pub expected_updated_at: DateTime<Utc>,
  pub source:              Option<EventSource>,
  /// Entities not yet linked to the event.
  pub new_links:           Vec<EntityLinkPlan>,
  /// New primary entity, when it changes.
  pub primary_entity:      Option<String>,
  pub history:             Vec<AttributeHistoryEntry>,
}

#[derive(Debug)]
pub enum MergePlan {
  /// The source URL is already attached; nothing to do.
  Duplicate { event_id: Uuid },
  Update {
    update:     EventUpdate,
    /// Incoming values that were rejected. Advisory only.
    suppressed: Vec<Error>,
  },
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// Plan the creation of a canonical event from an unmatched candidate.
pub fn plan_creation(candidate: &ResolvedCandidate, now: DateTime<Utc>) -> EventCreation {
  let c = &candidate.candidate;
  let title = c.title.trim().to_owned();
  let event = CanonicalEvent {
    event_id: Uuid::new_v4(),
    dedup_key: dedup_key(&title, c.event_date),
    title,
    description: c.description_text().trim().to_owned(),
    event_date: c.event_date,
    event_type: c.event_type.known().copied(),
    severity: c.severity.known().copied(),
    records_affected: c.records_affected.known().copied(),
    status: c.status.known().copied().unwrap_or_default(),
    confidence: c.confidence.clamp(0.0, 1.0),
    created_at: now,
    updated_at: now,
  };

  let source = EventSource::from_record(&c.source, event.event_id);
  let links: Vec<EntityLinkPlan> = candidate
    .entities
    .iter()
    .enumerate()
    .map(|(i, e)| EntityLinkPlan::from_resolved(e, i == 0))
    .collect();
  let primary = candidate.primary_entity().map(|e| e.canonical_name.as_str());
  let history = initial_entries(&event, primary, Some(source.source_id), now);

  EventCreation { event, source, links, history }
}

/// Plan folding `candidate` into the canonical event `view`.
///
/// `gate` is the entity-gate outcome the matcher reported for this pairing.
pub fn plan_merge(
  view: &EventView,
  candidate: &ResolvedCandidate,
  gate: GateOutcome,
  policy: &MergePolicy,
  now: DateTime<Utc>,
) -> Result<MergePlan> {
  let c = &candidate.candidate;
  if view.has_source_url(&c.source.url) {
    return Ok(MergePlan::Duplicate { event_id: view.event.event_id });
  }

  let stored_confidence = view.event.confidence;
  let mut event = view.event.clone();
  let source = EventSource::from_record(&c.source, event.event_id);
  let current_primary = view.primary_entity();

  let new_links: Vec<EntityLinkPlan> = candidate
    .entities
    .iter()
    .filter(|e| {
      !view
        .entities
        .iter()
        .any(|l| l.entity.canonical_name == e.canonical_name)
    })
    .map(|e| EntityLinkPlan::from_resolved(e, false))
    .collect();

  let promoted = promoted_primary(view, candidate, policy);

  let mut suppressed = Vec::new();
  let mut tracker = Tracker::new(
    &mut event,
    current_primary.map(|l| l.entity.canonical_name.clone()),
    Some(source.source_id),
    now,
  );

  let incoming = [
    c.records_affected.known().map(|&n| AttributeValue::RecordsAffected(n)),
    c.severity.known().map(|&s| AttributeValue::Severity(s)),
    c.event_type.known().map(|&t| AttributeValue::EventType(t)),
    c.status.known().map(|&s| AttributeValue::Status(s)),
  ];
  for value in incoming.into_iter().flatten() {
    let attribute = value.attribute();
    if tracker.current(attribute).as_ref() == Some(&value) {
      continue;
    }
    if !policy.accepts(c.confidence, stored_confidence) {
      suppressed.push(Error::ConflictingAttributeUpdate {
        event_id: view.event.event_id,
        attribute,
        incoming_confidence: c.confidence,
        stored_confidence,
      });
      continue;
    }
    match tracker.set(value) {
      Ok(_) => {}
      Err(e @ Error::InvalidStatusTransition { .. }) => suppressed.push(e),
      Err(e) => return Err(e),
    }
  }

  let mut primary_entity = None;
  if let Some(name) = promoted {
    tracker.set(AttributeValue::PrimaryEntity(name.clone()))?;
    primary_entity = Some(name);
  }

  let history = tracker.into_entries();

  let distinct_sources = view.sources.len() + 1;
  event.confidence =
    policy.corroborated_confidence(stored_confidence, distinct_sources, gate);
  event.updated_at = now;

  Ok(MergePlan::Update {
    update: EventUpdate {
      event,
      expected_updated_at: view.event.updated_at,
      source: Some(source),
      new_links,
      primary_entity,
      history,
    },
    suppressed,
  })
}

/// The candidate entity that should become primary, if any.
///
/// An event without a primary adopts the candidate's. Otherwise the most
/// confident other candidate entity takes over only when it beats the current
/// primary's link confidence by `primary_margin`.
fn promoted_primary(
  view: &EventView,
  candidate: &ResolvedCandidate,
  policy: &MergePolicy,
) -> Option<String> {
  let Some(current) = view.primary_entity() else {
    return candidate.primary_entity().map(|e| e.canonical_name.clone());
  };

  let challenger = candidate
    .entities
    .iter()
    .filter(|e| e.canonical_name != current.entity.canonical_name)
    .fold(None::<&ResolvedEntity>, |best, e| match best {
      Some(b) if b.confidence >= e.confidence => Some(b),
      _ => Some(e),
    })?;

  (challenger.confidence + TOLERANCE >= current.confidence + policy.primary_margin)
    .then(|| challenger.canonical_name.clone())
}

/// Plan an operator correction of one attribute, outside of any source.
///
/// Returns `Ok(None)` when the value is already current. Status corrections
/// must be forward transitions; a primary entity must already be linked.
pub fn plan_correction(
  view: &EventView,
  value: AttributeValue,
  now: DateTime<Utc>,
) -> Result<Option<EventUpdate>> {
  if let AttributeValue::PrimaryEntity(name) = &value
    && !view.entities.iter().any(|l| &l.entity.canonical_name == name)
  {
    return Err(Error::InvalidAttributeValue {
      attribute: AttributeName::PrimaryEntity,
      value:     name.clone(),
    });
  }

  let mut event = view.event.clone();
  let mut tracker = Tracker::new(
    &mut event,
    view.primary_entity().map(|l| l.entity.canonical_name.clone()),
    None,
    now,
  );
  if !tracker.set(value.clone())? {
    return Ok(None);
  }
  let history = tracker.into_entries();

  let primary_entity = match value {
    AttributeValue::PrimaryEntity(name) => Some(name),
    _ => None,
  };

  Ok(Some(EventUpdate {
    event,
    expected_updated_at: view.event.updated_at,
    source: None,
    new_links: Vec::new(),
    primary_entity,
    history,
  }))
}
