//! Attribute history: the append-only audit trail of a canonical event.
//!
//! Every change to a versioned attribute produces exactly one
//! [`AttributeHistoryEntry`] before the new value is written into the event.
//! Entries are never edited or deleted. Replaying all entries for an event in
//! order from an empty [`AttributeSnapshot`] reconstructs its current values.
//!
//! Values are stored as text so the ledger stays readable without the Rust
//! types: ISO dates, snake_case enum names, decimal counts, and canonical
//! entity names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{CanonicalEvent, EventStatus, EventType, EventView, Severity},
  text::dedup_key,
};

// ─── Attributes ──────────────────────────────────────────────────────────────

/// The versioned attributes of a canonical event.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeName {
  EventDate,
  EventType,
  Severity,
  RecordsAffected,
  Status,
  PrimaryEntity,
}

impl AttributeName {
  pub const ALL: [AttributeName; 6] = [
    Self::EventDate,
    Self::EventType,
    Self::Severity,
    Self::RecordsAffected,
    Self::Status,
    Self::PrimaryEntity,
  ];
}

/// A typed value of one versioned attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
  EventDate(NaiveDate),
  EventType(EventType),
  Severity(Severity),
  RecordsAffected(u64),
  Status(EventStatus),
  PrimaryEntity(String),
}

impl AttributeValue {
  pub fn attribute(&self) -> AttributeName {
    match self {
      Self::EventDate(_) => AttributeName::EventDate,
      Self::EventType(_) => AttributeName::EventType,
      Self::Severity(_) => AttributeName::Severity,
      Self::RecordsAffected(_) => AttributeName::RecordsAffected,
      Self::Status(_) => AttributeName::Status,
      Self::PrimaryEntity(_) => AttributeName::PrimaryEntity,
    }
  }

  /// Text form stored in the ledger.
  pub fn encode(&self) -> String {
    match self {
      Self::EventDate(d) => d.format("%Y-%m-%d").to_string(),
      Self::EventType(t) => t.to_string(),
      Self::Severity(s) => s.to_string(),
      Self::RecordsAffected(n) => n.to_string(),
      Self::Status(s) => s.to_string(),
      Self::PrimaryEntity(name) => name.clone(),
    }
  }

  pub fn decode(attribute: AttributeName, text: &str) -> Result<Self> {
    let invalid = || Error::InvalidAttributeValue {
      attribute,
      value: text.to_owned(),
    };
    Ok(match attribute {
      AttributeName::EventDate => Self::EventDate(
        NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?,
      ),
      AttributeName::EventType => {
        Self::EventType(EventType::from_str(text).map_err(|_| invalid())?)
      }
      AttributeName::Severity => {
        Self::Severity(Severity::from_str(text).map_err(|_| invalid())?)
      }
      AttributeName::RecordsAffected => {
        Self::RecordsAffected(text.parse().map_err(|_| invalid())?)
      }
      AttributeName::Status => {
        Self::Status(EventStatus::from_str(text).map_err(|_| invalid())?)
      }
      AttributeName::PrimaryEntity => Self::PrimaryEntity(text.to_owned()),
    })
  }
}

// ─── Ledger entry ────────────────────────────────────────────────────────────

/// One immutable change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeHistoryEntry {
  pub entry_id:        Uuid,
  pub event_id:        Uuid,
  /// The source whose report caused the change; `None` for operator
  /// corrections.
  pub event_source_id: Option<Uuid>,
  pub attribute_name:  AttributeName,
  pub old_value:       Option<String>,
  pub new_value:       Option<String>,
  pub changed_at:      DateTime<Utc>,
}

impl AttributeHistoryEntry {
  fn new(
    event_id: Uuid,
    origin: Option<Uuid>,
    attribute_name: AttributeName,
    old: Option<&AttributeValue>,
    new: Option<&AttributeValue>,
    changed_at: DateTime<Utc>,
  ) -> Self {
    Self {
      entry_id: Uuid::new_v4(),
      event_id,
      event_source_id: origin,
      attribute_name,
      old_value: old.map(AttributeValue::encode),
      new_value: new.map(AttributeValue::encode),
      changed_at,
    }
  }

  /// Decode `new_value` into a typed value.
  pub fn new_typed(&self) -> Result<Option<AttributeValue>> {
    self
      .new_value
      .as_deref()
      .map(|v| AttributeValue::decode(self.attribute_name, v))
      .transpose()
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The values of every versioned attribute at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
  pub event_date:       Option<NaiveDate>,
  pub event_type:       Option<EventType>,
  pub severity:         Option<Severity>,
  pub records_affected: Option<u64>,
  pub status:           Option<EventStatus>,
  pub primary_entity:   Option<String>,
}

impl AttributeSnapshot {
  pub fn from_event(event: &CanonicalEvent, primary_entity: Option<&str>) -> Self {
    Self {
      event_date:       Some(event.event_date),
      event_type:       event.event_type,
      severity:         event.severity,
      records_affected: event.records_affected,
      status:           Some(event.status),
      primary_entity:   primary_entity.map(str::to_owned),
    }
  }

  /// The current state of a materialised event.
  pub fn of(view: &EventView) -> Self {
    Self::from_event(
      &view.event,
      view.primary_entity().map(|l| l.entity.canonical_name.as_str()),
    )
  }

  pub fn get(&self, attribute: AttributeName) -> Option<AttributeValue> {
    match attribute {
      AttributeName::EventDate => self.event_date.map(AttributeValue::EventDate),
      AttributeName::EventType => self.event_type.map(AttributeValue::EventType),
      AttributeName::Severity => self.severity.map(AttributeValue::Severity),
      AttributeName::RecordsAffected => {
        self.records_affected.map(AttributeValue::RecordsAffected)
      }
      AttributeName::Status => self.status.map(AttributeValue::Status),
      AttributeName::PrimaryEntity => {
        self.primary_entity.clone().map(AttributeValue::PrimaryEntity)
      }
    }
  }

  fn put(&mut self, attribute: AttributeName, value: Option<AttributeValue>) {
    let Some(value) = value else {
      match attribute {
        AttributeName::EventDate => self.event_date = None,
        AttributeName::EventType => self.event_type = None,
        AttributeName::Severity => self.severity = None,
        AttributeName::RecordsAffected => self.records_affected = None,
        AttributeName::Status => self.status = None,
        AttributeName::PrimaryEntity => self.primary_entity = None,
      }
      return;
    };
    match value {
      AttributeValue::EventDate(d) => self.event_date = Some(d),
      AttributeValue::EventType(t) => self.event_type = Some(t),
      AttributeValue::Severity(s) => self.severity = Some(s),
      AttributeValue::RecordsAffected(n) => self.records_affected = Some(n),
      AttributeValue::Status(s) => self.status = Some(s),
      AttributeValue::PrimaryEntity(name) => self.primary_entity = Some(name),
    }
  }
}

/// Fold a timeline into the snapshot it produces.
///
/// Entries are applied in `changed_at` order; entries sharing a timestamp keep
/// the order they were given in.
pub fn replay<'a>(
  entries: impl IntoIterator<Item = &'a AttributeHistoryEntry>,
) -> Result<AttributeSnapshot> {
  let mut ordered: Vec<&AttributeHistoryEntry> = entries.into_iter().collect();
  ordered.sort_by_key(|e| e.changed_at);

  let mut snapshot = AttributeSnapshot::default();
  for entry in ordered {
    snapshot.put(entry.attribute_name, entry.new_typed()?);
  }
  Ok(snapshot)
}

/// Ledger entries for a freshly created event: one `null → value` entry per
/// attribute that has a value.
pub fn initial_entries(
  event: &CanonicalEvent,
  primary_entity: Option<&str>,
  origin: Option<Uuid>,
  at: DateTime<Utc>,
) -> Vec<AttributeHistoryEntry> {
  let snapshot = AttributeSnapshot::from_event(event, primary_entity);
  AttributeName::ALL
    .iter()
    .filter_map(|&attr| {
      let value = snapshot.get(attr)?;
      Some(AttributeHistoryEntry::new(
        event.event_id,
        origin,
        attr,
        None,
        Some(&value),
        at,
      ))
    })
    .collect()
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Routes attribute changes on one event through the ledger.
///
/// Each accepted [`Tracker::set`] appends an entry and then writes the value
/// into the event. All entries produced by one tracker share its origin.
pub struct Tracker<'a> {
  event:          &'a mut CanonicalEvent,
  primary_entity: Option<String>,
  origin:         Option<Uuid>,
  at:             DateTime<Utc>,
  entries:        Vec<AttributeHistoryEntry>,
}

impl<'a> Tracker<'a> {
  pub fn new(
    event: &'a mut CanonicalEvent,
    primary_entity: Option<String>,
    origin: Option<Uuid>,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      event,
      primary_entity,
      origin,
      at,
      entries: Vec::new(),
    }
  }

  pub fn current(&self, attribute: AttributeName) -> Option<AttributeValue> {
    AttributeSnapshot::from_event(self.event, self.primary_entity.as_deref())
      .get(attribute)
  }

  /// Set an attribute. Returns `Ok(false)` without touching anything when the
  /// value is unchanged.
  ///
  /// Status values must be a legal forward transition from the current status.
  pub fn set(&mut self, value: AttributeValue) -> Result<bool> {
    let attribute = value.attribute();
    let old = self.current(attribute);
    if old.as_ref() == Some(&value) {
      return Ok(false);
    }

    if let (Some(AttributeValue::Status(from)), AttributeValue::Status(to)) = (&old, &value)
      && !from.can_transition_to(*to)
    {
      return Err(Error::InvalidStatusTransition { from: *from, to: *to });
    }

    self.entries.push(AttributeHistoryEntry::new(
      self.event.event_id,
      self.origin,
      attribute,
      old.as_ref(),
      Some(&value),
      self.at,
    ));

    match value {
      AttributeValue::EventDate(d) => {
        self.event.event_date = d;
        self.event.dedup_key = dedup_key(&self.event.title, d);
      }
      AttributeValue::EventType(t) => self.event.event_type = Some(t),
      AttributeValue::Severity(s) => self.event.severity = Some(s),
      AttributeValue::RecordsAffected(n) => self.event.records_affected = Some(n),
      AttributeValue::Status(s) => self.event.status = s,
      AttributeValue::PrimaryEntity(name) => self.primary_entity = Some(name),
    }
    self.event.updated_at = self.at;
    Ok(true)
  }

  pub fn primary_entity(&self) -> Option<&str> { self.primary_entity.as_deref() }

  pub fn entries(&self) -> &[AttributeHistoryEntry] { &self.entries }

  pub fn into_entries(self) -> Vec<AttributeHistoryEntry> { self.entries }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::test_helpers::{date, view};

  #[test]
  fn unchanged_value_is_a_noop() {
    let mut v = view("Acme breach", date(2025, 1, 1), None, 1);
    v.event.records_affected = Some(10);
    let before = v.event.clone();

    let mut tracker = Tracker::new(&mut v.event, None, None, Utc::now());
    assert!(!tracker.set(AttributeValue::RecordsAffected(10)).unwrap());
    assert!(tracker.entries().is_empty());
    drop(tracker);
    assert_eq!(v.event, before);
  }

  #[test]
  fn change_appends_entry_then_writes_value() {
    let mut v = view("Acme breach", date(2025, 1, 1), None, 1);
    v.event.records_affected = Some(1000);
    let origin = Uuid::new_v4();
    let at = v.event.updated_at + Duration::minutes(5);

    let mut tracker = Tracker::new(&mut v.event, None, Some(origin), at);
    assert!(tracker.set(AttributeValue::RecordsAffected(50_000)).unwrap());
    assert!(tracker.set(AttributeValue::Severity(Severity::High)).unwrap());
    let entries = tracker.into_entries();

    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.event_source_id == Some(origin)));
    assert_eq!(entries[0].old_value.as_deref(), Some("1000"));
    assert_eq!(entries[0].new_value.as_deref(), Some("50000"));
    assert_eq!(entries[1].old_value, None);
    assert_eq!(entries[1].new_value.as_deref(), Some("high"));
    assert_eq!(v.event.records_affected, Some(50_000));
    assert_eq!(v.event.updated_at, at);
  }

  #[test]
  fn status_must_move_forward() {
    let mut v = view("Acme breach", date(2025, 1, 1), None, 1);
    let mut tracker = Tracker::new(&mut v.event, None, None, Utc::now());

    assert!(tracker.set(AttributeValue::Status(EventStatus::Contained)).unwrap());
    assert!(tracker.set(AttributeValue::Status(EventStatus::Resolved)).unwrap());
    let err = tracker
      .set(AttributeValue::Status(EventStatus::Active))
      .unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidStatusTransition { from: EventStatus::Resolved, to: EventStatus::Active }
    ));
    assert_eq!(tracker.entries().len(), 2);
  }

  #[test]
  fn date_correction_recomputes_dedup_key() {
    let mut v = view("Acme breach", date(2025, 1, 1), None, 1);
    let old_key = v.event.dedup_key.clone();
    let mut tracker = Tracker::new(&mut v.event, None, None, Utc::now());
    tracker.set(AttributeValue::EventDate(date(2024, 12, 30))).unwrap();
    drop(tracker);
    assert_ne!(v.event.dedup_key, old_key);
    assert_eq!(v.event.dedup_key, dedup_key("Acme breach", date(2024, 12, 30)));
  }

  #[test]
  fn replay_reconstructs_current_values() {
    let mut v = view("Acme breach", date(2025, 1, 1), Some("Acme Corp"), 1);
    v.event.severity = Some(Severity::Medium);
    let t0 = v.event.created_at;
    let mut ledger = initial_entries(&v.event, Some("Acme Corp"), None, t0);

    let mut tracker =
      Tracker::new(&mut v.event, Some("Acme Corp".into()), None, t0 + Duration::hours(1));
    tracker.set(AttributeValue::Severity(Severity::Critical)).unwrap();
    tracker.set(AttributeValue::RecordsAffected(42)).unwrap();
    tracker.set(AttributeValue::Status(EventStatus::Contained)).unwrap();
    ledger.extend(tracker.into_entries());

    // Replay must not depend on the order entries are handed over in.
    ledger.reverse();
    let replayed = replay(&ledger).unwrap();
    assert_eq!(replayed, AttributeSnapshot::of(&v));
    assert_eq!(replayed.severity, Some(Severity::Critical));
  }

  #[test]
  fn values_round_trip_through_text() {
    for value in [
      AttributeValue::EventDate(date(2025, 6, 30)),
      AttributeValue::EventType(EventType::SupplyChain),
      AttributeValue::Severity(Severity::Low),
      AttributeValue::RecordsAffected(5_700_000),
      AttributeValue::Status(EventStatus::Resolved),
      AttributeValue::PrimaryEntity("Live Nation Entertainment, Inc".into()),
    ] {
      let decoded = AttributeValue::decode(value.attribute(), &value.encode()).unwrap();
      assert_eq!(decoded, value);
    }
    assert!(AttributeValue::decode(AttributeName::RecordsAffected, "lots").is_err());
  }
}
