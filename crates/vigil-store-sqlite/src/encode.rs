//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, UUIDs
//! are hyphenated lowercase strings and enums use their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use vigil_core::{
  entity::{Entity, EntityMapping, LinkedEntity, RelationshipType},
  event::{CanonicalEvent, EventSource, EventStatus, EventType, EventView, Severity},
  history::{AttributeHistoryEntry, AttributeName},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// Any strum-backed enum to its stored name.
pub fn encode_enum<T: Into<&'static str>>(v: T) -> String {
  let s: &'static str = v.into();
  s.to_owned()
}

fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode { column, value: s.to_owned() })
}

/// Counts above `i64::MAX` are rejected, never clamped.
pub fn encode_records(n: u64) -> Result<i64> {
  i64::try_from(n).map_err(|_| Error::Encode {
    column: "records_affected",
    value:  n.to_string(),
  })
}

fn decode_records(n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Decode {
    column: "records_affected",
    value:  n.to_string(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `canonical_events` row.
pub struct RawEvent {
  pub event_id:         String,
  pub dedup_key:        String,
  pub title:            String,
  pub description:      String,
  pub event_date:       String,
  pub event_type:       Option<String>,
  pub severity:         Option<String>,
  pub records_affected: Option<i64>,
  pub status:           String,
  pub confidence:       f64,
  pub created_at:       String,
  pub updated_at:       String,
}

/// Column list matching [`RawEvent::from_row`].
pub const EVENT_COLUMNS: &str = "e.event_id, e.dedup_key, e.title, e.description, \
  e.event_date, e.event_type, e.severity, e.records_affected, e.status, \
  e.confidence, e.created_at, e.updated_at";

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:         row.get(0)?,
      dedup_key:        row.get(1)?,
      title:            row.get(2)?,
      description:      row.get(3)?,
      event_date:       row.get(4)?,
      event_type:       row.get(5)?,
      severity:         row.get(6)?,
      records_affected: row.get(7)?,
      status:           row.get(8)?,
      confidence:       row.get(9)?,
      created_at:       row.get(10)?,
      updated_at:       row.get(11)?,
    })
  }

  pub fn into_event(self) -> Result<CanonicalEvent> {
    Ok(CanonicalEvent {
      event_id:         decode_uuid(&self.event_id)?,
      dedup_key:        self.dedup_key,
      title:            self.title,
      description:      self.description,
      event_date:       decode_date(&self.event_date)?,
      event_type:       self
        .event_type
        .as_deref()
        .map(|s| decode_enum::<EventType>("event_type", s))
        .transpose()?,
      severity:         self
        .severity
        .as_deref()
        .map(|s| decode_enum::<Severity>("severity", s))
        .transpose()?,
      records_affected: self.records_affected.map(decode_records).transpose()?,
      status:           decode_enum::<EventStatus>("status", &self.status)?,
      confidence:       self.confidence,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values from `event_entities` joined with `entities`.
pub struct RawLinkedEntity {
  pub entity_id:      String,
  pub canonical_name: String,
  pub entity_type:    Option<String>,
  pub industry:       Option<String>,
  pub is_primary:     bool,
  pub confidence:     f64,
}

impl RawLinkedEntity {
  pub fn into_linked(self) -> Result<LinkedEntity> {
    Ok(LinkedEntity {
      entity:     Entity {
        entity_id:      decode_uuid(&self.entity_id)?,
        canonical_name: self.canonical_name,
        entity_type:    self.entity_type,
        industry:       self.industry,
      },
      is_primary: self.is_primary,
      confidence: self.confidence,
    })
  }
}

/// Raw values read directly from an `event_sources` row.
pub struct RawSource {
  pub source_id:         String,
  pub event_id:          String,
  pub source_type:       String,
  pub url:               String,
  pub published_date:    Option<String>,
  pub retrieved_date:    String,
  pub raw_title:         String,
  pub raw_content:       String,
  pub credibility_score: f64,
  pub relevance_score:   f64,
}

pub const SOURCE_COLUMNS: &str = "source_id, event_id, source_type, url, \
  published_date, retrieved_date, raw_title, raw_content, credibility_score, \
  relevance_score";

impl RawSource {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      source_id:         row.get(0)?,
      event_id:          row.get(1)?,
      source_type:       row.get(2)?,
      url:               row.get(3)?,
      published_date:    row.get(4)?,
      retrieved_date:    row.get(5)?,
      raw_title:         row.get(6)?,
      raw_content:       row.get(7)?,
      credibility_score: row.get(8)?,
      relevance_score:   row.get(9)?,
    })
  }

  pub fn into_source(self) -> Result<EventSource> {
    Ok(EventSource {
      source_id:         decode_uuid(&self.source_id)?,
      event_id:          decode_uuid(&self.event_id)?,
      source_type:       self.source_type,
      url:               self.url,
      published_date:    self.published_date.as_deref().map(decode_dt).transpose()?,
      retrieved_date:    decode_dt(&self.retrieved_date)?,
      raw_title:         self.raw_title,
      raw_content:       self.raw_content,
      credibility_score: self.credibility_score,
      relevance_score:   self.relevance_score,
    })
  }
}

/// An event row with its links and sources, still undecoded.
pub struct RawView {
  pub event:    RawEvent,
  pub entities: Vec<RawLinkedEntity>,
  pub sources:  Vec<RawSource>,
}

impl RawView {
  pub fn into_view(self) -> Result<EventView> {
    Ok(EventView {
      event:    self.event.into_event()?,
      entities: self
        .entities
        .into_iter()
        .map(RawLinkedEntity::into_linked)
        .collect::<Result<_>>()?,
      sources:  self
        .sources
        .into_iter()
        .map(RawSource::into_source)
        .collect::<Result<_>>()?,
    })
  }
}

/// Raw values read directly from an `attribute_history` row.
pub struct RawHistoryEntry {
  pub entry_id:        String,
  pub event_id:        String,
  pub event_source_id: Option<String>,
  pub attribute_name:  String,
  pub old_value:       Option<String>,
  pub new_value:       Option<String>,
  pub changed_at:      String,
}

impl RawHistoryEntry {
  pub fn into_entry(self) -> Result<AttributeHistoryEntry> {
    Ok(AttributeHistoryEntry {
      entry_id:        decode_uuid(&self.entry_id)?,
      event_id:        decode_uuid(&self.event_id)?,
      event_source_id: self.event_source_id.as_deref().map(decode_uuid).transpose()?,
      attribute_name:  decode_enum::<AttributeName>("attribute_name", &self.attribute_name)?,
      old_value:       self.old_value,
      new_value:       self.new_value,
      changed_at:      decode_dt(&self.changed_at)?,
    })
  }
}

/// Raw values read directly from an `entity_mappings` row.
pub struct RawMapping {
  pub source_entity:     String,
  pub canonical_entity:  String,
  pub relationship_type: String,
}

impl RawMapping {
  pub fn into_mapping(self) -> Result<EntityMapping> {
    Ok(EntityMapping {
      source_entity:     self.source_entity,
      canonical_entity:  self.canonical_entity,
      relationship_type: decode_enum::<RelationshipType>(
        "relationship_type",
        &self.relationship_type,
      )?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_round_trip_textually() {
    let now = Utc::now();
    let text = encode_dt(now);
    assert_eq!(decode_dt(&text).unwrap(), now);
    assert_eq!(encode_dt(decode_dt(&text).unwrap()), text);
  }

  #[test]
  fn enums_use_snake_case_names() {
    assert_eq!(encode_enum(EventType::DenialOfService), "denial_of_service");
    assert_eq!(encode_enum(EventStatus::Active), "active");
    assert!(decode_enum::<Severity>("severity", "apocalyptic").is_err());
  }

  #[test]
  fn record_counts_beyond_i64_are_rejected() {
    assert_eq!(encode_records(i64::MAX as u64).unwrap(), i64::MAX);
    assert!(matches!(
      encode_records(u64::MAX),
      Err(Error::Encode { column: "records_affected", .. })
    ));
    assert!(decode_records(-1).is_err());
  }
}
