//! Event types: the ephemeral candidate, the canonical record, and the
//! provenance rows that hang off it.
//!
//! A [`CandidateEvent`] is one source's account of a possible incident. It is
//! never stored as-is; the engine either folds it into an existing
//! [`CanonicalEvent`] or creates a new one from it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::entity::LinkedEntity;

// ─── Classification ──────────────────────────────────────────────────────────

/// Broad category of a cyber incident.
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
pub enum EventType {
  DataBreach,
  Ransomware,
  Malware,
  Phishing,
  DenialOfService,
  Vulnerability,
  SupplyChain,
  InsiderThreat,
  Other,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// Lifecycle status of a canonical event.
///
/// Transitions are forward-only: `Active → Contained → Resolved`, or
/// `Active → Resolved` directly. `Resolved` is terminal.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
  #[default]
  Active,
  Contained,
  Resolved,
}

impl EventStatus {
  pub fn is_active(self) -> bool { matches!(self, Self::Active) }

  /// Whether moving from `self` to `to` is a legal forward transition.
  /// Staying in place is not a transition.
  pub fn can_transition_to(self, to: EventStatus) -> bool {
    use EventStatus::*;
    matches!(
      (self, to),
      (Active, Contained) | (Active, Resolved) | (Contained, Resolved)
    )
  }
}

// ─── Reported ────────────────────────────────────────────────────────────────

/// A candidate attribute that the source either stated or did not.
///
/// `Unknown` is explicit so downstream logic never has to guess whether a
/// field was omitted on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reported<T> {
  Known(T),
  Unknown,
}

impl<T> Default for Reported<T> {
  fn default() -> Self { Self::Unknown }
}

impl<T> Reported<T> {
  pub fn known(&self) -> Option<&T> {
    match self {
      Self::Known(v) => Some(v),
      Self::Unknown => None,
    }
  }

  pub fn into_option(self) -> Option<T> {
    match self {
      Self::Known(v) => Some(v),
      Self::Unknown => None,
    }
  }

  pub fn is_known(&self) -> bool { matches!(self, Self::Known(_)) }
}

impl<T> From<Option<T>> for Reported<T> {
  fn from(value: Option<T>) -> Self {
    value.map_or(Self::Unknown, Self::Known)
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// The report a candidate came from. Becomes an [`EventSource`] row once the
/// candidate is attached to a canonical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
  /// Collector category, e.g. `"news"`, `"search"`, `"advisory"`.
  pub source_type:       String,
  /// Natural identity of the report.
  pub url:               String,
  pub published_date:    Option<DateTime<Utc>>,
  pub retrieved_date:    DateTime<Utc>,
  pub raw_title:         String,
  /// Leading snippet of the report body.
  pub raw_content:       String,
  pub credibility_score: f64,
  pub relevance_score:   f64,
}

/// An entity name as extracted by the source, before canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntity {
  pub name:        String,
  /// Extraction confidence in `[0, 1]`.
  pub confidence:  f64,
  pub entity_type: Option<String>,
  pub industry:    Option<String>,
}

impl CandidateEntity {
  pub fn named(name: impl Into<String>, confidence: f64) -> Self {
    Self {
      name: name.into(),
      confidence,
      entity_type: None,
      industry: None,
    }
  }
}

/// One source's normalized account of a possible incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEvent {
  /// Assigned at normalization; used only for logs and offline replay.
  pub candidate_id:     Uuid,
  pub title:            String,
  pub description:      Reported<String>,
  pub event_date:       NaiveDate,
  /// In source order; the first entry is the candidate's primary entity.
  pub entities:         Vec<CandidateEntity>,
  pub event_type:       Reported<EventType>,
  pub severity:         Reported<Severity>,
  pub records_affected: Reported<u64>,
  pub status:           Reported<EventStatus>,
  /// Source confidence in `[0, 1]`.
  pub confidence:       f64,
  pub source:           SourceRecord,
}

impl CandidateEvent {
  /// A candidate with every optional attribute set to `Unknown`.
  pub fn new(
    title: impl Into<String>,
    event_date: NaiveDate,
    confidence: f64,
    source: SourceRecord,
  ) -> Self {
    Self {
      candidate_id: Uuid::new_v4(),
      title: title.into(),
      description: Reported::Unknown,
      event_date,
      entities: Vec::new(),
      event_type: Reported::Unknown,
      severity: Reported::Unknown,
      records_affected: Reported::Unknown,
      status: Reported::Unknown,
      confidence,
      source,
    }
  }

  /// The candidate's description, or `""` when unknown.
  pub fn description_text(&self) -> &str {
    self.description.known().map(String::as_str).unwrap_or("")
  }
}

// ─── Canonical ───────────────────────────────────────────────────────────────

/// The deduplicated, merged record for one real-world incident.
///
/// Never hard-deleted. Versioned attributes only change through the history
/// tracker (see [`crate::history`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
  pub event_id:         Uuid,
  pub dedup_key:        String,
  pub title:            String,
  pub description:      String,
  pub event_date:       NaiveDate,
  pub event_type:       Option<EventType>,
  pub severity:         Option<Severity>,
  pub records_affected: Option<u64>,
  pub status:           EventStatus,
  /// Aggregate confidence in `[0, 1]`; never decreases.
  pub confidence:       f64,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

/// A report attached to a canonical event. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
  pub source_id:         Uuid,
  pub event_id:          Uuid,
  pub source_type:       String,
  pub url:               String,
  pub published_date:    Option<DateTime<Utc>>,
  pub retrieved_date:    DateTime<Utc>,
  pub raw_title:         String,
  pub raw_content:       String,
  pub credibility_score: f64,
  pub relevance_score:   f64,
}

impl EventSource {
  pub fn from_record(record: &SourceRecord, event_id: Uuid) -> Self {
    Self {
      source_id: Uuid::new_v4(),
      event_id,
      source_type: record.source_type.clone(),
      url: record.url.clone(),
      published_date: record.published_date,
      retrieved_date: record.retrieved_date,
      raw_title: record.raw_title.clone(),
      raw_content: record.raw_content.clone(),
      credibility_score: record.credibility_score,
      relevance_score: record.relevance_score,
    }
  }
}

// ─── Materialised view ───────────────────────────────────────────────────────

/// A canonical event together with its linked entities and sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
  pub event:    CanonicalEvent,
  pub entities: Vec<LinkedEntity>,
  /// Ordered by retrieval.
  pub sources:  Vec<EventSource>,
}

impl EventView {
  pub fn primary_entity(&self) -> Option<&LinkedEntity> {
    self.entities.iter().find(|l| l.is_primary)
  }

  pub fn source_count(&self) -> usize { self.sources.len() }

  pub fn has_source_url(&self, url: &str) -> bool {
    self.sources.iter().any(|s| s.url == url)
  }
}
