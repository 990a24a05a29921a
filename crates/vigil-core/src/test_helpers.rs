//! Fixtures shared by the unit tests in this crate.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{
  canonical::{EntityCanonicalizer, ResolvedCandidate},
  entity::{Entity, LinkedEntity},
  event::{CandidateEntity, CandidateEvent, CanonicalEvent, EventSource, EventStatus, EventView, SourceRecord},
  merge::EventCreation,
  text::dedup_key,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn record(url: String, title: &str) -> SourceRecord {
  SourceRecord {
    source_type: "news".into(),
    url,
    published_date: None,
    retrieved_date: Utc::now(),
    raw_title: title.into(),
    raw_content: String::new(),
    credibility_score: 0.5,
    relevance_score: 0.5,
  }
}

/// A candidate with a unique URL, confidence 0.7 and, optionally, one entity
/// extracted at confidence 0.9.
pub fn candidate(title: &str, event_date: NaiveDate, entity: Option<&str>) -> CandidateEvent {
  let url = format!("https://news.example.com/{}", Uuid::new_v4());
  let mut c = CandidateEvent::new(title, event_date, 0.7, record(url, title));
  if let Some(name) = entity {
    c.entities.push(CandidateEntity::named(name, 0.9));
  }
  c
}

pub fn resolved(candidate: CandidateEvent) -> ResolvedCandidate {
  EntityCanonicalizer::default().resolve_candidate(candidate)
}

/// An Active event with `sources` distinct sources and, optionally, a primary
/// entity stored under exactly the given name.
pub fn view(
  title: &str,
  event_date: NaiveDate,
  entity: Option<&str>,
  sources: usize,
) -> EventView {
  let now = Utc::now();
  let event = CanonicalEvent {
    event_id: Uuid::new_v4(),
    dedup_key: dedup_key(title, event_date),
    title: title.into(),
    description: String::new(),
    event_date,
    event_type: None,
    severity: None,
    records_affected: None,
    status: EventStatus::Active,
    confidence: 0.5,
    created_at: now,
    updated_at: now,
  };
  let entities = entity
    .map(|name| LinkedEntity {
      entity:     Entity {
        entity_id:      Uuid::new_v4(),
        canonical_name: name.into(),
        entity_type:    None,
        industry:       None,
      },
      is_primary: true,
      confidence: 0.8,
    })
    .into_iter()
    .collect();
  let sources = (0..sources)
    .map(|i| {
      let url = format!("https://news.example.com/{}/{i}", event.event_id);
      EventSource::from_record(&record(url, title), event.event_id)
    })
    .collect();
  EventView { event, entities, sources }
}

/// The view a store would materialise right after applying `creation`.
pub fn view_from_creation(creation: &EventCreation) -> EventView {
  let entities = creation
    .links
    .iter()
    .map(|l| LinkedEntity {
      entity:     Entity {
        entity_id:      Uuid::new_v4(),
        canonical_name: l.canonical_name.clone(),
        entity_type:    l.entity_type.clone(),
        industry:       l.industry.clone(),
      },
      is_primary: l.is_primary,
      confidence: l.confidence,
    })
    .collect();
  EventView {
    event: creation.event.clone(),
    entities,
    sources: vec![creation.source.clone()],
  }
}
