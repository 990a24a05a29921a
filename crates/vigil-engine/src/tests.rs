//! End-to-end tests for the engine against an in-memory SQLite store.

use std::{
  collections::{BTreeSet, HashMap, HashSet},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vigil_core::{
  entity::{EntityMapping, RelationshipType},
  event::{
    CandidateEntity, CandidateEvent, EventSource, EventStatus, EventView, Reported, Severity,
    SourceRecord,
  },
  history::{AttributeHistoryEntry, AttributeName, AttributeSnapshot, replay},
  merge::{EventCreation, EventUpdate},
  store::{EventQuery, EventStore, GatewayError, GatewayErrorKind},
};
use vigil_store_sqlite::SqliteStore;

use crate::{Engine, EngineConfig, Error, Intake, Outcome, worker};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn candidate(title: &str, event_date: NaiveDate, entity: Option<&str>) -> CandidateEvent {
  let url = format!("https://news.example.com/{}", Uuid::new_v4());
  candidate_at(title, event_date, entity, &url)
}

fn candidate_at(title: &str, event_date: NaiveDate, entity: Option<&str>, url: &str) -> CandidateEvent {
  let source = SourceRecord {
    source_type:       "news".into(),
    url:               url.into(),
    published_date:    None,
    retrieved_date:    Utc::now(),
    raw_title:         title.into(),
    raw_content:       String::new(),
    credibility_score: 0.5,
    relevance_score:   0.5,
  };
  let mut c = CandidateEvent::new(title, event_date, 0.6, source);
  if let Some(name) = entity {
    c.entities.push(CandidateEntity::named(name, 0.8));
  }
  c
}

async fn engine() -> Engine<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Engine::new(Arc::new(store), EngineConfig::default())
}

async fn engine_with(mappings: &[(&str, &str)]) -> Engine<SqliteStore> {
  let mut engine = engine().await;
  for (alias, canonical) in mappings {
    engine
      .store()
      .put_entity_mapping(EntityMapping {
        source_entity:     (*alias).into(),
        canonical_entity:  (*canonical).into(),
        relationship_type: RelationshipType::Subsidiary,
      })
      .await
      .unwrap();
  }
  engine.refresh_mappings().await.unwrap();
  engine
}

async fn all_events<S: EventStore>(store: &S) -> Vec<EventView> {
  store.query_events(&EventQuery::default()).await.unwrap()
}

fn batch(candidates: Vec<CandidateEvent>) -> Vec<Intake> { candidates.into_iter().map(Ok).collect() }

/// Groups of source URLs, one per canonical event, in a canonical order.
fn partition(events: &[EventView]) -> BTreeSet<BTreeSet<String>> {
  events
    .iter()
    .map(|v| v.sources.iter().map(|s| s.url.clone()).collect())
    .collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn qantas_reports_merge_through_alias() {
  let mut engine = engine_with(&[("Qantas Airways", "Qantas")]).await;
  let description = "Personal data of millions of customers was exposed after an \
                     attack on a third-party contact centre platform.";

  let mut a = candidate("Qantas data breach", date(2025, 6, 30), Some("Qantas"));
  a.description = Reported::Known(description.into());
  let mut b = candidate("Qantas Airways data breach", date(2025, 6, 30), Some("Qantas Airways"));
  b.description = Reported::Known(description.into());

  let report = engine
    .process_batch(batch(vec![a, b]), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.created(), 1);
  assert_eq!(report.merged(), 1);

  let events = all_events(engine.store().as_ref()).await;
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].sources.len(), 2);
  assert_eq!(events[0].primary_entity().unwrap().entity.canonical_name, "Qantas");
}

#[tokio::test]
async fn qantas_reports_merge_with_reported_scores() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  // Title similarity 0.87, entity similarity 0.9.
  let scorer = |a: &str, b: &str| {
    if a == b {
      1.0
    } else if a.contains("breach") {
      0.87
    } else {
      0.9
    }
  };
  let mut engine = Engine::with_scorer(store, EngineConfig::default(), scorer);

  let a = candidate("Qantas data breach", date(2025, 6, 30), Some("Qantas"));
  let b = candidate("Qantas Airways data breach", date(2025, 6, 30), Some("Qantas Airways"));
  let report = engine
    .process_batch(batch(vec![a, b]), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.created(), 1);
  let merged = report
    .processed
    .iter()
    .find_map(|p| match p.outcome {
      Outcome::Merged { score, .. } => score,
      _ => None,
    })
    .unwrap();
  assert!((merged - 0.87).abs() < 1e-9);

  let events = all_events(engine.store().as_ref()).await;
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].sources.len(), 2);
}

#[tokio::test]
async fn higher_confidence_count_replaces_lower() {
  let engine = engine().await;

  let mut first = candidate("Acme Corp data breach", date(2025, 3, 1), Some("Acme Corp"));
  first.records_affected = Reported::Known(1000);
  first.confidence = 0.6;
  let created = engine.process(first).await.unwrap();

  let mut second = candidate("Acme Corp data breach", date(2025, 3, 2), Some("Acme Corp"));
  second.records_affected = Reported::Known(50_000);
  second.confidence = 0.85;
  let second_url = second.source.url.clone();
  let merged = engine.process(second).await.unwrap();
  assert!(merged.advisories.is_empty());
  assert_eq!(merged.outcome.event_id(), created.outcome.event_id());

  let id = created.outcome.event_id();
  let view = engine.store().get_event(id).await.unwrap().unwrap();
  assert_eq!(view.event.records_affected, Some(50_000));

  let history = engine.store().history(id).await.unwrap();
  let change = history
    .iter()
    .filter(|e| e.attribute_name == AttributeName::RecordsAffected)
    .last()
    .unwrap();
  assert_eq!(change.old_value.as_deref(), Some("1000"));
  assert_eq!(change.new_value.as_deref(), Some("50000"));
  let origin = view.sources.iter().find(|s| s.url == second_url).unwrap();
  assert_eq!(change.event_source_id, Some(origin.source_id));
}

#[tokio::test]
async fn lower_confidence_count_is_suppressed() {
  let engine = engine().await;

  let mut first = candidate("Acme Corp data breach", date(2025, 3, 1), None);
  first.records_affected = Reported::Known(50_000);
  first.confidence = 0.85;
  let id = engine.process(first).await.unwrap().outcome.event_id();
  let before = engine.store().history(id).await.unwrap().len();

  let mut second = candidate("Acme Corp data breach", date(2025, 3, 1), None);
  second.records_affected = Reported::Known(1000);
  second.confidence = 0.6;
  let processed = engine.process(second).await.unwrap();

  assert!(matches!(
    processed.advisories.as_slice(),
    [vigil_core::Error::ConflictingAttributeUpdate { .. }]
  ));
  let view = engine.store().get_event(id).await.unwrap().unwrap();
  assert_eq!(view.event.records_affected, Some(50_000));
  assert_eq!(view.sources.len(), 2);
  assert_eq!(engine.store().history(id).await.unwrap().len(), before);
}

#[tokio::test]
async fn unstorable_count_fails_without_diverging_history() {
  let engine = engine().await;

  let mut huge = candidate("Initech data breach", date(2025, 5, 1), None);
  huge.records_affected = Reported::Known(u64::MAX);
  let err = engine.process(huge).await.unwrap_err();
  assert!(!err.is_fatal());
  assert!(matches!(err, Error::Store(vigil_store_sqlite::Error::Encode { .. })));
  assert!(all_events(engine.store().as_ref()).await.is_empty());

  let mut first = candidate("Initech data breach", date(2025, 5, 1), None);
  first.records_affected = Reported::Known(1000);
  first.confidence = 0.6;
  let id = engine.process(first).await.unwrap().outcome.event_id();

  let mut second = candidate("Initech data breach", date(2025, 5, 1), None);
  second.records_affected = Reported::Known(u64::MAX);
  second.confidence = 0.9;
  assert!(engine.process(second).await.is_err());

  let view = engine.store().get_event(id).await.unwrap().unwrap();
  assert_eq!(view.event.records_affected, Some(1000));
  assert_eq!(view.sources.len(), 1);
  let history = engine.store().history(id).await.unwrap();
  assert_eq!(replay(&history).unwrap(), AttributeSnapshot::of(&view));
}

#[tokio::test]
async fn unrelated_reports_stay_apart() {
  let mut engine = engine().await;
  let a = candidate("Hospital network hit by ransomware", date(2025, 4, 10), Some("Mercy Health"));
  let b = candidate("Retailer card skimming disclosed", date(2025, 4, 10), Some("ShopMart"));

  let report = engine
    .process_batch(batch(vec![a, b]), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.created(), 2);
  assert_eq!(all_events(engine.store().as_ref()).await.len(), 2);
}

#[tokio::test]
async fn same_url_twice_changes_nothing() {
  let engine = engine().await;
  let url = "https://news.example.com/acme";
  let first = engine
    .process(candidate_at("Acme breach", date(2025, 1, 1), None, url))
    .await
    .unwrap();
  let id = first.outcome.event_id();
  let before = engine.store().get_event(id).await.unwrap().unwrap();
  let history_before = engine.store().history(id).await.unwrap();

  let mut again = candidate_at("Acme breach", date(2025, 1, 1), None, url);
  again.severity = Reported::Known(Severity::Critical);
  again.confidence = 1.0;
  let second = engine.process(again).await.unwrap();

  assert_eq!(second.outcome, Outcome::Duplicate { event_id: id });
  assert_eq!(engine.store().get_event(id).await.unwrap().unwrap(), before);
  assert_eq!(engine.store().history(id).await.unwrap(), history_before);
}

#[tokio::test]
async fn subsidiary_alias_groups_with_parent() {
  let mappings = [("Ticketmaster LLC", "Live Nation Entertainment, Inc")];
  let existing = || candidate("Live Nation data breach", date(2024, 5, 28), Some("Live Nation Entertainment, Inc"));
  let incoming = || candidate("Live Nation data breaches", date(2024, 5, 29), Some("Ticketmaster LLC"));

  let mut mapped = engine_with(&mappings).await;
  mapped
    .process_batch(batch(vec![existing(), incoming()]), &CancellationToken::new())
    .await
    .unwrap();
  let events = all_events(mapped.store().as_ref()).await;
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].sources.len(), 2);
  assert_eq!(events[0].entities.len(), 1);

  // Without the mapping the entity gate keeps them apart.
  let mut unmapped = engine().await;
  unmapped
    .process_batch(batch(vec![existing(), incoming()]), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(all_events(unmapped.store().as_ref()).await.len(), 2);
}

// ─── Properties ──────────────────────────────────────────────────────────────

fn mixed_batch() -> Vec<CandidateEvent> {
  let rows = [
    ("Acme Corp data breach", 1, Some("Acme Corp"), "a1"),
    ("Acme Corp data breach", 2, Some("Acme Corp"), "a2"),
    ("ACME corp data breach.", 3, None, "a3"),
    ("Globex ransomware attack", 2, Some("Globex"), "g1"),
    ("Globex ransomware attacks", 4, Some("Globex"), "g2"),
    ("Initech payroll phishing", 2, Some("Initech"), "i1"),
    ("Acme Corp data breach", 2, Some("Zenith Ltd"), "z1"),
    ("Umbrella supply chain compromise", 20, None, "u1"),
  ];
  rows
    .iter()
    .map(|(title, day, entity, slug)| {
      let mut c = candidate_at(title, date(2025, 5, *day), *entity, &format!("https://feed.example/{slug}"));
      c.severity = Reported::Known(if day % 2 == 0 { Severity::High } else { Severity::Medium });
      c
    })
    .collect()
}

#[tokio::test]
async fn grouping_is_independent_of_input_order() {
  let mut forward = engine().await;
  forward
    .process_batch(batch(mixed_batch()), &CancellationToken::new())
    .await
    .unwrap();

  let mut reversed_input = mixed_batch();
  reversed_input.reverse();
  let mut reversed = engine().await;
  reversed
    .process_batch(batch(reversed_input), &CancellationToken::new())
    .await
    .unwrap();

  let a = partition(&all_events(forward.store().as_ref()).await);
  let b = partition(&all_events(reversed.store().as_ref()).await);
  assert_eq!(a, b);
  assert!(a.len() >= 3);
}

#[tokio::test]
async fn resubmitting_a_batch_is_idempotent() {
  let mut engine = engine().await;
  engine
    .process_batch(batch(mixed_batch()), &CancellationToken::new())
    .await
    .unwrap();
  let events = all_events(engine.store().as_ref()).await;
  let mut histories = HashMap::new();
  for v in &events {
    histories.insert(v.event.event_id, engine.store().history(v.event.event_id).await.unwrap());
  }

  let report = engine
    .process_batch(batch(mixed_batch()), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.duplicates(), mixed_batch().len());
  assert_eq!(all_events(engine.store().as_ref()).await, events);
  for v in &events {
    assert_eq!(
      engine.store().history(v.event.event_id).await.unwrap(),
      histories[&v.event.event_id]
    );
  }
}

#[tokio::test]
async fn confidence_never_decreases() {
  let engine = engine().await;
  let mut last = 0.0;
  let mut id = None;
  for (i, confidence) in [0.9, 0.3, 0.5, 0.2, 0.95, 0.1].into_iter().enumerate() {
    let mut c = candidate("Acme Corp data breach", date(2025, 3, 1 + i as u32 % 3), Some("Acme Corp"));
    c.confidence = confidence;
    let processed = engine.process(c).await.unwrap();
    let event_id = processed.outcome.event_id();
    assert_eq!(*id.get_or_insert(event_id), event_id);

    let now = engine.store().get_event(event_id).await.unwrap().unwrap().event.confidence;
    assert!(now >= last, "{now} < {last}");
    assert!(now <= 1.0);
    last = now;
  }
}

#[tokio::test]
async fn history_replays_to_current_state() {
  let mut engine = engine().await;
  engine
    .process_batch(batch(mixed_batch()), &CancellationToken::new())
    .await
    .unwrap();

  let target = all_events(engine.store().as_ref()).await[0].event.event_id;
  engine.transition_status(target, EventStatus::Contained).await.unwrap();
  engine.correct_event_date(target, date(2025, 4, 30)).await.unwrap();

  for view in all_events(engine.store().as_ref()).await {
    let history = engine.store().history(view.event.event_id).await.unwrap();
    assert_eq!(replay(&history).unwrap(), AttributeSnapshot::of(&view), "{}", view.event.title);
  }
}

#[tokio::test]
async fn active_dedup_keys_stay_unique() {
  let mut engine = engine().await;
  let mut candidates = mixed_batch();
  for i in 0..5 {
    let vendor = format!("Vendor {i}");
    candidates.push(candidate("Acme Corp data breach", date(2025, 5, 2), Some(vendor.as_str())));
  }
  engine
    .process_batch(batch(candidates), &CancellationToken::new())
    .await
    .unwrap();

  let active = engine
    .store()
    .query_events(&EventQuery { status: Some(EventStatus::Active), ..Default::default() })
    .await
    .unwrap();
  let keys: HashSet<&str> = active.iter().map(|v| v.event.dedup_key.as_str()).collect();
  assert_eq!(keys.len(), active.len());
}

#[tokio::test]
async fn ambiguous_match_is_flagged() {
  let engine = engine().await;
  let a = engine
    .process(candidate("Acme breach", date(2025, 3, 1), Some("Acme Corp")))
    .await
    .unwrap();
  let b = engine
    .process(candidate("Acme breach", date(2025, 3, 3), Some("Zenith Ltd")))
    .await
    .unwrap();
  assert_ne!(a.outcome.event_id(), b.outcome.event_id());

  let c = engine
    .process(candidate("Acme breach", date(2025, 3, 2), None))
    .await
    .unwrap();
  assert_eq!(c.outcome.event_id(), a.outcome.event_id());
  assert!(matches!(
    c.advisories.as_slice(),
    [vigil_core::Error::AmbiguousMatch { chosen, runner_up, .. }]
      if *chosen == a.outcome.event_id() && *runner_up == b.outcome.event_id()
  ));
}

// ─── Conflicts and failures ──────────────────────────────────────────────────

#[tokio::test]
async fn key_collision_merges_into_existing_row() {
  let engine = engine().await;
  let first = engine
    .process(candidate("Acme breach", date(2025, 1, 1), Some("Acme Corp")))
    .await
    .unwrap();

  // Entity gate fails, so this is planned as a creation and collides on the key.
  let second = engine
    .process(candidate("Acme breach", date(2025, 1, 1), Some("Zenith Ltd")))
    .await
    .unwrap();
  assert_eq!(
    second.outcome,
    Outcome::Merged { event_id: first.outcome.event_id(), score: None }
  );

  let events = all_events(engine.store().as_ref()).await;
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].sources.len(), 2);
  assert_eq!(events[0].entities.len(), 2);
}

/// Wraps a store and injects failures.
struct Flaky {
  inner:     SqliteStore,
  conflicts: AtomicUsize,
  down:      AtomicBool,
}

impl Flaky {
  async fn new() -> Self {
    Self {
      inner:     SqliteStore::open_in_memory().await.unwrap(),
      conflicts: AtomicUsize::new(0),
      down:      AtomicBool::new(false),
    }
  }

  fn check(&self) -> Result<(), FlakyError> {
    if self.down.load(Ordering::SeqCst) {
      return Err(FlakyError::Down);
    }
    Ok(())
  }
}

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error(transparent)]
  Inner(#[from] vigil_store_sqlite::Error),
  #[error("injected conflict")]
  Conflict,
  #[error("injected outage")]
  Down,
}

impl GatewayError for FlakyError {
  fn kind(&self) -> GatewayErrorKind {
    match self {
      Self::Inner(e) => e.kind(),
      Self::Conflict => GatewayErrorKind::Conflict,
      Self::Down => GatewayErrorKind::Unavailable,
    }
  }
}

impl EventStore for Flaky {
  type Error = FlakyError;

  async fn entity_mappings(&self) -> Result<Vec<EntityMapping>, FlakyError> {
    self.check()?;
    Ok(self.inner.entity_mappings().await?)
  }

  async fn put_entity_mapping(&self, mapping: EntityMapping) -> Result<(), FlakyError> {
    self.check()?;
    Ok(self.inner.put_entity_mapping(mapping).await?)
  }

  async fn find_source_by_url(&self, url: &str) -> Result<Option<EventSource>, FlakyError> {
    self.check()?;
    Ok(self.inner.find_source_by_url(url).await?)
  }

  async fn find_active_by_dedup_key(&self, key: &str) -> Result<Option<EventView>, FlakyError> {
    self.check()?;
    Ok(self.inner.find_active_by_dedup_key(key).await?)
  }

  async fn active_events_between(
    &self,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<EventView>, FlakyError> {
    self.check()?;
    Ok(self.inner.active_events_between(from, to).await?)
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<EventView>, FlakyError> {
    self.check()?;
    Ok(self.inner.get_event(event_id).await?)
  }

  async fn query_events(&self, query: &EventQuery) -> Result<Vec<EventView>, FlakyError> {
    self.check()?;
    Ok(self.inner.query_events(query).await?)
  }

  async fn history(&self, event_id: Uuid) -> Result<Vec<AttributeHistoryEntry>, FlakyError> {
    self.check()?;
    Ok(self.inner.history(event_id).await?)
  }

  async fn create_event(&self, creation: EventCreation) -> Result<EventView, FlakyError> {
    self.check()?;
    Ok(self.inner.create_event(creation).await?)
  }

  async fn apply_update(&self, update: EventUpdate) -> Result<EventView, FlakyError> {
    self.check()?;
    let injected = self
      .conflicts
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected {
      return Err(FlakyError::Conflict);
    }
    Ok(self.inner.apply_update(update).await?)
  }
}

#[tokio::test]
async fn update_conflict_is_retried_once() {
  let engine = Engine::new(Arc::new(Flaky::new().await), EngineConfig::default());
  let first = engine
    .process(candidate("Acme breach", date(2025, 1, 1), None))
    .await
    .unwrap();

  engine.store().conflicts.store(1, Ordering::SeqCst);
  let second = engine
    .process(candidate("Acme breach", date(2025, 1, 2), None))
    .await
    .unwrap();
  assert!(matches!(second.outcome, Outcome::Merged { event_id, .. } if event_id == first.outcome.event_id()));
  let view = engine.store().get_event(first.outcome.event_id()).await.unwrap().unwrap();
  assert_eq!(view.sources.len(), 2);
}

#[tokio::test]
async fn repeated_conflict_fails_only_that_candidate() {
  let mut engine = Engine::new(Arc::new(Flaky::new().await), EngineConfig::default());
  engine
    .process(candidate("Acme breach", date(2025, 1, 1), None))
    .await
    .unwrap();

  engine.store().conflicts.store(2, Ordering::SeqCst);
  let report = engine
    .process_batch(
      batch(vec![
        candidate("Acme breach", date(2025, 1, 2), None),
        candidate("Globex outage", date(2025, 1, 3), None),
      ]),
      &CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(report.failures.len(), 1);
  assert!(report.failures[0].reason.contains("persistence conflict"));
  assert_eq!(report.created(), 1);
}

#[tokio::test]
async fn unavailable_store_aborts_the_batch() {
  let mut engine = Engine::new(Arc::new(Flaky::new().await), EngineConfig::default());
  engine.store().down.store(true, Ordering::SeqCst);

  let err = engine
    .process_batch(
      batch(vec![candidate("Acme breach", date(2025, 1, 1), None)]),
      &CancellationToken::new(),
    )
    .await
    .unwrap_err();
  assert!(err.is_fatal());
  assert!(matches!(err, Error::StoreUnavailable(FlakyError::Down)));
}

#[tokio::test]
async fn rejected_payloads_are_reported_not_dropped() {
  let mut engine = engine().await;
  let intake = vec![
    Err(vigil_core::Error::IncompleteCandidate {
      candidate: "feed.jsonl:3".into(),
      reason:    "no non-empty title".into(),
    }),
    Ok(candidate("Acme breach", date(2025, 1, 1), None)),
  ];
  let report = engine
    .process_batch(intake, &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.created(), 1);
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].candidate, "feed.jsonl:3");
}

#[tokio::test]
async fn cancelled_batch_takes_nothing_new() {
  let mut engine = engine().await;
  let cancel = CancellationToken::new();
  cancel.cancel();
  let report = engine
    .process_batch(batch(mixed_batch()), &cancel)
    .await
    .unwrap();
  assert!(report.cancelled);
  assert!(report.processed.is_empty());
  assert!(all_events(engine.store().as_ref()).await.is_empty());
}

// ─── Operator corrections ────────────────────────────────────────────────────

#[tokio::test]
async fn status_only_moves_forward() {
  let engine = engine().await;
  let id = engine
    .process(candidate("Acme breach", date(2025, 1, 1), None))
    .await
    .unwrap()
    .outcome
    .event_id();

  let resolved = engine.transition_status(id, EventStatus::Resolved).await.unwrap();
  assert_eq!(resolved.event.status, EventStatus::Resolved);

  let err = engine.transition_status(id, EventStatus::Active).await.unwrap_err();
  assert!(matches!(err, Error::Core(vigil_core::Error::InvalidStatusTransition { .. })));

  // A resolved event no longer absorbs new reports.
  let fresh = engine
    .process(candidate("Acme breach", date(2025, 1, 1), None))
    .await
    .unwrap();
  assert!(matches!(fresh.outcome, Outcome::Created { event_id } if event_id != id));
}

#[tokio::test]
async fn correcting_a_missing_event_fails() {
  let engine = engine().await;
  let err = engine
    .correct_event_date(Uuid::new_v4(), date(2025, 1, 1))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(vigil_core::Error::EventNotFound(_))));
}

// ─── Worker ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn worker_drains_queue_in_arrival_order() {
  let engine = engine().await;
  let store = engine.store().clone();
  let (tx, rx) = worker::channel(4);
  let handle = tokio::spawn(worker::Worker::new(engine, rx, CancellationToken::new()).run());

  tx.send(Ok(candidate("Acme breach", date(2025, 1, 1), None))).await.unwrap();
  tx.send(Err(vigil_core::Error::IncompleteCandidate {
    candidate: "feed.jsonl:2".into(),
    reason:    "no source url".into(),
  }))
  .await
  .unwrap();
  tx.send(Ok(candidate("Acme breach", date(2025, 1, 2), None))).await.unwrap();
  drop(tx);

  let report = handle.await.unwrap().unwrap();
  assert_eq!(report.created(), 1);
  assert_eq!(report.merged(), 1);
  assert_eq!(report.failures.len(), 1);
  assert!(!report.cancelled);
  assert_eq!(all_events(store.as_ref()).await.len(), 1);
}

#[tokio::test]
async fn cancelled_worker_stops() {
  let engine = engine().await;
  let (tx, rx) = worker::channel(4);
  let cancel = CancellationToken::new();
  let handle = tokio::spawn(worker::Worker::new(engine, rx, cancel.clone()).run());

  cancel.cancel();
  let report = handle.await.unwrap().unwrap();
  assert!(report.cancelled);
  assert!(tx.send(Ok(candidate("late", date(2025, 1, 1), None))).await.is_err());
}
