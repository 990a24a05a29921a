//! [`Engine`]: one candidate in, one atomic store write out.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vigil_core::{
  canonical::{EntityCanonicalizer, ResolvedCandidate},
  event::{CandidateEvent, EventStatus, EventView},
  history::AttributeValue,
  matcher::{GateOutcome, MatchDecision, Matcher, MatcherConfig},
  merge::{MergePlan, MergePolicy, plan_correction, plan_creation, plan_merge},
  similarity::{Levenshtein, SimilarityScorer},
  store::{EventStore, GatewayError, GatewayErrorKind},
};

use crate::{
  Error, Result,
  report::{BatchReport, Failure, Outcome, Processed},
};

/// One item on the intake queue: a normalized candidate, or the reason a
/// payload could not become one.
pub type Intake = std::result::Result<CandidateEvent, vigil_core::Error>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub matcher: MatcherConfig,
  pub merge:   MergePolicy,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Drives candidates through canonicalization, matching and merging.
///
/// An engine is the single writer for its store: callers must not run two
/// engines against the same store concurrently.
pub struct Engine<S, M = Levenshtein> {
  store:         Arc<S>,
  matcher:       Matcher<M>,
  policy:        MergePolicy,
  canonicalizer: EntityCanonicalizer,
}

impl<S: EventStore> Engine<S, Levenshtein> {
  /// An engine using the default edit-distance scorer. Call
  /// [`refresh_mappings`](Self::refresh_mappings) before processing.
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self::with_scorer(store, config, Levenshtein)
  }
}

impl<S: EventStore, M: SimilarityScorer> Engine<S, M> {
  pub fn with_scorer(store: Arc<S>, config: EngineConfig, scorer: M) -> Self {
    Self {
      store,
      matcher: Matcher::new(config.matcher, scorer),
      policy: config.merge,
      canonicalizer: EntityCanonicalizer::default(),
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Reload the alias table snapshot from the store.
  pub async fn refresh_mappings(&mut self) -> Result<(), S::Error> {
    let mappings = self.store.entity_mappings().await.map_err(Error::store)?;
    tracing::debug!(mappings = mappings.len(), "loaded entity mappings");
    self.canonicalizer = EntityCanonicalizer::new(mappings);
    Ok(())
  }

  // ── Batches ───────────────────────────────────────────────────────────────

  /// Process a finite batch under the single-writer discipline.
  ///
  /// Candidates are taken in (event_date, url) order, so any permutation of
  /// the same set produces the same grouping. Per-candidate failures are
  /// recorded in the report; only an unavailable store aborts the batch.
  /// `cancel` is checked between candidates.
  pub async fn process_batch(
    &mut self,
    intake: impl IntoIterator<Item = Intake>,
    cancel: &CancellationToken,
  ) -> Result<BatchReport, S::Error> {
    self.refresh_mappings().await?;

    let mut report = BatchReport::default();
    let mut candidates = Vec::new();
    for item in intake {
      match item {
        Ok(c) => candidates.push(c),
        Err(e) => report_rejection(&mut report, e),
      }
    }
    candidates.sort_by(|a, b| {
      a.event_date
        .cmp(&b.event_date)
        .then_with(|| a.source.url.cmp(&b.source.url))
    });

    for candidate in candidates {
      if cancel.is_cancelled() {
        report.cancelled = true;
        break;
      }
      self.handle(Ok(candidate), &mut report).await?;
    }

    tracing::info!(%report, "batch complete");
    Ok(report)
  }

  /// Process one intake item into `report`. Returns `Err` only when the run
  /// must stop.
  pub async fn handle(&self, item: Intake, report: &mut BatchReport) -> Result<(), S::Error> {
    let candidate = match item {
      Ok(c) => c,
      Err(e) => {
        report_rejection(report, e);
        return Ok(());
      }
    };

    let candidate_id = candidate.candidate_id;
    let url = candidate.source.url.clone();
    match self.process(candidate).await {
      Ok(processed) => report.processed.push(processed),
      Err(e) if e.is_fatal() => {
        tracing::error!(candidate = %candidate_id, %url, error = %e, "aborting run");
        return Err(e);
      }
      Err(e) => {
        tracing::warn!(candidate = %candidate_id, %url, error = %e, "candidate failed");
        report.failures.push(Failure {
          candidate: candidate_id.to_string(),
          url:       Some(url),
          reason:    e.to_string(),
        });
      }
    }
    Ok(())
  }

  // ── One candidate ─────────────────────────────────────────────────────────

  /// Match and merge (or create) one candidate.
  pub async fn process(&self, candidate: CandidateEvent) -> Result<Processed, S::Error> {
    let resolved = self.canonicalizer.resolve_candidate(candidate);
    let c = &resolved.candidate;
    let candidate_id = c.candidate_id;
    let url = c.source.url.clone();

    let (outcome, advisories) = self.route(&resolved).await?;

    for advisory in &advisories {
      tracing::warn!(candidate = %candidate_id, %url, "{advisory}");
    }
    match outcome {
      Outcome::Created { event_id } => {
        tracing::info!(candidate = %candidate_id, %url, %event_id, "created canonical event")
      }
      Outcome::Merged { event_id, score } => {
        tracing::info!(candidate = %candidate_id, %url, %event_id, ?score, "merged into canonical event")
      }
      Outcome::Duplicate { event_id } => {
        tracing::debug!(candidate = %candidate_id, %url, %event_id, "source already attached")
      }
    }

    Ok(Processed { candidate: candidate_id, url, outcome, advisories })
  }

  async fn route(
    &self,
    resolved: &ResolvedCandidate,
  ) -> Result<(Outcome, Vec<vigil_core::Error>), S::Error> {
    let c = &resolved.candidate;

    if let Some(existing) = self
      .store
      .find_source_by_url(&c.source.url)
      .await
      .map_err(Error::store)?
    {
      return Ok((Outcome::Duplicate { event_id: existing.event_id }, Vec::new()));
    }

    let (from, to) = self.matcher.window(c.event_date);
    let pool = self
      .store
      .active_events_between(from, to)
      .await
      .map_err(Error::store)?;
    let decision = self.matcher.decide(resolved, &pool);

    match &decision {
      MatchDecision::NoMatch { closest } => {
        if let Some(closest) = closest {
          tracing::debug!(
            candidate = %c.candidate_id,
            closest = %closest.event_id,
            score = closest.score.combined,
            gate = ?closest.gate,
            "no match"
          );
        }
        self.create(resolved).await
      }
      MatchDecision::Match { chosen, .. } => {
        tracing::debug!(
          candidate = %c.candidate_id,
          event_id = %chosen.event_id,
          score = chosen.score.combined,
          gate = ?chosen.gate,
          "matched"
        );
        let mut advisories: Vec<_> = decision.ambiguity(c.candidate_id).into_iter().collect();
        let view = pool
          .into_iter()
          .find(|v| v.event.event_id == chosen.event_id)
          .ok_or(vigil_core::Error::EventNotFound(chosen.event_id))?;
        let (outcome, suppressed) = self
          .merge_into(view, resolved, chosen.gate, Some(chosen.score.combined))
          .await?;
        advisories.extend(suppressed);
        Ok((outcome, advisories))
      }
    }
  }

  async fn create(
    &self,
    resolved: &ResolvedCandidate,
  ) -> Result<(Outcome, Vec<vigil_core::Error>), S::Error> {
    let creation = plan_creation(resolved, Utc::now());
    let dedup_key = creation.event.dedup_key.clone();

    match self.store.create_event(creation).await {
      Ok(view) => Ok((Outcome::Created { event_id: view.event.event_id }, Vec::new())),
      Err(e) if e.kind() == GatewayErrorKind::Conflict => {
        tracing::info!(
          candidate = %resolved.candidate.candidate_id,
          %dedup_key,
          "dedup key or url already taken; merging into existing row"
        );
        self.recover_creation(resolved, dedup_key).await
      }
      Err(e) => Err(Error::store(e)),
    }
  }

  /// Re-read after a conflicting creation and merge into whatever now owns
  /// the key or the URL.
  async fn recover_creation(
    &self,
    resolved: &ResolvedCandidate,
    dedup_key: String,
  ) -> Result<(Outcome, Vec<vigil_core::Error>), S::Error> {
    let url = &resolved.candidate.source.url;
    if let Some(existing) = self.store.find_source_by_url(url).await.map_err(Error::store)? {
      return Ok((Outcome::Duplicate { event_id: existing.event_id }, Vec::new()));
    }

    let Some(view) = self
      .store
      .find_active_by_dedup_key(&dedup_key)
      .await
      .map_err(Error::store)?
    else {
      return Err(vigil_core::Error::PersistenceConflict { dedup_key }.into());
    };

    let gate = self.matcher.score(resolved, &view).gate;
    let gate = if gate.blocks() { GateOutcome::Skipped } else { gate };
    self.merge_into(view, resolved, gate, None).await
  }

  /// Plan and apply a merge, re-reading and re-planning once on conflict.
  async fn merge_into(
    &self,
    mut view: EventView,
    resolved: &ResolvedCandidate,
    gate: GateOutcome,
    score: Option<f64>,
  ) -> Result<(Outcome, Vec<vigil_core::Error>), S::Error> {
    let mut retried = false;
    loop {
      let (update, suppressed) =
        match plan_merge(&view, resolved, gate, &self.policy, Utc::now())? {
          MergePlan::Duplicate { event_id } => {
            return Ok((Outcome::Duplicate { event_id }, Vec::new()));
          }
          MergePlan::Update { update, suppressed } => (update, suppressed),
        };

      match self.store.apply_update(update).await {
        Ok(after) => {
          let event_id = after.event.event_id;
          return Ok((Outcome::Merged { event_id, score }, suppressed));
        }
        Err(e) if e.kind() == GatewayErrorKind::Conflict && !retried => {
          tracing::info!(event_id = %view.event.event_id, error = %e, "write conflict; retrying once");
          retried = true;
          view = self.reload(view.event.event_id).await?;
        }
        Err(e) if e.kind() == GatewayErrorKind::Conflict => {
          return Err(
            vigil_core::Error::PersistenceConflict { dedup_key: view.event.dedup_key }.into(),
          );
        }
        Err(e) => return Err(Error::store(e)),
      }
    }
  }

  async fn reload(&self, event_id: Uuid) -> Result<EventView, S::Error> {
    self
      .store
      .get_event(event_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| vigil_core::Error::EventNotFound(event_id).into())
  }

  // ── Operator corrections ──────────────────────────────────────────────────

  /// Correct an event's date. The change is logged with no originating
  /// source and the dedup key follows the new date.
  pub async fn correct_event_date(
    &self,
    event_id: Uuid,
    date: NaiveDate,
  ) -> Result<EventView, S::Error> {
    self.correct(event_id, AttributeValue::EventDate(date)).await
  }

  /// Move an event forward through its status machine.
  pub async fn transition_status(
    &self,
    event_id: Uuid,
    status: EventStatus,
  ) -> Result<EventView, S::Error> {
    self.correct(event_id, AttributeValue::Status(status)).await
  }

  async fn correct(&self, event_id: Uuid, value: AttributeValue) -> Result<EventView, S::Error> {
    let mut view = self.reload(event_id).await?;
    let mut retried = false;
    loop {
      let Some(update) = plan_correction(&view, value.clone(), Utc::now())? else {
        return Ok(view);
      };
      match self.store.apply_update(update).await {
        Ok(after) => {
          tracing::info!(%event_id, change = ?value, "applied correction");
          return Ok(after);
        }
        Err(e) if e.kind() == GatewayErrorKind::Conflict && !retried => {
          retried = true;
          view = self.reload(event_id).await?;
        }
        Err(e) if e.kind() == GatewayErrorKind::Conflict => {
          return Err(
            vigil_core::Error::PersistenceConflict { dedup_key: view.event.dedup_key }.into(),
          );
        }
        Err(e) => return Err(Error::store(e)),
      }
    }
  }
}

fn report_rejection(report: &mut BatchReport, error: vigil_core::Error) {
  tracing::warn!(error = %error, "rejected candidate");
  let candidate = match &error {
    vigil_core::Error::IncompleteCandidate { candidate, .. } => candidate.clone(),
    _ => String::from("unknown"),
  };
  report.failures.push(Failure {
    candidate,
    url: None,
    reason: error.to_string(),
  });
}
