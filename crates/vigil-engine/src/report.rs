//! Per-candidate outcomes and the batch report.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  Created { event_id: Uuid },
  /// Folded into an existing event. `score` is the match score, absent when
  /// the merge followed a persistence conflict.
  Merged { event_id: Uuid, score: Option<f64> },
  /// The source URL was already attached; nothing changed.
  Duplicate { event_id: Uuid },
}

impl Outcome {
  pub fn event_id(&self) -> Uuid {
    match self {
      Self::Created { event_id } | Self::Merged { event_id, .. } | Self::Duplicate { event_id } => {
        *event_id
      }
    }
  }
}

/// A successfully processed candidate.
#[derive(Debug)]
pub struct Processed {
  pub candidate:  Uuid,
  pub url:        String,
  pub outcome:    Outcome,
  /// Review flags and suppressed updates; none of them failed the candidate.
  pub advisories: Vec<vigil_core::Error>,
}

/// A candidate that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
  /// Candidate id, or the collector's reference for payloads that never
  /// became a candidate.
  pub candidate: String,
  pub url:       Option<String>,
  pub reason:    String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
  pub processed: Vec<Processed>,
  pub failures:  Vec<Failure>,
  /// Intake stopped early on request.
  pub cancelled: bool,
}

impl BatchReport {
  fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
    self.processed.iter().filter(|p| f(&p.outcome)).count()
  }

  pub fn created(&self) -> usize { self.count(|o| matches!(o, Outcome::Created { .. })) }

  pub fn merged(&self) -> usize { self.count(|o| matches!(o, Outcome::Merged { .. })) }

  pub fn duplicates(&self) -> usize { self.count(|o| matches!(o, Outcome::Duplicate { .. })) }

  pub fn advisories(&self) -> impl Iterator<Item = &vigil_core::Error> {
    self.processed.iter().flat_map(|p| p.advisories.iter())
  }
}

impl fmt::Display for BatchReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} created, {} merged, {} duplicate, {} failed, {} advisories",
      self.created(),
      self.merged(),
      self.duplicates(),
      self.failures.len(),
      self.advisories().count(),
    )?;
    if self.cancelled {
      write!(f, " (cancelled)")?;
    }
    Ok(())
  }
}
