//! Similarity matching of a candidate against existing canonical events.
//!
//! The decision is a pure function of the candidate, the pool of canonical
//! events, the configuration, and the scorer. Ties are broken on a total
//! order, so identical inputs always produce identical decisions regardless
//! of pool order.
//!
//! Scoring for each eligible event:
//!
//! 1. **Entity gate.** When both sides have a primary entity the normalized
//!    names must reach `entity_threshold`. When either side has none, the
//!    gate is skipped.
//! 2. **Text similarity.** Mean of the lowercase title ratio and the ratio of
//!    the first `description_prefix` characters of each description. When
//!    either description is empty only the title ratio counts.
//! 3. **Decision.** `combined >= match_threshold` and the gate did not fail.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  canonical::ResolvedCandidate,
  event::EventView,
  similarity::{Levenshtein, SimilarityScorer},
  text::{normalize, prefix_chars},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
  /// Canonical events within this many days of the candidate's date are
  /// considered.
  pub window_days:        i64,
  pub match_threshold:    f64,
  pub entity_threshold:   f64,
  /// Characters of each description compared.
  pub description_prefix: usize,
  /// A runner-up that also matches within this margin of the winner flags the
  /// decision as ambiguous.
  pub ambiguity_margin:   f64,
}

impl Default for MatcherConfig {
  fn default() -> Self {
    Self {
      window_days:        7,
      match_threshold:    0.8,
      entity_threshold:   0.8,
      description_prefix: 200,
      ambiguity_margin:   0.02,
    }
  }
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
  Passed { similarity: f64 },
  /// At least one side has no resolved primary entity.
  Skipped,
  Failed { similarity: f64 },
}

impl GateOutcome {
  pub fn blocks(&self) -> bool { matches!(self, Self::Failed { .. }) }

  pub fn is_skipped(&self) -> bool { matches!(self, Self::Skipped) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
  pub title:       f64,
  /// `None` when either description was empty.
  pub description: Option<f64>,
  pub combined:    f64,
}

/// A canonical event scored against a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
  pub event_id:     Uuid,
  pub score:        MatchScore,
  pub gate:         GateOutcome,
  pub source_count: usize,
  pub created_at:   DateTime<Utc>,
}

impl Scored {
  /// Tie-break order: highest combined score, then most sources, then the
  /// oldest event, then the smallest id.
  fn rank(&self, other: &Self) -> Ordering {
    other
      .score
      .combined
      .total_cmp(&self.score.combined)
      .then_with(|| other.source_count.cmp(&self.source_count))
      .then_with(|| self.created_at.cmp(&other.created_at))
      .then_with(|| self.event_id.cmp(&other.event_id))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MatchDecision {
  /// Nothing matched; `closest` is the best-scoring eligible event, if any.
  NoMatch { closest: Option<Scored> },
  Match {
    chosen:    Scored,
    runner_up: Option<Scored>,
    ambiguous: bool,
  },
}

impl MatchDecision {
  /// The review flag for an ambiguous match, if this decision is one.
  pub fn ambiguity(&self, candidate: Uuid) -> Option<Error> {
    match self {
      Self::Match { chosen, runner_up: Some(runner_up), ambiguous: true } => {
        Some(Error::AmbiguousMatch {
          candidate,
          chosen: chosen.event_id,
          chosen_score: chosen.score.combined,
          runner_up: runner_up.event_id,
          runner_up_score: runner_up.score.combined,
        })
      }
      _ => None,
    }
  }
}

// ─── Matcher ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Matcher<S = Levenshtein> {
  config: MatcherConfig,
  scorer: S,
}

impl Default for Matcher<Levenshtein> {
  fn default() -> Self { Self::new(MatcherConfig::default(), Levenshtein) }
}

impl<S: SimilarityScorer> Matcher<S> {
  pub fn new(config: MatcherConfig, scorer: S) -> Self { Self { config, scorer } }

  pub fn config(&self) -> &MatcherConfig { &self.config }

  /// Inclusive date range of canonical events eligible for `date`.
  pub fn window(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let span = Duration::days(self.config.window_days.max(0));
    (date - span, date + span)
  }

  fn eligible(&self, candidate: &ResolvedCandidate, view: &EventView) -> bool {
    let (from, to) = self.window(candidate.candidate.event_date);
    view.event.status.is_active()
      && view.event.event_date >= from
      && view.event.event_date <= to
  }

  fn entity_gate(&self, candidate: &ResolvedCandidate, view: &EventView) -> GateOutcome {
    let (Some(ours), Some(theirs)) = (candidate.primary_entity(), view.primary_entity())
    else {
      return GateOutcome::Skipped;
    };
    let similarity = self.scorer.ratio(
      &normalize(&ours.canonical_name),
      &normalize(&theirs.entity.canonical_name),
    );
    if similarity >= self.config.entity_threshold {
      GateOutcome::Passed { similarity }
    } else {
      GateOutcome::Failed { similarity }
    }
  }

  fn text_score(&self, candidate: &ResolvedCandidate, view: &EventView) -> MatchScore {
    let title = self.scorer.ratio(
      candidate.candidate.title.trim().to_lowercase().as_str(),
      view.event.title.trim().to_lowercase().as_str(),
    );

    let prefix = self.config.description_prefix;
    let ours = prefix_chars(candidate.candidate.description_text().trim(), prefix);
    let theirs = prefix_chars(view.event.description.trim(), prefix);
    let description = (!ours.is_empty() && !theirs.is_empty())
      .then(|| self.scorer.ratio(ours, theirs));

    let combined = match description {
      Some(d) => (title + d) / 2.0,
      None => title,
    };
    MatchScore { title, description, combined }
  }

  /// Score one canonical event against the candidate, ignoring eligibility.
  pub fn score(&self, candidate: &ResolvedCandidate, view: &EventView) -> Scored {
    Scored {
      event_id:     view.event.event_id,
      score:        self.text_score(candidate, view),
      gate:         self.entity_gate(candidate, view),
      source_count: view.source_count(),
      created_at:   view.event.created_at,
    }
  }

  fn is_match(&self, scored: &Scored) -> bool {
    !scored.gate.blocks() && scored.score.combined >= self.config.match_threshold
  }

  /// Decide whether `candidate` refers to one of the events in `pool`.
  ///
  /// Events outside the date window or not `Active` are ignored.
  pub fn decide(&self, candidate: &ResolvedCandidate, pool: &[EventView]) -> MatchDecision {
    let mut scored: Vec<Scored> = pool
      .iter()
      .filter(|view| self.eligible(candidate, view))
      .map(|view| self.score(candidate, view))
      .collect();
    scored.sort_by(Scored::rank);

    let (mut matches, rest): (Vec<Scored>, Vec<Scored>) =
      scored.into_iter().partition(|s| self.is_match(s));

    if matches.is_empty() {
      return MatchDecision::NoMatch { closest: rest.into_iter().next() };
    }

    let chosen = matches.remove(0);
    let runner_up = matches.into_iter().next();
    let ambiguous = runner_up.as_ref().is_some_and(|r| {
      chosen.score.combined - r.score.combined <= self.config.ambiguity_margin
    });

    MatchDecision::Match { chosen, runner_up, ambiguous }
  }
}
