//! Error types for `vigil-core`.
//!
//! Every per-candidate failure or warning the engine can produce is one of
//! these variants. Only some of them are fatal to the candidate; see
//! [`Error::is_advisory`].

use thiserror::Error;
use uuid::Uuid;

use crate::{event::EventStatus, history::AttributeName};

#[derive(Debug, Error)]
pub enum Error {
  /// A candidate is missing a required normalized field.
  #[error("incomplete candidate {candidate}: {reason}")]
  IncompleteCandidate { candidate: String, reason: String },

  /// Two canonical events scored within the ambiguity margin of each other.
  /// The tie-break still picks a winner; this is a review flag.
  #[error(
    "ambiguous match for candidate {candidate}: {chosen} ({chosen_score:.3}) \
     over {runner_up} ({runner_up_score:.3})"
  )]
  AmbiguousMatch {
    candidate:       Uuid,
    chosen:          Uuid,
    chosen_score:    f64,
    runner_up:       Uuid,
    runner_up_score: f64,
  },

  /// An incoming attribute value was rejected because it carries less
  /// confidence than the stored record.
  #[error(
    "suppressed update to {attribute} on {event_id}: incoming confidence \
     {incoming_confidence:.2} < stored {stored_confidence:.2}"
  )]
  ConflictingAttributeUpdate {
    event_id:            Uuid,
    attribute:           AttributeName,
    incoming_confidence: f64,
    stored_confidence:   f64,
  },

  /// A concurrent writer already owns this dedup key, or the row changed
  /// after the update was planned.
  #[error("persistence conflict on dedup key {dedup_key}")]
  PersistenceConflict { dedup_key: String },

  #[error("invalid status transition {from} -> {to}")]
  InvalidStatusTransition { from: EventStatus, to: EventStatus },

  #[error("canonical event not found: {0}")]
  EventNotFound(Uuid),

  #[error("invalid value for {attribute}: {value:?}")]
  InvalidAttributeValue {
    attribute: AttributeName,
    value:     String,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Advisory errors are reported alongside a successful outcome rather than
  /// failing the candidate.
  pub fn is_advisory(&self) -> bool {
    matches!(
      self,
      Self::AmbiguousMatch { .. }
        | Self::ConflictingAttributeUpdate { .. }
        | Self::InvalidStatusTransition { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
