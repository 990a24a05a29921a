//! Error types for the vigil-ingest normalizer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("payload is not a JSON object")]
  NotAnObject,

  #[error("no non-empty title")]
  MissingTitle,

  #[error("no source url")]
  MissingUrl,

  #[error("no resolvable event date")]
  UnresolvableDate,

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  /// Classify as the engine-level rejection for the payload identified by
  /// `reference` (a URL, or a `file:line` position).
  pub fn into_incomplete(self, reference: impl Into<String>) -> vigil_core::Error {
    vigil_core::Error::IncompleteCandidate {
      candidate: reference.into(),
      reason:    self.to_string(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
