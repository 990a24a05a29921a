//! Error type for `vigil-engine`.

use thiserror::Error;
use vigil_core::store::{GatewayError, GatewayErrorKind};

#[derive(Debug, Error)]
pub enum Error<E: GatewayError> {
  /// A per-candidate failure classified by the core.
  #[error(transparent)]
  Core(#[from] vigil_core::Error),

  #[error("store error: {0}")]
  Store(#[source] E),

  /// The store cannot be reached. Aborts the whole run.
  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] E),
}

impl<E: GatewayError> Error<E> {
  pub fn store(e: E) -> Self {
    match e.kind() {
      GatewayErrorKind::Unavailable => Self::StoreUnavailable(e),
      _ => Self::Store(e),
    }
  }

  /// Whether the error ends the run rather than just the candidate.
  pub fn is_fatal(&self) -> bool { matches!(self, Self::StoreUnavailable(_)) }
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
