//! Error type for `vigil-store-sqlite`.

use rusqlite::{ErrorCode, ffi};
use thiserror::Error;
use vigil_core::store::{GatewayError, GatewayErrorKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column holds a value the domain types cannot represent.
  #[error("undecodable {column}: {value:?}")]
  Decode { column: &'static str, value: String },

  /// A domain value falls outside what its column can store.
  #[error("unencodable {column}: {value}")]
  Encode { column: &'static str, value: String },

  #[error("canonical event not found: {0}")]
  EventNotFound(uuid::Uuid),

  /// The row changed after the update was planned.
  #[error("canonical event {0} was modified concurrently")]
  Stale(uuid::Uuid),
}

impl Error {
  fn sqlite_failure(&self) -> Option<&rusqlite::ffi::Error> {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))) => {
        Some(e)
      }
      _ => None,
    }
  }
}

impl GatewayError for Error {
  fn kind(&self) -> GatewayErrorKind {
    if let Self::Stale(_) = self {
      return GatewayErrorKind::Conflict;
    }
    if let Self::Database(tokio_rusqlite::Error::ConnectionClosed) = self {
      return GatewayErrorKind::Unavailable;
    }
    let Some(failure) = self.sqlite_failure() else {
      return GatewayErrorKind::Other;
    };
    // Uniqueness races are conflicts. Trigger aborts and other constraint
    // failures are not.
    match failure.code {
      ErrorCode::ConstraintViolation => match failure.extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
          GatewayErrorKind::Conflict
        }
        _ => GatewayErrorKind::Other,
      },
      ErrorCode::CannotOpen
      | ErrorCode::NotADatabase
      | ErrorCode::DatabaseCorrupt
      | ErrorCode::DiskFull
      | ErrorCode::SystemIoFailure
      | ErrorCode::ReadOnly
      | ErrorCode::PermissionDenied => GatewayErrorKind::Unavailable,
      _ => GatewayErrorKind::Other,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
