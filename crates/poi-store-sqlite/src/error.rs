//! Error type for `poi-store-sqlite`.

use poi_core::ErrorKind;
use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] poi_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(rusqlite::Error),

  /// A UNIQUE or PRIMARY KEY constraint rejected a write.
  #[error("constraint violation: {0}")]
  Conflict(rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::Database(_) | Self::Sqlite(_) | Self::Json(_) | Self::DateParse(_) => {
        ErrorKind::Storage
      }
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    match &e {
      rusqlite::Error::SqliteFailure(f, _)
        if matches!(
          f.extended_code,
          ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) =>
      {
        Self::Conflict(e)
      }
      _ => Self::Sqlite(e),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
