//! Error types for `poi-core`.

use thiserror::Error;

/// The coarse failure classes every store operation distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A referenced POI, tag, audience or pending update does not exist.
  NotFound,
  /// A uniqueness constraint was violated outside of upsert semantics.
  Conflict,
  /// The backing store failed to read or write.
  Storage,
  /// A parent chain exceeded the configured maximum depth.
  CycleDetected,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("poi not found: {0}")]
  PoiNotFound(i64),

  #[error("tag not found: {0:?}")]
  TagNotFound(String),

  #[error("target audience not found: {0:?}")]
  AudienceNotFound(String),

  #[error("pending update not found: {0}")]
  PendingUpdateNotFound(i64),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("parent chain starting at poi {start} exceeds {max_depth} levels")]
  CycleDetected { start: i64, max_depth: u32 },

  #[error("unknown pending update event: {0:?}")]
  UnknownEvent(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::PoiNotFound(_)
      | Self::TagNotFound(_)
      | Self::AudienceNotFound(_)
      | Self::PendingUpdateNotFound(_) => ErrorKind::NotFound,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::CycleDetected { .. } => ErrorKind::CycleDetected,
      // Undecodable staged payloads never reach the tables.
      Self::UnknownEvent(_) | Self::Serialization(_) => ErrorKind::Storage,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
