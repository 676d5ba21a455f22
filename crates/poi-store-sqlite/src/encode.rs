//! Encoding and decoding helpers between domain types and SQLite rows.
//!
//! Timestamps on staged updates are stored as RFC 3339 strings; history
//! timestamps are plain unix seconds and need no conversion.

use chrono::{DateTime, Utc};
use poi_core::{
  pending::PendingUpdate,
  poi::{Poi, PoiName, PoiSummary},
  tag::{Tag, TargetAudience},
};
use rusqlite::{Row, functions::FunctionFlags};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SQL functions ───────────────────────────────────────────────────────────

/// Name of the scalar function that lower-cases text with Unicode rules;
/// SQLite's own `lower()` and `LIKE` only fold ASCII.
pub const FOLD_FN: &str = "poi_fold";

/// Case-fold `text` the same way [`FOLD_FN`] does inside SQLite.
pub fn fold(text: &str) -> String { text.to_lowercase() }

/// Register the store's scalar functions on `conn`.
pub fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    FOLD_FN,
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| fold(&text))),
  )
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

/// Column order: `id, name, parent_id, description, href, level, weight,
/// pinyin_initials`.
pub const POI_COLUMNS: &str =
  "p.id, p.name, p.parent_id, p.description, p.href, p.level, p.weight, p.pinyin_initials";

pub fn poi_from_row(row: &Row<'_>) -> rusqlite::Result<Poi> {
  Ok(Poi {
    id:              row.get(0)?,
    name:            row.get(1)?,
    parent_id:       row.get(2)?,
    description:     row.get(3)?,
    href:            row.get(4)?,
    level:           row.get(5)?,
    weight:          row.get(6)?,
    pinyin_initials: row.get(7)?,
  })
}

pub fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<PoiSummary> {
  Ok(PoiSummary {
    id:          row.get(0)?,
    name:        row.get(1)?,
    description: row.get(2)?,
  })
}

pub fn name_from_row(row: &Row<'_>) -> rusqlite::Result<PoiName> {
  Ok(PoiName { id: row.get(0)?, name: row.get(1)? })
}

pub fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
  Ok(Tag {
    tag_id:          row.get(0)?,
    tag_name:        row.get(1)?,
    pinyin_initials: row.get(2)?,
  })
}

pub fn audience_from_row(row: &Row<'_>) -> rusqlite::Result<TargetAudience> {
  Ok(TargetAudience { id: row.get(0)?, target_audience: row.get(1)? })
}

// ─── Pending updates ─────────────────────────────────────────────────────────

/// Raw values read directly from a `pending_update` row.
pub struct RawPendingUpdate {
  pub id:        i64,
  pub event:     String,
  pub data:      String,
  pub auth_code: Option<String>,
  pub timestamp: String,
}

impl RawPendingUpdate {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:        row.get(0)?,
      event:     row.get(1)?,
      data:      row.get(2)?,
      auth_code: row.get(3)?,
      timestamp: row.get(4)?,
    })
  }

  pub fn into_pending(self) -> Result<PendingUpdate> {
    Ok(PendingUpdate {
      id:        self.id,
      event:     self.event,
      data:      self.data,
      auth_code: self.auth_code,
      timestamp: decode_dt(&self.timestamp)?,
    })
  }
}
