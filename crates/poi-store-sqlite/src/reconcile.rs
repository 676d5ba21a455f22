//! Tag reconciliation and recommendation writes.
//!
//! Both run on a connection that is already inside a transaction; the caller
//! commits or rolls back the whole group.

use std::collections::BTreeSet;

use poi_core::{
  poi::{RecommendationInput, TagRef},
  tag::TagDiff,
};
use rusqlite::{Connection, OptionalExtension as _};

use crate::Result;

/// Resolve a tag name to its id.
pub fn resolve_tag_id(conn: &Connection, name: &str) -> Result<i64> {
  conn
    .prepare_cached("SELECT tag_id FROM tag WHERE tag_name = ?1")?
    .query_row([name], |r| r.get(0))
    .optional()?
    .ok_or_else(|| poi_core::Error::TagNotFound(name.to_owned()).into())
}

/// Tag ids currently associated with `poi_id`.
pub fn current_tag_ids(conn: &Connection, poi_id: i64) -> Result<BTreeSet<i64>> {
  let ids = conn
    .prepare_cached("SELECT tag_id FROM poi_tag WHERE poi_id = ?1")?
    .query_map([poi_id], |r| r.get(0))?
    .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
  Ok(ids)
}

/// Apply the minimal add/remove diff that makes the associations of `poi_id`
/// equal `desired`. Both sides are compared as tag ids.
pub fn reconcile_tags(conn: &Connection, poi_id: i64, desired: &[TagRef]) -> Result<TagDiff> {
  let desired_ids = desired
    .iter()
    .map(|t| resolve_tag_id(conn, &t.tag_name))
    .collect::<Result<BTreeSet<i64>>>()?;
  let current_ids = current_tag_ids(conn, poi_id)?;

  let diff = TagDiff {
    added:   desired_ids.difference(&current_ids).copied().collect(),
    removed: current_ids.difference(&desired_ids).copied().collect(),
  };

  let mut delete = conn.prepare_cached("DELETE FROM poi_tag WHERE poi_id = ?1 AND tag_id = ?2")?;
  for tag_id in &diff.removed {
    delete.execute([poi_id, *tag_id])?;
  }

  let mut insert = conn.prepare_cached("INSERT INTO poi_tag (poi_id, tag_id) VALUES (?1, ?2)")?;
  for tag_id in &diff.added {
    insert.execute([poi_id, *tag_id])?;
  }

  Ok(diff)
}

/// Append one `recommend_reason` row per entry, resolving each audience label.
pub fn write_recommendations(
  conn: &Connection,
  poi_id: i64,
  recommendations: &[RecommendationInput],
) -> Result<()> {
  let mut audience = conn.prepare_cached("SELECT id FROM target_audience WHERE target_audience = ?1")?;
  let mut insert = conn.prepare_cached(
    "INSERT INTO recommend_reason (poi_id, target_audience_id, reason) VALUES (?1, ?2, ?3)",
  )?;

  for rec in recommendations {
    let audience_id: i64 = audience
      .query_row([&rec.audience], |r| r.get(0))
      .optional()?
      .ok_or_else(|| poi_core::Error::AudienceNotFound(rec.audience.clone()))?;
    insert.execute(rusqlite::params![poi_id, audience_id, rec.recommendation])?;
  }

  Ok(())
}
