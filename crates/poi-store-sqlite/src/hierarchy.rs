//! Parent-chain walks over the `poi` table.
//!
//! The walks are explicit loops bounded by a maximum depth. A chain longer
//! than the bound is reported as a cycle, which is the only way an
//! unbounded chain can arise.

use rusqlite::{Connection, OptionalExtension as _};

use crate::Result;

/// Default bound on parent-chain length.
pub const DEFAULT_MAX_DEPTH: u32 = 64;

fn parent_of(conn: &Connection, id: i64) -> Result<Option<Option<i64>>> {
  Ok(
    conn
      .prepare_cached("SELECT parent_id FROM poi WHERE id = ?1")?
      .query_row([id], |r| r.get(0))
      .optional()?,
  )
}

/// Number of parent links above `start`. A missing `start`, or a `start`
/// that resolves to no row, yields 0; a parent id that resolves to no row
/// ends the walk.
pub fn compute_level(conn: &Connection, start: Option<i64>, max_depth: u32) -> Result<u32> {
  let Some(origin) = start else {
    return Ok(0);
  };

  let mut current = origin;
  let mut level = 0;
  loop {
    match parent_of(conn, current)? {
      None | Some(None) => return Ok(level),
      Some(Some(parent)) => {
        if parent_of(conn, parent)?.is_none() {
          return Ok(level);
        }
        level += 1;
        if level > max_depth {
          return Err(poi_core::Error::CycleDetected { start: origin, max_depth }.into());
        }
        current = parent;
      }
    }
  }
}

/// Whether `needle` is `start` or one of its ancestors.
pub fn chain_contains(conn: &Connection, start: i64, needle: i64, max_depth: u32) -> Result<bool> {
  let mut current = Some(start);
  let mut steps = 0;
  while let Some(id) = current {
    if id == needle {
      return Ok(true);
    }
    steps += 1;
    if steps > max_depth {
      return Err(poi_core::Error::CycleDetected { start, max_depth }.into());
    }
    current = parent_of(conn, id)?.flatten();
  }
  Ok(false)
}

/// Rewrite the cached `level` of every descendant of `root`, whose own level
/// is `root_level`.
pub fn refresh_descendant_levels(
  conn: &Connection,
  root: i64,
  root_level: i64,
  max_depth: u32,
) -> Result<usize> {
  let mut frontier = vec![root];
  let mut level = root_level;
  let mut touched = 0;

  while !frontier.is_empty() {
    level += 1;

    let mut next = Vec::new();
    let mut children = conn.prepare_cached("SELECT id FROM poi WHERE parent_id = ?1")?;
    let mut update = conn.prepare_cached("UPDATE poi SET level = ?1 WHERE id = ?2")?;
    for parent in frontier {
      let ids = children
        .query_map([parent], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      for id in ids {
        if level > i64::from(max_depth) {
          return Err(poi_core::Error::CycleDetected { start: root, max_depth }.into());
        }
        update.execute(rusqlite::params![level, id])?;
        next.push(id);
      }
    }
    touched += next.len();
    frontier = next;
  }

  Ok(touched)
}
