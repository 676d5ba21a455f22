//! [`SqliteStore`] — the SQLite implementation of [`PoiStore`].

use std::path::Path;

use chrono::Utc;
use poi_core::{
  normalize::derive_search_key,
  pending::{PendingUpdate, encode_payload},
  poi::{
    PoiDetail, PoiForm, PoiName, PoiSummary, Recommendation, RecommendationInput, TagRef,
  },
  store::PoiStore,
  tag::{HistoryEntry, Tag, TagDiff, TargetAudience},
};
use rusqlite::{OptionalExtension as _, Transaction};
use tracing::Span;

use crate::{
  Error, Result,
  encode::{
    FOLD_FN, POI_COLUMNS, RawPendingUpdate, audience_from_row, encode_dt, fold,
    register_functions,
    name_from_row, poi_from_row, summary_from_row, tag_from_row,
  },
  hierarchy::{self, DEFAULT_MAX_DEPTH},
  reconcile,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A POI catalogue backed by a single SQLite file.
///
/// The connection is opened once and shared for the store's lifetime; each
/// operation acquires it for a single call. Cloning is cheap — the inner
/// connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:      tokio_rusqlite::Connection,
  span:      Span,
  max_depth: u32,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let span = tracing::info_span!("poi_store", path = %path.as_ref().display());
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, span).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, tracing::info_span!("poi_store", path = ":memory:")).await
  }

  async fn init(conn: tokio_rusqlite::Connection, span: Span) -> Result<Self> {
    let store = Self { conn, span, max_depth: DEFAULT_MAX_DEPTH };
    store
      .with_conn(|conn| {
        conn.execute_batch(SCHEMA)?;
        register_functions(conn)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }

  /// Parent all log events emitted by this store under `span`.
  pub fn with_span(mut self, span: Span) -> Self {
    self.span = span;
    self
  }

  /// Bound parent-chain walks to `max_depth` links.
  pub fn with_max_depth(mut self, max_depth: u32) -> Self {
    self.max_depth = max_depth;
    self
  }

  /// Run `f` on the connection thread.
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside a transaction that commits only if `f` succeeds.
  async fn in_transaction<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
  {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
      })
      .await
  }
}

// ─── Write helpers ───────────────────────────────────────────────────────────

fn poi_exists(conn: &rusqlite::Connection, id: i64) -> Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM poi WHERE id = ?1", [id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

struct Upserted {
  id:      i64,
  level:   i64,
  diff:    TagDiff,
  relevel: usize,
}

/// Upsert by name, then reconcile tags and append recommendations, all on
/// the same transaction.
fn upsert_poi_tx(tx: &Transaction<'_>, form: &PoiForm, max_depth: u32) -> Result<Upserted> {
  let pinyin_initials = derive_search_key(&form.name);

  let existing: Option<(i64, i64)> = tx
    .query_row("SELECT id, level FROM poi WHERE name = ?1", [&form.name], |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .optional()?;

  let level = match form.parent_id {
    None => 0,
    Some(parent) => {
      if !poi_exists(tx, parent)? {
        return Err(poi_core::Error::PoiNotFound(parent).into());
      }
      if let Some((id, _)) = existing
        && hierarchy::chain_contains(tx, parent, id, max_depth)?
      {
        return Err(poi_core::Error::CycleDetected { start: parent, max_depth }.into());
      }
      let level = hierarchy::compute_level(tx, Some(parent), max_depth)? + 1;
      // The POI's own walk must stay within the bound `compute_level` applies.
      if level > max_depth {
        return Err(poi_core::Error::CycleDetected { start: parent, max_depth }.into());
      }
      i64::from(level)
    }
  };

  tx.execute(
    "INSERT INTO poi (name, parent_id, description, href, level, weight, pinyin_initials)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(name) DO UPDATE SET
       parent_id       = excluded.parent_id,
       description     = excluded.description,
       href            = excluded.href,
       level           = excluded.level,
       weight          = excluded.weight,
       pinyin_initials = excluded.pinyin_initials",
    rusqlite::params![
      form.name,
      form.parent_id,
      form.description,
      form.href,
      level,
      form.weight,
      pinyin_initials,
    ],
  )?;

  // The insert path and the update path both land here; re-read by name.
  let id: i64 = tx.query_row("SELECT id FROM poi WHERE name = ?1", [&form.name], |r| r.get(0))?;

  let relevel = if existing.is_some_and(|(_, old_level)| old_level != level) {
    hierarchy::refresh_descendant_levels(tx, id, level, max_depth)?
  } else {
    0
  };

  let diff = reconcile::reconcile_tags(tx, id, &form.tags)?;
  reconcile::write_recommendations(tx, id, &form.recommendations)?;

  Ok(Upserted { id, level, diff, relevel })
}

// ─── PoiStore impl ───────────────────────────────────────────────────────────

impl PoiStore for SqliteStore {
  type Error = Error;

  // ── Hierarchy ─────────────────────────────────────────────────────────────

  async fn compute_level(&self, parent_id: Option<i64>) -> Result<u32> {
    let max_depth = self.max_depth;
    self
      .with_conn(move |conn| hierarchy::compute_level(conn, parent_id, max_depth))
      .await
  }

  // ── POI writes ────────────────────────────────────────────────────────────

  async fn upsert_poi(&self, form: PoiForm) -> Result<i64> {
    let max_depth = self.max_depth;
    let name = form.name.clone();

    let result = self
      .in_transaction(move |tx| upsert_poi_tx(tx, &form, max_depth))
      .await;

    match result {
      Ok(up) => {
        tracing::info!(
          parent: &self.span,
          poi_id = up.id,
          %name,
          level = up.level,
          tags_added = up.diff.added.len(),
          tags_removed = up.diff.removed.len(),
          descendants_relevelled = up.relevel,
          "upserted poi"
        );
        Ok(up.id)
      }
      Err(e) => {
        tracing::error!(parent: &self.span, %name, error = %e, "poi upsert rolled back");
        Err(e)
      }
    }
  }

  async fn reconcile_tags(&self, poi_id: i64, desired: Vec<TagRef>) -> Result<TagDiff> {
    let diff = self
      .in_transaction(move |tx| {
        if !poi_exists(tx, poi_id)? {
          return Err(poi_core::Error::PoiNotFound(poi_id).into());
        }
        reconcile::reconcile_tags(tx, poi_id, &desired)
      })
      .await?;

    if !diff.is_empty() {
      tracing::info!(
        parent: &self.span,
        poi_id,
        added = ?diff.added,
        removed = ?diff.removed,
        "reconciled poi tags"
      );
    }
    Ok(diff)
  }

  async fn write_recommendations(
    &self,
    poi_id: i64,
    recommendations: Vec<RecommendationInput>,
  ) -> Result<()> {
    let count = recommendations.len();
    self
      .in_transaction(move |tx| {
        if !poi_exists(tx, poi_id)? {
          return Err(poi_core::Error::PoiNotFound(poi_id).into());
        }
        reconcile::write_recommendations(tx, poi_id, &recommendations)
      })
      .await?;

    tracing::debug!(parent: &self.span, poi_id, count, "wrote recommendations");
    Ok(())
  }

  // ── POI reads ─────────────────────────────────────────────────────────────

  async fn search_by_keyword(&self, keyword: &str) -> Result<Vec<PoiSummary>> {
    let needle = fold(keyword);
    tracing::debug!(parent: &self.span, keyword, "searching pois by keyword");

    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT p.id, p.name, p.description
           FROM poi p
           WHERE instr({FOLD_FN}(p.name), ?1) > 0
              OR instr(p.pinyin_initials, ?1) > 0
           ORDER BY p.weight, p.id"
        ))?;
        let rows = stmt
          .query_map([needle], summary_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn search_by_exact_name(&self, name: &str) -> Result<Vec<PoiName>> {
    let name = name.to_owned();
    self
      .with_conn(move |conn| {
        let mut stmt = conn.prepare("SELECT id, name FROM poi WHERE name = ?1 ORDER BY id")?;
        let rows = stmt
          .query_map([name], name_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn find_by_tags(&self, tag_names: &[String]) -> Result<Vec<PoiSummary>> {
    let mut names = tag_names.to_vec();
    names.sort();
    names.dedup();
    if names.is_empty() {
      return Ok(Vec::new());
    }

    self
      .with_conn(move |conn| {
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
          "SELECT p.id, p.name, p.description
           FROM poi p
           JOIN poi_tag pt ON pt.poi_id = p.id
           JOIN tag t      ON t.tag_id  = pt.tag_id
           WHERE t.tag_name IN ({placeholders})
           GROUP BY p.id
           HAVING COUNT(DISTINCT t.tag_id) = {}
           ORDER BY p.weight, p.id",
          names.len()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(names.iter()), summary_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn get_by_id(&self, id: i64) -> Result<PoiDetail> {
    self
      .with_conn(move |conn| {
        let row = conn
          .query_row(
            &format!(
              "SELECT {POI_COLUMNS}, parent.name
               FROM poi p
               LEFT JOIN poi parent ON parent.id = p.parent_id
               WHERE p.id = ?1"
            ),
            [id],
            |row| Ok((poi_from_row(row)?, row.get::<_, Option<String>>(8)?)),
          )
          .optional()?;
        let Some((poi, parent_name)) = row else {
          return Err(poi_core::Error::PoiNotFound(id).into());
        };

        let tags = conn
          .prepare(
            "SELECT t.tag_name
             FROM tag t
             JOIN poi_tag pt ON pt.tag_id = t.tag_id
             WHERE pt.poi_id = ?1
             ORDER BY t.tag_name",
          )?
          .query_map([id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;

        let recommendations = conn
          .prepare(
            "SELECT r.reason, a.target_audience
             FROM recommend_reason r
             JOIN target_audience a ON a.id = r.target_audience_id
             WHERE r.poi_id = ?1
             ORDER BY r.id",
          )?
          .query_map([id], |r| {
            Ok(Recommendation { reason: r.get(0)?, target_audience: r.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(PoiDetail { poi, parent_name, tags, recommendations })
      })
      .await
  }

  // ── Tags ──────────────────────────────────────────────────────────────────

  async fn list_tags(&self) -> Result<Vec<Tag>> {
    self
      .with_conn(|conn| {
        let mut stmt =
          conn.prepare("SELECT tag_id, tag_name, pinyin_initials FROM tag ORDER BY tag_id")?;
        let rows = stmt
          .query_map([], tag_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn create_tag(&self, name: &str) -> Result<Tag> {
    let tag_name = name.to_owned();
    let pinyin_initials = derive_search_key(name);

    let tag = self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO tag (tag_name, pinyin_initials) VALUES (?1, ?2)",
          rusqlite::params![tag_name, pinyin_initials],
        )?;
        Ok(Tag { tag_id: conn.last_insert_rowid(), tag_name, pinyin_initials })
      })
      .await?;

    tracing::info!(parent: &self.span, tag_id = tag.tag_id, tag_name = %tag.tag_name, "created tag");
    Ok(tag)
  }

  async fn count_pois_for_tag(&self, name: &str) -> Result<u64> {
    let name = name.to_owned();
    self
      .with_conn(move |conn| {
        let count: i64 = conn.query_row(
          "SELECT COUNT(*)
           FROM poi_tag pt
           JOIN tag t ON t.tag_id = pt.tag_id
           WHERE t.tag_name = ?1",
          [name],
          |r| r.get(0),
        )?;
        Ok(count.unsigned_abs())
      })
      .await
  }

  async fn delete_tag(&self, name: &str) -> Result<()> {
    let tag_name = name.to_owned();

    let (associations, tags) = self
      .in_transaction(move |tx| {
        let associations = tx.execute(
          "DELETE FROM poi_tag WHERE tag_id IN (SELECT tag_id FROM tag WHERE tag_name = ?1)",
          [&tag_name],
        )?;
        let tags = tx.execute("DELETE FROM tag WHERE tag_name = ?1", [&tag_name])?;
        Ok((associations, tags))
      })
      .await?;

    if tags == 0 {
      tracing::debug!(parent: &self.span, tag_name = name, "delete of unknown tag ignored");
    } else {
      tracing::info!(parent: &self.span, tag_name = name, associations, "deleted tag");
    }
    Ok(())
  }

  // ── Target audiences ──────────────────────────────────────────────────────

  async fn list_target_audiences(&self) -> Result<Vec<TargetAudience>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT id, target_audience FROM target_audience ORDER BY id")?;
        let rows = stmt
          .query_map([], audience_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn add_target_audience(&self, label: &str) -> Result<TargetAudience> {
    let target_audience = label.to_owned();
    self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO target_audience (target_audience) VALUES (?1)",
          [&target_audience],
        )?;
        Ok(TargetAudience { id: conn.last_insert_rowid(), target_audience })
      })
      .await
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn record_history(&self, tag_ids: &[i64], used_time: i64) -> Result<()> {
    let ids = tag_ids.to_vec();
    let count = ids.len();

    self
      .in_transaction(move |tx| {
        let mut insert = tx.prepare_cached("INSERT INTO history (tag_id, used_time) VALUES (?1, ?2)")?;
        for tag_id in ids {
          insert.execute([tag_id, used_time])?;
        }
        Ok(())
      })
      .await?;

    tracing::debug!(parent: &self.span, count, used_time, "recorded tag history");
    Ok(())
  }

  async fn fetch_history(&self) -> Result<Vec<HistoryEntry>> {
    self
      .with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT tag_id, used_time FROM history ORDER BY id")?;
        let rows = stmt
          .query_map([], |r| Ok(HistoryEntry { tag_id: r.get(0)?, used_time: r.get(1)? }))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }

  async fn prune_history(&self, cutoff: i64) -> Result<u64> {
    let removed = self
      .with_conn(move |conn| Ok(conn.execute("DELETE FROM history WHERE used_time < ?1", [cutoff])?))
      .await?;

    tracing::info!(parent: &self.span, cutoff, removed, "pruned tag history");
    Ok(removed as u64)
  }

  // ── Pending updates ───────────────────────────────────────────────────────

  async fn stage_update(
    &self,
    event: &str,
    data: &serde_json::Value,
    auth_code: Option<&str>,
  ) -> Result<i64> {
    let event_str = event.to_owned();
    let data_str  = encode_payload(data);
    let auth_code = auth_code.map(str::to_owned);
    let at_str    = encode_dt(Utc::now());

    let id = self
      .with_conn(move |conn| {
        conn.execute(
          "INSERT INTO pending_update (event, data, auth_code, timestamp) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![event_str, data_str, auth_code, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::info!(parent: &self.span, id, event, "staged pending update");
    Ok(id)
  }

  async fn list_pending_updates(&self) -> Result<Vec<PendingUpdate>> {
    let raws = self
      .with_conn(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, event, data, auth_code, timestamp FROM pending_update ORDER BY id",
        )?;
        let rows = stmt
          .query_map([], RawPendingUpdate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPendingUpdate::into_pending).collect()
  }

  async fn get_pending_update(&self, id: i64) -> Result<Option<PendingUpdate>> {
    let raw = self
      .with_conn(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, event, data, auth_code, timestamp FROM pending_update WHERE id = ?1",
              [id],
              RawPendingUpdate::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPendingUpdate::into_pending).transpose()
  }

  async fn discard_pending_update(&self, id: i64) -> Result<bool> {
    let removed = self
      .with_conn(move |conn| Ok(conn.execute("DELETE FROM pending_update WHERE id = ?1", [id])?))
      .await?;

    tracing::info!(parent: &self.span, id, removed = removed > 0, "discarded pending update");
    Ok(removed > 0)
  }
}
