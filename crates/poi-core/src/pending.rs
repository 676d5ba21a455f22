//! Staged change requests and their application to a [`PoiStore`].
//!
//! A pending update is an opaque `(event, data)` pair recorded before it is
//! applied. Applying decodes the pair into a [`Change`], runs it against the
//! store and deletes the staged row. A change that fails to decode or to
//! apply keeps its row, so it can be retried or discarded explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  poi::PoiForm,
  store::PoiStore,
  tag::{Tag, UsedTag},
};

// ─── Staged row ──────────────────────────────────────────────────────────────

/// A change request awaiting application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
  pub id:        i64,
  pub event:     String,
  /// Raw payload; JSON text for structured events.
  pub data:      String,
  pub auth_code: Option<String>,
  pub timestamp: DateTime<Utc>,
}

/// Encode a payload for the `data` column: strings verbatim, everything else
/// as compact JSON.
pub fn encode_payload(data: &serde_json::Value) -> String {
  match data {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// The event tags a pending update can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum UpdateEvent {
  AddNewTag,
  RemoveTag,
  InsertPoi,
  InsertHistory,
}

/// A decoded pending update.
#[derive(Debug, Clone)]
pub enum Change {
  AddTag(String),
  RemoveTag(String),
  UpsertPoi(PoiForm),
  RecordHistory(Vec<UsedTag>),
}

impl Change {
  /// Decode an `(event, data)` pair as staged.
  pub fn decode(event: &str, data: &str) -> Result<Self> {
    let event: UpdateEvent = event
      .parse()
      .map_err(|_| Error::UnknownEvent(event.to_owned()))?;

    Ok(match event {
      UpdateEvent::AddNewTag => Self::AddTag(data.to_owned()),
      UpdateEvent::RemoveTag => Self::RemoveTag(data.to_owned()),
      UpdateEvent::InsertPoi => Self::UpsertPoi(serde_json::from_str(data)?),
      UpdateEvent::InsertHistory => Self::RecordHistory(serde_json::from_str(data)?),
    })
  }
}

// ─── Application ─────────────────────────────────────────────────────────────

/// What applying a [`Change`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
  TagCreated(Tag),
  TagRemoved(String),
  PoiUpserted(i64),
  HistoryRecorded(usize),
}

/// Run a decoded change against `store`. History entries are stamped `now`
/// (unix seconds).
pub async fn apply_change<S: PoiStore>(
  store: &S,
  change: Change,
  now: i64,
) -> Result<Applied, S::Error> {
  match change {
    Change::AddTag(name) => Ok(Applied::TagCreated(store.create_tag(&name).await?)),
    Change::RemoveTag(name) => {
      store.delete_tag(&name).await?;
      Ok(Applied::TagRemoved(name))
    }
    Change::UpsertPoi(form) => Ok(Applied::PoiUpserted(store.upsert_poi(form).await?)),
    Change::RecordHistory(tags) => {
      let ids: Vec<i64> = tags.iter().map(|t| t.tag_id).collect();
      store.record_history(&ids, now).await?;
      Ok(Applied::HistoryRecorded(ids.len()))
    }
  }
}

/// Apply the staged update `id` and delete it once it has been applied.
///
/// On any failure the staged row is left in place.
pub async fn apply_pending<S: PoiStore>(store: &S, id: i64) -> Result<Applied, S::Error> {
  let update = store
    .get_pending_update(id)
    .await?
    .ok_or(Error::PendingUpdateNotFound(id))?;

  let change = Change::decode(&update.event, &update.data)?;
  let applied = apply_change(store, change, Utc::now().timestamp()).await?;

  store.discard_pending_update(id).await?;
  Ok(applied)
}
