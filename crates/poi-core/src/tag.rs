//! Tags, target audiences and tag-usage history.

use serde::{Deserialize, Serialize};

/// A free-form label attachable to any number of POIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id:          i64,
  pub tag_name:        String,
  pub pinyin_initials: String,
}

/// Reference row naming an audience a recommendation is written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAudience {
  pub id:              i64,
  pub target_audience: String,
}

/// One recorded use of a tag. `used_time` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub tag_id:    i64,
  pub used_time: i64,
}

/// A tag reference by id, as carried in staged history payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedTag {
  pub tag_id: i64,
}

/// The association changes applied by one tag reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiff {
  pub added:   Vec<i64>,
  pub removed: Vec<i64>,
}

impl TagDiff {
  pub fn is_empty(&self) -> bool { self.added.is_empty() && self.removed.is_empty() }
}
