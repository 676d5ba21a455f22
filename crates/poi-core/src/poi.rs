//! POI types — the catalogued points of interest and the form used to write
//! them.
//!
//! A POI is keyed for writes by its unique display name; the surrogate `id`
//! is assigned by the store and stays stable across upserts of the same name.
//! The `level` and `pinyin_initials` columns are derived by the store and are
//! never taken from the caller.

use serde::{Deserialize, Serialize};

// ─── Stored record ───────────────────────────────────────────────────────────

/// A POI row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poi {
  pub id:              i64,
  /// Unique display label; the natural key for upserts.
  pub name:            String,
  pub parent_id:       Option<i64>,
  pub description:     Option<String>,
  pub href:            Option<String>,
  /// Depth in the parent chain; roots sit at 0.
  pub level:           i64,
  /// Sort order among siblings.
  pub weight:          i64,
  pub pinyin_initials: String,
}

// ─── Write input ─────────────────────────────────────────────────────────────

/// A tag reference inside a [`PoiForm`], by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRef {
  pub tag_name: String,
}

impl TagRef {
  pub fn new(tag_name: impl Into<String>) -> Self {
    Self { tag_name: tag_name.into() }
  }
}

/// One audience-scoped recommendation note inside a [`PoiForm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationInput {
  /// Label of an existing target audience.
  pub audience:       String,
  pub recommendation: String,
}

/// Input to [`crate::store::PoiStore::upsert_poi`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoiForm {
  pub name:            String,
  #[serde(default)]
  pub parent_id:       Option<i64>,
  #[serde(default)]
  pub description:     Option<String>,
  #[serde(default)]
  pub href:            Option<String>,
  /// Accepted for compatibility with staged payloads; the stored level is
  /// always derived from `parent_id`.
  #[serde(default)]
  pub level:           Option<i64>,
  #[serde(default)]
  pub weight:          i64,
  #[serde(default)]
  pub tags:            Vec<TagRef>,
  #[serde(default)]
  pub recommendations: Vec<RecommendationInput>,
}

impl PoiForm {
  /// Convenience constructor with every optional field empty.
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn with_parent(mut self, parent_id: i64) -> Self {
    self.parent_id = Some(parent_id);
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  pub fn with_tags<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.tags = names.into_iter().map(TagRef::new).collect();
    self
  }

  pub fn with_recommendation(
    mut self,
    audience: impl Into<String>,
    recommendation: impl Into<String>,
  ) -> Self {
    self.recommendations.push(RecommendationInput {
      audience:       audience.into(),
      recommendation: recommendation.into(),
    });
    self
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A keyword-search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiSummary {
  pub id:          i64,
  pub name:        String,
  pub description: Option<String>,
}

/// An exact-name hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiName {
  pub id:   i64,
  pub name: String,
}

/// A recommendation joined with its audience label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
  pub reason:          String,
  pub target_audience: String,
}

/// The assembled read model for a single POI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiDetail {
  #[serde(flatten)]
  pub poi:             Poi,
  /// Display name of the parent, if the parent row still resolves.
  pub parent_name:     Option<String>,
  pub tags:            Vec<String>,
  pub recommendations: Vec<Recommendation>,
}
