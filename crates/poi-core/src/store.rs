//! The `PoiStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `poi-store-sqlite`).
//! Callers that stage, apply or serve changes depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use crate::{
  pending::PendingUpdate,
  poi::{PoiDetail, PoiForm, PoiName, PoiSummary, RecommendationInput, TagRef},
  tag::{HistoryEntry, Tag, TagDiff, TargetAudience},
};

/// Abstraction over a POI catalogue backend.
///
/// Every multi-statement write is atomic: it either applies completely or
/// leaves the store untouched and returns the first failure.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes.
pub trait PoiStore: Send + Sync {
  type Error: std::error::Error + From<crate::Error> + Send + Sync + 'static;

  // ── Hierarchy ─────────────────────────────────────────────────────────

  /// Depth of the POI `parent_id` in its parent chain: the number of parent
  /// links above it. `None` and ids that resolve to no row yield 0.
  ///
  /// Fails with a cycle error if the walk exceeds the store's maximum depth.
  fn compute_level(
    &self,
    parent_id: Option<i64>,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  // ── POI writes ────────────────────────────────────────────────────────

  /// Insert or update the POI named `form.name`, then reconcile its tags and
  /// append its recommendations. Returns the POI's surrogate id, which is
  /// stable across upserts of the same name.
  fn upsert_poi(
    &self,
    form: PoiForm,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Make the POI's tag associations equal `desired` by applying the minimal
  /// add/remove diff. Every desired tag must already exist.
  fn reconcile_tags(
    &self,
    poi_id: i64,
    desired: Vec<TagRef>,
  ) -> impl Future<Output = Result<TagDiff, Self::Error>> + Send + '_;

  /// Append one recommendation row per entry. Entries are not deduplicated.
  fn write_recommendations(
    &self,
    poi_id: i64,
    recommendations: Vec<RecommendationInput>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── POI reads ─────────────────────────────────────────────────────────

  /// POIs whose name or search key contains `keyword`, case-insensitively.
  fn search_by_keyword<'a>(
    &'a self,
    keyword: &'a str,
  ) -> impl Future<Output = Result<Vec<PoiSummary>, Self::Error>> + Send + 'a;

  fn search_by_exact_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Vec<PoiName>, Self::Error>> + Send + 'a;

  /// POIs associated with *every* tag in `tag_names`.
  fn find_by_tags<'a>(
    &'a self,
    tag_names: &'a [String],
  ) -> impl Future<Output = Result<Vec<PoiSummary>, Self::Error>> + Send + 'a;

  /// Assemble the full read model for a POI.
  fn get_by_id(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<PoiDetail, Self::Error>> + Send + '_;

  // ── Tags ──────────────────────────────────────────────────────────────

  fn list_tags(
    &self,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  /// Create a tag. Fails with a conflict if the name is taken.
  fn create_tag<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + 'a;

  /// Number of POIs currently associated with the tag. Advisory only:
  /// [`PoiStore::delete_tag`] does not consult it.
  fn count_pois_for_tag<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Remove the tag's associations and then the tag itself.
  fn delete_tag<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Target audiences ──────────────────────────────────────────────────

  fn list_target_audiences(
    &self,
  ) -> impl Future<Output = Result<Vec<TargetAudience>, Self::Error>> + Send + '_;

  /// Seed a reference audience row.
  fn add_target_audience<'a>(
    &'a self,
    label: &'a str,
  ) -> impl Future<Output = Result<TargetAudience, Self::Error>> + Send + 'a;

  // ── History ───────────────────────────────────────────────────────────

  /// Append one history row per tag id, all stamped `used_time`.
  fn record_history<'a>(
    &'a self,
    tag_ids: &'a [i64],
    used_time: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn fetch_history(
    &self,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  /// Delete history rows strictly older than `cutoff`; returns how many went.
  fn prune_history(
    &self,
    cutoff: i64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Pending updates ───────────────────────────────────────────────────

  /// Stage a change request. String payloads are stored verbatim, anything
  /// else as JSON.
  fn stage_update<'a>(
    &'a self,
    event: &'a str,
    data: &'a serde_json::Value,
    auth_code: Option<&'a str>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  fn list_pending_updates(
    &self,
  ) -> impl Future<Output = Result<Vec<PendingUpdate>, Self::Error>> + Send + '_;

  fn get_pending_update(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<PendingUpdate>, Self::Error>> + Send + '_;

  /// Delete a staged change without applying it. Returns `false` if no row
  /// had that id.
  fn discard_pending_update(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
