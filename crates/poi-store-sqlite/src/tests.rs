//! Integration tests for `SqliteStore` against an in-memory database.

use poi_core::{
  ErrorKind,
  pending::{Applied, apply_pending},
  poi::{PoiForm, TagRef},
  store::PoiStore,
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A store seeded with the tags `park`, `free`, `lake` and the audience
/// `kids`.
async fn seeded() -> SqliteStore {
  let s = store().await;
  for name in ["park", "free", "lake"] {
    s.create_tag(name).await.unwrap();
  }
  s.add_target_audience("kids").await.unwrap();
  s
}

fn tags(names: &[&str]) -> Vec<TagRef> { names.iter().copied().map(TagRef::new).collect() }

fn names(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

async fn tag_names_of(s: &SqliteStore, poi_id: i64) -> Vec<String> {
  s.get_by_id(poi_id).await.unwrap().tags
}

// ─── Upsert ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_same_name_twice_keeps_one_row_with_latest_fields() {
  let s = store().await;

  let first = s
    .upsert_poi(PoiForm::new("Central Park").with_description("old"))
    .await
    .unwrap();
  let second = s
    .upsert_poi(PoiForm::new("Central Park").with_description("new"))
    .await
    .unwrap();
  assert_eq!(first, second);

  let hits = s.search_by_exact_name("Central Park").await.unwrap();
  assert_eq!(hits.len(), 1);

  let detail = s.get_by_id(first).await.unwrap();
  assert_eq!(detail.poi.description.as_deref(), Some("new"));
}

#[tokio::test]
async fn upsert_derives_search_key_and_level() {
  let s = store().await;

  let root = s.upsert_poi(PoiForm::new("北京")).await.unwrap();
  let mut form = PoiForm::new("颐和园").with_parent(root);
  form.level = Some(42);
  let child = s.upsert_poi(form).await.unwrap();

  let root_detail = s.get_by_id(root).await.unwrap();
  assert_eq!(root_detail.poi.pinyin_initials, "bj");
  assert_eq!(root_detail.poi.level, 0);

  let child_detail = s.get_by_id(child).await.unwrap();
  assert_eq!(child_detail.poi.level, 1);
  assert_eq!(child_detail.parent_name.as_deref(), Some("北京"));
}

#[tokio::test]
async fn upsert_with_unknown_parent_is_not_found() {
  let s = store().await;
  let err = s
    .upsert_poi(PoiForm::new("Orphan").with_parent(999))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert!(s.search_by_exact_name("Orphan").await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_rejects_parent_chains_that_loop() {
  let s = store().await;
  let root = s.upsert_poi(PoiForm::new("Root")).await.unwrap();
  let child = s.upsert_poi(PoiForm::new("Child").with_parent(root)).await.unwrap();

  let err = s
    .upsert_poi(PoiForm::new("Root").with_parent(child))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);

  let err = s
    .upsert_poi(PoiForm::new("Child").with_parent(child))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);

  // Nothing changed.
  assert_eq!(s.get_by_id(root).await.unwrap().poi.parent_id, None);
}

#[tokio::test]
async fn reparenting_refreshes_descendant_levels() {
  let s = store().await;
  let a = s.upsert_poi(PoiForm::new("A")).await.unwrap();
  let b = s.upsert_poi(PoiForm::new("B")).await.unwrap();
  let c = s.upsert_poi(PoiForm::new("C").with_parent(b)).await.unwrap();

  // Move B under A; C follows one level deeper.
  s.upsert_poi(PoiForm::new("B").with_parent(a)).await.unwrap();

  assert_eq!(s.get_by_id(b).await.unwrap().poi.level, 1);
  assert_eq!(s.get_by_id(c).await.unwrap().poi.level, 2);
}

#[tokio::test]
async fn reparenting_a_full_depth_subtree_fails_only_when_it_overflows() {
  let s = store().await.with_max_depth(2);
  let a = s.upsert_poi(PoiForm::new("A")).await.unwrap();
  let b = s.upsert_poi(PoiForm::new("B")).await.unwrap();
  let c = s.upsert_poi(PoiForm::new("C").with_parent(b)).await.unwrap();
  let leaf = s.upsert_poi(PoiForm::new("Leaf")).await.unwrap();

  // A leaf may land exactly at the bound.
  s.upsert_poi(PoiForm::new("Leaf").with_parent(c)).await.unwrap();
  assert_eq!(s.get_by_id(leaf).await.unwrap().poi.level, 2);

  // Moving B under A would push Leaf to level 3.
  let err = s
    .upsert_poi(PoiForm::new("B").with_parent(a))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);
  assert_eq!(s.get_by_id(b).await.unwrap().poi.parent_id, None);
  assert_eq!(s.get_by_id(leaf).await.unwrap().poi.level, 2);
}

#[tokio::test]
async fn failed_upsert_rolls_back_every_step() {
  let s = seeded().await;

  let form = PoiForm::new("Central Park")
    .with_tags(["park", "missing"])
    .with_recommendation("kids", "playground");
  let err = s.upsert_poi(form).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  assert!(s.search_by_exact_name("Central Park").await.unwrap().is_empty());
  assert_eq!(s.count_pois_for_tag("park").await.unwrap(), 0);
}

#[tokio::test]
async fn upsert_with_unknown_audience_is_not_found() {
  let s = seeded().await;
  let form = PoiForm::new("Zoo").with_recommendation("pensioners", "quiet mornings");
  let err = s.upsert_poi(form).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert!(s.search_by_exact_name("Zoo").await.unwrap().is_empty());
}

// ─── Hierarchy ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn compute_level_follows_parent_chain() {
  let s = store().await;
  assert_eq!(s.compute_level(None).await.unwrap(), 0);

  let root = s.upsert_poi(PoiForm::new("Root")).await.unwrap();
  let child = s.upsert_poi(PoiForm::new("Child").with_parent(root)).await.unwrap();
  let grandchild = s
    .upsert_poi(PoiForm::new("Grandchild").with_parent(child))
    .await
    .unwrap();

  let child_parent = s.get_by_id(child).await.unwrap().poi.parent_id;
  let grandchild_parent = s.get_by_id(grandchild).await.unwrap().poi.parent_id;
  assert_eq!(s.compute_level(child_parent).await.unwrap(), 0);
  assert_eq!(s.compute_level(grandchild_parent).await.unwrap(), 1);
  assert_eq!(s.compute_level(Some(grandchild)).await.unwrap(), 2);
}

#[tokio::test]
async fn compute_level_of_missing_id_is_zero() {
  let s = store().await;
  assert_eq!(s.compute_level(Some(12345)).await.unwrap(), 0);
}

#[tokio::test]
async fn compute_level_detects_cycles() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("poi.sqlite");

  let s = SqliteStore::open(&path).await.unwrap().with_max_depth(8);
  let a = s.upsert_poi(PoiForm::new("A")).await.unwrap();
  let b = s.upsert_poi(PoiForm::new("B").with_parent(a)).await.unwrap();

  // Close the loop behind the store's back.
  let raw = rusqlite::Connection::open(&path).unwrap();
  raw
    .execute("UPDATE poi SET parent_id = ?1 WHERE id = ?2", [b, a])
    .unwrap();
  drop(raw);

  let err = s.compute_level(Some(b)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);
}

#[tokio::test]
async fn upsert_refuses_levels_beyond_max_depth() {
  let s = store().await.with_max_depth(3);

  let n0 = s.upsert_poi(PoiForm::new("n0")).await.unwrap();
  let mut parent = n0;
  for name in ["n1", "n2", "n3"] {
    parent = s.upsert_poi(PoiForm::new(name).with_parent(parent)).await.unwrap();
  }
  let n3 = parent;
  assert_eq!(s.get_by_id(n3).await.unwrap().poi.level, 3);

  let err = s
    .upsert_poi(PoiForm::new("n4").with_parent(n3))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::CycleDetected);
  assert!(s.search_by_exact_name("n4").await.unwrap().is_empty());

  // Every stored POI is still walkable within the bound.
  assert_eq!(s.compute_level(Some(n3)).await.unwrap(), 3);

  // Re-upserting the root leaves the full-depth subtree untouched.
  let again = s
    .upsert_poi(PoiForm::new("n0").with_description("renamed root"))
    .await
    .unwrap();
  assert_eq!(again, n0);
  assert_eq!(s.search_by_exact_name("n0").await.unwrap().len(), 1);
  let root = s.get_by_id(n0).await.unwrap().poi;
  assert_eq!(root.description.as_deref(), Some("renamed root"));
  assert_eq!(s.get_by_id(n3).await.unwrap().poi.level, 3);
}

// ─── Tag reconciliation ──────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_converges_to_the_desired_set() {
  let s = seeded().await;
  let poi = s.upsert_poi(PoiForm::new("Lakeside")).await.unwrap();

  let diff = s.reconcile_tags(poi, tags(&["park", "free"])).await.unwrap();
  assert_eq!(diff.added.len(), 2);
  assert!(diff.removed.is_empty());

  let diff = s.reconcile_tags(poi, tags(&["lake", "park"])).await.unwrap();
  assert_eq!(diff.added.len(), 1);
  assert_eq!(diff.removed.len(), 1);
  assert_eq!(tag_names_of(&s, poi).await, names(&["lake", "park"]));

  // Same set in another order: no-op.
  let diff = s.reconcile_tags(poi, tags(&["park", "lake"])).await.unwrap();
  assert!(diff.is_empty());
  assert_eq!(tag_names_of(&s, poi).await, names(&["lake", "park"]));
}

#[tokio::test]
async fn reconcile_to_empty_removes_everything() {
  let s = seeded().await;
  let poi = s
    .upsert_poi(PoiForm::new("Lakeside").with_tags(["park", "lake"]))
    .await
    .unwrap();

  s.reconcile_tags(poi, Vec::new()).await.unwrap();
  assert!(tag_names_of(&s, poi).await.is_empty());
}

#[tokio::test]
async fn reconcile_ignores_duplicate_desired_names() {
  let s = seeded().await;
  let poi = s.upsert_poi(PoiForm::new("Lakeside")).await.unwrap();

  let diff = s.reconcile_tags(poi, tags(&["park", "park"])).await.unwrap();
  assert_eq!(diff.added.len(), 1);
  assert_eq!(s.count_pois_for_tag("park").await.unwrap(), 1);
}

#[tokio::test]
async fn reconcile_unknown_tag_changes_nothing() {
  let s = seeded().await;
  let poi = s
    .upsert_poi(PoiForm::new("Lakeside").with_tags(["park"]))
    .await
    .unwrap();

  let err = s
    .reconcile_tags(poi, tags(&["free", "nonexistent"]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  assert_eq!(tag_names_of(&s, poi).await, names(&["park"]));
}

#[tokio::test]
async fn reconcile_missing_poi_is_not_found() {
  let s = seeded().await;
  let err = s.reconcile_tags(77, tags(&["park"])).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Recommendations ─────────────────────────────────────────────────────────

#[tokio::test]
async fn recommendations_are_appended_not_replaced() {
  let s = seeded().await;
  let form = PoiForm::new("Zoo").with_recommendation("kids", "see the pandas");

  let id = s.upsert_poi(form.clone()).await.unwrap();
  s.upsert_poi(form).await.unwrap();
  s.write_recommendations(id, Vec::new()).await.unwrap();

  let detail = s.get_by_id(id).await.unwrap();
  assert_eq!(detail.recommendations.len(), 2);
  assert!(
    detail
      .recommendations
      .iter()
      .all(|r| r.target_audience == "kids" && r.reason == "see the pandas")
  );
}

// ─── Search & retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn keyword_search_matches_name_and_search_key() {
  let s = store().await;
  s.upsert_poi(PoiForm::new("中央公园")).await.unwrap();
  s.upsert_poi(PoiForm::new("Central Park").with_description("NYC"))
    .await
    .unwrap();
  s.upsert_poi(PoiForm::new("Harbour")).await.unwrap();

  let by_key = s.search_by_keyword("ZYGY").await.unwrap();
  assert_eq!(by_key.len(), 1);
  assert_eq!(by_key[0].name, "中央公园");

  let by_name = s.search_by_keyword("park").await.unwrap();
  assert_eq!(by_name.len(), 1);
  assert_eq!(by_name[0].description.as_deref(), Some("NYC"));

  assert!(s.search_by_keyword("%").await.unwrap().is_empty());
}

#[tokio::test]
async fn keyword_search_folds_case_beyond_ascii() {
  let s = store().await;
  s.upsert_poi(PoiForm::new("École Militaire")).await.unwrap();
  s.upsert_poi(PoiForm::new("Harbour")).await.unwrap();

  for keyword in ["école", "ÉCOLE", "militaire"] {
    let hits = s.search_by_keyword(keyword).await.unwrap();
    assert_eq!(hits.len(), 1, "keyword {keyword:?}");
    assert_eq!(hits[0].name, "École Militaire");
  }
}

#[tokio::test]
async fn exact_name_search_does_not_match_substrings() {
  let s = store().await;
  s.upsert_poi(PoiForm::new("Central Park")).await.unwrap();
  assert!(s.search_by_exact_name("Central").await.unwrap().is_empty());
  assert_eq!(s.search_by_exact_name("Central Park").await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_by_tags_requires_every_tag() {
  let s = seeded().await;
  let both = s
    .upsert_poi(PoiForm::new("Both").with_tags(["park", "free"]))
    .await
    .unwrap();
  s.upsert_poi(PoiForm::new("OnlyPark").with_tags(["park"]))
    .await
    .unwrap();
  s.upsert_poi(PoiForm::new("OnlyFree").with_tags(["free", "lake"]))
    .await
    .unwrap();

  let hits = s.find_by_tags(&names(&["park", "free"])).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].id, both);

  assert_eq!(s.find_by_tags(&names(&["park"])).await.unwrap().len(), 2);
  assert!(s.find_by_tags(&[]).await.unwrap().is_empty());
  assert!(s.find_by_tags(&names(&["park", "nope"])).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_by_id_missing_is_not_found() {
  let s = store().await;
  let err = s.get_by_id(404).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn get_by_id_defaults_to_empty_children() {
  let s = store().await;
  let id = s.upsert_poi(PoiForm::new("Bare")).await.unwrap();
  let detail = s.get_by_id(id).await.unwrap();
  assert!(detail.tags.is_empty());
  assert!(detail.recommendations.is_empty());
  assert!(detail.parent_name.is_none());
}

#[tokio::test]
async fn end_to_end_tagging_scenario() {
  let s = store().await;
  s.create_tag("park").await.unwrap();
  s.create_tag("free").await.unwrap();

  let poi = s
    .upsert_poi(PoiForm::new("Central Park").with_tags(["park", "free"]))
    .await
    .unwrap();

  let hits = s.find_by_tags(&names(&["park", "free"])).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].id, poi);

  s.reconcile_tags(poi, tags(&["park"])).await.unwrap();
  assert_eq!(s.get_by_id(poi).await.unwrap().tags, names(&["park"]));

  s.delete_tag("park").await.unwrap();
  assert!(s.find_by_tags(&names(&["park"])).await.unwrap().is_empty());
  assert!(s.get_by_id(poi).await.unwrap().tags.is_empty());
  assert!(s.list_tags().await.unwrap().iter().all(|t| t.tag_name != "park"));
}

// ─── Tag lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_tag_derives_key_and_rejects_duplicates() {
  let s = store().await;
  let tag = s.create_tag("免费").await.unwrap();
  assert_eq!(tag.pinyin_initials, "mf");
  assert_eq!(s.list_tags().await.unwrap(), vec![tag]);

  let err = s.create_tag("免费").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn count_pois_for_tag_is_advisory() {
  let s = seeded().await;
  s.upsert_poi(PoiForm::new("A").with_tags(["park"])).await.unwrap();
  s.upsert_poi(PoiForm::new("B").with_tags(["park", "free"]))
    .await
    .unwrap();

  assert_eq!(s.count_pois_for_tag("park").await.unwrap(), 2);
  assert_eq!(s.count_pois_for_tag("lake").await.unwrap(), 0);

  // Deletion proceeds regardless of the count.
  s.delete_tag("park").await.unwrap();
  assert_eq!(s.count_pois_for_tag("park").await.unwrap(), 0);
}

#[tokio::test]
async fn delete_unknown_tag_is_a_no_op() {
  let s = seeded().await;
  s.delete_tag("never-existed").await.unwrap();
  assert_eq!(s.list_tags().await.unwrap().len(), 3);
}

#[tokio::test]
async fn duplicate_audience_is_a_conflict() {
  let s = seeded().await;
  let err = s.add_target_audience("kids").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert_eq!(s.list_target_audiences().await.unwrap().len(), 1);
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn prune_history_keeps_rows_at_the_cutoff() {
  let s = store().await;
  s.record_history(&[1, 2], 100).await.unwrap();
  s.record_history(&[3], 200).await.unwrap();
  s.record_history(&[4], 300).await.unwrap();
  assert_eq!(s.fetch_history().await.unwrap().len(), 4);

  let removed = s.prune_history(200).await.unwrap();
  assert_eq!(removed, 2);

  let left: Vec<(i64, i64)> = s
    .fetch_history()
    .await
    .unwrap()
    .into_iter()
    .map(|h| (h.tag_id, h.used_time))
    .collect();
  assert_eq!(left, vec![(3, 200), (4, 300)]);
}

// ─── Pending updates ─────────────────────────────────────────────────────────

#[tokio::test]
async fn stage_update_stores_strings_verbatim_and_objects_as_json() {
  let s = store().await;
  let plain = s
    .stage_update("add-new-tag", &serde_json::json!("park"), Some("code"))
    .await
    .unwrap();
  let nested = serde_json::json!({"key1": "value1", "nested": {"key3": "value3"}});
  let structured = s.stage_update("test", &nested, None).await.unwrap();

  let plain_row = s.get_pending_update(plain).await.unwrap().unwrap();
  assert_eq!(plain_row.data, "park");
  assert_eq!(plain_row.auth_code.as_deref(), Some("code"));

  let structured_row = s.get_pending_update(structured).await.unwrap().unwrap();
  let back: serde_json::Value = serde_json::from_str(&structured_row.data).unwrap();
  assert_eq!(back, nested);

  assert_eq!(s.list_pending_updates().await.unwrap().len(), 2);
}

#[tokio::test]
async fn applying_a_pending_update_deletes_it() {
  let s = store().await;
  let id = s
    .stage_update("add-new-tag", &serde_json::json!("park"), None)
    .await
    .unwrap();

  let applied = apply_pending(&s, id).await.unwrap();
  assert!(matches!(applied, Applied::TagCreated(ref t) if t.tag_name == "park"));
  assert!(s.get_pending_update(id).await.unwrap().is_none());
}

#[tokio::test]
async fn applying_staged_poi_and_history() {
  let s = seeded().await;
  let form = serde_json::json!({
    "name": "Central Park",
    "tags": [{"tag_name": "park"}],
    "recommendations": [{"audience": "kids", "recommendation": "playground"}]
  });
  let poi_update = s.stage_update("insert-poi", &form, None).await.unwrap();
  let Applied::PoiUpserted(poi) = apply_pending(&s, poi_update).await.unwrap() else {
    panic!("expected PoiUpserted");
  };
  assert_eq!(s.get_by_id(poi).await.unwrap().tags, names(&["park"]));

  let history = serde_json::json!([{"tag_id": 1}, {"tag_id": 2}]);
  let history_update = s.stage_update("insert-history", &history, None).await.unwrap();
  assert_eq!(
    apply_pending(&s, history_update).await.unwrap(),
    Applied::HistoryRecorded(2)
  );
  assert_eq!(s.fetch_history().await.unwrap().len(), 2);
  assert!(s.list_pending_updates().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_application_keeps_the_pending_update() {
  let s = store().await;
  s.create_tag("park").await.unwrap();

  let dup = s
    .stage_update("add-new-tag", &serde_json::json!("park"), None)
    .await
    .unwrap();
  let err = apply_pending(&s, dup).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(s.get_pending_update(dup).await.unwrap().is_some());

  let unknown = s
    .stage_update("reboot", &serde_json::json!("now"), None)
    .await
    .unwrap();
  assert!(apply_pending(&s, unknown).await.is_err());
  assert!(s.get_pending_update(unknown).await.unwrap().is_some());

  assert!(s.discard_pending_update(dup).await.unwrap());
  assert!(!s.discard_pending_update(dup).await.unwrap());
}

#[tokio::test]
async fn applying_missing_pending_update_is_not_found() {
  let s = store().await;
  let err = apply_pending(&s, 9).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn custom_span_does_not_change_behaviour() {
  let s = store()
    .await
    .with_span(tracing::info_span!("catalogue", run = "import"));
  let id = s.upsert_poi(PoiForm::new("Harbour")).await.unwrap();
  assert_eq!(s.get_by_id(id).await.unwrap().poi.name, "Harbour");
}

#[tokio::test]
async fn reopened_store_keeps_its_rows() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("poi.sqlite");

  let id = {
    let s = SqliteStore::open(&path).await.unwrap();
    s.create_tag("park").await.unwrap();
    s.upsert_poi(PoiForm::new("Central Park").with_tags(["park"]))
      .await
      .unwrap()
  };

  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(s.get_by_id(id).await.unwrap().tags, names(&["park"]));
}
