use genosdb::{GraphDb, GraphDbError, Query, edge_id};
use proptest::prelude::*;
use serde_json::{Map, json};

fn db() -> GraphDb {
    GraphDb::in_memory().expect("db")
}

#[test]
fn test_put_then_get_returns_record() {
    let db = db();
    let written = db
        .put("n1", json!({ "type": "user", "name": "Ann" }))
        .expect("put");
    let stored = db.get("n1").expect("node");
    assert_eq!(stored.data, json!({ "type": "user", "name": "Ann" }));
    assert_eq!(stored.version, 1);
    assert_eq!(stored.timestamp, written.timestamp);
    assert!(stored.timestamp > 0);
}

#[test]
fn test_second_put_bumps_version() {
    let db = db();
    db.put("n1", json!({ "name": "Ann" })).expect("put");
    let second = db.put("n1", json!({ "name": "Annie" })).expect("put");
    assert_eq!(second.version, 2);
    assert_eq!(db.get("n1").expect("node").version, 2);
}

#[test]
fn test_get_missing_is_none() {
    assert!(db().get("nobody").is_none());
}

#[test]
fn test_put_with_merges_meta_onto_record() {
    let db = db();
    let mut meta = Map::new();
    meta.insert("owner".into(), json!("alice"));
    let record = db.put_with("doc", json!({ "title": "x" }), meta).expect("put");
    assert_eq!(record.meta["owner"], json!("alice"));
    let replaced = db.put("doc", json!({ "title": "y" })).expect("put");
    assert!(replaced.meta.is_empty());
}

#[test]
fn test_empty_ids_are_rejected_without_side_effects() {
    let db = db();
    assert!(matches!(db.put("", json!({})), Err(GraphDbError::InvalidInput(_))));
    assert!(matches!(db.link("a", "", json!({})), Err(GraphDbError::InvalidInput(_))));
    let stats = db.stats();
    assert_eq!(stats.nodes + stats.edges + stats.oplog_len, 0);
}

#[test]
fn test_remove_cascades_to_edges_in_both_directions() {
    let db = db();
    for id in ["a", "b", "c"] {
        db.put(id, json!({ "id": id })).expect("put");
    }
    db.link("a", "b", json!({ "weight": 5 })).expect("link");
    db.link("c", "a", json!({})).expect("link");
    db.link("b", "c", json!({})).expect("link");

    assert!(db.remove("a"));
    assert!(db.get_edge(&edge_id("a", "b")).is_none());
    assert!(db.get_edge(&edge_id("c", "a")).is_none());
    assert!(db.get_edge(&edge_id("b", "c")).is_some());
    assert!(db.edges_of("a").is_empty());
    assert!(!db.remove("a"));
}

#[test]
fn test_dangling_edges_are_legal() {
    let db = db();
    db.link("x", "y", json!({})).expect("link");
    assert_eq!(db.stats().edges, 1);
    assert_eq!(db.stats().nodes, 0);
    assert!(db.map(&Query::all()).expect("map").is_empty());
}

#[test]
fn test_clear_empties_everything() {
    let db = db();
    db.put("a", json!({})).expect("put");
    db.put("b", json!({})).expect("put");
    db.link("a", "b", json!({})).expect("link");
    db.clear();
    let stats = db.stats();
    assert_eq!((stats.nodes, stats.edges), (0, 0));
    assert_eq!(stats.oplog_len, 1);
    assert!(db.get("a").is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_version_counts_puts(ids in proptest::collection::vec(0u8..4, 1..40)) {
        let db = GraphDb::in_memory().expect("db");
        let mut counts = [0u64; 4];
        for (step, id) in ids.iter().enumerate() {
            db.put(&format!("n{id}"), json!({ "step": step })).expect("put");
            counts[*id as usize] += 1;
        }
        for (id, count) in counts.iter().enumerate() {
            let stored = db.get(&format!("n{id}"));
            prop_assert_eq!(stored.map_or(0, |n| n.version), *count);
        }
    }
}
