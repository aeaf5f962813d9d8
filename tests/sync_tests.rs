use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use genosdb::{
    ApplyOutcome, BroadcastChannel, ConflictPolicy, ConflictResolver, EdgeRecord, GraphConfig,
    GraphDb, NodeRecord, Operation, Query, Resolution, Revision, edge_id,
};
use proptest::prelude::*;
use serde_json::{Map, json};

const FAR_FUTURE: u64 = u64::MAX / 2;

fn put_op(id: &str, timestamp: u64, version: u64, name: &str) -> Operation {
    Operation::Put {
        node: NodeRecord {
            id: id.into(),
            data: json!({ "name": name }),
            timestamp,
            version,
            meta: Map::new(),
        },
    }
}

fn link_op(from: &str, to: &str, timestamp: u64) -> Operation {
    Operation::Link {
        edge: EdgeRecord {
            id: edge_id(from, to),
            from: from.into(),
            to: to.into(),
            data: json!({}),
            timestamp,
        },
    }
}

fn remove_op(id: &str, timestamp: u64) -> Operation {
    Operation::Remove {
        id: id.into(),
        timestamp,
    }
}

/// Nodes in id order plus every edge id among them and the ids in `extra`.
fn contents(db: &GraphDb, extra: &[&str]) -> (Vec<NodeRecord>, Vec<EdgeRecord>) {
    let nodes = db.map(&Query::all()).expect("map");
    let mut ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ids.extend(extra.iter().map(|id| id.to_string()));
    let mut edges: Vec<EdgeRecord> = ids.iter().flat_map(|id| db.edges_of(id)).collect();
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    edges.dedup_by(|a, b| a.id == b.id);
    (nodes, edges)
}

/// Overlapping puts, links, removes and a clear over a handful of ids.
fn mixed_batch() -> Vec<Operation> {
    vec![
        put_op("a", 10, 1, "a1"),
        remove_op("a", 15),
        put_op("a", 20, 2, "a2"),
        put_op("b", 5, 1, "b1"),
        put_op("b", 8, 2, "b2"),
        remove_op("b", 30),
        put_op("c", 12, 1, "c1"),
        put_op("d", 4, 1, "d1"),
        put_op("e", 40, 1, "e1"),
        link_op("a", "b", 21),
        link_op("a", "c", 11),
        link_op("c", "a", 14),
        link_op("e", "a", 45),
        Operation::Clear { timestamp: 13 },
    ]
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_older_peer_put_is_superseded() {
    let db = GraphDb::in_memory().expect("db");
    db.put("a", json!({ "name": "local" })).expect("put");
    let report = db.sync_with_peer(vec![put_op("a", 1, 7, "stale")]);
    assert_eq!(report.superseded, 1);
    assert_eq!(db.get("a").expect("node").data["name"], json!("local"));
    assert_eq!(db.oplog().len(), 1);
}

#[test]
fn test_newer_peer_put_wins_and_is_relayed() {
    let db = GraphDb::in_memory().expect("db");
    db.put("a", json!({ "name": "local" })).expect("put");
    let report = db.sync_with_peer(vec![put_op("a", FAR_FUTURE, 1, "remote")]);
    assert_eq!(report.applied, 1);
    let stored = db.get("a").expect("node");
    assert_eq!(stored.data["name"], json!("remote"));
    assert_eq!(stored.timestamp, FAR_FUTURE);
    let log = db.oplog();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1], put_op("a", FAR_FUTURE, 1, "remote"));
}

#[test]
fn test_arrival_order_policy_applies_stale_puts() {
    let cfg = GraphConfig::in_memory().with_conflict_policy(ConflictPolicy::ArrivalOrder);
    let db = GraphDb::open(cfg).expect("db");
    db.put("a", json!({ "name": "local" })).expect("put");
    let report = db.sync_with_peer(vec![put_op("a", 1, 1, "stale")]);
    assert_eq!(report.applied, 1);
    assert_eq!(db.get("a").expect("node").data["name"], json!("stale"));
}

#[test]
fn test_replay_is_idempotent() {
    let db = GraphDb::in_memory().expect("db");
    let batch = vec![put_op("a", 10, 1, "x"), link_op("a", "b", 11)];
    assert_eq!(db.sync_with_peer(batch.clone()).applied, 2);
    let again = db.sync_with_peer(batch);
    assert_eq!(again.applied, 0);
    assert_eq!(again.superseded, 2);
    assert_eq!(db.oplog().len(), 2);
}

#[test]
fn test_puts_and_links_converge_regardless_of_order() {
    let ops = vec![
        put_op("a", 10, 1, "first"),
        put_op("a", 20, 2, "second"),
        Operation::Remove {
            id: "a".into(),
            timestamp: 15,
        },
        put_op("b", 5, 1, "bee"),
        put_op("b", 8, 2, "bee again"),
        link_op("a", "b", 21),
    ];
    let forward = GraphDb::in_memory().expect("db");
    forward.sync_with_peer(ops.clone());
    let backward = GraphDb::in_memory().expect("db");
    backward.sync_with_peer(ops.into_iter().rev());

    for db in [&forward, &backward] {
        assert_eq!(db.get("a").expect("a").data["name"], json!("second"));
        assert_eq!(db.get("b").expect("b").data["name"], json!("bee again"));
        assert!(db.get_edge(&edge_id("a", "b")).is_some());
    }
}

#[test]
fn test_remove_arriving_before_older_put_still_wins() {
    let ops = vec![put_op("a", 10, 1, "x"), remove_op("a", 15)];
    let in_order = GraphDb::in_memory().expect("db");
    in_order.sync_with_peer(ops.clone());
    let reversed = GraphDb::in_memory().expect("db");
    let report = reversed.sync_with_peer(ops.into_iter().rev());
    assert_eq!((report.applied, report.superseded), (1, 1));

    assert!(in_order.get("a").is_none());
    assert!(reversed.get("a").is_none());
    assert_eq!(contents(&in_order, &["a"]), contents(&reversed, &["a"]));

    assert_eq!(reversed.sync_with_peer(vec![put_op("a", 16, 1, "back")]).applied, 1);
    assert!(reversed.get("a").is_some());
}

#[test]
fn test_remove_before_link_discards_stale_edge() {
    let ops = vec![link_op("a", "b", 10), remove_op("a", 15), link_op("b", "a", 20)];
    let in_order = GraphDb::in_memory().expect("db");
    in_order.sync_with_peer(ops.clone());
    let reversed = GraphDb::in_memory().expect("db");
    reversed.sync_with_peer(ops.into_iter().rev());
    for db in [&in_order, &reversed] {
        assert!(db.get_edge(&edge_id("a", "b")).is_none());
        assert!(db.get_edge(&edge_id("b", "a")).is_some());
    }
}

#[test]
fn test_clear_arriving_before_older_put_still_wins() {
    let ops = vec![
        put_op("old", 10, 1, "o"),
        link_op("old", "x", 11),
        Operation::Clear { timestamp: 15 },
        put_op("new", 20, 1, "n"),
    ];
    let in_order = GraphDb::in_memory().expect("db");
    in_order.sync_with_peer(ops.clone());
    let reversed = GraphDb::in_memory().expect("db");
    reversed.sync_with_peer(ops.into_iter().rev());
    for db in [&in_order, &reversed] {
        assert!(db.get("old").is_none());
        assert!(db.get("new").is_some());
        assert_eq!(db.stats().edges, 0);
    }
}

#[test]
fn test_local_put_outranks_peer_clock_ahead() {
    let local = GraphDb::in_memory().expect("local");
    let peer = GraphDb::in_memory().expect("peer");
    for db in [&local, &peer] {
        db.sync_with_peer(vec![put_op("a", FAR_FUTURE, 1, "remote")]);
    }
    let written = local.put("a", json!({ "name": "newer local" })).expect("put");
    assert!(written.timestamp > FAR_FUTURE);
    assert_eq!(written.version, 2);

    let shipped = local.oplog().last().cloned().expect("op");
    let report = peer.sync_with_peer(vec![shipped]);
    assert_eq!(report.applied, 1);
    assert_eq!(peer.get("a"), local.get("a"));
}

#[test]
fn test_local_remove_outranks_peer_clock_ahead() {
    let local = GraphDb::in_memory().expect("local");
    let peer = GraphDb::in_memory().expect("peer");
    for db in [&local, &peer] {
        db.sync_with_peer(vec![put_op("a", FAR_FUTURE, 1, "remote")]);
    }
    assert!(local.remove("a"));
    let shipped = local.oplog().last().cloned().expect("op");
    assert_eq!(peer.sync_with_peer(vec![shipped]).applied, 1);
    assert!(peer.get("a").is_none());
}

#[test]
fn test_mixed_batch_converges_to_expected_state() {
    let forward = GraphDb::in_memory().expect("db");
    forward.sync_with_peer(mixed_batch());
    let backward = GraphDb::in_memory().expect("db");
    backward.sync_with_peer(mixed_batch().into_iter().rev());

    let ids: Vec<String> = forward
        .map(&Query::all())
        .expect("map")
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["a", "e"]);
    assert_eq!(forward.get("a").expect("a").data["name"], json!("a2"));
    assert!(forward.get_edge(&edge_id("e", "a")).is_some());
    assert_eq!(forward.stats().edges, 1);
    assert_eq!(contents(&forward, &["b", "c"]), contents(&backward, &["b", "c"]));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_any_delivery_order_converges(ops in Just(mixed_batch()).prop_shuffle()) {
        let reference = GraphDb::in_memory().expect("db");
        reference.sync_with_peer(mixed_batch());
        let shuffled = GraphDb::in_memory().expect("db");
        shuffled.sync_with_peer(ops);
        prop_assert_eq!(
            contents(&shuffled, &["b", "c", "d"]),
            contents(&reference, &["b", "c", "d"])
        );
    }
}

#[test]
fn test_peer_clear_spares_newer_records() {
    let db = GraphDb::in_memory().expect("db");
    db.sync_with_peer(vec![put_op("old", 5, 1, "o"), put_op("new", 50, 1, "n")]);
    db.sync_with_peer(vec![Operation::Clear { timestamp: 20 }]);
    assert!(db.get("old").is_none());
    assert!(db.get("new").is_some());
}

#[test]
fn test_malformed_operations_are_counted_and_skipped() {
    let db = GraphDb::in_memory().expect("db");
    let mut bad_link = link_op("a", "b", 5);
    if let Operation::Link { edge } = &mut bad_link {
        edge.id = "forged".into();
    }
    let report = db.sync_with_peer(vec![
        put_op("", 1, 1, "nameless"),
        bad_link,
        put_op("ok", 1, 1, "fine"),
    ]);
    assert_eq!((report.applied, report.rejected), (1, 2));
    assert!(db.get("ok").is_some());
}

#[test]
fn test_json_batch_counts_undecodable_entries() {
    let db = GraphDb::in_memory().expect("db");
    let report = db.sync_with_peer_json(&[
        json!({ "type": "put", "node": { "id": "a", "data": {}, "timestamp": 3, "version": 1 } }),
        json!({ "type": "teleport" }),
        json!("not even an object"),
        json!({ "type": "remove", "id": "a", "timestamp": 4 }),
    ]);
    assert_eq!(report.applied, 2);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.total(), 4);
    assert!(db.get("a").is_none());
}

#[test]
fn test_apply_operation_does_not_touch_oplog() {
    let db = GraphDb::in_memory().expect("db");
    let outcome = db.apply_operation(&put_op("a", 5, 1, "x")).expect("apply");
    assert_eq!(outcome, ApplyOutcome::Applied);
    assert!(db.get("a").is_some());
    assert!(db.oplog().is_empty());
}

#[test]
fn test_custom_resolver_is_consulted() {
    struct KeepLocal;
    impl ConflictResolver for KeepLocal {
        fn resolve(&self, _local: Revision, _incoming: Revision) -> Resolution {
            Resolution::KeepLocal
        }
    }
    let db = GraphDb::open_with(
        GraphConfig::in_memory(),
        Arc::new(genosdb::NoopBus),
        Arc::new(KeepLocal),
    )
    .expect("db");
    db.put("a", json!({ "name": "mine" })).expect("put");
    let report = db.sync_with_peer(vec![put_op("a", FAR_FUTURE, 9, "theirs")]);
    assert_eq!(report.superseded, 1);
    assert_eq!(db.get("a").expect("a").data["name"], json!("mine"));
}

#[test]
fn test_broadcast_channel_replicates_between_instances() {
    let channel = BroadcastChannel::new();
    let a = GraphDb::open_with_bus(GraphConfig::in_memory(), Arc::new(channel.endpoint()))
        .expect("a");
    let b = GraphDb::open_with_bus(GraphConfig::in_memory(), Arc::new(channel.endpoint()))
        .expect("b");

    a.put("shared", json!({ "from": "a" })).expect("put");
    a.link("shared", "other", json!({})).expect("link");
    assert!(wait_until(|| b.get_edge(&edge_id("shared", "other")).is_some()));
    assert_eq!(b.get("shared").expect("replica").data, json!({ "from": "a" }));
    assert!(b.oplog().is_empty());

    b.remove("shared");
    assert!(wait_until(|| a.get("shared").is_none()));
}

#[test]
fn test_peer_batch_is_relayed_on_bus() {
    let channel = BroadcastChannel::new();
    let relay = GraphDb::open_with_bus(GraphConfig::in_memory(), Arc::new(channel.endpoint()))
        .expect("relay");
    let tab = GraphDb::open_with_bus(GraphConfig::in_memory(), Arc::new(channel.endpoint()))
        .expect("tab");
    relay.sync_with_peer(vec![put_op("p", 42, 1, "peer")]);
    assert!(wait_until(|| tab.get("p").is_some()));
}
