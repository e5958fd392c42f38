//! End-to-end tests for the ArborDB engine and persistence manager:
//! - Leaf-chain ordering against an independent reference
//! - Split shape and step vocabulary at ORDER = 4
//! - Persistence round-trips through the JSON file store
//! - Snapshot immutability on failed operations
//! - Arity-first composite-key semantics observed through the public API

use arbor_common::{Column, CompositeKey, Record, TreeConfig, TreeNode, TreeStructure};
use arbor_storage::{JsonFileStore, MemoryStore, Operation, Step, TreeManager};

fn ikey(v: i64) -> CompositeKey {
    CompositeKey::single(Column::Int(v))
}

fn irec(v: i64) -> Record {
    Record::new(vec![
        Column::Int(v),
        Column::String(format!("row-{v}")),
        Column::Bool(v % 2 == 0),
    ])
}

/// Walks the leaf chain from the leftmost leaf, returning all keys in
/// chain order.
fn chain_keys(tree: &TreeStructure) -> Vec<CompositeKey> {
    let mut current = tree.nodes.values().find_map(|node| match node {
        TreeNode::Leaf(leaf) if leaf.prev_page.is_none() => Some(leaf.page_id),
        _ => None,
    });
    let mut keys = Vec::new();
    while let Some(leaf_id) = current {
        let leaf = tree.leaf(leaf_id).unwrap();
        keys.extend(leaf.keys.iter().cloned());
        current = leaf.next_page;
    }
    keys
}

fn memory_manager() -> TreeManager<MemoryStore> {
    TreeManager::new(MemoryStore::new()).unwrap()
}

#[test]
fn leaf_chain_matches_sorted_reference_after_mixed_workload() {
    let mut manager = memory_manager();
    manager.init_tree("workload", TreeConfig::default()).unwrap();

    let inserts = [
        45, 12, 78, 3, 91, 27, 66, 8, 54, 33, 99, 15, 72, 6, 81, 24, 60, 39, 87, 18,
    ];
    for &k in &inserts {
        assert!(manager.insert("workload", ikey(k), irec(k)).success);
    }
    let deletes = [12, 91, 6, 54, 18, 99];
    for &k in &deletes {
        assert!(manager.delete("workload", &ikey(k)).success);
    }

    let tree = manager.get_tree("workload").unwrap();
    tree.validate(4).unwrap();

    let mut expected: Vec<i64> = inserts
        .iter()
        .copied()
        .filter(|k| !deletes.contains(k))
        .collect();
    expected.sort_unstable();
    let expected: Vec<CompositeKey> = expected.into_iter().map(ikey).collect();
    assert_eq!(chain_keys(tree), expected);
}

#[test]
fn order_four_split_produces_two_balanced_linked_leaves() {
    let mut manager = memory_manager();
    manager.init_tree("split", TreeConfig::default()).unwrap();
    for k in 1..=3 {
        assert!(manager.insert("split", ikey(k), irec(k)).success);
    }

    let response = manager.insert("split", ikey(4), irec(4));
    assert!(response.success);

    // Exactly one split with a 2/2 distribution and one promoted key.
    let splits: Vec<&Step> = response
        .steps
        .iter()
        .filter(|s| s.kind() == "SPLIT_NODE")
        .collect();
    assert_eq!(splits.len(), 1);
    let Step::SplitNode {
        original_node,
        new_node,
        separator_key,
    } = splits[0]
    else {
        unreachable!();
    };
    assert_eq!(original_node.key_count(), 2);
    assert_eq!(new_node.key_count(), 2);
    assert_eq!(separator_key, &ikey(3));
    assert_eq!(
        response
            .steps
            .iter()
            .filter(|s| s.kind() == "PROMOTE_KEY")
            .count(),
        1
    );

    let tree = manager.get_tree("split").unwrap();
    tree.validate(4).unwrap();
    assert_eq!(tree.height, 1);
    assert_eq!(chain_keys(tree), vec![ikey(1), ikey(2), ikey(3), ikey(4)]);
}

#[test]
fn insert_search_delete_search_contract() {
    let mut manager = memory_manager();
    manager.init_tree("contract", TreeConfig::default()).unwrap();

    assert!(manager.insert("contract", ikey(42), irec(42)).success);
    let found = manager.search("contract", &ikey(42));
    assert!(found.success);
    assert_eq!(found.value, Some(irec(42)));
    assert!(found.steps.iter().any(|s| s.kind() == "SEARCH_FOUND"));

    assert!(manager.delete("contract", &ikey(42)).success);
    let missing = manager.search("contract", &ikey(42));
    assert!(!missing.success);
    assert!(missing.steps.iter().any(|s| s.kind() == "SEARCH_NOT_FOUND"));
}

#[test]
fn failed_update_leaves_tree_byte_for_byte_unchanged() {
    let mut manager = memory_manager();
    manager.init_tree("frozen", TreeConfig::default()).unwrap();
    for k in 1..=10 {
        assert!(manager.insert("frozen", ikey(k), irec(k)).success);
    }

    let before = serde_json::to_string(manager.get_tree("frozen").unwrap()).unwrap();
    let response = manager.update("frozen", &ikey(77), irec(0));
    assert!(!response.success);
    let after = serde_json::to_string(manager.get_tree("frozen").unwrap()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn range_query_matches_reference_across_leaf_boundaries() {
    let mut manager = memory_manager();
    manager.init_tree("ranges", TreeConfig::default()).unwrap();
    let keys: Vec<i64> = (1..=30).map(|k| k * 3).collect();
    for &k in &keys {
        assert!(manager.insert("ranges", ikey(k), irec(k)).success);
    }

    let response = manager.range_query("ranges", &ikey(10), &ikey(50));
    assert!(response.success);
    assert_eq!(response.operation, Operation::RangeQuery);

    let reference: Vec<CompositeKey> = keys
        .iter()
        .copied()
        .filter(|&k| (10..=50).contains(&k))
        .map(ikey)
        .collect();
    assert_eq!(response.keys, Some(reference));

    // Multiple leaves were walked for a span this wide.
    let traversed = response
        .steps
        .iter()
        .filter(|s| s.kind() == "TRAVERSE_NODE")
        .count();
    assert!(traversed > 2, "expected a multi-leaf walk, saw {traversed}");
}

#[test]
fn arity_first_keys_are_distinct_index_entries() {
    let mut manager = memory_manager();
    manager.init_tree("arity", TreeConfig::default()).unwrap();

    let short = ikey(5);
    let long = CompositeKey::new(vec![Column::Int(5), Column::Int(0)]);
    assert!(manager.insert("arity", short.clone(), irec(1)).success);
    // A longer key sharing the prefix is a different key, not a duplicate.
    assert!(manager.insert("arity", long.clone(), irec(2)).success);

    assert_eq!(manager.search("arity", &short).value, Some(irec(1)));
    assert_eq!(manager.search("arity", &long).value, Some(irec(2)));
}

#[test]
fn snapshots_round_trip_through_the_json_store() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = JsonFileStore::new(dir.path()).unwrap();
        let mut manager = TreeManager::new(store).unwrap();
        manager.init_tree("persisted", TreeConfig::default()).unwrap();
        manager
            .init_tree(
                "secondary",
                TreeConfig {
                    order: 5,
                    ..TreeConfig::default()
                },
            )
            .unwrap();
        for k in 1..=17 {
            assert!(manager.insert("persisted", ikey(k), irec(k)).success);
        }
        manager.set_current_tree("secondary").unwrap();
    }

    // A fresh manager over the same directory sees identical state.
    let store = JsonFileStore::new(dir.path()).unwrap();
    let mut manager = TreeManager::new(store).unwrap();
    assert_eq!(manager.list_trees(), vec!["persisted", "secondary"]);
    assert_eq!(manager.current_tree(), Some("secondary"));
    assert_eq!(manager.get_tree_metadata("secondary").unwrap().order, 5);

    let tree = manager.get_tree("persisted").unwrap();
    tree.validate(4).unwrap();
    assert_eq!(
        chain_keys(tree),
        (1..=17).map(ikey).collect::<Vec<_>>()
    );

    // The reloaded tree keeps allocating fresh page ids, so operations
    // continue cleanly.
    assert!(manager.insert("persisted", ikey(18), irec(18)).success);
    assert!(manager.search("persisted", &ikey(18)).success);
}

#[test]
fn response_serialization_is_replayable() {
    let mut manager = memory_manager();
    manager.init_tree("wire", TreeConfig::default()).unwrap();
    for k in 1..=4 {
        assert!(manager.insert("wire", ikey(k), irec(k)).success);
    }

    let response = manager.search("wire", &ikey(3));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["operation"], "SEARCH");
    assert!(json["steps"].as_array().unwrap().len() > 1);
    for step in json["steps"].as_array().unwrap() {
        assert!(step["type"].is_string(), "steps must be tagged variants");
    }

    // The trace round-trips losslessly for replay.
    let raw = serde_json::to_string(&response).unwrap();
    let back: arbor_storage::OperationResponse = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, response);
}

#[test]
fn deep_tree_survives_full_drain() {
    let mut manager = memory_manager();
    manager.init_tree("drain", TreeConfig::default()).unwrap();
    let keys: Vec<i64> = (1..=50).collect();
    for &k in &keys {
        assert!(manager.insert("drain", ikey(k), irec(k)).success);
    }
    assert!(manager.get_tree("drain").unwrap().height >= 2);

    // Drain in an order that exercises both borrow directions and merges.
    let mut order: Vec<i64> = keys.iter().copied().step_by(2).collect();
    order.extend(keys.iter().copied().skip(1).step_by(2).rev());
    for &k in &order {
        let response = manager.delete("drain", &ikey(k));
        assert!(response.success, "delete {k} failed: {:?}", response.error);
        manager.get_tree("drain").unwrap().validate(4).unwrap();
    }

    let tree = manager.get_tree("drain").unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.height, 0);
}
