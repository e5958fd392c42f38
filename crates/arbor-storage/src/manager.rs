//! Named-tree persistence manager.
//!
//! The manager owns the load/save lifecycle around the operation engine:
//! it resolves a tree by name, runs the requested operation against a
//! clone of the stored snapshot, and overwrites the stored entry only on
//! success, so a failed operation can never leave a half-mutated tree
//! behind. Every operation returns a structured response carrying the
//! full step trace, in success and failure alike.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use arbor_buffer::{CacheStats, PageAccess};
use arbor_common::{
    ArborError, Column, CompositeKey, PageId, Record, Result, TreeConfig, TreeNode, TreeStructure,
    MAX_TREES,
};
use arbor_wal::{Lsn, WalInfo};

use crate::btree::{loader, BPlusTree, Instruments, Operation, OperationResponse};
use crate::repository::{SnapshotStore, StoredTree, TreesStorage};

/// Display summary of one named tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeInfo {
    pub name: String,
    pub order: usize,
    pub page_size: usize,
    pub wal_enabled: bool,
    pub cache_size: usize,
    pub root_page: Option<PageId>,
    pub height: u32,
    pub key_count: usize,
}

/// Manages up to [`MAX_TREES`] named trees over an injected snapshot
/// store, tracking the current tree independently of the stored set.
pub struct TreeManager<S: SnapshotStore> {
    store: S,
    storage: TreesStorage,
    /// Runtime instruments per tree, rebuilt lazily from metadata.
    instruments: HashMap<String, Instruments>,
}

impl<S: SnapshotStore> TreeManager<S> {
    /// Loads the manager state from the store. A current-tree pointer that
    /// names a missing tree is discarded.
    pub fn new(store: S) -> Result<Self> {
        let trees = store.load_trees()?;
        let current_tree = store
            .load_current()?
            .filter(|name| trees.contains_key(name));
        Ok(Self {
            store,
            storage: TreesStorage {
                trees,
                current_tree,
            },
            instruments: HashMap::new(),
        })
    }

    // =========================================================================
    // Tree lifecycle
    // =========================================================================

    /// Creates an empty named tree. Fails on name collision, invalid
    /// order, or when the capacity cap is reached. The first created tree
    /// becomes current when no current tree is set.
    pub fn init_tree(&mut self, name: &str, config: TreeConfig) -> Result<()> {
        config.validate()?;
        if self.storage.trees.contains_key(name) {
            return Err(ArborError::TreeExists(name.to_string()));
        }
        if !self.can_create_tree() {
            return Err(ArborError::CapacityExceeded { max: MAX_TREES });
        }

        self.storage.trees.insert(
            name.to_string(),
            StoredTree {
                tree: TreeStructure::new(),
                metadata: config,
            },
        );
        self.instruments
            .insert(name.to_string(), Instruments::new(&config));
        self.store.save_trees(&self.storage.trees)?;

        if self.storage.current_tree.is_none() {
            self.storage.current_tree = Some(name.to_string());
            self.store.save_current(Some(name))?;
        }
        info!(name, order = config.order, "tree created");
        Ok(())
    }

    /// Returns false once the tree-count cap is reached.
    pub fn can_create_tree(&self) -> bool {
        self.storage.trees.len() < MAX_TREES
    }

    /// Looks up a tree snapshot by name.
    pub fn get_tree(&self, name: &str) -> Result<&TreeStructure> {
        Ok(&self.stored(name)?.tree)
    }

    /// All stored trees with their metadata.
    pub fn get_all_trees(&self) -> &BTreeMap<String, StoredTree> {
        &self.storage.trees
    }

    /// Names of all stored trees, ascending.
    pub fn list_trees(&self) -> Vec<String> {
        self.storage.trees.keys().cloned().collect()
    }

    /// Creation-time metadata of one tree.
    pub fn get_tree_metadata(&self, name: &str) -> Result<&TreeConfig> {
        Ok(&self.stored(name)?.metadata)
    }

    /// Display summary of one tree.
    pub fn tree_info(&self, name: &str) -> Result<TreeInfo> {
        let stored = self.stored(name)?;
        let key_count = stored
            .tree
            .nodes
            .values()
            .filter_map(|node| match node {
                TreeNode::Leaf(leaf) => Some(leaf.keys.len()),
                TreeNode::Internal(_) => None,
            })
            .sum();
        Ok(TreeInfo {
            name: name.to_string(),
            order: stored.metadata.order,
            page_size: stored.metadata.page_size,
            wal_enabled: stored.metadata.wal_enabled,
            cache_size: stored.metadata.cache_size,
            root_page: stored.tree.root_page,
            height: stored.tree.height,
            key_count,
        })
    }

    /// Overwrites a named tree's snapshot and persists the change.
    pub fn save_tree(&mut self, name: &str, tree: TreeStructure) -> Result<()> {
        self.commit(name, tree)
    }

    /// Removes a named tree. The current pointer is cleared if it named
    /// the removed tree, never silently retargeted.
    pub fn delete_tree(&mut self, name: &str) -> Result<()> {
        if self.storage.trees.remove(name).is_none() {
            return Err(ArborError::TreeNotFound(name.to_string()));
        }
        self.instruments.remove(name);
        if self.storage.current_tree.as_deref() == Some(name) {
            self.storage.current_tree = None;
            self.store.save_current(None)?;
        }
        self.store.save_trees(&self.storage.trees)?;
        info!(name, "tree dropped");
        Ok(())
    }

    /// Resets a tree to empty while keeping its name and metadata.
    /// Instruments restart as well, so the WAL and cache read as fresh.
    pub fn clear_tree(&mut self, name: &str) -> Result<()> {
        let stored = self
            .storage
            .trees
            .get_mut(name)
            .ok_or_else(|| ArborError::TreeNotFound(name.to_string()))?;
        let config = stored.metadata;
        stored.tree = TreeStructure::new();
        self.instruments
            .insert(name.to_string(), Instruments::new(&config));
        self.store.save_trees(&self.storage.trees)?;
        info!(name, "tree cleared");
        Ok(())
    }

    /// Name of the current tree, if set.
    pub fn current_tree(&self) -> Option<&str> {
        self.storage.current_tree.as_deref()
    }

    /// Points the current-tree slot at an existing tree.
    pub fn set_current_tree(&mut self, name: &str) -> Result<()> {
        self.stored(name)?;
        self.storage.current_tree = Some(name.to_string());
        self.store.save_current(Some(name))?;
        Ok(())
    }

    // =========================================================================
    // Instrumentation surfaces
    // =========================================================================

    /// WAL state of one tree, for display.
    pub fn wal_info(&mut self, name: &str) -> Result<WalInfo> {
        let config = self.stored(name)?.metadata;
        Ok(self.instruments_entry(name, &config).wal.info())
    }

    /// Cache counters of one tree, for display.
    pub fn cache_stats(&mut self, name: &str) -> Result<CacheStats> {
        let config = self.stored(name)?.metadata;
        Ok(self.instruments_entry(name, &config).cache.stats())
    }

    /// Read log of one tree, for display.
    pub fn read_log(&mut self, name: &str) -> Result<Vec<PageAccess>> {
        let config = self.stored(name)?.metadata;
        Ok(self
            .instruments_entry(name, &config)
            .read_log
            .entries()
            .to_vec())
    }

    /// Appends a checkpoint marker to one tree's WAL.
    pub fn checkpoint(&mut self, name: &str) -> Result<Option<Lsn>> {
        let config = self.stored(name)?.metadata;
        Ok(self.instruments_entry(name, &config).wal.checkpoint())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Looks up a key. Read-only; the stored snapshot is never replaced.
    pub fn search(&mut self, name: &str, key: &CompositeKey) -> OperationResponse {
        let (config, mut working) = match self.context(name) {
            Ok(ctx) => ctx,
            Err(e) => {
                return OperationResponse::failure(Operation::Search, &e, Vec::new())
                    .with_key(key.clone())
            }
        };
        let instruments = self.instruments_entry(name, &config);
        let mut engine = BPlusTree::new(&mut working, config, instruments);
        let result = engine.search(key);
        let steps = engine.into_steps();
        match result {
            Ok(hit) => OperationResponse::success(Operation::Search, steps)
                .with_key(key.clone())
                .with_value(hit.value),
            Err(e) => OperationResponse::failure(Operation::Search, &e, steps).with_key(key.clone()),
        }
    }

    /// Inserts a key/record pair and persists the mutated snapshot on
    /// success.
    pub fn insert(&mut self, name: &str, key: CompositeKey, value: Record) -> OperationResponse {
        let (config, mut working) = match self.context(name) {
            Ok(ctx) => ctx,
            Err(e) => {
                return OperationResponse::failure(Operation::Insert, &e, Vec::new()).with_key(key)
            }
        };
        let instruments = self.instruments_entry(name, &config);
        let mut engine = BPlusTree::new(&mut working, config, instruments);
        let result = engine.insert(key.clone(), value.clone());
        let steps = engine.into_steps();
        match result.and_then(|()| self.commit(name, working)) {
            Ok(()) => OperationResponse::success(Operation::Insert, steps)
                .with_key(key)
                .with_value(value),
            Err(e) => OperationResponse::failure(Operation::Insert, &e, steps).with_key(key),
        }
    }

    /// Removes a key and persists the mutated snapshot on success.
    pub fn delete(&mut self, name: &str, key: &CompositeKey) -> OperationResponse {
        let (config, mut working) = match self.context(name) {
            Ok(ctx) => ctx,
            Err(e) => {
                return OperationResponse::failure(Operation::Delete, &e, Vec::new())
                    .with_key(key.clone())
            }
        };
        let instruments = self.instruments_entry(name, &config);
        let mut engine = BPlusTree::new(&mut working, config, instruments);
        let result = engine.delete(key);
        let steps = engine.into_steps();
        match result.and_then(|removed| self.commit(name, working).map(|()| removed)) {
            Ok(removed) => OperationResponse::success(Operation::Delete, steps)
                .with_key(key.clone())
                .with_value(removed),
            Err(e) => OperationResponse::failure(Operation::Delete, &e, steps).with_key(key.clone()),
        }
    }

    /// Overwrites the record under an existing key and persists on
    /// success. A miss fails with the search trace attached and the stored
    /// snapshot untouched.
    pub fn update(&mut self, name: &str, key: &CompositeKey, value: Record) -> OperationResponse {
        let (config, mut working) = match self.context(name) {
            Ok(ctx) => ctx,
            Err(e) => {
                return OperationResponse::failure(Operation::Update, &e, Vec::new())
                    .with_key(key.clone())
            }
        };
        let instruments = self.instruments_entry(name, &config);
        let mut engine = BPlusTree::new(&mut working, config, instruments);
        let result = engine.update(key, value.clone());
        let steps = engine.into_steps();
        match result.and_then(|old| self.commit(name, working).map(|()| old)) {
            Ok(_old) => OperationResponse::success(Operation::Update, steps)
                .with_key(key.clone())
                .with_value(value),
            Err(e) => OperationResponse::failure(Operation::Update, &e, steps).with_key(key.clone()),
        }
    }

    /// Collects all pairs within an inclusive key range. Read-only.
    pub fn range_query(
        &mut self,
        name: &str,
        start: &CompositeKey,
        end: &CompositeKey,
    ) -> OperationResponse {
        let (config, mut working) = match self.context(name) {
            Ok(ctx) => ctx,
            Err(e) => return OperationResponse::failure(Operation::RangeQuery, &e, Vec::new()),
        };
        let instruments = self.instruments_entry(name, &config);
        let mut engine = BPlusTree::new(&mut working, config, instruments);
        let result = engine.range(start, end);
        let steps = engine.into_steps();
        match result {
            Ok(pairs) => OperationResponse::success(Operation::RangeQuery, steps).with_pairs(pairs),
            Err(e) => OperationResponse::failure(Operation::RangeQuery, &e, steps),
        }
    }

    /// Bulk-loads `count` random rows (default when `None`) through
    /// sequential inserts, returning one response per row for replay.
    /// Generated ids avoid keys already present in the tree.
    pub fn load_random(
        &mut self,
        name: &str,
        count: Option<usize>,
    ) -> Result<Vec<OperationResponse>> {
        let count = loader::resolve_count(count)?;
        let taken: HashSet<i64> = self
            .stored(name)?
            .tree
            .nodes
            .values()
            .filter_map(|node| match node {
                TreeNode::Leaf(leaf) => Some(&leaf.keys),
                TreeNode::Internal(_) => None,
            })
            .flatten()
            .filter_map(|key| match key.values.first() {
                Some(Column::Int(id)) => Some(*id),
                _ => None,
            })
            .collect();

        let mut rng = rand::rng();
        let rows = loader::generate_rows(&mut rng, count, &taken);
        debug!(name, count, "bulk load");

        let mut responses = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            responses.push(self.insert(name, key, value));
        }
        Ok(responses)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn stored(&self, name: &str) -> Result<&StoredTree> {
        self.storage
            .trees
            .get(name)
            .ok_or_else(|| ArborError::TreeNotFound(name.to_string()))
    }

    /// Clones the stored snapshot for an operation run.
    fn context(&self, name: &str) -> Result<(TreeConfig, TreeStructure)> {
        let stored = self.stored(name)?;
        Ok((stored.metadata, stored.tree.clone()))
    }

    fn instruments_entry(&mut self, name: &str, config: &TreeConfig) -> &mut Instruments {
        self.instruments
            .entry(name.to_string())
            .or_insert_with(|| Instruments::new(config))
    }

    /// Atomically replaces the stored snapshot and persists the map.
    fn commit(&mut self, name: &str, tree: TreeStructure) -> Result<()> {
        let stored = self
            .storage
            .trees
            .get_mut(name)
            .ok_or_else(|| ArborError::TreeNotFound(name.to_string()))?;
        stored.tree = tree;
        self.store.save_trees(&self.storage.trees)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn manager() -> TreeManager<MemoryStore> {
        TreeManager::new(MemoryStore::new()).unwrap()
    }

    fn ikey(v: i64) -> CompositeKey {
        CompositeKey::single(Column::Int(v))
    }

    fn irec(v: i64) -> Record {
        Record::new(vec![Column::Int(v)])
    }

    #[test]
    fn test_first_created_tree_becomes_current() {
        let mut manager = manager();
        assert_eq!(manager.current_tree(), None);
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        manager.init_tree("beta", TreeConfig::default()).unwrap();
        assert_eq!(manager.current_tree(), Some("alpha"));

        manager.set_current_tree("beta").unwrap();
        assert_eq!(manager.current_tree(), Some("beta"));
        assert!(manager.set_current_tree("missing").is_err());
    }

    #[test]
    fn test_capacity_cap_rejects_creation() {
        let mut manager = manager();
        for i in 0..MAX_TREES {
            assert!(manager.can_create_tree());
            manager
                .init_tree(&format!("tree-{i}"), TreeConfig::default())
                .unwrap();
        }
        assert!(!manager.can_create_tree());
        let err = manager.init_tree("overflow", TreeConfig::default()).unwrap_err();
        assert!(matches!(err, ArborError::CapacityExceeded { max } if max == MAX_TREES));
        assert_eq!(manager.list_trees().len(), MAX_TREES);

        // Dropping a tree frees a slot.
        manager.delete_tree("tree-0").unwrap();
        assert!(manager.can_create_tree());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        assert!(matches!(
            manager.init_tree("alpha", TreeConfig::default()).unwrap_err(),
            ArborError::TreeExists(_)
        ));
    }

    #[test]
    fn test_invalid_order_rejected_at_creation() {
        let mut manager = manager();
        let config = TreeConfig {
            order: 2,
            ..TreeConfig::default()
        };
        assert!(matches!(
            manager.init_tree("tiny", config).unwrap_err(),
            ArborError::InvalidOrder { .. }
        ));
        assert!(manager.list_trees().is_empty());
    }

    #[test]
    fn test_delete_tree_clears_current_pointer() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        manager.init_tree("beta", TreeConfig::default()).unwrap();
        manager.delete_tree("alpha").unwrap();
        // The pointer is cleared, not silently retargeted to "beta".
        assert_eq!(manager.current_tree(), None);
        assert!(manager.get_tree("alpha").is_err());
        assert!(manager.get_tree("beta").is_ok());
    }

    #[test]
    fn test_insert_search_delete_through_manager() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();

        let response = manager.insert("alpha", ikey(1), irec(10));
        assert!(response.success, "insert failed: {:?}", response.error);
        assert_eq!(response.operation, Operation::Insert);
        assert!(!response.steps.is_empty());

        let response = manager.search("alpha", &ikey(1));
        assert!(response.success);
        assert_eq!(response.value, Some(irec(10)));

        let response = manager.delete("alpha", &ikey(1));
        assert!(response.success);
        assert_eq!(response.value, Some(irec(10)));

        let response = manager.search("alpha", &ikey(1));
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Key not found"));
        assert!(!response.steps.is_empty());
    }

    #[test]
    fn test_duplicate_insert_reports_error_and_keeps_tree() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        assert!(manager.insert("alpha", ikey(1), irec(10)).success);

        let before = manager.get_tree("alpha").unwrap().clone();
        let response = manager.insert("alpha", ikey(1), irec(99));
        assert!(!response.success);
        assert!(response.error.as_deref().unwrap_or("").contains("Duplicate"));
        assert_eq!(manager.get_tree("alpha").unwrap(), &before);
    }

    #[test]
    fn test_failed_update_leaves_snapshot_untouched() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        for k in 1..=8 {
            assert!(manager.insert("alpha", ikey(k), irec(k)).success);
        }

        let before = manager.get_tree("alpha").unwrap().clone();
        let response = manager.update("alpha", &ikey(99), irec(0));
        assert!(!response.success);
        assert!(response
            .steps
            .iter()
            .any(|s| s.kind() == "SEARCH_NOT_FOUND"));
        assert_eq!(manager.get_tree("alpha").unwrap(), &before);
    }

    #[test]
    fn test_unknown_tree_fails_structurally() {
        let mut manager = manager();
        let response = manager.insert("ghost", ikey(1), irec(1));
        assert!(!response.success);
        assert!(response
            .error
            .as_deref()
            .unwrap_or("")
            .contains("Tree not found"));
        assert!(response.steps.is_empty());
    }

    #[test]
    fn test_clear_tree_keeps_name_and_metadata() {
        let mut manager = manager();
        let config = TreeConfig {
            order: 5,
            wal_enabled: false,
            ..TreeConfig::default()
        };
        manager.init_tree("alpha", config).unwrap();
        for k in 1..=6 {
            assert!(manager.insert("alpha", ikey(k), irec(k)).success);
        }
        manager.clear_tree("alpha").unwrap();

        let tree = manager.get_tree("alpha").unwrap();
        assert!(tree.is_empty());
        assert_eq!(manager.get_tree_metadata("alpha").unwrap(), &config);
        assert_eq!(manager.wal_info("alpha").unwrap().entries.len(), 0);
    }

    #[test]
    fn test_wal_and_cache_instrumentation_advance() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        for k in 1..=5 {
            assert!(manager.insert("alpha", ikey(k), irec(k)).success);
        }

        let wal = manager.wal_info("alpha").unwrap();
        assert_eq!(wal.entries.len(), 5);
        let lsns: Vec<u64> = wal.entries.iter().map(|e| e.lsn.0).collect();
        assert_eq!(lsns, vec![1, 2, 3, 4, 5]);

        let stats = manager.cache_stats("alpha").unwrap();
        assert!(stats.misses > 0);
        assert!(manager.read_log("alpha").unwrap().len() > 0);

        let ckpt = manager.checkpoint("alpha").unwrap().unwrap();
        assert_eq!(manager.wal_info("alpha").unwrap().checkpoint, Some(ckpt));
    }

    #[test]
    fn test_wal_disabled_tree_emits_no_wal_steps() {
        let mut manager = manager();
        let config = TreeConfig {
            wal_enabled: false,
            ..TreeConfig::default()
        };
        manager.init_tree("quiet", config).unwrap();
        let response = manager.insert("quiet", ikey(1), irec(1));
        assert!(response.success);
        assert!(response.steps.iter().all(|s| s.kind() != "WAL_APPEND"));
        assert_eq!(manager.wal_info("quiet").unwrap().entries.len(), 0);
    }

    #[test]
    fn test_range_query_through_manager() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        for k in [5, 3, 9, 1, 7] {
            assert!(manager.insert("alpha", ikey(k), irec(k)).success);
        }

        let response = manager.range_query("alpha", &ikey(3), &ikey(7));
        assert!(response.success);
        assert_eq!(
            response.keys,
            Some(vec![ikey(3), ikey(5), ikey(7)])
        );
        assert_eq!(response.values.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn test_load_random_respects_bounds() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();

        assert!(matches!(
            manager.load_random("alpha", Some(0)).unwrap_err(),
            ArborError::InvalidCount { .. }
        ));
        assert!(matches!(
            manager.load_random("alpha", Some(101)).unwrap_err(),
            ArborError::InvalidCount { .. }
        ));

        let responses = manager.load_random("alpha", Some(25)).unwrap();
        assert_eq!(responses.len(), 25);
        assert!(responses.iter().all(|r| r.success));

        let tree = manager.get_tree("alpha").unwrap();
        tree.validate(4).unwrap();
        assert_eq!(manager.tree_info("alpha").unwrap().key_count, 25);
    }

    #[test]
    fn test_tree_info_reflects_structure() {
        let mut manager = manager();
        manager.init_tree("alpha", TreeConfig::default()).unwrap();
        for k in 1..=4 {
            assert!(manager.insert("alpha", ikey(k), irec(k)).success);
        }
        let info = manager.tree_info("alpha").unwrap();
        assert_eq!(info.name, "alpha");
        assert_eq!(info.order, 4);
        assert_eq!(info.height, 1);
        assert_eq!(info.key_count, 4);
        assert!(info.root_page.is_some());
    }
}
