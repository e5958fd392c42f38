//! Snapshot persistence for named trees.
//!
//! Persistence is an injected repository with an explicit load/save
//! lifecycle rather than ambient global state. Two durable slots exist:
//! the whole [`TreesStorage`] blob and the current-tree name. Saves are
//! atomic whole-structure overwrites.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use arbor_common::{ArborError, Result, TreeConfig, TreeStructure};

/// One stored tree with its creation-time metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTree {
    pub tree: TreeStructure,
    pub metadata: TreeConfig,
}

/// The full named-tree state: name-to-tree map plus the current pointer.
///
/// The current name is tracked (and persisted) independently of the map,
/// so deleting trees never silently retargets it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreesStorage {
    pub trees: BTreeMap<String, StoredTree>,
    pub current_tree: Option<String>,
}

/// Durable storage for [`TreesStorage`], split into its two slots.
pub trait SnapshotStore {
    /// Loads the tree map; an empty map if nothing was ever saved.
    fn load_trees(&self) -> Result<BTreeMap<String, StoredTree>>;

    /// Overwrites the tree map.
    fn save_trees(&mut self, trees: &BTreeMap<String, StoredTree>) -> Result<()>;

    /// Loads the current-tree name slot.
    fn load_current(&self) -> Result<Option<String>>;

    /// Overwrites the current-tree name slot.
    fn save_current(&mut self, name: Option<&str>) -> Result<()>;
}

/// Volatile store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trees: BTreeMap<String, StoredTree>,
    current: Option<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn load_trees(&self) -> Result<BTreeMap<String, StoredTree>> {
        Ok(self.trees.clone())
    }

    fn save_trees(&mut self, trees: &BTreeMap<String, StoredTree>) -> Result<()> {
        self.trees = trees.clone();
        Ok(())
    }

    fn load_current(&self) -> Result<Option<String>> {
        Ok(self.current.clone())
    }

    fn save_current(&mut self, name: Option<&str>) -> Result<()> {
        self.current = name.map(str::to_string);
        Ok(())
    }
}

/// File-backed store holding two JSON documents in a data directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a partially written blob.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    const TREES_FILE: &'static str = "trees.json";
    const CURRENT_FILE: &'static str = "current.json";

    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let value =
            serde_json::from_str(&raw).map_err(|e| ArborError::Serialize(e.to_string()))?;
        Ok(Some(value))
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let json =
            serde_json::to_string_pretty(value).map_err(|e| ArborError::Serialize(e.to_string()))?;
        let tmp = self.dir.join(format!("{file}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.dir.join(file))?;
        debug!(file, "snapshot written");
        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    fn load_trees(&self) -> Result<BTreeMap<String, StoredTree>> {
        Ok(self.read_json(Self::TREES_FILE)?.unwrap_or_default())
    }

    fn save_trees(&mut self, trees: &BTreeMap<String, StoredTree>) -> Result<()> {
        self.write_json(Self::TREES_FILE, trees)
    }

    fn load_current(&self) -> Result<Option<String>> {
        Ok(self.read_json::<Option<String>>(Self::CURRENT_FILE)?.flatten())
    }

    fn save_current(&mut self, name: Option<&str>) -> Result<()> {
        self.write_json(Self::CURRENT_FILE, &name)
    }
}
