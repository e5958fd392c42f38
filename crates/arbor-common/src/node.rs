//! Node and tree structures for the B+Tree simulation.
//!
//! The tree is an identifier-indexed map: nodes live in a flat mapping from
//! page id to node value and edges are stored ids, not references. Page ids
//! are allocated from a monotone counter and never reused while referenced.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ArborError, Result};
use crate::types::{CompositeKey, Record};

/// Identifier for a page within a tree. The first allocated page is 1;
/// 0 is never a valid id.
pub type PageId = u64;

/// Discriminant for the two node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Internal,
    Leaf,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Internal => write!(f, "internal"),
            NodeKind::Leaf => write!(f, "leaf"),
        }
    }
}

/// An internal routing node holding `k` separator keys and `k + 1` children.
///
/// Child `i` holds keys less than separator `i` and at least separator
/// `i - 1`; a key equal to a separator routes right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalNode {
    pub page_id: PageId,
    pub keys: Vec<CompositeKey>,
    pub children: Vec<PageId>,
}

/// A leaf node holding keys with their records, linked to its siblings in
/// ascending key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
    pub page_id: PageId,
    pub keys: Vec<CompositeKey>,
    pub values: Vec<Record>,
    pub next_page: Option<PageId>,
    pub prev_page: Option<PageId>,
}

/// A node in the tree, either internal or leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl TreeNode {
    /// Returns the page id shared by both node kinds.
    pub fn page_id(&self) -> PageId {
        match self {
            TreeNode::Internal(n) => n.page_id,
            TreeNode::Leaf(n) => n.page_id,
        }
    }

    /// Returns the node kind discriminant.
    pub fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Internal(_) => NodeKind::Internal,
            TreeNode::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// Returns the number of keys held by this node.
    pub fn key_count(&self) -> usize {
        match self {
            TreeNode::Internal(n) => n.keys.len(),
            TreeNode::Leaf(n) => n.keys.len(),
        }
    }

    /// Returns the keys held by this node.
    pub fn keys(&self) -> &[CompositeKey] {
        match self {
            TreeNode::Internal(n) => &n.keys,
            TreeNode::Leaf(n) => &n.keys,
        }
    }
}

/// The complete structure of one B+Tree: root pointer, height, and the
/// page-indexed node map.
///
/// `height` counts edges from the root to any leaf. Both the empty tree and
/// a tree whose root is a lone leaf have height 0; the height increments
/// only when the root splits and decrements only when it collapses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeStructure {
    pub root_page: Option<PageId>,
    pub height: u32,
    pub nodes: BTreeMap<PageId, TreeNode>,
    next_page_id: PageId,
}

impl Default for TreeStructure {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStructure {
    /// Creates an empty tree. The root is created lazily on first insert.
    pub fn new() -> Self {
        Self {
            root_page: None,
            height: 0,
            nodes: BTreeMap::new(),
            next_page_id: 1,
        }
    }

    /// Returns true if the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.root_page.is_none()
    }

    /// Allocates a fresh page id. Ids are never reused.
    pub fn allocate_page_id(&mut self) -> PageId {
        let id = self.next_page_id;
        self.next_page_id += 1;
        id
    }

    /// Looks up a node, failing with a structural error if the id is absent.
    pub fn node(&self, page_id: PageId) -> Result<&TreeNode> {
        self.nodes
            .get(&page_id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("page {page_id} missing from node map")))
    }

    /// Mutable variant of [`TreeStructure::node`].
    pub fn node_mut(&mut self, page_id: PageId) -> Result<&mut TreeNode> {
        self.nodes
            .get_mut(&page_id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("page {page_id} missing from node map")))
    }

    /// Looks up a leaf node, failing if the page is absent or internal.
    pub fn leaf(&self, page_id: PageId) -> Result<&LeafNode> {
        match self.node(page_id)? {
            TreeNode::Leaf(leaf) => Ok(leaf),
            TreeNode::Internal(_) => Err(ArborError::TreeCorrupted(format!(
                "page {page_id} is internal, expected leaf"
            ))),
        }
    }

    /// Mutable variant of [`TreeStructure::leaf`].
    pub fn leaf_mut(&mut self, page_id: PageId) -> Result<&mut LeafNode> {
        match self.node_mut(page_id)? {
            TreeNode::Leaf(leaf) => Ok(leaf),
            TreeNode::Internal(_) => Err(ArborError::TreeCorrupted(format!(
                "page {page_id} is internal, expected leaf"
            ))),
        }
    }

    /// Looks up an internal node, failing if the page is absent or a leaf.
    pub fn internal(&self, page_id: PageId) -> Result<&InternalNode> {
        match self.node(page_id)? {
            TreeNode::Internal(node) => Ok(node),
            TreeNode::Leaf(_) => Err(ArborError::TreeCorrupted(format!(
                "page {page_id} is a leaf, expected internal"
            ))),
        }
    }

    /// Mutable variant of [`TreeStructure::internal`].
    pub fn internal_mut(&mut self, page_id: PageId) -> Result<&mut InternalNode> {
        match self.node_mut(page_id)? {
            TreeNode::Internal(node) => Ok(node),
            TreeNode::Leaf(_) => Err(ArborError::TreeCorrupted(format!(
                "page {page_id} is a leaf, expected internal"
            ))),
        }
    }

    /// Inserts a node into the map under its own page id.
    pub fn insert_node(&mut self, node: TreeNode) {
        self.nodes.insert(node.page_id(), node);
    }

    /// Removes a node from the map.
    pub fn remove_node(&mut self, page_id: PageId) -> Option<TreeNode> {
        self.nodes.remove(&page_id)
    }

    /// Checks every structural invariant of the tree for the given order.
    ///
    /// Verified: root/height consistency, child arity, key-count bounds,
    /// key ordering within nodes, separator bounds between parent and
    /// child, uniform leaf depth, bidirectional leaf-chain consistency,
    /// and absence of unreachable nodes.
    pub fn validate(&self, order: usize) -> Result<()> {
        let max_keys = order - 1;
        let min_keys = order.div_ceil(2) - 1;

        let root = match self.root_page {
            None => {
                if self.height != 0 || !self.nodes.is_empty() {
                    return Err(ArborError::TreeCorrupted(
                        "rootless tree must be empty with height 0".into(),
                    ));
                }
                return Ok(());
            }
            Some(root) => root,
        };

        let mut reachable = BTreeSet::new();
        let mut leaves_in_order = Vec::new();
        self.walk(root, 0, None, None, max_keys, min_keys, &mut reachable, &mut leaves_in_order)?;

        if reachable.len() != self.nodes.len() {
            return Err(ArborError::TreeCorrupted(format!(
                "{} nodes in map, {} reachable from root",
                self.nodes.len(),
                reachable.len()
            )));
        }

        // The leaf chain must mirror the in-order leaf sequence, linked both ways.
        for (i, &leaf_id) in leaves_in_order.iter().enumerate() {
            let leaf = self.leaf(leaf_id)?;
            let expected_prev = if i == 0 { None } else { Some(leaves_in_order[i - 1]) };
            let expected_next = leaves_in_order.get(i + 1).copied();
            if leaf.prev_page != expected_prev || leaf.next_page != expected_next {
                return Err(ArborError::TreeCorrupted(format!(
                    "leaf {leaf_id} chain links inconsistent with leaf order"
                )));
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        page_id: PageId,
        depth: u32,
        lower: Option<&CompositeKey>,
        upper: Option<&CompositeKey>,
        max_keys: usize,
        min_keys: usize,
        reachable: &mut BTreeSet<PageId>,
        leaves: &mut Vec<PageId>,
    ) -> Result<()> {
        if !reachable.insert(page_id) {
            return Err(ArborError::TreeCorrupted(format!(
                "page {page_id} reachable twice"
            )));
        }

        let node = self.node(page_id)?;
        let is_root = Some(page_id) == self.root_page;
        let keys = node.keys();

        if keys.len() > max_keys {
            return Err(ArborError::TreeCorrupted(format!(
                "page {page_id} holds {} keys, max is {max_keys}",
                keys.len()
            )));
        }
        if !is_root && keys.len() < min_keys {
            return Err(ArborError::TreeCorrupted(format!(
                "page {page_id} holds {} keys, min is {min_keys}",
                keys.len()
            )));
        }
        for pair in keys.windows(2) {
            if pair[0].compare(&pair[1]) != std::cmp::Ordering::Less {
                return Err(ArborError::TreeCorrupted(format!(
                    "page {page_id} keys out of order"
                )));
            }
        }
        for key in keys {
            if lower.is_some_and(|low| key.compare(low) == std::cmp::Ordering::Less) {
                return Err(ArborError::TreeCorrupted(format!(
                    "page {page_id} key {key} below separator bound"
                )));
            }
            if upper.is_some_and(|up| key.compare(up) != std::cmp::Ordering::Less) {
                return Err(ArborError::TreeCorrupted(format!(
                    "page {page_id} key {key} at or above separator bound"
                )));
            }
        }

        match node {
            TreeNode::Leaf(leaf) => {
                if leaf.keys.len() != leaf.values.len() {
                    return Err(ArborError::TreeCorrupted(format!(
                        "leaf {page_id} has {} keys but {} values",
                        leaf.keys.len(),
                        leaf.values.len()
                    )));
                }
                if depth != self.height {
                    return Err(ArborError::TreeCorrupted(format!(
                        "leaf {page_id} at depth {depth}, height is {}",
                        self.height
                    )));
                }
                leaves.push(page_id);
            }
            TreeNode::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(ArborError::TreeCorrupted(format!(
                        "internal {page_id} has {} keys but {} children",
                        internal.keys.len(),
                        internal.children.len()
                    )));
                }
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&internal.keys[i - 1]) };
                    let child_upper = if i == internal.keys.len() {
                        upper
                    } else {
                        Some(&internal.keys[i])
                    };
                    self.walk(
                        child,
                        depth + 1,
                        child_lower,
                        child_upper,
                        max_keys,
                        min_keys,
                        reachable,
                        leaves,
                    )?;
                }
            }
        }

        Ok(())
    }
}
