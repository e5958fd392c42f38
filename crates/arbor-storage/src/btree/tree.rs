//! B+Tree operation engine.
//!
//! Each public operation runs against a mutable [`TreeStructure`] snapshot
//! and records its trace through the [`Tracer`]. The engine never persists
//! anything itself; the manager owns the load/commit lifecycle.

use std::cmp::Ordering;

use arbor_common::{
    ArborError, CompositeKey, InternalNode, LeafNode, NodeKind, PageId, Record, Result,
    TreeConfig, TreeNode, TreeStructure,
};
use arbor_wal::WalRecordType;

use super::step::Step;
use super::tracer::{Instruments, Tracer};

/// Location of a key found by [`BPlusTree::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub leaf_id: PageId,
    pub index: usize,
    pub value: Record,
}

/// The operation engine bound to one tree snapshot and its instruments.
pub struct BPlusTree<'a> {
    tree: &'a mut TreeStructure,
    config: TreeConfig,
    tracer: Tracer<'a>,
}

impl<'a> BPlusTree<'a> {
    /// Binds the engine to a tree snapshot and its runtime instruments.
    pub fn new(
        tree: &'a mut TreeStructure,
        config: TreeConfig,
        instruments: &'a mut Instruments,
    ) -> Self {
        Self {
            tree,
            config,
            tracer: Tracer::new(instruments),
        }
    }

    /// The steps collected so far.
    pub fn steps(&self) -> &[Step] {
        self.tracer.steps()
    }

    /// Returns the collected trace, consuming the engine.
    pub fn into_steps(self) -> Vec<Step> {
        self.tracer.into_steps()
    }

    // =========================================================================
    // Locator
    // =========================================================================

    /// Descends from the root to the leaf that should hold `key`, visiting
    /// (and tracing) every node on the way. Returns the root-to-leaf path.
    ///
    /// Membership is not guaranteed; callers binary-search the final leaf.
    fn descend(&mut self, key: &CompositeKey) -> Result<Vec<PageId>> {
        let root = self
            .tree
            .root_page
            .ok_or_else(|| ArborError::TreeCorrupted("descent on empty tree".into()))?;
        let mut path = Vec::with_capacity(self.tree.height as usize + 1);
        let mut current = root;
        loop {
            if path.len() > self.tree.height as usize + 1 {
                return Err(ArborError::TreeCorrupted(format!(
                    "descent exceeded tree height {}",
                    self.tree.height
                )));
            }
            let next = {
                let node = self.tree.node(current)?;
                self.tracer.visit(node);
                match node {
                    TreeNode::Leaf(_) => None,
                    TreeNode::Internal(internal) => {
                        let idx = child_index(internal, key);
                        Some(*internal.children.get(idx).ok_or_else(|| {
                            ArborError::TreeCorrupted(format!(
                                "internal {current} has no child at index {idx}"
                            ))
                        })?)
                    }
                }
            };
            path.push(current);
            match next {
                None => return Ok(path),
                Some(id) => current = id,
            }
        }
    }

    /// Quiet variant of the descent: locates the leaf for `key` without
    /// emitting trace steps. Used where a position must be re-derived
    /// after an already-traced search.
    fn locate_leaf(&self, key: &CompositeKey) -> Result<PageId> {
        let mut current = self.tree.root_page.ok_or(ArborError::KeyNotFound)?;
        let mut hops = 0usize;
        loop {
            match self.tree.node(current)? {
                TreeNode::Leaf(_) => return Ok(current),
                TreeNode::Internal(internal) => {
                    hops += 1;
                    if hops > self.tree.height as usize + 1 {
                        return Err(ArborError::TreeCorrupted(format!(
                            "descent exceeded tree height {}",
                            self.tree.height
                        )));
                    }
                    let idx = child_index(internal, key);
                    current = *internal.children.get(idx).ok_or_else(|| {
                        ArborError::TreeCorrupted(format!(
                            "internal {current} has no child at index {idx}"
                        ))
                    })?;
                }
            }
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Looks up `key`, tracing the full descent. Never mutates the tree.
    pub fn search(&mut self, key: &CompositeKey) -> Result<SearchHit> {
        if self.tree.root_page.is_none() {
            self.tracer.push(Step::SearchNotFound {
                key: key.clone(),
                node_id: None,
            });
            return Err(ArborError::KeyNotFound);
        }

        let path = self.descend(key)?;
        let leaf_id = last_page(&path)?;
        let leaf = self.tree.leaf(leaf_id)?;
        match leaf.keys.binary_search_by(|k| k.compare(key)) {
            Ok(index) => {
                let value = leaf.values.get(index).cloned().ok_or_else(|| {
                    ArborError::TreeCorrupted(format!("leaf {leaf_id} value slot {index} missing"))
                })?;
                self.tracer.push(Step::SearchFound {
                    node_id: leaf_id,
                    index,
                    key: key.clone(),
                    value: value.clone(),
                });
                Ok(SearchHit {
                    leaf_id,
                    index,
                    value,
                })
            }
            Err(_) => {
                self.tracer.push(Step::SearchNotFound {
                    key: key.clone(),
                    node_id: Some(leaf_id),
                });
                Err(ArborError::KeyNotFound)
            }
        }
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts a key/record pair. Duplicate keys are rejected, splits
    /// propagate up to the root, and the leaf chain is kept spliced.
    pub fn insert(&mut self, key: CompositeKey, value: Record) -> Result<()> {
        let max_keys = self.config.max_keys();

        // Lazy root: the first insert creates a lone leaf root.
        if self.tree.root_page.is_none() {
            let page_id = self.tree.allocate_page_id();
            self.tree.insert_node(TreeNode::Leaf(LeafNode {
                page_id,
                keys: vec![key.clone()],
                values: vec![value.clone()],
                next_page: None,
                prev_page: None,
            }));
            self.tree.root_page = Some(page_id);
            self.tracer.access(page_id, NodeKind::Leaf);
            self.tracer.push(Step::InsertKey {
                node_id: page_id,
                key: key.clone(),
                value,
                position: 0,
            });
            self.tracer.push(Step::CheckOverflow {
                node_id: page_id,
                key_count: 1,
                max_keys,
                is_overflow: false,
            });
            self.tracer.mark_dirty(page_id);
            self.tracer.commit(WalRecordType::Insert, page_id, &key);
            return Ok(());
        }

        let path = self.descend(&key)?;
        let leaf_id = last_page(&path)?;

        let (position, was_full) = {
            let leaf = self.tree.leaf(leaf_id)?;
            match leaf.keys.binary_search_by(|k| k.compare(&key)) {
                Ok(_) => return Err(ArborError::DuplicateKey(key.to_string())),
                Err(pos) => (pos, leaf.keys.len() >= max_keys),
            }
        };

        {
            let leaf = self.tree.leaf_mut(leaf_id)?;
            leaf.keys.insert(position, key.clone());
            leaf.values.insert(position, value.clone());
        }
        self.tracer.mark_dirty(leaf_id);

        if was_full {
            // The key joins a temporarily overfull node; the split below
            // restores the bound.
            self.tracer.push(Step::AddTempKey {
                node_id: leaf_id,
                key: key.clone(),
                position,
            });
        } else {
            self.tracer.push(Step::InsertKey {
                node_id: leaf_id,
                key: key.clone(),
                value,
                position,
            });
        }

        let key_count = self.tree.leaf(leaf_id)?.keys.len();
        let is_overflow = key_count > max_keys;
        self.tracer.push(Step::CheckOverflow {
            node_id: leaf_id,
            key_count,
            max_keys,
            is_overflow,
        });

        if is_overflow {
            let (separator, new_id) = self.split_leaf(leaf_id)?;
            self.propagate_split(&path, leaf_id, separator, new_id)?;
        }

        self.tracer.commit(WalRecordType::Insert, leaf_id, &key);
        Ok(())
    }

    /// Splits an overfull leaf. The left half (`ceil(order / 2)` keys)
    /// stays in place; the rest moves to a new right sibling spliced into
    /// the leaf chain. Returns the promoted separator (the new sibling's
    /// first key) and the sibling's page id.
    fn split_leaf(&mut self, leaf_id: PageId) -> Result<(CompositeKey, PageId)> {
        let new_id = self.tree.allocate_page_id();
        let mid = self.config.order.div_ceil(2);

        let (new_leaf, old_next) = {
            let leaf = self.tree.leaf_mut(leaf_id)?;
            let right_keys = leaf.keys.split_off(mid);
            let right_values = leaf.values.split_off(mid);
            let old_next = leaf.next_page;
            leaf.next_page = Some(new_id);
            (
                LeafNode {
                    page_id: new_id,
                    keys: right_keys,
                    values: right_values,
                    next_page: old_next,
                    prev_page: Some(leaf_id),
                },
                old_next,
            )
        };

        let separator = new_leaf.keys.first().cloned().ok_or_else(|| {
            ArborError::TreeCorrupted(format!("split of leaf {leaf_id} produced an empty sibling"))
        })?;

        if let Some(next_id) = old_next {
            self.tree.leaf_mut(next_id)?.prev_page = Some(new_id);
            self.tracer.mark_dirty(next_id);
        }
        self.tree.insert_node(TreeNode::Leaf(new_leaf));
        self.tracer.access(new_id, NodeKind::Leaf);
        self.push_split_step(leaf_id, new_id, separator.clone())?;
        Ok((separator, new_id))
    }

    /// Splits an overfull internal node around its median key. The median
    /// is removed from both halves and handed back for promotion.
    fn split_internal(&mut self, node_id: PageId) -> Result<(CompositeKey, PageId)> {
        let new_id = self.tree.allocate_page_id();

        let (new_node, promoted) = {
            let node = self.tree.internal_mut(node_id)?;
            let mid = node.keys.len() / 2;
            let promoted = node.keys.get(mid).cloned().ok_or_else(|| {
                ArborError::TreeCorrupted(format!("internal {node_id} split with no median"))
            })?;
            let right_keys = node.keys.split_off(mid + 1);
            node.keys.truncate(mid);
            let right_children = node.children.split_off(mid + 1);
            (
                InternalNode {
                    page_id: new_id,
                    keys: right_keys,
                    children: right_children,
                },
                promoted,
            )
        };

        self.tree.insert_node(TreeNode::Internal(new_node));
        self.tracer.access(new_id, NodeKind::Internal);
        self.push_split_step(node_id, new_id, promoted.clone())?;
        Ok((promoted, new_id))
    }

    /// Emits a SPLIT_NODE step with snapshots of both halves.
    fn push_split_step(
        &mut self,
        left_id: PageId,
        right_id: PageId,
        separator: CompositeKey,
    ) -> Result<()> {
        let original_node = self.tree.node(left_id)?.clone();
        let new_node = self.tree.node(right_id)?.clone();
        self.tracer.push(Step::SplitNode {
            original_node,
            new_node,
            separator_key: separator,
        });
        self.tracer.mark_dirty(left_id);
        self.tracer.mark_dirty(right_id);
        Ok(())
    }

    /// Inserts a promoted separator into each ancestor in turn, splitting
    /// ancestors that overflow. If the promotion outlives the whole path,
    /// the root itself split: a new root is allocated and the height grows.
    fn propagate_split(
        &mut self,
        path: &[PageId],
        mut left_id: PageId,
        mut separator: CompositeKey,
        mut right_id: PageId,
    ) -> Result<()> {
        let max_keys = self.config.max_keys();

        for &parent_id in path.iter().rev().skip(1) {
            {
                let parent = self.tree.internal_mut(parent_id)?;
                let pos = parent
                    .keys
                    .partition_point(|k| k.compare(&separator) == Ordering::Less);
                parent.keys.insert(pos, separator.clone());
                parent.children.insert(pos + 1, right_id);
            }
            self.tracer.mark_dirty(parent_id);
            self.tracer.push(Step::PromoteKey {
                key: separator.clone(),
                target_node_id: parent_id,
                left_child: left_id,
                right_child: right_id,
            });

            let key_count = self.tree.internal(parent_id)?.keys.len();
            let is_overflow = key_count > max_keys;
            self.tracer.push(Step::CheckOverflow {
                node_id: parent_id,
                key_count,
                max_keys,
                is_overflow,
            });
            if !is_overflow {
                return Ok(());
            }

            let (promoted, new_id) = self.split_internal(parent_id)?;
            separator = promoted;
            left_id = parent_id;
            right_id = new_id;
        }

        let new_root_id = self.tree.allocate_page_id();
        self.tree.insert_node(TreeNode::Internal(InternalNode {
            page_id: new_root_id,
            keys: vec![separator.clone()],
            children: vec![left_id, right_id],
        }));
        self.tree.root_page = Some(new_root_id);
        self.tree.height += 1;
        self.tracer.access(new_root_id, NodeKind::Internal);
        self.tracer.mark_dirty(new_root_id);
        self.tracer.push(Step::PromoteKey {
            key: separator,
            target_node_id: new_root_id,
            left_child: left_id,
            right_child: right_id,
        });
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Removes a key/record pair, rebalancing by borrow or merge up the
    /// ancestor chain and collapsing the root when it empties out.
    pub fn delete(&mut self, key: &CompositeKey) -> Result<Record> {
        if self.tree.root_page.is_none() {
            return Err(ArborError::KeyNotFound);
        }

        let path = self.descend(key)?;
        let leaf_id = last_page(&path)?;
        let position = self
            .tree
            .leaf(leaf_id)?
            .keys
            .binary_search_by(|k| k.compare(key))
            .map_err(|_| ArborError::KeyNotFound)?;

        let removed = {
            let leaf = self.tree.leaf_mut(leaf_id)?;
            leaf.keys.remove(position);
            leaf.values.remove(position)
        };
        self.tracer.mark_dirty(leaf_id);
        self.tracer.push(Step::DeleteKey {
            node_id: leaf_id,
            key: key.clone(),
            position,
        });

        self.rebalance(&path)?;
        self.tracer.commit(WalRecordType::Delete, leaf_id, key);
        Ok(removed)
    }

    /// Restores the minimum-key bound along the deletion path, bottom-up.
    /// Borrowing from a sibling stops the propagation; merging removes a
    /// parent separator and may push the underflow one level up.
    fn rebalance(&mut self, path: &[PageId]) -> Result<()> {
        let min_keys = self.config.min_keys();

        for level in (1..path.len()).rev() {
            let node_id = path[level];
            let parent_id = path[level - 1];
            if self.tree.node(node_id)?.key_count() >= min_keys {
                break;
            }

            let (child_idx, left_sibling, right_sibling) = {
                let parent = self.tree.internal(parent_id)?;
                let idx = parent
                    .children
                    .iter()
                    .position(|&c| c == node_id)
                    .ok_or_else(|| {
                        ArborError::TreeCorrupted(format!(
                            "page {node_id} not a child of {parent_id}"
                        ))
                    })?;
                let left = idx.checked_sub(1).map(|i| parent.children[i]);
                let right = parent.children.get(idx + 1).copied();
                (idx, left, right)
            };

            if let Some(sibling_id) = left_sibling {
                if self.tree.node(sibling_id)?.key_count() > min_keys {
                    self.borrow_from_left(parent_id, child_idx)?;
                    break;
                }
            }
            if let Some(sibling_id) = right_sibling {
                if self.tree.node(sibling_id)?.key_count() > min_keys {
                    self.borrow_from_right(parent_id, child_idx)?;
                    break;
                }
            }

            // No sibling can lend: merge, absorbing into the left node of
            // the pair so the leaf chain splice is a pure right removal.
            if child_idx > 0 {
                self.merge_children(parent_id, child_idx - 1)?;
            } else {
                self.merge_children(parent_id, child_idx)?;
            }
        }

        self.fix_root()
    }

    /// Moves one boundary key from the left sibling into the underflowing
    /// node, rotating the parent separator.
    fn borrow_from_left(&mut self, parent_id: PageId, child_idx: usize) -> Result<()> {
        let (node_id, sibling_id) = {
            let parent = self.tree.internal(parent_id)?;
            (parent.children[child_idx], parent.children[child_idx - 1])
        };
        let sep_idx = child_idx - 1;
        let kind = self.tree.node(sibling_id)?.kind();
        self.tracer.access(sibling_id, kind);
        self.tracer.push(Step::BorrowFromLeft {
            node_id,
            sibling_id,
            parent_id,
        });

        match kind {
            NodeKind::Leaf => {
                let (moved_key, moved_value) = {
                    let sibling = self.tree.leaf_mut(sibling_id)?;
                    let key = sibling.keys.pop().ok_or_else(|| lend_error(sibling_id))?;
                    let value = sibling.values.pop().ok_or_else(|| lend_error(sibling_id))?;
                    (key, value)
                };
                {
                    let node = self.tree.leaf_mut(node_id)?;
                    node.keys.insert(0, moved_key.clone());
                    node.values.insert(0, moved_value);
                }
                self.tree.internal_mut(parent_id)?.keys[sep_idx] = moved_key.clone();
                self.tracer.push(Step::BorrowKey {
                    key: moved_key.clone(),
                    from_node: sibling_id,
                    to_node: node_id,
                });
                self.tracer.push(Step::PromoteKey {
                    key: moved_key,
                    target_node_id: parent_id,
                    left_child: sibling_id,
                    right_child: node_id,
                });
            }
            NodeKind::Internal => {
                let separator = self.tree.internal(parent_id)?.keys[sep_idx].clone();
                let (up_key, moved_child) = {
                    let sibling = self.tree.internal_mut(sibling_id)?;
                    let key = sibling.keys.pop().ok_or_else(|| lend_error(sibling_id))?;
                    let child = sibling.children.pop().ok_or_else(|| lend_error(sibling_id))?;
                    (key, child)
                };
                {
                    let node = self.tree.internal_mut(node_id)?;
                    node.keys.insert(0, separator);
                    node.children.insert(0, moved_child);
                }
                self.tree.internal_mut(parent_id)?.keys[sep_idx] = up_key.clone();
                self.tracer.push(Step::BorrowKey {
                    key: up_key.clone(),
                    from_node: sibling_id,
                    to_node: node_id,
                });
                self.tracer.push(Step::PromoteKey {
                    key: up_key,
                    target_node_id: parent_id,
                    left_child: sibling_id,
                    right_child: node_id,
                });
            }
        }

        self.tracer.mark_dirty(sibling_id);
        self.tracer.mark_dirty(node_id);
        self.tracer.mark_dirty(parent_id);
        Ok(())
    }

    /// Moves one boundary key from the right sibling into the underflowing
    /// node, rotating the parent separator.
    fn borrow_from_right(&mut self, parent_id: PageId, child_idx: usize) -> Result<()> {
        let (node_id, sibling_id) = {
            let parent = self.tree.internal(parent_id)?;
            (parent.children[child_idx], parent.children[child_idx + 1])
        };
        let sep_idx = child_idx;
        let kind = self.tree.node(sibling_id)?.kind();
        self.tracer.access(sibling_id, kind);
        self.tracer.push(Step::BorrowFromRight {
            node_id,
            sibling_id,
            parent_id,
        });

        match kind {
            NodeKind::Leaf => {
                let (moved_key, moved_value, new_separator) = {
                    let sibling = self.tree.leaf_mut(sibling_id)?;
                    if sibling.keys.is_empty() {
                        return Err(lend_error(sibling_id));
                    }
                    let key = sibling.keys.remove(0);
                    let value = sibling.values.remove(0);
                    let new_separator = sibling
                        .keys
                        .first()
                        .cloned()
                        .ok_or_else(|| lend_error(sibling_id))?;
                    (key, value, new_separator)
                };
                {
                    let node = self.tree.leaf_mut(node_id)?;
                    node.keys.push(moved_key.clone());
                    node.values.push(moved_value);
                }
                self.tree.internal_mut(parent_id)?.keys[sep_idx] = new_separator.clone();
                self.tracer.push(Step::BorrowKey {
                    key: moved_key,
                    from_node: sibling_id,
                    to_node: node_id,
                });
                self.tracer.push(Step::PromoteKey {
                    key: new_separator,
                    target_node_id: parent_id,
                    left_child: node_id,
                    right_child: sibling_id,
                });
            }
            NodeKind::Internal => {
                let separator = self.tree.internal(parent_id)?.keys[sep_idx].clone();
                let (up_key, moved_child) = {
                    let sibling = self.tree.internal_mut(sibling_id)?;
                    if sibling.keys.is_empty() {
                        return Err(lend_error(sibling_id));
                    }
                    (sibling.keys.remove(0), sibling.children.remove(0))
                };
                {
                    let node = self.tree.internal_mut(node_id)?;
                    node.keys.push(separator);
                    node.children.push(moved_child);
                }
                self.tree.internal_mut(parent_id)?.keys[sep_idx] = up_key.clone();
                self.tracer.push(Step::BorrowKey {
                    key: up_key.clone(),
                    from_node: sibling_id,
                    to_node: node_id,
                });
                self.tracer.push(Step::PromoteKey {
                    key: up_key,
                    target_node_id: parent_id,
                    left_child: node_id,
                    right_child: sibling_id,
                });
            }
        }

        self.tracer.mark_dirty(sibling_id);
        self.tracer.mark_dirty(node_id);
        self.tracer.mark_dirty(parent_id);
        Ok(())
    }

    /// Merges `parent.children[left_idx]` with its right neighbor,
    /// removing the separator between them from the parent. Leaves are
    /// concatenated and the chain re-linked; internals additionally absorb
    /// the demoted separator.
    fn merge_children(&mut self, parent_id: PageId, left_idx: usize) -> Result<()> {
        let (left_id, right_id, separator) = {
            let parent = self.tree.internal(parent_id)?;
            (
                parent.children[left_idx],
                parent.children[left_idx + 1],
                parent.keys[left_idx].clone(),
            )
        };

        let kind = self.tree.node(left_id)?.kind();
        self.tracer.access(left_id, kind);
        self.tracer.access(right_id, kind);

        match self.tree.remove_node(right_id) {
            Some(TreeNode::Leaf(right)) => {
                {
                    let left = self.tree.leaf_mut(left_id)?;
                    left.keys.extend(right.keys);
                    left.values.extend(right.values);
                    left.next_page = right.next_page;
                }
                if let Some(next_id) = right.next_page {
                    self.tree.leaf_mut(next_id)?.prev_page = Some(left_id);
                    self.tracer.mark_dirty(next_id);
                }
            }
            Some(TreeNode::Internal(right)) => {
                let left = self.tree.internal_mut(left_id)?;
                left.keys.push(separator.clone());
                left.keys.extend(right.keys);
                left.children.extend(right.children);
            }
            None => {
                return Err(ArborError::TreeCorrupted(format!(
                    "merge target {right_id} missing from node map"
                )))
            }
        }

        {
            let parent = self.tree.internal_mut(parent_id)?;
            parent.keys.remove(left_idx);
            parent.children.remove(left_idx + 1);
        }

        let merged_node = self.tree.node(left_id)?.clone();
        self.tracer.push(Step::MergeNode {
            left_id,
            right_id,
            merged_node,
            separator_key: separator,
        });
        self.tracer.mark_dirty(left_id);
        self.tracer.mark_dirty(parent_id);
        self.tracer.discard_page(right_id);
        Ok(())
    }

    /// Collapses an empty root: an internal root with no keys hands the
    /// tree to its sole child (height shrinks); an empty leaf root leaves
    /// the tree empty.
    fn fix_root(&mut self) -> Result<()> {
        let Some(root_id) = self.tree.root_page else {
            return Ok(());
        };

        let collapse = match self.tree.node(root_id)? {
            TreeNode::Internal(root) if root.keys.is_empty() => {
                Some(root.children.first().copied().ok_or_else(|| {
                    ArborError::TreeCorrupted(format!("empty root {root_id} has no child"))
                })?)
            }
            _ => None,
        };
        if let Some(child) = collapse {
            self.tree.remove_node(root_id);
            self.tracer.discard_page(root_id);
            self.tree.root_page = Some(child);
            self.tree.height = self.tree.height.saturating_sub(1);
        }

        let Some(root_id) = self.tree.root_page else {
            return Ok(());
        };
        if let TreeNode::Leaf(leaf) = self.tree.node(root_id)? {
            if leaf.keys.is_empty() {
                self.tree.remove_node(root_id);
                self.tracer.discard_page(root_id);
                self.tree.root_page = None;
                self.tree.height = 0;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Overwrites the record stored under `key`. The preceding search's
    /// trace is part of this operation's trace; on a miss the operation
    /// fails with that trace attached. The leaf position is re-derived
    /// rather than trusted from the search result.
    pub fn update(&mut self, key: &CompositeKey, new_value: Record) -> Result<Record> {
        self.search(key)?;

        let leaf_id = self.locate_leaf(key)?;
        let index = self
            .tree
            .leaf(leaf_id)?
            .keys
            .binary_search_by(|k| k.compare(key))
            .map_err(|_| ArborError::KeyNotFound)?;

        let old_value = {
            let leaf = self.tree.leaf_mut(leaf_id)?;
            let slot = leaf.values.get_mut(index).ok_or_else(|| {
                ArborError::TreeCorrupted(format!("leaf {leaf_id} value slot {index} missing"))
            })?;
            std::mem::replace(slot, new_value.clone())
        };

        self.tracer.mark_dirty(leaf_id);
        self.tracer.push(Step::UpdateKey {
            node_id: leaf_id,
            index,
            key: key.clone(),
            old_value: old_value.clone(),
            new_value,
        });
        self.tracer.commit(WalRecordType::Update, leaf_id, key);
        Ok(old_value)
    }

    // =========================================================================
    // Range query
    // =========================================================================

    /// Collects every key/record pair with `start <= key <= end` by
    /// walking the leaf chain from the leaf that would hold `start`.
    /// Returns the pairs in ascending order; an inverted range is empty.
    pub fn range(
        &mut self,
        start: &CompositeKey,
        end: &CompositeKey,
    ) -> Result<Vec<(CompositeKey, Record)>> {
        let mut pairs = Vec::new();
        if self.tree.root_page.is_none() || start.compare(end) == Ordering::Greater {
            return Ok(pairs);
        }

        let path = self.descend(start)?;
        let mut current = Some(last_page(&path)?);
        let mut first = true;

        while let Some(leaf_id) = current {
            if first {
                first = false;
            } else {
                let node = self.tree.node(leaf_id)?;
                self.tracer.visit(node);
            }

            let (mut collected, next) = {
                let leaf = self.tree.leaf(leaf_id)?;
                let begin = leaf
                    .keys
                    .partition_point(|k| k.compare(start) == Ordering::Less);
                let mut collected = Vec::new();
                let mut done = false;
                for i in begin..leaf.keys.len() {
                    if leaf.keys[i].compare(end) == Ordering::Greater {
                        done = true;
                        break;
                    }
                    let value = leaf.values.get(i).cloned().ok_or_else(|| {
                        ArborError::TreeCorrupted(format!("leaf {leaf_id} value slot {i} missing"))
                    })?;
                    collected.push((leaf.keys[i].clone(), value));
                }
                (collected, if done { None } else { leaf.next_page })
            };
            pairs.append(&mut collected);
            current = next;
        }

        Ok(pairs)
    }
}

/// Selects the child to follow for `key`: the first child whose separator
/// exceeds the key, i.e. keys equal to a separator route right.
fn child_index(internal: &InternalNode, key: &CompositeKey) -> usize {
    internal
        .keys
        .partition_point(|sep| sep.compare(key) != Ordering::Greater)
}

fn last_page(path: &[PageId]) -> Result<PageId> {
    path.last()
        .copied()
        .ok_or_else(|| ArborError::TreeCorrupted("descent produced an empty path".into()))
}

fn lend_error(sibling_id: PageId) -> ArborError {
    ArborError::TreeCorrupted(format!("sibling {sibling_id} has no entry to lend"))
}
