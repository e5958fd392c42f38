//! Step trace vocabulary.
//!
//! Every operation emits an ordered list of [`Step`] records describing the
//! atomic actions it performed. Renderers replay this trace for animation,
//! so the serialized shape is a stable contract: a tagged variant per step
//! kind, each carrying only the fields relevant to that kind.

use serde::{Deserialize, Serialize};

use arbor_common::{CompositeKey, NodeKind, PageId, Record, TreeNode};
use arbor_wal::Lsn;

/// One atomic action within an operation's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    /// Visit of one node during descent or a leaf-chain walk.
    TraverseNode {
        node_id: PageId,
        kind: NodeKind,
        keys: Vec<CompositeKey>,
    },
    /// Key/record pair inserted into a leaf with spare room.
    InsertKey {
        node_id: PageId,
        key: CompositeKey,
        value: Record,
        position: usize,
    },
    /// Key added to an already-full node, making it temporarily overfull
    /// until the following split resolves it.
    AddTempKey {
        node_id: PageId,
        key: CompositeKey,
        position: usize,
    },
    /// Key-count check against the node capacity.
    CheckOverflow {
        node_id: PageId,
        key_count: usize,
        max_keys: usize,
        is_overflow: bool,
    },
    /// Node partitioned into two; snapshots show both halves after the
    /// split.
    SplitNode {
        original_node: TreeNode,
        new_node: TreeNode,
        separator_key: CompositeKey,
    },
    /// Separator key moved up into a parent (or new root).
    PromoteKey {
        key: CompositeKey,
        target_node_id: PageId,
        left_child: PageId,
        right_child: PageId,
    },
    /// Record overwritten in place.
    UpdateKey {
        node_id: PageId,
        index: usize,
        key: CompositeKey,
        old_value: Record,
        new_value: Record,
    },
    /// Key/record pair removed from a leaf.
    DeleteKey {
        node_id: PageId,
        key: CompositeKey,
        position: usize,
    },
    /// Underflowing node takes a key from its left sibling.
    BorrowFromLeft {
        node_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
    },
    /// Underflowing node takes a key from its right sibling.
    BorrowFromRight {
        node_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
    },
    /// The key that moved between siblings during a borrow.
    BorrowKey {
        key: CompositeKey,
        from_node: PageId,
        to_node: PageId,
    },
    /// Two siblings combined; the snapshot shows the surviving node after
    /// the merge.
    MergeNode {
        left_id: PageId,
        right_id: PageId,
        merged_node: TreeNode,
        separator_key: CompositeKey,
    },
    /// Simulated WAL append for a mutation intent.
    WalAppend { lsn: Lsn, page_id: PageId },
    /// Simulated write-back of all pages dirtied by the operation.
    BufferFlush { page_ids: Vec<PageId> },
    /// Successful membership check in the terminal leaf.
    SearchFound {
        node_id: PageId,
        index: usize,
        key: CompositeKey,
        value: Record,
    },
    /// Failed membership check; `node_id` is the terminal leaf, absent
    /// when the tree was empty.
    SearchNotFound {
        key: CompositeKey,
        node_id: Option<PageId>,
    },
    /// Page brought into the simulated cache.
    PageLoad { page_id: PageId, kind: NodeKind },
    /// Dirty page written back.
    PageFlush { page_id: PageId },
    /// Page access satisfied from the simulated cache.
    CacheHit { page_id: PageId },
    /// Page access that missed the simulated cache.
    CacheMiss { page_id: PageId },
    /// Least-recently-used page dropped to make room.
    EvictPage { page_id: PageId },
}

impl Step {
    /// Returns the serialized tag of this step kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::TraverseNode { .. } => "TRAVERSE_NODE",
            Step::InsertKey { .. } => "INSERT_KEY",
            Step::AddTempKey { .. } => "ADD_TEMP_KEY",
            Step::CheckOverflow { .. } => "CHECK_OVERFLOW",
            Step::SplitNode { .. } => "SPLIT_NODE",
            Step::PromoteKey { .. } => "PROMOTE_KEY",
            Step::UpdateKey { .. } => "UPDATE_KEY",
            Step::DeleteKey { .. } => "DELETE_KEY",
            Step::BorrowFromLeft { .. } => "BORROW_FROM_LEFT",
            Step::BorrowFromRight { .. } => "BORROW_FROM_RIGHT",
            Step::BorrowKey { .. } => "BORROW_KEY",
            Step::MergeNode { .. } => "MERGE_NODE",
            Step::WalAppend { .. } => "WAL_APPEND",
            Step::BufferFlush { .. } => "BUFFER_FLUSH",
            Step::SearchFound { .. } => "SEARCH_FOUND",
            Step::SearchNotFound { .. } => "SEARCH_NOT_FOUND",
            Step::PageLoad { .. } => "PAGE_LOAD",
            Step::PageFlush { .. } => "PAGE_FLUSH",
            Step::CacheHit { .. } => "CACHE_HIT",
            Step::CacheMiss { .. } => "CACHE_MISS",
            Step::EvictPage { .. } => "EVICT_PAGE",
        }
    }
}
