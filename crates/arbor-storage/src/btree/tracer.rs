//! Step collection and instrumentation wiring.
//!
//! The tracer sits between the balancing algorithms and the simulated
//! durability/caching subsystems: every page the engine touches flows
//! through [`Tracer::access`], which drives the cache model and read log
//! and emits the corresponding cache/I-O steps, and every mutation ends
//! with [`Tracer::commit`], which appends the WAL intent and emits the
//! flush steps. Instrumentation observes; it never alters outcomes.

use bytes::BytesMut;

use arbor_buffer::{AccessOutcome, PageCache, ReadLog};
use arbor_common::{CompositeKey, NodeKind, PageId, TreeConfig, TreeNode};
use arbor_wal::{WalLog, WalRecordType};

use super::step::Step;

/// Per-tree runtime instrumentation state.
///
/// Instruments are rebuilt from tree metadata on load; they are not part
/// of the persisted snapshot.
pub struct Instruments {
    pub wal: WalLog,
    pub cache: PageCache,
    pub read_log: ReadLog,
}

impl Instruments {
    /// Creates instrumentation for a tree with the given configuration.
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            wal: WalLog::new(config.wal_enabled),
            cache: PageCache::new(config.cache_size),
            read_log: ReadLog::new(),
        }
    }
}

/// Collects the step trace of one operation and drives the instruments.
pub struct Tracer<'a> {
    steps: Vec<Step>,
    instruments: &'a mut Instruments,
    /// Pages dirtied by the current operation, in first-dirtied order.
    dirty: Vec<PageId>,
}

impl<'a> Tracer<'a> {
    /// Creates a tracer over the given instruments.
    pub fn new(instruments: &'a mut Instruments) -> Self {
        Self {
            steps: Vec::new(),
            instruments,
            dirty: Vec::new(),
        }
    }

    /// Appends a step to the trace.
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Records a page access: read log entry, cache touch, and the
    /// matching CACHE_HIT or CACHE_MISS / EVICT_PAGE / PAGE_LOAD steps.
    pub fn access(&mut self, page_id: PageId, kind: NodeKind) {
        self.instruments.read_log.record(page_id, kind);
        match self.instruments.cache.touch(page_id) {
            AccessOutcome::Hit => self.steps.push(Step::CacheHit { page_id }),
            AccessOutcome::Miss { evicted } => {
                self.steps.push(Step::CacheMiss { page_id });
                if let Some(victim) = evicted {
                    self.steps.push(Step::EvictPage { page_id: victim });
                }
                self.steps.push(Step::PageLoad { page_id, kind });
            }
        }
    }

    /// Records a node visit: a page access followed by a TRAVERSE_NODE
    /// step carrying the node's keys.
    pub fn visit(&mut self, node: &TreeNode) {
        self.access(node.page_id(), node.kind());
        self.steps.push(Step::TraverseNode {
            node_id: node.page_id(),
            kind: node.kind(),
            keys: node.keys().to_vec(),
        });
    }

    /// Marks a page as dirtied by the current operation.
    pub fn mark_dirty(&mut self, page_id: PageId) {
        if !self.dirty.contains(&page_id) {
            self.dirty.push(page_id);
        }
    }

    /// Drops a freed page from the dirty set and the cache model.
    pub fn discard_page(&mut self, page_id: PageId) {
        self.dirty.retain(|&id| id != page_id);
        self.instruments.cache.discard(page_id);
    }

    /// Finishes a mutating operation: WAL append (before the flush steps,
    /// so the intent is logged before the mutation counts as durable),
    /// one PAGE_FLUSH per dirty page, and a closing BUFFER_FLUSH.
    pub fn commit(&mut self, record_type: WalRecordType, page_id: PageId, key: &CompositeKey) {
        let mut payload = BytesMut::with_capacity(key.encoded_size());
        key.encode(&mut payload);
        if let Some(lsn) = self
            .instruments
            .wal
            .append(record_type, page_id, payload.freeze())
        {
            self.steps.push(Step::WalAppend { lsn, page_id });
        }

        let dirty = std::mem::take(&mut self.dirty);
        for &page_id in &dirty {
            self.steps.push(Step::PageFlush { page_id });
        }
        self.steps.push(Step::BufferFlush { page_ids: dirty });
    }

    /// Returns the collected steps, consuming the tracer.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// The steps collected so far.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
