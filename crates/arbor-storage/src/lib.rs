//! Storage engine for ArborDB.
//!
//! This crate provides:
//! - The B+Tree operation engine with step-trace emission
//! - The step vocabulary and operation response contract
//! - Simulated WAL / buffer-cache instrumentation wiring
//! - The random-data bulk loader
//! - The named-tree persistence manager over injected snapshot stores

mod btree;
mod manager;
mod repository;

pub use btree::{
    loader, BPlusTree, Instruments, Operation, OperationResponse, SearchHit, Step, Tracer,
};
pub use manager::{TreeInfo, TreeManager};
pub use repository::{JsonFileStore, MemoryStore, SnapshotStore, StoredTree, TreesStorage};
