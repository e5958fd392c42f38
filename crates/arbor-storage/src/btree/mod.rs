//! B+Tree simulation engine with step tracing.
//!
//! The engine runs the classic order-balanced algorithms - search, insert
//! with splits, delete with borrows and merges, update, range query - over
//! an identifier-indexed node map, emitting a deterministic trace of
//! atomic steps through the simulated WAL and buffer-cache instruments.

pub mod loader;
pub mod response;
pub mod step;
pub mod tracer;
pub mod tree;

pub use response::{Operation, OperationResponse};
pub use step::Step;
pub use tracer::{Instruments, Tracer};
pub use tree::{BPlusTree, SearchHit};
