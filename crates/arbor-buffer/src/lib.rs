//! Simulated buffer-cache instrumentation for ArborDB.
//!
//! This crate models the caching behavior a page-based engine would show,
//! without owning any page data:
//! - LRU residency tracking over page ids with a configurable capacity
//! - Cumulative hit/miss/eviction counters
//! - A read log of every page touched, stamped with a logical tick
//!
//! The counters and logs are exposed for observability only; they never
//! gate or alter the outcome of a tree operation.

mod cache;
mod read_log;

pub use cache::{AccessOutcome, CacheStats, PageCache};
pub use read_log::{PageAccess, ReadLog};
