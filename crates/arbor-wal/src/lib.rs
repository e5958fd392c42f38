//! Simulated write-ahead log for ArborDB.
//!
//! Every mutating tree operation appends an intent record here before its
//! structural change is considered durable. The log is illustrative
//! instrumentation: it is held in memory, replayed by nothing, and must
//! never gate or alter the outcome of an operation.

pub mod log;
pub mod record;

pub use log::{WalEntryInfo, WalInfo, WalLog};
pub use record::{Lsn, WalRecord, WalRecordType};
