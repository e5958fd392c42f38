//! Append-only in-memory log with checkpoint tracking.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use arbor_common::PageId;

use crate::record::{Lsn, WalRecord, WalRecordType};

/// The simulated write-ahead log for one tree.
///
/// Appends are ordered by a monotonically increasing LSN. When the log is
/// disabled (per tree configuration) appends become no-ops and report no
/// LSN, so callers emit no WAL trace steps.
#[derive(Debug)]
pub struct WalLog {
    next_lsn: Lsn,
    entries: Vec<WalRecord>,
    checkpoint: Option<Lsn>,
    enabled: bool,
}

impl WalLog {
    /// Creates an empty log.
    pub fn new(enabled: bool) -> Self {
        Self {
            next_lsn: Lsn::FIRST,
            entries: Vec::new(),
            checkpoint: None,
            enabled,
        }
    }

    /// Returns true if appends are recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends a mutation-intent record and returns its LSN, or `None`
    /// when the log is disabled.
    pub fn append(
        &mut self,
        record_type: WalRecordType,
        page_id: PageId,
        payload: Bytes,
    ) -> Option<Lsn> {
        if !self.enabled {
            return None;
        }
        let lsn = self.next_lsn;
        self.next_lsn = lsn.next();
        debug!(%lsn, ?record_type, page_id, "wal append");
        self.entries.push(WalRecord {
            lsn,
            record_type,
            page_id,
            payload,
        });
        Some(lsn)
    }

    /// Appends a checkpoint marker and remembers it as the latest
    /// checkpoint. Returns the marker's LSN, or `None` when disabled.
    pub fn checkpoint(&mut self) -> Option<Lsn> {
        let lsn = self.append(WalRecordType::Checkpoint, 0, Bytes::new())?;
        self.checkpoint = Some(lsn);
        debug!(%lsn, "wal checkpoint");
        Some(lsn)
    }

    /// Next LSN to be assigned.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }

    /// All appended records, oldest first.
    pub fn entries(&self) -> &[WalRecord] {
        &self.entries
    }

    /// LSN of the latest checkpoint marker, if any.
    pub fn latest_checkpoint(&self) -> Option<Lsn> {
        self.checkpoint
    }

    /// Snapshot of the log state for display.
    pub fn info(&self) -> WalInfo {
        WalInfo {
            next_lsn: self.next_lsn,
            checkpoint: self.checkpoint,
            entries: self
                .entries
                .iter()
                .map(|record| WalEntryInfo {
                    lsn: record.lsn,
                    record_type: record.record_type,
                    page_id: record.page_id,
                })
                .collect(),
        }
    }
}

/// Display snapshot of one WAL entry (payload omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntryInfo {
    pub lsn: Lsn,
    pub record_type: WalRecordType,
    pub page_id: PageId,
}

/// Display snapshot of the WAL state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalInfo {
    pub next_lsn: Lsn,
    pub checkpoint: Option<Lsn>,
    pub entries: Vec<WalEntryInfo>,
}
