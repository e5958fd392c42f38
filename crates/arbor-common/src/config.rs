//! Configuration structures and capacity constants for ArborDB.

use serde::{Deserialize, Serialize};

use crate::error::{ArborError, Result};

/// Default B+Tree order (maximum children per internal node).
pub const DEFAULT_ORDER: usize = 4;

/// Smallest order for which the balancing algorithms are well-defined.
pub const MIN_ORDER: usize = 3;

/// Default simulated page size in bytes. Surfaced for display only.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer-cache capacity in pages.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Maximum number of named trees retained concurrently.
pub const MAX_TREES: usize = 5;

/// Bounds for the random bulk loader.
pub const MIN_COUNT: usize = 1;
pub const MAX_COUNT: usize = 100;
pub const DEFAULT_COUNT: usize = 10;

/// Creation-time parameters of one tree.
///
/// Only `order` is consulted by the balancing algorithms; the remaining
/// fields parameterize the simulated instrumentation and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of children per internal node.
    pub order: usize,
    /// Simulated page size in bytes.
    pub page_size: usize,
    /// Whether mutating operations append to the simulated WAL.
    pub wal_enabled: bool,
    /// Buffer-cache capacity in pages.
    pub cache_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            page_size: DEFAULT_PAGE_SIZE,
            wal_enabled: true,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl TreeConfig {
    /// Maximum keys per node (`order - 1`).
    pub fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Minimum keys per non-root node after rebalancing
    /// (`ceil(order / 2) - 1`).
    pub fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Rejects configurations the algorithms cannot support.
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_ORDER {
            return Err(ArborError::InvalidOrder {
                order: self.order,
                min: MIN_ORDER,
            });
        }
        Ok(())
    }
}
