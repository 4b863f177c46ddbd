//! Pagination parameters for list operations.

use serde::{Deserialize, Serialize};

/// Offset-based pagination shared across all list operations.
///
/// - `per_page`: 1–100, default 25
/// - `offset`: rows to skip, default 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_per_page", rename = "per-page")]
    pub per_page: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_per_page() -> u64 {
    25
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            offset: 0,
        }
    }
}

impl PageRequest {
    pub const MAX_PER_PAGE: u64 = 100;

    pub fn new(per_page: u64, offset: u64) -> Self {
        Self { per_page, offset }
    }

    /// Clamp `per_page` to the valid range 1–100.
    ///
    /// Backends call this before building a query.
    pub fn clamped(self) -> Self {
        Self {
            per_page: self.per_page.clamp(1, Self::MAX_PER_PAGE),
            offset: self.offset,
        }
    }
}
