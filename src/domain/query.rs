//! Query types
//!
//! Time windows, pagination and ordering shared by the engines and stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Default page size when the caller does not specify one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound on page size so listings stay finite
pub const MAX_PAGE_SIZE: u32 = 500;

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted windows
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Everything from the Unix epoch up to now
    pub fn until_now() -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: Utc::now(),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// 1-based page with offset/limit semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    /// Build a page, clamping out-of-range values
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Ordering by creation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first, used for replay within a window
    Ascending,
    /// Most recent first, used for history views
    #[default]
    Descending,
}

/// Entry listing request for one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub wallet_id: Uuid,
    pub range: TimeRange,
    pub order: SortOrder,
    /// `None` returns the whole window
    pub page: Option<Page>,
    pub completed_only: bool,
}

impl EntryQuery {
    /// All completed entries of a window, oldest first
    pub fn window(wallet_id: Uuid, range: TimeRange) -> Self {
        Self {
            wallet_id,
            range,
            order: SortOrder::Ascending,
            page: None,
            completed_only: true,
        }
    }

    /// One page of history
    pub fn paged(wallet_id: Uuid, range: TimeRange, page: Page, order: SortOrder) -> Self {
        Self {
            wallet_id,
            range,
            order,
            page: Some(page),
            completed_only: false,
        }
    }
}
