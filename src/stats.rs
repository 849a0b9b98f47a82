//! Progress projection: aggregate counters derived from the page store.
//!
//! Nothing here is tracked incrementally. [`Progress::compute`] is called
//! after every store mutation and recounts from scratch.

use crate::store::{PageStatus, PageStore};
use serde::{Deserialize, Serialize};

/// Aggregate view of a session's pages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Total pages in the document.
    pub page_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub pending_count: usize,
    /// `success_count / page_count`, in `[0, 1]`; 0 for an empty document.
    pub fraction: f64,
}

impl Progress {
    pub fn compute(pages: &PageStore, page_count: usize) -> Self {
        let success_count = pages.count(PageStatus::Success);
        let fraction = if page_count == 0 {
            0.0
        } else {
            (success_count as f64 / page_count as f64).min(1.0)
        };
        Self {
            page_count,
            success_count,
            error_count: pages.count(PageStatus::Error),
            pending_count: pages.count(PageStatus::Pending),
            fraction,
        }
    }

    /// Fraction as a whole-number percentage, rounded down.
    pub fn percent(&self) -> u8 {
        (self.fraction * 100.0).floor() as u8
    }

    /// Every page has a `success` record.
    pub fn is_complete(&self) -> bool {
        self.page_count > 0 && self.success_count >= self.page_count
    }
}
