//! Observer trait for per-page translation events.
//!
//! Inject an [`Arc<dyn TranslationObserver>`] via
//! [`crate::config::TranslationConfigBuilder::observer`] to receive events as
//! the pipeline works. Hosts that prefer pulling state can use
//! [`crate::pipeline::Translator::subscribe`] instead; both see the same
//! snapshots.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_translate::{TranslationConfig, TranslationObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ErrorCounter {
//!     errors: AtomicUsize,
//! }
//!
//! impl TranslationObserver for ErrorCounter {
//!     fn on_page_error(&self, index: usize, _total: usize, error: &str) {
//!         self.errors.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {} failed: {}", index + 1, error);
//!     }
//! }
//!
//! let counter = Arc::new(ErrorCounter { errors: AtomicUsize::new(0) });
//! let config = TranslationConfig::builder()
//!     .observer(counter as Arc<dyn TranslationObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::SessionSnapshot;
use std::sync::Arc;

/// Called by the pipeline as it processes pages.
///
/// Implementations must be `Send + Sync`: the main loop and single-page
/// regenerations run as separate tasks and may call in concurrently.
/// All methods default to no-ops.
pub trait TranslationObserver: Send + Sync {
    /// A sequential run started.
    ///
    /// * `total_pages` — pages in the document, including already translated ones
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Just before the backend request for a page.
    ///
    /// * `index` — 0-based page index
    fn on_page_start(&self, index: usize, total_pages: usize) {
        let _ = (index, total_pages);
    }

    /// A page was translated and stored.
    ///
    /// * `text_len` — byte length of the sanitized translation
    fn on_page_complete(&self, index: usize, total_pages: usize, text_len: usize) {
        let _ = (index, total_pages, text_len);
    }

    /// The backend failed for a page; an `error` record was stored.
    fn on_page_error(&self, index: usize, total_pages: usize, error: &str) {
        let _ = (index, total_pages, error);
    }

    /// A sequential run ended, by completion or cancellation.
    ///
    /// * `success_count` — pages with a `success` record at that moment
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }

    /// Published state changed.
    fn on_snapshot(&self, snapshot: &SessionSnapshot) {
        let _ = snapshot;
    }
}

/// Observer that ignores every event. Default when none is configured.
pub struct NoopObserver;

impl TranslationObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::TranslationConfig`].
pub type SharedObserver = Arc<dyn TranslationObserver>;
