//! Document sources: where page text comes from.
//!
//! The pipeline never parses a document itself. It asks a [`DocumentSource`]
//! for the page count and for one page's plain text at a time.
//!
//! 1. [`input`] — canonicalise a user-supplied path or URL to a local file
//! 2. [`pdf`]   — extract every page's text once via pdfium
//! 3. [`TextDocument`] — in-memory pages, for tests and headless hosts

pub mod input;
pub mod pdf;

pub use input::{resolve_input, ResolvedInput};
pub use pdf::PdfDocument;

/// Read-only access to a loaded document.
pub trait DocumentSource: Send + Sync {
    /// Stable identity used for cache lookup.
    fn name(&self) -> &str;

    /// Total pages, fixed once loaded.
    fn page_count(&self) -> usize;

    /// Plain text of page `index`, or `None` when the index is out of range
    /// or the page has no extractable text.
    fn page_text(&self, index: usize) -> Option<String>;
}

/// Document held entirely in memory.
#[derive(Debug, Clone)]
pub struct TextDocument {
    name: String,
    pages: Vec<Option<String>>,
}

impl TextDocument {
    pub fn new<S: Into<String>>(name: impl Into<String>, pages: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            pages: pages.into_iter().map(|p| Some(p.into())).collect(),
        }
    }

    /// Pages may be `None` to model pages whose extraction yielded nothing.
    pub fn with_gaps(name: impl Into<String>, pages: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            pages,
        }
    }
}

impl DocumentSource for TextDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Option<String> {
        self.pages
            .get(index)?
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
    }
}
