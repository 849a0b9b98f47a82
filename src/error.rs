//! Error types for the edgequake-pdf-translate library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`TranslateError`] — **Fatal**: the session cannot be set up at all
//!   (bad input file, corrupt PDF, provider not configured). Returned as
//!   `Err(TranslateError)` from constructors and the document loaders.
//!
//! * [`PageError`] — **Non-fatal**: the backend failed for one page. The
//!   pipeline records it as an `error` page and moves on to the next index;
//!   it is never propagated out of a run.
//!
//! * [`CacheError`] — the page cache could not be read, written or removed.
//!   Persistence is best-effort, so the pipeline logs these and continues
//!   without the cache rather than stopping.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-translate library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF could not be opened by pdfium.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Page number outside the loaded document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium \
to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal backend failure for a single page.
///
/// The pipeline turns every variant into an `error` page record carrying
/// [`crate::store::ERROR_PLACEHOLDER`]; the detail only goes to logs and
/// observers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// The backend call failed after its internal retries.
    #[error("Page {page}: translation failed after {retries} retries: {detail}")]
    BackendFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The backend answered, but with no text.
    #[error("Page {page}: backend returned an empty response")]
    EmptyResponse { page: usize },

    /// The backend call did not finish within its own deadline.
    #[error("Page {page}: translation timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

/// Failure reading, writing or deleting a cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file '{path}' is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
