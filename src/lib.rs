//! # edgequake-pdf-translate
//!
//! Translate PDF documents page by page with an LLM, keeping every finished
//! page in a local cache so an interrupted run picks up where it stopped.
//!
//! ## Why page by page?
//!
//! Whole-document prompts hit context limits and lose everything on one
//! failure. Here each page is its own request and its own cache entry. A
//! short tail of the previous page (source and translation) is sent along,
//! so terminology and sentence flow carry across page breaks without the
//! prompt growing with the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / URL
//!  │
//!  ├─ 1. Source    resolve input, extract page text via pdfium
//!  ├─ 2. Cache     restore finished pages for this document name
//!  ├─ 3. Prompt    page text + tail of previous page + glossary
//!  ├─ 4. LLM       one call per page, strictly in order, with a delay
//!  ├─ 5. Sanitize  strip markers, labels, fences from the reply
//!  ├─ 6. Store     upsert, persist, publish a snapshot
//!  └─ 7. Export    join successful pages
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_translate::{
//!     assemble, resolve_input, PageSeparator, PdfDocument, TranslationConfig, Translator,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TranslationConfig::builder()
//!         .target_language("English")
//!         .glossary_term("Bescheid", "notice")
//!         .build()?;
//!     let translator = Translator::from_config(config)?;
//!
//!     let input = resolve_input("bericht.pdf", 120).await?;
//!     let document = PdfDocument::from_input(&input, None).await?;
//!     if let Some(run) = translator.load(Arc::new(document)).await {
//!         run.await?;
//!     }
//!
//!     println!("{}", assemble(&translator.export_pages(), &PageSeparator::None));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-translate` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf-translate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sanitize;
pub mod source;
pub mod stats;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{LlmBackend, TranslationBackend, DEFAULT_MODEL};
pub use config::{TranslationConfig, TranslationConfigBuilder, MAX_RETRIES};
pub use error::{CacheError, PageError, TranslateError};
pub use export::{assemble, write_export, PageSeparator};
pub use pipeline::{SessionSnapshot, Translator};
pub use progress::{NoopObserver, SharedObserver, TranslationObserver};
pub use prompts::{PageContext, PromptBuilder};
pub use sanitize::sanitize;
pub use source::{resolve_input, DocumentSource, PdfDocument, ResolvedInput, TextDocument};
pub use stats::Progress;
pub use store::{PageCache, PageRecord, PageStatus, PageStore, ERROR_PLACEHOLDER};
