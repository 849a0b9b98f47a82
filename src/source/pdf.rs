//! PDF text extraction via pdfium.
//!
//! pdfium is not async-safe, so the document is opened and every page's
//! text extracted in one `spawn_blocking` call. After that the
//! [`PdfDocument`] is plain owned data: cheap to share across the pipeline's
//! tasks and never touched by pdfium again.

use super::{DocumentSource, ResolvedInput};
use crate::error::TranslateError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A PDF whose page text has been extracted up front.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    name: String,
    pages: Vec<Option<String>>,
}

impl PdfDocument {
    /// Open `pdf_path` and extract all page text.
    ///
    /// * `name` — document name used for cache lookup
    pub async fn open(
        pdf_path: &Path,
        name: impl Into<String>,
        password: Option<&str>,
    ) -> Result<Self, TranslateError> {
        let path = pdf_path.to_path_buf();
        let pwd = password.map(str::to_string);

        let pages = tokio::task::spawn_blocking(move || extract_text_blocking(&path, pwd.as_deref()))
            .await
            .map_err(|e| TranslateError::Internal(format!("Text extraction task panicked: {}", e)))??;

        let name = name.into();
        info!("PDF '{}' loaded: {} pages", name, pages.len());
        Ok(Self { name, pages })
    }

    /// Open an input produced by [`super::resolve_input`].
    pub async fn from_input(
        input: &ResolvedInput,
        password: Option<&str>,
    ) -> Result<Self, TranslateError> {
        Self::open(input.path(), input.document_name(), password).await
    }
}

impl DocumentSource for PdfDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Option<String> {
        self.pages.get(index)?.clone()
    }
}

/// Blocking implementation of text extraction.
fn extract_text_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<Option<String>>, TranslateError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| TranslateError::PdfiumBindingFailed(e.to_string()))?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path.to_path_buf(), password.is_some(), format!("{:?}", e)))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    let mut texts = Vec::with_capacity(total);

    for (idx, page) in pages.iter().enumerate() {
        let text = match page.text() {
            Ok(text) => Some(text.all()).filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!("Page {}: text extraction failed: {:?}", idx + 1, e);
                None
            }
        };
        debug!(
            "Extracted page {} → {} chars",
            idx + 1,
            text.as_ref().map_or(0, |t| t.chars().count())
        );
        texts.push(text);
    }

    Ok(texts)
}

/// Map a pdfium open failure onto the password / corruption variants.
fn open_error(path: PathBuf, had_password: bool, detail: String) -> TranslateError {
    if detail.to_lowercase().contains("password") {
        if had_password {
            TranslateError::WrongPassword { path }
        } else {
            TranslateError::PasswordRequired { path }
        }
    } else {
        TranslateError::CorruptPdf { path, detail }
    }
}
