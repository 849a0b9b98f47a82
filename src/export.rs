//! Export: join successful pages into one text document.
//!
//! Only `success` records are eligible, in page-index order. Failed and
//! pending pages are left out rather than replaced by a placeholder.

use crate::error::TranslateError;
use crate::store::PageRecord;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// What goes between two exported pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSeparator {
    /// Blank line only. (default)
    #[default]
    None,
    /// `---` on its own line.
    HorizontalRule,
    /// `<!-- page N -->` naming the page that follows (1-based).
    Comment,
    /// Any other text, on its own line.
    Custom(String),
}

impl PageSeparator {
    /// Separator placed before the page at zero-based `next_index`.
    pub fn render(&self, next_index: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", next_index + 1),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

impl FromStr for PageSeparator {
    type Err = std::convert::Infallible;

    /// `none`, `hr` / `---`, `comment`; anything else is taken verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "" | "none" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.trim().to_string()),
        })
    }
}

/// Join the text of every successful record, ordered by index.
///
/// `pages` need not be sorted or filtered beforehand.
pub fn assemble(pages: &[PageRecord], separator: &PageSeparator) -> String {
    let mut eligible: Vec<&PageRecord> = pages.iter().filter(|r| r.is_success()).collect();
    eligible.sort_by_key(|r| r.index);

    let mut out = String::new();
    for (i, page) in eligible.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(page.index));
        }
        out.push_str(page.text.trim_end());
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Write `text` to `path` atomically: temp file alongside, then rename.
pub async fn write_export(path: &Path, text: &str) -> Result<(), TranslateError> {
    let failed = |source| TranslateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, text.as_bytes()).await.map_err(failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(failed)?;

    info!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}
