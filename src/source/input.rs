//! Input resolution: turn a user-supplied path or URL into a local PDF.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that lives as long as the [`ResolvedInput`]. The `%PDF` magic bytes are
//! checked before returning so a wrong file fails with a clear message.
//!
//! Each resolved input also carries the document name used for the page
//! cache: the file name for local files, the last URL path segment for
//! downloads. The name never depends on the temp directory, so a second run
//! on the same URL finds the same cache file.

use crate::error::TranslateError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input — either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local { path: PathBuf, name: String },
    /// Input was a URL; the PDF lives in a temp directory that is removed
    /// when this value is dropped.
    Downloaded {
        path: PathBuf,
        name: String,
        _temp_dir: TempDir,
    },
}

impl ResolvedInput {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local { path, .. } => path,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// Stable document name for cache lookup.
    pub fn document_name(&self) -> &str {
        match self {
            ResolvedInput::Local { name, .. } => name,
            ResolvedInput::Downloaded { name, .. } => name,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TranslateError> {
    let input = input.trim();
    if input.is_empty() || (input.contains("://") && !is_url(input)) {
        return Err(TranslateError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, TranslateError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(TranslateError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TranslateError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TranslateError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TranslateError::FileNotFound { path });
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Resolved local PDF: {} (cache name '{}')", path.display(), name);
    Ok(ResolvedInput::Local { path, name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TranslateError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| TranslateError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let name = file_name_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| TranslateError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&name);

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(TranslateError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| TranslateError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        name,
        _temp_dir: temp_dir,
    })
}

/// Last non-empty path segment of `url` when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .filter(|last| last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
