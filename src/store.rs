//! Page store: one translation record per page index, persisted per document.
//!
//! The in-memory [`PageStore`] is a map from page index to [`PageRecord`];
//! an update to an index replaces whatever was stored there before, so
//! duplicates cannot exist. [`PageStore::ordered`] is the single view used
//! for display, persistence and export.
//!
//! [`PageCache`] owns the cache directory. Each document gets one JSON file
//! holding the ordered record list. Reads that fail for any reason are a
//! cache miss; writes go through a temp file and a rename so a crash never
//! leaves a torn snapshot behind.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Text stored for a page whose backend call failed.
pub const ERROR_PLACEHOLDER: &str =
    "Translation failed for this page. Regenerate it to try again.";

/// Processing state of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    /// Queued or in flight. Older cache files call this `loading`.
    #[serde(alias = "loading")]
    Pending,
    Success,
    Error,
}

/// Translation result for one page of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 0-based page index; stable for the lifetime of the document.
    pub index: usize,
    /// Translated text, or [`ERROR_PLACEHOLDER`] for failed pages.
    pub text: String,
    pub status: PageStatus,
}

impl PageRecord {
    pub fn success(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            status: PageStatus::Success,
        }
    }

    pub fn error(index: usize) -> Self {
        Self {
            index,
            text: ERROR_PLACEHOLDER.to_string(),
            status: PageStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PageStatus::Success
    }
}

/// Index-keyed collection of page records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStore {
    records: BTreeMap<usize, PageRecord>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a record list; later duplicates win.
    pub fn from_records(records: impl IntoIterator<Item = PageRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    pub fn get(&self, index: usize) -> Option<&PageRecord> {
        self.records.get(&index)
    }

    /// Insert `record`, replacing any record already stored at its index.
    pub fn upsert(&mut self, record: PageRecord) {
        self.records.insert(record.index, record);
    }

    /// Mark an existing record as pending. Returns `false` if the index has
    /// no record yet.
    pub fn mark_pending(&mut self, index: usize) -> bool {
        match self.records.get_mut(&index) {
            Some(record) => {
                record.status = PageStatus::Pending;
                true
            }
            None => false,
        }
    }

    /// All records sorted by index ascending.
    pub fn ordered(&self) -> Vec<PageRecord> {
        self.records.values().cloned().collect()
    }

    /// Drop every record whose index is outside `0..page_count`.
    pub fn retain_below(&mut self, page_count: usize) {
        self.records.retain(|&index, _| index < page_count);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, status: PageStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageRecord> {
        self.records.values()
    }
}

/// On-disk page cache: one JSON file per document name.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file used for `document_name`.
    ///
    /// Path separators and other characters that are unsafe in file names are
    /// replaced with `_`, so the same name always maps to the same file.
    pub fn path_for(&self, document_name: &str) -> PathBuf {
        let stem: String = document_name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = if stem.trim_matches('.').is_empty() {
            "_".to_string()
        } else {
            stem
        };
        self.dir.join(format!("{stem}.json"))
    }

    /// Read the persisted store for `document_name`.
    ///
    /// A missing, unreadable or malformed file is a cache miss.
    pub async fn load(&self, document_name: &str) -> Option<PageStore> {
        match self.try_load(document_name).await {
            Ok(store) => store,
            Err(e) => {
                warn!("Ignoring page cache: {}", e);
                None
            }
        }
    }

    async fn try_load(&self, document_name: &str) -> Result<Option<PageStore>, CacheError> {
        let path = self.path_for(document_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let records: Vec<PageRecord> =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;
        debug!("Loaded {} cached pages from {}", records.len(), path.display());
        Ok(Some(PageStore::from_records(records)))
    }

    /// Persist `store.ordered()` for `document_name`.
    ///
    /// Atomic: the snapshot is written to a temp file and renamed over the
    /// previous one. The cache directory is created on first use.
    pub async fn save(&self, document_name: &str, store: &PageStore) -> Result<(), CacheError> {
        let path = self.path_for(document_name);
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let json = serde_json::to_vec_pretty(&store.ordered()).map_err(|source| {
            CacheError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(io_err)?;
        Ok(())
    }

    /// Delete the persisted store for `document_name`. Nothing to delete is
    /// not an error.
    pub async fn clear(&self, document_name: &str) -> Result<(), CacheError> {
        let path = self.path_for(document_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}
