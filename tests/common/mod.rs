//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use edgequake_pdf_translate::{PageError, TextDocument, TranslationBackend, TranslationConfig};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// Scripted backend: echoes the page body with an `(en)` suffix, wrapped in
/// the markers a careless model would repeat.
///
/// Pages can be made to fail or to panic, and every call can be held at a
/// gate until the test releases it.
pub struct MockBackend {
    calls: AtomicUsize,
    prompts: Mutex<Vec<(usize, String)>>,
    failing: Mutex<HashSet<usize>>,
    panicking: Mutex<HashSet<usize>>,
    open: watch::Sender<bool>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            open: watch::channel(true).0,
        })
    }

    pub fn fail_page(&self, page: usize) {
        self.failing.lock().unwrap().insert(page);
    }

    /// The call for `page` panics after passing the gate.
    pub fn panic_on_page(&self, page: usize) {
        self.panicking.lock().unwrap().insert(page);
    }

    pub fn heal_page(&self, page: usize) {
        self.failing.lock().unwrap().remove(&page);
        self.panicking.lock().unwrap().remove(&page);
    }

    /// Calls block after being recorded until [`MockBackend::release`].
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, page: usize) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == page)
            .count()
    }

    /// Most recent prompt sent for `page`.
    pub fn prompt_for(&self, page: usize) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| *p == page)
            .map(|(_, prompt)| prompt.clone())
    }

    /// Yield to spawned tasks until `n` calls have been recorded.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("backend was not called in time");
    }
}

impl TranslationBackend for MockBackend {
    fn translate<'a>(
        &'a self,
        page: usize,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, PageError>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push((page, prompt.to_string()));
            self.calls.fetch_add(1, Ordering::SeqCst);

            let mut open = self.open.subscribe();
            loop {
                if *open.borrow_and_update() {
                    break;
                }
                if open.changed().await.is_err() {
                    break;
                }
            }

            let panics = self.panicking.lock().unwrap().contains(&page);
            if panics {
                panic!("scripted panic on page {page}");
            }
            if self.failing.lock().unwrap().contains(&page) {
                return Err(PageError::BackendFailed {
                    page,
                    retries: 0,
                    detail: "scripted failure".into(),
                });
            }
            Ok(format!("[START] {} (en) [END]", page_body(prompt)))
        })
    }
}

/// Text between the page markers of a prompt.
pub fn page_body(prompt: &str) -> &str {
    prompt
        .split("[START]\n")
        .nth(1)
        .and_then(|rest| rest.split("\n[END]").next())
        .unwrap_or_default()
}

/// `(prior_source_tail, prior_translation_tail)` of a prompt, if it carries
/// a continuity block.
pub fn continuity(prompt: &str) -> Option<(String, String)> {
    if !prompt.contains("CONTEXT FROM THE PREVIOUS PAGE") {
        return None;
    }
    let parts: Vec<&str> = prompt.split("\"\"\"").collect();
    Some((parts[1].to_string(), parts[3].to_string()))
}

pub fn config(dir: &TempDir) -> TranslationConfig {
    TranslationConfig::builder()
        .cache_dir(dir.path())
        .request_delay(Duration::ZERO)
        .build()
        .unwrap()
}

/// `n` pages of German text named `Seite {i}`.
pub fn document(name: &str, n: usize) -> Arc<TextDocument> {
    Arc::new(TextDocument::new(
        name,
        (0..n).map(|i| format!("Seite {i} Inhalt.")),
    ))
}
