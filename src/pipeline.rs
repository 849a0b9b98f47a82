//! The translation pipeline: one document session, one sequential worker.
//!
//! [`Translator`] owns the session state behind a single async mutex. Every
//! store mutation (upsert + persist + publish) happens while holding it, so
//! the main loop and single-page regenerations never interleave a write and
//! the cache file always holds a complete snapshot.
//!
//! ## Data Flow
//!
//! ```text
//! load ──▶ cache lookup ──▶ start ──▶ for each page index, ascending:
//!                                       skip if no source text
//!                                       skip if success / in flight
//!                                       prompt ──▶ backend ──▶ sanitize
//!                                       upsert + persist + publish
//!                                       delay
//! ```
//!
//! ## Sessions and runs
//!
//! Each `load` and each `reset` gives the session a fresh id; each `start`
//! gives the worker a fresh run id. A worker stops as soon as either id no
//! longer matches, and a result computed for an older session id is
//! discarded instead of written. Cancellation is cooperative: it is noticed
//! between pages and around the inter-request delay, never mid-call.
//!
//! A page index is claimed by at most one worker at a time (main loop or
//! regeneration) until its result is committed. Workers run under a
//! supervisor task; if one panics, its run id and claimed pages are released
//! and those pages are recorded as failed.

use crate::backend::{LlmBackend, TranslationBackend};
use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::progress::TranslationObserver;
use crate::prompts::{tail, PageContext, PromptBuilder};
use crate::sanitize::sanitize;
use crate::source::DocumentSource;
use crate::stats::Progress;
use crate::store::{PageCache, PageRecord, PageStatus, PageStore};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

/// Read-only view of the session, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// `None` until a document is loaded.
    pub document_name: Option<String>,
    pub page_count: usize,
    /// Records ordered by page index.
    pub pages: Vec<PageRecord>,
    pub is_running: bool,
    pub progress: Progress,
}

impl SessionSnapshot {
    /// Successful pages in index order: the input of any export.
    pub fn exportable(&self) -> Vec<PageRecord> {
        self.pages.iter().filter(|r| r.is_success()).cloned().collect()
    }
}

/// Drives translation of the loaded document.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Translator {
    inner: Arc<Inner>,
}

struct Inner {
    config: TranslationConfig,
    backend: Arc<dyn TranslationBackend>,
    prompts: PromptBuilder,
    cache: PageCache,
    state: Mutex<State>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    /// Shared counter for session, run and worker ids.
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Session {
    id: u64,
    document: Arc<dyn DocumentSource>,
    pages: PageStore,
    /// Run id of the active sequential worker.
    active_run: Option<u64>,
    /// Page index → id of the worker translating it.
    in_flight: HashMap<usize, u64>,
}

/// What the main loop should do with the next index.
enum Step {
    Translate,
    Skip,
    Stop,
}

impl Translator {
    pub fn new(config: TranslationConfig, backend: Arc<dyn TranslationBackend>) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                prompts: config.prompt_builder(),
                cache: PageCache::new(config.cache_dir.clone()),
                config,
                backend,
                state: Mutex::new(State::default()),
                snapshot_tx,
            }),
        }
    }

    /// Build a translator backed by the LLM provider named in `config`.
    pub fn from_config(config: TranslationConfig) -> Result<Self, TranslateError> {
        let backend = LlmBackend::from_config(&config)?;
        Ok(Self::new(config, Arc::new(backend)))
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.inner.cache
    }

    /// Bind `document` as the active session, replacing any previous one.
    ///
    /// Cached pages are restored first. If any page is missing, failed or
    /// still pending, a run starts immediately and its handle is returned.
    pub async fn load(&self, document: Arc<dyn DocumentSource>) -> Option<JoinHandle<()>> {
        let name = document.name().to_string();
        let page_count = document.page_count();

        let needs_work = {
            // Commits persist under this lock, so the cache read below sees
            // every page the previous session wrote.
            let mut state = self.inner.state.lock().await;
            let id = state.next_id();

            let mut pages = self.inner.cache.load(&name).await.unwrap_or_default();
            pages.retain_below(page_count);
            let needs_work =
                pages.len() < page_count || pages.iter().any(|r| r.status != PageStatus::Success);

            info!(
                "Loaded '{}': {} pages, {} cached{}",
                name,
                page_count,
                pages.len(),
                if needs_work { "" } else { " (complete)" }
            );

            state.session = Some(Session {
                id,
                document,
                pages,
                active_run: None,
                in_flight: HashMap::new(),
            });
            self.inner.publish(&state);
            needs_work
        };

        if needs_work {
            self.start().await
        } else {
            None
        }
    }

    /// Start the sequential run over all pages.
    ///
    /// No-op (`None`) without a session or while a run is already active.
    pub async fn start(&self) -> Option<JoinHandle<()>> {
        let mut state = self.inner.state.lock().await;
        let run = state.next_id();
        let session = state.session.as_mut()?;
        if session.active_run.is_some() {
            debug!("Run already active for '{}'", session.document.name());
            return None;
        }
        session.active_run = Some(run);
        let session_id = session.id;
        let document = Arc::clone(&session.document);
        self.inner.publish(&state);
        drop(state);

        let inner = Arc::clone(&self.inner);
        Some(self.inner.supervise(session_id, run, async move {
            inner.run(session_id, run, document).await;
        }))
    }

    /// Ask the active run to stop before its next page. Returns `false` when
    /// nothing was running.
    pub async fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        let stopped = match state.session.as_mut() {
            Some(session) => session.active_run.take().is_some(),
            None => false,
        };
        if stopped {
            info!("Run cancelled");
            self.inner.publish(&state);
        }
        stopped
    }

    /// Re-translate one page, whether or not a run is active.
    ///
    /// The page is marked pending right away; the returned task does the
    /// translation. `None` when there is no session, the index is out of
    /// range, the page has no source text, or a worker is already
    /// translating the page.
    pub async fn regenerate_one(&self, index: usize) -> Option<JoinHandle<()>> {
        let mut state = self.inner.state.lock().await;
        let worker = state.next_id();
        let session = state.session.as_mut()?;

        let page_count = session.document.page_count();
        if index >= page_count {
            warn!("Cannot regenerate page {}: document has {} pages", index + 1, page_count);
            return None;
        }
        let Some(source_text) = session.document.page_text(index) else {
            warn!("Cannot regenerate page {}: no source text", index + 1);
            return None;
        };
        if session.in_flight.contains_key(&index) {
            debug!("Page {} is already being translated", index + 1);
            return None;
        }
        session.in_flight.insert(index, worker);
        session.pages.mark_pending(index);

        let session_id = session.id;
        let document = Arc::clone(&session.document);
        self.inner.publish(&state);
        drop(state);

        info!("Regenerating page {}", index + 1);
        let inner = Arc::clone(&self.inner);
        Some(self.inner.supervise(session_id, worker, async move {
            inner
                .translate_page(session_id, document.as_ref(), index, &source_text)
                .await;
        }))
    }

    /// Throw away every cached and in-memory page and translate from scratch.
    pub async fn reset(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = self.inner.state.lock().await;
            let id = state.next_id();
            let session = state.session.as_mut()?;
            session.id = id;
            session.active_run = None;
            session.pages.clear();
            session.in_flight.clear();

            let name = session.document.name().to_string();
            if let Err(e) = self.inner.cache.clear(&name).await {
                warn!("Could not delete page cache: {}", e);
            }
            info!("Reset '{}'", name);
            self.inner.publish(&state);
        }
        self.start().await
    }

    /// Same as [`Translator::reset`]: every page is translated again.
    pub async fn regenerate_all(&self) -> Option<JoinHandle<()>> {
        self.reset().await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Snapshots as a `Stream`, starting with the current one.
    pub fn updates(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.subscribe())
    }

    pub fn progress(&self) -> Progress {
        self.inner.snapshot_tx.borrow().progress
    }

    pub fn is_running(&self) -> bool {
        self.inner.snapshot_tx.borrow().is_running
    }

    /// Successful pages in index order.
    pub fn export_pages(&self) -> Vec<PageRecord> {
        self.inner.snapshot_tx.borrow().exportable()
    }
}

impl Inner {
    async fn run(&self, session_id: u64, run: u64, document: Arc<dyn DocumentSource>) {
        let total = document.page_count();
        info!("Run started for '{}' ({} pages)", document.name(), total);
        self.notify(|o| o.on_run_start(total));

        for index in 0..total {
            let Some(source_text) = document.page_text(index) else {
                debug!("Page {}: no source text, skipping", index + 1);
                continue;
            };

            match self.next_step(session_id, run, index).await {
                Step::Stop => break,
                Step::Skip => continue,
                Step::Translate => {}
            }

            self.translate_page(session_id, document.as_ref(), index, &source_text)
                .await;

            if !self.is_current(session_id, run).await {
                break;
            }
            if !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
                if !self.is_current(session_id, run).await {
                    break;
                }
            }
        }

        self.finish_run(session_id, run, total).await;
    }

    /// Decide what to do with `index`, claiming it for `run` on `Translate`.
    async fn next_step(&self, session_id: u64, run: u64, index: usize) -> Step {
        let mut state = self.state.lock().await;
        match state.session.as_mut() {
            Some(s) if s.id == session_id && s.active_run == Some(run) => {
                if s.pages.get(index).is_some_and(PageRecord::is_success) {
                    debug!("Page {}: already translated", index + 1);
                    Step::Skip
                } else if s.in_flight.contains_key(&index) {
                    debug!("Page {}: another worker is translating it", index + 1);
                    Step::Skip
                } else {
                    s.in_flight.insert(index, run);
                    Step::Translate
                }
            }
            _ => Step::Stop,
        }
    }

    async fn is_current(&self, session_id: u64, run: u64) -> bool {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .is_some_and(|s| s.id == session_id && s.active_run == Some(run))
    }

    async fn finish_run(&self, session_id: u64, run: u64, total: usize) {
        let mut state = self.state.lock().await;
        let success_count = match state.session.as_mut() {
            Some(s) if s.id == session_id => {
                if s.active_run == Some(run) {
                    s.active_run = None;
                }
                s.pages.count(PageStatus::Success)
            }
            _ => return,
        };
        self.publish(&state);
        drop(state);

        info!("Run finished: {}/{} pages translated", success_count, total);
        self.notify(|o| o.on_run_complete(total, success_count));
    }

    /// Context → prompt → backend → sanitize → commit, for one page.
    async fn translate_page(
        &self,
        session_id: u64,
        document: &dyn DocumentSource,
        index: usize,
        source_text: &str,
    ) {
        let total = document.page_count();
        let window = self.config.context_window_chars;

        let (prior_source, prior_translation) = match index.checked_sub(1) {
            Some(prev) => (
                document.page_text(prev).unwrap_or_default(),
                self.translated_text(session_id, prev).await.unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };

        let prompt = self.prompts.build(&PageContext {
            page_index: index,
            source_text,
            prior_source_tail: tail(&prior_source, window),
            prior_translation_tail: tail(&prior_translation, window),
        });

        self.notify(|o| o.on_page_start(index, total));
        debug!("Page {}: sending {} byte prompt", index + 1, prompt.len());

        let (record, failure) = match self.backend.translate(index, &prompt).await {
            Ok(raw) => {
                let text = sanitize(&raw);
                if text.is_empty() {
                    warn!("Page {}: response was empty after sanitizing", index + 1);
                }
                (PageRecord::success(index, text), None)
            }
            Err(e) => {
                warn!("{}", e);
                (PageRecord::error(index), Some(e.to_string()))
            }
        };
        let text_len = record.text.len();

        if !self.commit(session_id, record).await {
            return;
        }
        match failure {
            None => self.notify(|o| o.on_page_complete(index, total, text_len)),
            Some(err) => self.notify(|o| o.on_page_error(index, total, &err)),
        }
    }

    /// Stored translation of `index`, only if that page succeeded.
    async fn translated_text(&self, session_id: u64, index: usize) -> Option<String> {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .filter(|s| s.id == session_id)?
            .pages
            .get(index)
            .filter(|r| r.is_success())
            .map(|r| r.text.clone())
    }

    /// Upsert + persist + publish under the state lock, releasing the page's
    /// claim. Returns `false` when the session changed and the record was
    /// dropped.
    async fn commit(&self, session_id: u64, record: PageRecord) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
            debug!("Page {}: discarding result for a replaced session", record.index + 1);
            return false;
        };

        session.in_flight.remove(&record.index);
        session.pages.upsert(record);
        let name = session.document.name().to_string();
        if let Err(e) = self.cache.save(&name, &session.pages).await {
            warn!("Could not persist page cache: {}", e);
        }
        self.publish(&state);
        true
    }

    /// Spawn `work` for `worker`. If it panics, [`Inner::abandon`] releases
    /// what the worker held, and the returned handle still resolves to `Ok`.
    fn supervise(
        self: &Arc<Self>,
        session_id: u64,
        worker: u64,
        work: impl Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let task = tokio::spawn(work);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!("Worker {} panicked: {}", worker, e);
                inner.abandon(session_id, worker).await;
            }
        })
    }

    /// Clear the run id and page claims of a dead worker. Claimed pages are
    /// recorded as failed so they can be retried.
    async fn abandon(&self, session_id: u64, worker: u64) {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.as_mut().filter(|s| s.id == session_id) else {
            return;
        };

        if session.active_run == Some(worker) {
            session.active_run = None;
        }
        let claimed: Vec<usize> = session
            .in_flight
            .iter()
            .filter(|&(_, &owner)| owner == worker)
            .map(|(&index, _)| index)
            .collect();
        for &index in &claimed {
            warn!("Page {}: worker died, marking as failed", index + 1);
            session.in_flight.remove(&index);
            session.pages.upsert(PageRecord::error(index));
        }
        if !claimed.is_empty() {
            let name = session.document.name().to_string();
            if let Err(e) = self.cache.save(&name, &session.pages).await {
                warn!("Could not persist page cache: {}", e);
            }
        }
        self.publish(&state);
    }

    fn publish(&self, state: &State) {
        let snapshot = match &state.session {
            None => SessionSnapshot::default(),
            Some(s) => {
                let page_count = s.document.page_count();
                SessionSnapshot {
                    document_name: Some(s.document.name().to_string()),
                    page_count,
                    pages: s.pages.ordered(),
                    is_running: s.active_run.is_some(),
                    progress: Progress::compute(&s.pages, page_count),
                }
            }
        };
        self.notify(|o| o.on_snapshot(&snapshot));
        self.snapshot_tx.send_replace(snapshot);
    }

    fn notify(&self, f: impl FnOnce(&dyn TranslationObserver)) {
        if let Some(observer) = &self.config.observer {
            f(observer.as_ref());
        }
    }
}
