//! Pipeline behaviour against an in-memory document and a scripted backend.

mod common;

use common::{config, continuity, document, MockBackend};
use edgequake_pdf_translate::{
    assemble, PageCache, PageRecord, PageSeparator, PageStatus, PageStore, SessionSnapshot,
    TextDocument, TranslationConfig, TranslationObserver, Translator,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::task::JoinHandle;

async fn finish(run: Option<JoinHandle<()>>) {
    run.expect("a task should have been spawned").await.unwrap();
}

fn statuses(snapshot: &SessionSnapshot) -> Vec<(usize, PageStatus)> {
    snapshot.pages.iter().map(|r| (r.index, r.status)).collect()
}

#[tokio::test]
async fn failed_page_then_regenerate() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.fail_page(2);
    let translator = Translator::new(config(&dir), backend.clone());

    finish(translator.load(document("drei.pdf", 3)).await).await;

    let snap = translator.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (1, PageStatus::Success), (2, PageStatus::Error)]
    );
    assert_eq!(snap.progress.success_count, 2);
    assert_eq!(snap.progress.error_count, 1);
    assert!((snap.progress.fraction - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(snap.pages[0].text, "Seite 0 Inhalt. (en)");
    assert!(!snap.is_running);

    backend.heal_page(2);
    finish(translator.regenerate_one(2).await).await;

    let snap = translator.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (1, PageStatus::Success), (2, PageStatus::Success)]
    );
    assert_eq!(snap.progress.fraction, 1.0);
    assert_eq!(snap.progress.error_count, 0);
    assert_eq!(backend.calls(), 4);
}

#[tokio::test]
async fn completed_document_is_not_translated_again() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let translator = Translator::new(config(&dir), backend.clone());

    finish(translator.load(document("fertig.pdf", 3)).await).await;
    assert_eq!(backend.calls(), 3);

    finish(translator.start().await).await;
    finish(translator.start().await).await;
    assert_eq!(backend.calls(), 3);

    // A fresh session over the same cache has nothing to do.
    let again = Translator::new(config(&dir), backend.clone());
    assert!(again.load(document("fertig.pdf", 3)).await.is_none());
    assert!(again.snapshot().progress.is_complete());
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn resumed_page_uses_cached_translation_as_context() {
    let dir = TempDir::new().unwrap();
    let cache = PageCache::new(dir.path());
    let cached = PageStore::from_records(
        (0..5).map(|i| PageRecord::success(i, format!("Page {i} in English."))),
    );
    cache.save("buch.pdf", &cached).await.unwrap();

    let backend = MockBackend::new();
    let translator = Translator::new(config(&dir), backend.clone());
    finish(translator.load(document("buch.pdf", 6)).await).await;

    assert_eq!(backend.calls(), 1);
    let prompt = backend.prompt_for(5).unwrap();
    let (prior_source, prior_translation) = continuity(&prompt).unwrap();
    assert_eq!(prior_source, "Seite 4 Inhalt.");
    assert_eq!(prior_translation, "Page 4 in English.");
    assert!(translator.snapshot().progress.is_complete());
}

#[tokio::test]
async fn pages_without_text_are_skipped() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let translator = Translator::new(config(&dir), backend.clone());
    let doc = Arc::new(TextDocument::with_gaps(
        "luecke.pdf",
        vec![Some("Erste Seite.".into()), None, Some("Dritte Seite.".into())],
    ));

    finish(translator.load(doc).await).await;

    let snap = translator.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (2, PageStatus::Success)]
    );
    assert_eq!(backend.calls(), 2);
    // Page 1 has neither source nor translation, so page 2 gets no context.
    assert!(continuity(&backend.prompt_for(2).unwrap()).is_none());

    assert!(translator.regenerate_one(1).await.is_none());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn continuity_context_is_bounded() {
    let dir = TempDir::new().unwrap();
    let config = TranslationConfig::builder()
        .cache_dir(dir.path())
        .request_delay(std::time::Duration::ZERO)
        .context_window_chars(40)
        .build()
        .unwrap();
    let backend = MockBackend::new();
    let translator = Translator::new(config, backend.clone());

    let long = format!("{} Ende des Satzes", "Wörter ".repeat(2000));
    let doc = Arc::new(TextDocument::new("lang.pdf", [long.clone(), "Weiter.".into()]));
    finish(translator.load(doc).await).await;

    let (prior_source, prior_translation) = continuity(&backend.prompt_for(1).unwrap()).unwrap();
    assert_eq!(prior_source.chars().count(), 40);
    assert!(long.ends_with(&prior_source));
    assert_eq!(prior_translation.chars().count(), 40);
    assert!(prior_translation.ends_with("Ende des Satzes (en)"));
}

#[tokio::test]
async fn failure_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.fail_page(0);
    let translator = Translator::new(config(&dir), backend.clone());

    finish(translator.load(document("fehler.pdf", 3)).await).await;

    let snap = translator.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Error), (1, PageStatus::Success), (2, PageStatus::Success)]
    );
    // A failed page contributes its source but no translation.
    let (prior_source, prior_translation) = continuity(&backend.prompt_for(1).unwrap()).unwrap();
    assert_eq!(prior_source, "Seite 0 Inhalt.");
    assert_eq!(prior_translation, "");

    let exported = assemble(&translator.export_pages(), &PageSeparator::None);
    assert_eq!(exported, "Seite 1 Inhalt. (en)\n\nSeite 2 Inhalt. (en)\n");
}

#[tokio::test]
async fn reset_clears_store_and_cache() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.fail_page(1);
    let translator = Translator::new(config(&dir), backend.clone());
    finish(translator.load(document("neu.pdf", 3)).await).await;
    assert_eq!(translator.snapshot().progress.error_count, 1);

    backend.hold();
    let run = translator.reset().await;

    let snap = translator.snapshot();
    assert!(snap.pages.is_empty());
    assert_eq!(snap.progress.fraction, 0.0);
    assert_eq!(snap.progress.error_count, 0);
    assert!(snap.is_running);
    assert!(translator.cache().load("neu.pdf").await.is_none());

    backend.heal_page(1);
    backend.release();
    finish(run).await;
    assert!(translator.snapshot().progress.is_complete());
    assert_eq!(backend.calls(), 6);
}

#[tokio::test]
async fn cancel_stops_before_the_next_page() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.hold();
    let translator = Translator::new(config(&dir), backend.clone());

    let run = translator.load(document("halt.pdf", 3)).await;
    backend.wait_for_calls(1).await;
    assert!(translator.cancel().await);
    assert!(!translator.cancel().await);
    backend.release();
    finish(run).await;

    // The page in flight still lands; nothing after it is requested.
    let snap = translator.snapshot();
    assert_eq!(statuses(&snap), vec![(0, PageStatus::Success)]);
    assert!(!snap.is_running);
    assert_eq!(backend.calls(), 1);

    // Starting again resumes after the finished page.
    finish(translator.start().await).await;
    assert_eq!(backend.calls(), 3);
    assert!(translator.snapshot().progress.is_complete());
}

#[tokio::test]
async fn restart_after_cancel_skips_the_page_in_flight() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.hold();
    let translator = Translator::new(config(&dir), backend.clone());

    let first = translator.load(document("zweimal.pdf", 2)).await;
    backend.wait_for_calls(1).await;
    assert!(translator.cancel().await);

    // Page 0 is still with the cancelled run; the new run moves on to page 1.
    let second = translator.start().await;
    assert!(second.is_some());
    backend.wait_for_calls(2).await;
    backend.release();
    finish(first).await;
    finish(second).await;

    assert_eq!(backend.calls_for(0), 1);
    assert_eq!(backend.calls_for(1), 1);
    assert_eq!(backend.calls(), 2);
    let snap = translator.snapshot();
    assert!(snap.progress.is_complete());
    assert!(!snap.is_running);
}

#[tokio::test]
async fn panicking_worker_releases_the_session() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.panic_on_page(1);
    let translator = Translator::new(config(&dir), backend.clone());

    finish(translator.load(document("absturz.pdf", 3)).await).await;

    let snap = translator.snapshot();
    assert!(!snap.is_running);
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (1, PageStatus::Error)]
    );
    let persisted = translator.cache().load("absturz.pdf").await.unwrap();
    assert_eq!(persisted.ordered(), snap.pages);

    // A regeneration that panics does not keep the page claimed either.
    finish(translator.regenerate_one(1).await).await;
    assert_eq!(statuses(&translator.snapshot())[1], (1, PageStatus::Error));

    backend.heal_page(1);
    finish(translator.start().await).await;
    assert!(translator.snapshot().progress.is_complete());
    assert_eq!(backend.calls_for(1), 3);
    assert_eq!(backend.calls(), 5);
}

#[tokio::test]
async fn cache_write_failure_does_not_block_the_run() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let config = TranslationConfig::builder()
        .cache_dir(blocker.join("pages"))
        .request_delay(std::time::Duration::ZERO)
        .build()
        .unwrap();
    let backend = MockBackend::new();
    backend.fail_page(1);
    let translator = Translator::new(config, backend.clone());

    finish(translator.load(document("schreibschutz.pdf", 3)).await).await;

    let snap = translator.snapshot();
    assert!(!snap.is_running);
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (1, PageStatus::Error), (2, PageStatus::Success)]
    );
    assert!(translator.cache().load("schreibschutz.pdf").await.is_none());

    backend.heal_page(1);
    finish(translator.regenerate_one(1).await).await;
    assert!(translator.snapshot().progress.is_complete());
    assert_eq!(translator.export_pages().len(), 3);
}

#[tokio::test]
async fn reload_keeps_pages_committed_by_the_previous_session() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.hold();
    let translator = Translator::new(config(&dir), backend.clone());

    let first = translator.load(document("erneut.pdf", 2)).await;
    backend.wait_for_calls(1).await;
    let mut rx = translator.subscribe();
    backend.release();
    rx.wait_for(|s| s.pages.first().is_some_and(|r| r.status == PageStatus::Success))
        .await
        .unwrap();

    // Reload while the first run may still be working on page 1.
    let second = translator.load(document("erneut.pdf", 2)).await;
    assert_eq!(
        translator.snapshot().pages.first().map(|r| r.status),
        Some(PageStatus::Success)
    );
    finish(first).await;
    if let Some(run) = second {
        run.await.unwrap();
    }

    assert!(translator.snapshot().progress.is_complete());
    assert_eq!(backend.calls_for(0), 1);
    let persisted = translator.cache().load("erneut.pdf").await.unwrap();
    assert_eq!(persisted.ordered(), translator.snapshot().pages);
}

#[tokio::test]
async fn results_for_a_replaced_session_are_discarded() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.hold();
    let translator = Translator::new(config(&dir), backend.clone());

    let first = translator.load(document("alt.pdf", 2)).await;
    backend.wait_for_calls(1).await;
    let second = translator.load(document("neu.pdf", 2)).await;
    backend.release();
    finish(first).await;
    finish(second).await;

    let snap = translator.snapshot();
    assert_eq!(snap.document_name.as_deref(), Some("neu.pdf"));
    assert!(snap.progress.is_complete());
    assert!(snap.pages.iter().all(|r| r.text.starts_with("Seite")));
    assert!(translator.cache().load("alt.pdf").await.is_none());
}

#[tokio::test]
async fn regeneration_during_a_run_is_serialized() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    backend.hold();
    let translator = Translator::new(config(&dir), backend.clone());

    let run = translator.load(document("parallel.pdf", 3)).await;
    backend.wait_for_calls(1).await;

    let regen = translator.regenerate_one(2).await;
    assert!(regen.is_some());
    assert!(translator.regenerate_one(2).await.is_none());
    // Nothing stored for page 2 yet, so there is no record to mark pending.
    assert!(translator.snapshot().pages.is_empty());

    backend.wait_for_calls(2).await;
    backend.release();
    finish(regen).await;
    finish(run).await;

    assert!(translator.snapshot().progress.is_complete());
    assert_eq!(backend.calls_for(2), 1);
    assert_eq!(backend.calls(), 3);

    let persisted = translator.cache().load("parallel.pdf").await.unwrap();
    assert_eq!(persisted.ordered(), translator.snapshot().pages);
}

#[tokio::test]
async fn cached_pending_and_stale_entries() {
    let dir = TempDir::new().unwrap();
    let cache = PageCache::new(dir.path());
    tokio::fs::create_dir_all(dir.path()).await.unwrap();
    tokio::fs::write(
        cache.path_for("alt.pdf"),
        r#"[
            {"index": 0, "text": "Done.", "status": "success"},
            {"index": 1, "text": "", "status": "loading"},
            {"index": 7, "text": "Gone.", "status": "success"}
        ]"#,
    )
    .await
    .unwrap();

    let backend = MockBackend::new();
    let translator = Translator::new(config(&dir), backend.clone());
    finish(translator.load(document("alt.pdf", 2)).await).await;

    let snap = translator.snapshot();
    assert_eq!(
        statuses(&snap),
        vec![(0, PageStatus::Success), (1, PageStatus::Success)]
    );
    assert_eq!(snap.pages[0].text, "Done.");
    assert_eq!(backend.calls(), 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<bool>>,
}

impl TranslationObserver for Recorder {
    fn on_run_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_complete(&self, index: usize, _total: usize, _len: usize) {
        self.events.lock().unwrap().push(format!("ok {index}"));
    }
    fn on_page_error(&self, index: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {index}"));
    }
    fn on_run_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total}"));
    }
    fn on_snapshot(&self, snapshot: &SessionSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.is_running);
    }
}

#[tokio::test]
async fn observer_and_subscribers_see_every_change() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = TranslationConfig::builder()
        .cache_dir(dir.path())
        .request_delay(std::time::Duration::ZERO)
        .observer(recorder.clone())
        .build()
        .unwrap();
    let backend = MockBackend::new();
    backend.fail_page(1);
    let translator = Translator::new(config, backend.clone());

    let mut rx = translator.subscribe();
    assert_eq!(*rx.borrow_and_update(), SessionSnapshot::default());

    finish(translator.load(document("beobachtet.pdf", 3)).await).await;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 3", "ok 0", "err 1", "ok 2", "done 2/3"]
    );
    let snapshots = recorder.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.first(), Some(&false));
    assert_eq!(snapshots.last(), Some(&false));
    assert!(snapshots.contains(&true));

    assert!(rx.has_changed().unwrap());
    let latest = rx.borrow_and_update().clone();
    assert_eq!(latest, translator.snapshot());
    assert_eq!(latest.progress.success_count, 2);
}
