//! CLI binary for edgequake-pdf-translate.
//!
//! Maps flags to `TranslationConfig`, drives one `Translator` session over
//! the input document and writes the assembled translation.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_translate::{
    assemble, resolve_input, write_export, DocumentSource, PageSeparator, PdfDocument,
    SessionSnapshot, SharedObserver, TranslateError, TranslationConfig, TranslationObserver,
    Translator,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Terminal observer ────────────────────────────────────────────────────────

/// Progress bar plus one log line per finished page.
///
/// The bar position follows published snapshots, so pages restored from the
/// cache are counted from the start.
struct CliObserver {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
    }
}

impl TranslationObserver for CliObserver {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, index: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(format!("page {}", index + 1));
    }

    fn on_page_complete(&self, index: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_page_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}…", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
    }

    fn on_snapshot(&self, snapshot: &SessionSnapshot) {
        let p = snapshot.progress;
        self.bar.set_length(p.page_count as u64);
        self.bar.set_position((p.success_count + p.error_count) as u64);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate to English (stdout)
  pdf-translate bericht.pdf

  # Translate to a file, French, with a glossary
  pdf-translate report.pdf -o report.fr.txt --target-language French \
      --glossary "throughput=débit" --glossary "latency=latence"

  # Resume: run the same command again; finished pages come from the cache

  # Retry pages 4 and 9 after a run
  pdf-translate report.pdf -o report.txt --regenerate 4 --regenerate 9

  # Start over, ignoring the cache
  pdf-translate report.pdf -o report.txt --reset

  # Translate from URL
  pdf-translate https://example.org/paper.pdf -o paper.txt

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  RUST_LOG                Log filter (overrides -v / -q)

CACHE:
  Finished pages are stored as JSON per document name under the cache
  directory (default: <user cache dir>/pdf-translate/pages). Two different
  files with the same name share one cache entry; use --cache-dir or
  --reset to keep them apart.
"#;

/// Translate PDF files and URLs page by page with LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate",
    version,
    about = "Translate PDF files and URLs page by page with LLMs",
    long_about = "Translate PDF documents (local files or URLs) page by page using an LLM. \
Each page is translated with a short excerpt of the previous page for continuity, and every \
finished page is cached so an interrupted run resumes where it stopped.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the translation to this file instead of stdout.
    #[arg(short, long, env = "PDF_TRANSLATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Language to translate into.
    #[arg(long, env = "PDF_TRANSLATE_TARGET_LANGUAGE", default_value = "English")]
    target_language: String,

    /// Subject area, used to frame the prompt.
    #[arg(long, env = "PDF_TRANSLATE_DOMAIN", default_value = "technical and scientific")]
    domain: String,

    /// Fixed term translation, as SOURCE=TARGET. Repeatable.
    #[arg(long = "glossary", value_name = "SRC=DST", value_parser = parse_glossary_term)]
    glossary: Vec<(String, String)>,

    /// Characters of the previous page passed as context.
    #[arg(long, env = "PDF_TRANSLATE_CONTEXT_WINDOW", default_value_t = 350,
          value_parser = clap::value_parser!(u64).range(1..))]
    context_window: u64,

    /// Pause between two page requests, in milliseconds.
    #[arg(long, env = "PDF_TRANSLATE_DELAY_MS", default_value_t = 2000)]
    delay_ms: u64,

    /// Directory holding the page cache.
    #[arg(long, env = "PDF_TRANSLATE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Discard cached pages for this document before translating.
    #[arg(long)]
    reset: bool,

    /// Re-translate page N (1-based) after the run. Repeatable.
    #[arg(long = "regenerate", value_name = "N",
          value_parser = clap::value_parser!(u64).range(1..))]
    regenerate: Vec<u64>,

    /// Page separator in the output: none, hr, comment, or custom string.
    #[arg(long, env = "PDF_TRANSLATE_SEPARATOR", default_value = "none")]
    separator: String,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_TRANSLATE_PASSWORD")]
    password: Option<String>,

    /// Retries per page on LLM failure (at most 10).
    #[arg(long, env = "PDF_TRANSLATE_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(..=10))]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF_TRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_TRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_TRANSLATE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdfium(cli.quiet)?;

    // ── Build config ─────────────────────────────────────────────────────
    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone().map(|o| o as SharedObserver))?;
    let translator = Translator::from_config(config).context("Failed to set up LLM provider")?;

    // ── Open document ────────────────────────────────────────────────────
    let input = resolve_input(&cli.input, cli.download_timeout)
        .await
        .context("Failed to resolve input")?;
    let document = PdfDocument::from_input(&input, cli.password.as_deref())
        .await
        .context("Failed to open PDF")?;
    let page_count = document.page_count();

    if let Some(&page) = cli.regenerate.iter().find(|&&p| p as usize > page_count) {
        return Err(TranslateError::PageOutOfRange {
            page: page as usize,
            total: page_count,
        }
        .into());
    }

    if cli.reset {
        translator
            .cache()
            .clear(input.document_name())
            .await
            .context("Failed to clear page cache")?;
    }

    // ── Translate ────────────────────────────────────────────────────────
    if let Some(run) = translator.load(Arc::new(document)).await {
        wait_or_cancel(&translator, run).await?;
    } else if !cli.quiet {
        eprintln!("{} all {} pages restored from cache", cyan("◆"), page_count);
    }

    for &page in &cli.regenerate {
        if let Some(task) = translator.regenerate_one(page as usize - 1).await {
            wait_or_cancel(&translator, task).await?;
        }
    }

    if let Some(o) = &observer {
        o.bar.finish_and_clear();
    }

    // ── Export ───────────────────────────────────────────────────────────
    let snapshot = translator.snapshot();
    let separator: PageSeparator = cli.separator.parse().unwrap_or_default();
    let text = assemble(&snapshot.pages, &separator);

    if let Some(ref output_path) = cli.output {
        write_export(output_path, &text)
            .await
            .context("Failed to write output")?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
    }

    let p = snapshot.progress;
    if !cli.quiet {
        let mark = if p.error_count == 0 { green("✔") } else { cyan("⚠") };
        let target = cli
            .output
            .as_ref()
            .map(|o| format!("  →  {}", bold(&o.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {}/{} pages translated ({}%){}",
            mark,
            p.success_count,
            p.page_count,
            p.percent(),
            target
        );
    }

    if p.error_count > 0 {
        anyhow::bail!(
            "{} page(s) failed; re-run to retry them or use --regenerate N",
            p.error_count
        );
    }
    Ok(())
}

/// Await a pipeline task; on Ctrl-C, cancel the run and let the page in
/// flight finish so it lands in the cache.
async fn wait_or_cancel(translator: &Translator, mut task: JoinHandle<()>) -> Result<()> {
    tokio::select! {
        joined = &mut task => joined.context("Translation task failed")?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{} interrupted, finishing current page…", cyan("◆"));
            translator.cancel().await;
            task.await.context("Translation task failed")?;
            anyhow::bail!("Interrupted; run the same command again to resume");
        }
    }
    Ok(())
}

/// Download PDFium on first run, with a byte progress bar.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                bar.set_length(t);
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map CLI args to `TranslationConfig`.
fn build_config(cli: &Cli, observer: Option<SharedObserver>) -> Result<TranslationConfig> {
    let mut builder = TranslationConfig::builder()
        .target_language(cli.target_language.as_str())
        .domain(cli.domain.as_str())
        .glossary(cli.glossary.clone())
        .context_window_chars(cli.context_window as usize)
        .request_delay(Duration::from_millis(cli.delay_ms))
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.as_str());
    }
    if let Some(o) = observer {
        builder = builder.observer(o);
    }

    builder.build().context("Invalid configuration")
}

/// Parse one `--glossary SRC=DST` value.
fn parse_glossary_term(s: &str) -> Result<(String, String), String> {
    let (src, dst) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SRC=DST, got '{s}'"))?;
    let (src, dst) = (src.trim(), dst.trim());
    if src.is_empty() || dst.is_empty() {
        return Err(format!("both sides of '{s}' must be non-empty"));
    }
    Ok((src.to_string(), dst.to_string()))
}
