//! Configuration types for page-by-page translation.
//!
//! All pipeline behaviour is controlled through [`TranslationConfig`], built
//! via its [`TranslationConfigBuilder`]. Keeping every knob in one struct makes
//! it easy to share a config between the pipeline and the backend, and to
//! log it when two runs disagree.

use crate::error::TranslateError;
use crate::progress::SharedObserver;
use crate::prompts::{PromptBuilder, DEFAULT_CONTEXT_WINDOW};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for [`TranslationConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a translation session.
///
/// # Example
/// ```rust
/// use edgequake_pdf_translate::TranslationConfig;
/// use std::time::Duration;
///
/// let config = TranslationConfig::builder()
///     .target_language("Spanish")
///     .domain("medical")
///     .glossary_term("Befund", "finding")
///     .request_delay(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(config.context_window_chars, 350);
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Language every page is translated into. Default: "English".
    pub target_language: String,

    /// Subject area named in the role instruction. Default: "technical and scientific".
    ///
    /// Telling the model which field it is working in is the cheapest way to
    /// get the right register and terminology.
    pub domain: String,

    /// Fixed term substitutions, applied in order. Default: empty.
    pub glossary: Vec<(String, String)>,

    /// Trailing characters of the previous page sent as context. Default: 350.
    ///
    /// Large enough to hold the sentence that straddles the page break,
    /// small enough that the previous page does not dominate the request.
    pub context_window_chars: usize,

    /// Pause after each processed page. Default: 2 s.
    ///
    /// Keeps a sequential run under typical per-minute rate limits.
    pub request_delay: Duration,

    /// Directory holding one cache file per document.
    /// Default: `<platform cache dir>/pdf-translate/pages`.
    pub cache_dir: PathBuf,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries inside the LLM backend before a page is reported failed.
    /// Default: 2, at most [`MAX_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call deadline enforced by the LLM backend, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Receives page and run events.
    pub observer: Option<SharedObserver>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: "English".to_string(),
            domain: "technical and scientific".to_string(),
            glossary: Vec::new(),
            context_window_chars: DEFAULT_CONTEXT_WINDOW,
            request_delay: Duration::from_secs(2),
            cache_dir: default_cache_dir(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            observer: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("target_language", &self.target_language)
            .field("domain", &self.domain)
            .field("glossary", &self.glossary)
            .field("context_window_chars", &self.context_window_chars)
            .field("request_delay", &self.request_delay)
            .field("cache_dir", &self.cache_dir)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn TranslationObserver>"))
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Prompt builder carrying this config's language, domain and glossary.
    pub fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(&self.target_language, &self.domain).with_glossary(self.glossary.clone())
    }
}

/// `<platform cache dir>/pdf-translate/pages`, or the temp dir when the
/// platform has no cache dir.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf-translate")
        .join("pages")
}

/// Builder for [`TranslationConfig`].
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
}

impl TranslationConfigBuilder {
    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = language.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.config.domain = domain.into();
        self
    }

    pub fn glossary(mut self, terms: Vec<(String, String)>) -> Self {
        self.config.glossary = terms;
        self
    }

    pub fn glossary_term(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.glossary.push((from.into(), to.into()));
        self
    }

    pub fn context_window_chars(mut self, n: usize) -> Self {
        self.config.context_window_chars = n;
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.config.request_delay = delay;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranslationConfig, TranslateError> {
        let c = &self.config;
        if c.target_language.trim().is_empty() {
            return Err(TranslateError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        if c.context_window_chars == 0 {
            return Err(TranslateError::InvalidConfig(
                "Context window must be ≥ 1 character".into(),
            ));
        }
        Ok(self.config)
    }
}
