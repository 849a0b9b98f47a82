//! Translation backend: turn a prompt into translated text.
//!
//! The pipeline only sees [`TranslationBackend`]: one prompt in, text or a
//! [`PageError`] out. [`LlmBackend`] is the production implementation on top
//! of an `edgequake-llm` provider; tests plug in scripted backends.
//!
//! ## Retry Strategy
//!
//! Rate-limit and overload errors are transient. The LLM backend retries with
//! exponential backoff (`retry_backoff_ms * 2^attempt`, capped at
//! [`MAX_BACKOFF_MS`]) and bounds every call
//! with `api_timeout_secs`, so from the pipeline's point of view each call
//! always resolves to success or failure.

use crate::config::{TranslationConfig, MAX_RETRIES};
use crate::error::{PageError, TranslateError};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Asynchronous prompt → text translation.
pub trait TranslationBackend: Send + Sync {
    /// Translate one page request.
    ///
    /// * `page` — 0-based page index, used for error reporting only
    fn translate<'a>(&'a self, page: usize, prompt: &'a str)
        -> BoxFuture<'a, Result<String, PageError>>;
}

/// [`TranslationBackend`] backed by an `edgequake-llm` chat provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &TranslationConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries.min(MAX_RETRIES),
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &TranslationConfig) -> Result<Self, TranslateError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    async fn translate_with_retries(&self, page: usize, prompt: &str) -> Result<String, PageError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];
        let mut last_err = PageError::EmptyResponse { page };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page + 1,
                    attempt,
                    self.max_retries,
                    backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(
                self.api_timeout,
                self.provider.chat(&messages, Some(&self.options)),
            )
            .await
            {
                Ok(Ok(response)) if !response.content.trim().is_empty() => {
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page + 1,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Ok(_)) => {
                    warn!("Page {}: attempt {} returned no text", page + 1, attempt + 1);
                    last_err = PageError::EmptyResponse { page };
                }
                Ok(Err(e)) => {
                    warn!("Page {}: attempt {} failed — {}", page + 1, attempt + 1, e);
                    last_err = PageError::BackendFailed {
                        page,
                        retries: attempt,
                        detail: e.to_string(),
                    };
                }
                Err(_) => {
                    warn!(
                        "Page {}: attempt {} timed out after {}s",
                        page + 1,
                        attempt + 1,
                        self.api_timeout.as_secs()
                    );
                    last_err = PageError::Timeout {
                        page,
                        secs: self.api_timeout.as_secs(),
                    };
                }
            }
        }

        Err(last_err)
    }
}

/// Longest single wait between two attempts.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

impl TranslationBackend for LlmBackend {
    fn translate<'a>(
        &'a self,
        page: usize,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, PageError>> {
        Box::pin(self.translate_with_retries(page, prompt))
    }
}

/// Build `CompletionOptions` from the translation config.
fn build_options(config: &TranslationConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &TranslationConfig) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TranslateError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TranslateError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TranslateError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
