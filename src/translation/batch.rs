/*!
 * Batch translation processing.
 *
 * This module splits a request into order-preserving batches and translates
 * each batch with whole-batch retries. A batch that still fails after the
 * last retry comes back as "untranslated" markers rather than an error.
 */

use log::{debug, info, warn};
use std::time::Duration;

use crate::errors::{ParseError, ProviderError, TranslationError};

use super::backend::{TranslateOptions, TranslationBackend};
use super::task::CancellationFlag;

/// Texts to translate plus how to translate them
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    /// Texts in layer order
    pub texts: Vec<String>,
    /// Source language code or "auto"
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Texts per batch
    pub batch_size: usize,
    /// Model override
    pub model: Option<String>,
    /// Prompt template override
    pub prompt_template: Option<String>,
    /// Extra prompt instructions
    pub instructions: String,
}

impl TranslationRequest {
    /// Create a request; `texts` must be non-empty and `batch_size` at least 1
    pub fn new(
        texts: Vec<String>,
        target_lang: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, TranslationError> {
        if texts.is_empty() {
            return Err(TranslationError::Configuration(
                "nothing to translate".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(TranslationError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            texts,
            source_lang: crate::language_utils::AUTO_DETECT.to_string(),
            target_lang: target_lang.into(),
            batch_size,
            model: None,
            prompt_template: None,
            instructions: String::new(),
        })
    }

    pub fn with_source_lang(mut self, source_lang: impl Into<String>) -> Self {
        self.source_lang = source_lang.into();
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Split into `ceil(len / batch_size)` contiguous batches
    pub fn batches(&self) -> Vec<TranslationBatch<'_>> {
        self.texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(i, texts)| TranslationBatch {
                index: i + 1,
                offset: i * self.batch_size,
                texts,
            })
            .collect()
    }

    /// Number of batches the request splits into
    pub fn batch_count(&self) -> usize {
        self.texts.len().div_ceil(self.batch_size)
    }

    /// Backend options for the given retry number
    pub fn options(&self, attempt: u32) -> TranslateOptions {
        TranslateOptions {
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            model: self.model.clone(),
            prompt_template: self.prompt_template.clone(),
            instructions: self.instructions.clone(),
            attempt,
        }
    }
}

/// Contiguous slice of a request
#[derive(Debug, Clone, Copy)]
pub struct TranslationBatch<'a> {
    /// 1-based position
    pub index: usize,
    /// Position of the first text in the request
    pub offset: usize,
    /// Texts of this batch
    pub texts: &'a [String],
}

impl TranslationBatch<'_> {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Outcome of one batch
#[derive(Debug)]
pub struct TranslationResult {
    /// 1-based batch position
    pub batch_index: usize,
    /// One entry per input text, `None` when untranslated
    pub translations: Vec<Option<String>>,
    /// Retries used
    pub retries: u32,
    /// Whether any attempt succeeded
    pub succeeded: bool,
    /// Last failure when the batch did not succeed
    pub last_error: Option<TranslationError>,
}

impl TranslationResult {
    /// Number of entries that came back translated
    pub fn translated_count(&self) -> usize {
        self.translations.iter().filter(|t| t.is_some()).count()
    }
}

/// Whole-batch retry settings
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base backoff, doubled per retry
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Parse failures keep their own variant so reports can tell them apart
fn batch_error(error: ProviderError) -> TranslationError {
    match error {
        ProviderError::Unparseable(parse) => TranslationError::Parse(parse),
        other => TranslationError::AdapterCall(other),
    }
}

/// Batch translator driving a backend with retries
pub struct BatchTranslator<'a> {
    /// The backend to use
    backend: &'a dyn TranslationBackend,
    /// Retry settings
    policy: RetryPolicy,
    /// Stops further retries once set
    cancel: Option<CancellationFlag>,
}

impl<'a> BatchTranslator<'a> {
    /// Create a new batch translator
    pub fn new(backend: &'a dyn TranslationBackend, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            cancel: None,
        }
    }

    /// Skip remaining retries once `flag` is set
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled)
    }

    /// Translate one batch, retrying the whole batch on failure, on a count
    /// mismatch, or when nothing came back translated.
    pub async fn translate_batch(
        &self,
        request: &TranslationRequest,
        batch: TranslationBatch<'_>,
    ) -> TranslationResult {
        let mut last_error = None;
        let mut retries = 0;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                if self.cancelled() {
                    debug!("Batch {}: cancelled, skipping retry {}", batch.index, attempt);
                    break;
                }
                let delay = self.policy.delay(attempt);
                warn!(
                    "Retry {}/{} for batch {} in {:?}",
                    attempt, self.policy.max_retries, batch.index, delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                retries = attempt;
            }

            let options = request.options(attempt);
            match self.backend.translate(batch.texts, &options).await {
                Ok(translations) if translations.len() != batch.len() => {
                    let error = TranslationError::Parse(ParseError::Insufficient {
                        expected: batch.len(),
                        found: translations.len(),
                    });
                    warn!("Batch {}: {}", batch.index, error);
                    last_error = Some(error);
                }
                Ok(translations) if translations.iter().all(Option::is_none) => {
                    warn!("Batch {}: no text came back translated", batch.index);
                    last_error = Some(TranslationError::AdapterCall(ProviderError::ParseError(
                        "no text came back translated".to_string(),
                    )));
                }
                Ok(translations) => {
                    debug!(
                        "Batch {} translated by {} after {} retries",
                        batch.index,
                        self.backend.name(),
                        attempt
                    );
                    return TranslationResult {
                        batch_index: batch.index,
                        translations,
                        retries: attempt,
                        succeeded: true,
                        last_error: None,
                    };
                }
                Err(e) => {
                    warn!("Batch {} failed: {}", batch.index, e);
                    last_error = Some(batch_error(e));
                }
            }
        }

        TranslationResult {
            batch_index: batch.index,
            translations: vec![None; batch.len()],
            retries,
            succeeded: false,
            last_error,
        }
    }

    /// Translate a whole request batch by batch, in order
    pub async fn translate_request(&self, request: &TranslationRequest) -> Vec<TranslationResult> {
        let batches = request.batches();
        let total = batches.len();
        let mut results = Vec::with_capacity(total);
        for batch in batches {
            info!("Translating batch {}/{} ({} texts)", batch.index, total, batch.len());
            results.push(self.translate_batch(request, batch).await);
        }
        results
    }
}
