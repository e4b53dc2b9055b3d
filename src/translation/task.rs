/*!
 * Batch translation task.
 *
 * Translates one source field of a layer into a target field:
 * Preparing → Running → Committing → Succeeded | Failed, with Cancelled
 * reachable at any batch boundary. All values are written into a single
 * edit session that is committed once at the end, so a failed or cancelled
 * run leaves the layer as it was.
 */

use log::{Level, debug, error, info, log, warn};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::app_config::Config;
use crate::errors::{LayerError, TransactionError, TranslationError};
use crate::layer::{AttributeValue, EditSession, FeatureFilter, FeatureId, Field, LayerStore};

use super::backend::TranslationBackend;
use super::batch::{BatchTranslator, RetryPolicy, TranslationRequest};

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Preparing,
    Running,
    Committing,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether the task has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Running => "running",
            Self::Committing => "committing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Cooperative cancellation signal, cheap to clone and share
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress after a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskProgress {
    /// 1-based batch just finished
    pub batch: usize,
    /// Number of batches
    pub batches: usize,
    /// Features processed so far, translated or not
    pub processed: usize,
    /// Features translated so far
    pub translated: usize,
    /// Features selected for translation
    pub total: usize,
}

impl TaskProgress {
    /// Processed share in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Receiver of progress and user-facing messages
pub trait ProgressSink: Send + Sync {
    /// Called after every batch
    fn progress(&self, progress: &TaskProgress);

    /// A message worth showing to the user
    fn message(&self, level: Level, message: &str) {
        log!(level, "{}", message);
    }
}

/// Sink that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn progress(&self, progress: &TaskProgress) {
        info!(
            "Translated {}/{} features ({:.0}%)",
            progress.translated,
            progress.total,
            progress.fraction() * 100.0
        );
    }
}

/// What to translate and how
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Field holding the text to translate
    pub source_field: String,
    /// Field receiving translations, created as a string field if absent
    pub target_field: String,
    /// Source language code or "auto"
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Texts per batch
    pub batch_size: usize,
    /// Whole-batch retry settings
    pub retry: RetryPolicy,
    /// Model override
    pub model: Option<String>,
    /// Prompt template override
    pub prompt_template: Option<String>,
    /// Extra prompt instructions
    pub instructions: String,
}

impl TaskOptions {
    /// Options with the default batch and retry settings
    pub fn new(source_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            source_lang: crate::language_utils::AUTO_DETECT.to_string(),
            target_lang: "ar".to_string(),
            batch_size: 10,
            retry: RetryPolicy::default(),
            model: None,
            prompt_template: None,
            instructions: String::new(),
        }
    }

    /// Options taken from the configuration
    pub fn from_config(
        config: &Config,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        let common = &config.translation.common;
        Self {
            source_lang: config.source_language.clone(),
            target_lang: config.target_language.clone(),
            batch_size: common.batch_size,
            retry: RetryPolicy {
                max_retries: common.max_retries,
                backoff_ms: common.retry_backoff_ms,
            },
            instructions: common.instructions.clone(),
            ..Self::new(source_field, target_field)
        }
    }

    fn validate(&self) -> Result<(), TranslationError> {
        if self.source_field.trim().is_empty() || self.target_field.trim().is_empty() {
            return Err(TranslationError::Configuration(
                "source and target fields are required".to_string(),
            ));
        }
        if self.source_field == self.target_field {
            return Err(TranslationError::Configuration(format!(
                "target field '{}' must differ from the source field",
                self.target_field
            )));
        }
        if self.batch_size == 0 {
            return Err(TranslationError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FeatureValue {
    id: FeatureId,
    source_text: String,
    original_target: AttributeValue,
    target_written: bool,
}

/// Features selected for translation, in store order
#[derive(Debug, Clone, Default)]
pub struct FeatureValueMap {
    entries: Vec<FeatureValue>,
}

impl FeatureValueMap {
    /// Select features with a non-blank source and a blank target
    pub fn snapshot<S: LayerStore + ?Sized>(store: &S, source_field: &str, target_field: &str) -> Self {
        let entries = store
            .get_features(&FeatureFilter::All)
            .into_iter()
            .filter_map(|feature| {
                let source = feature.get(source_field);
                let target = feature.get(target_field);
                if source.is_null_or_blank() || !target.is_null_or_blank() {
                    return None;
                }
                // Every non-null value has a text form
                let Some(source_text) = source.as_text() else {
                    warn!("Feature {} has no text in '{}', not selected", feature.id, source_field);
                    return None;
                };
                Some(FeatureValue {
                    id: feature.id,
                    source_text: source_text.trim().to_string(),
                    original_target: target.clone(),
                    target_written: false,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selected feature ids
    pub fn ids(&self) -> Vec<FeatureId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Source texts, one per selected feature
    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.source_text.clone()).collect()
    }

    /// Number of features whose target has been written
    pub fn written_count(&self) -> usize {
        self.entries.iter().filter(|e| e.target_written).count()
    }

    fn id_at(&self, pos: usize) -> Option<FeatureId> {
        self.entries.get(pos).map(|e| e.id)
    }

    fn mark_written(&mut self, pos: usize) {
        if let Some(entry) = self.entries.get_mut(pos) {
            entry.target_written = true;
        }
    }

    fn written(&self) -> impl Iterator<Item = (FeatureId, &AttributeValue)> {
        self.entries
            .iter()
            .filter(|e| e.target_written)
            .map(|e| (e.id, &e.original_target))
    }
}

/// Per-batch record in the report
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// 1-based batch position
    pub index: usize,
    /// Texts in the batch
    pub size: usize,
    /// Retries used
    pub retries: u32,
    /// Texts that came back translated
    pub translated: usize,
    /// Whether any attempt succeeded
    pub succeeded: bool,
}

/// Result of a task run
#[derive(Debug)]
pub struct TaskReport {
    /// Identifier used in log lines
    pub run_id: Uuid,
    /// Final state
    pub state: TaskState,
    /// Features selected for translation
    pub total_features: usize,
    /// Values persisted by the commit
    pub translated_count: usize,
    /// Features left untranslated
    pub skipped: Vec<FeatureId>,
    /// One entry per processed batch
    pub batches: Vec<BatchOutcome>,
    /// Wall time of the run
    pub elapsed: Duration,
    /// Failure reason for Failed and Cancelled runs
    pub error: Option<TranslationError>,
}

impl TaskReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: TaskState::Preparing,
            total_features: 0,
            translated_count: 0,
            skipped: Vec::new(),
            batches: Vec::new(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// Retries recorded for a batch
    pub fn retries_for(&self, batch_index: usize) -> Option<u32> {
        self.batches.iter().find(|b| b.index == batch_index).map(|b| b.retries)
    }

    /// One-line outcome for the user
    pub fn summary(&self) -> String {
        match self.state {
            TaskState::Succeeded if self.skipped.is_empty() => format!(
                "Successfully translated {} out of {} features",
                self.translated_count, self.total_features
            ),
            TaskState::Succeeded => format!(
                "Translated {} out of {} features, {} skipped",
                self.translated_count,
                self.total_features,
                self.skipped.len()
            ),
            TaskState::Cancelled => "Translation was cancelled".to_string(),
            _ => match &self.error {
                Some(e) => format!("Translation failed: {}", e),
                None => format!("Translation ended in state {}", self.state),
            },
        }
    }

    /// The report on success, the failure reason otherwise
    pub fn into_result(self) -> Result<Self, TranslationError> {
        match self.state {
            TaskState::Succeeded => Ok(self),
            TaskState::Cancelled => Err(TranslationError::Cancelled),
            _ => Err(self.error.unwrap_or_else(|| {
                TranslationError::Configuration(format!("task ended in state {}", self.state))
            })),
        }
    }
}

/// Translates one field of a layer store in batches
pub struct BatchTranslationTask<'a> {
    backend: &'a dyn TranslationBackend,
    options: TaskOptions,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationFlag,
    state: TaskState,
    run_id: Uuid,
}

impl<'a> BatchTranslationTask<'a> {
    /// Create a task that logs its progress
    pub fn new(backend: &'a dyn TranslationBackend, options: TaskOptions) -> Self {
        Self {
            backend,
            options,
            sink: Arc::new(LogSink),
            cancel: CancellationFlag::new(),
            state: TaskState::Preparing,
            run_id: Uuid::new_v4(),
        }
    }

    /// Report progress to `sink`
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Flag that cancels this task when set
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run the task to completion against `store`
    pub async fn run<S: LayerStore + ?Sized>(&mut self, store: &mut S) -> TaskReport {
        let started = Instant::now();
        let mut report = TaskReport::new(self.run_id);
        let mut created_field = false;

        info!(
            "[{}] Translating '{}' into '{}' on layer '{}' with {}",
            self.run_id,
            self.options.source_field,
            self.options.target_field,
            store.name(),
            self.backend.name()
        );

        let result = self.execute(store, &mut report, &mut created_field).await;

        match result {
            Ok(()) => {
                self.state = TaskState::Succeeded;
            }
            Err(e) => {
                self.state = if matches!(e, TranslationError::Cancelled) {
                    TaskState::Cancelled
                } else {
                    TaskState::Failed
                };
                report.translated_count = 0;
                if created_field {
                    self.remove_created_field(store);
                }
                report.error = Some(e);
            }
        }

        report.state = self.state;
        report.elapsed = started.elapsed();

        let level = match self.state {
            TaskState::Succeeded if report.skipped.is_empty() => Level::Info,
            TaskState::Succeeded | TaskState::Cancelled => Level::Warn,
            _ => Level::Error,
        };
        self.sink.message(level, &report.summary());
        info!("[{}] Finished in {:?} ({})", self.run_id, report.elapsed, self.state);
        report
    }

    async fn execute<S: LayerStore + ?Sized>(
        &mut self,
        store: &mut S,
        report: &mut TaskReport,
        created_field: &mut bool,
    ) -> Result<(), TranslationError> {
        self.state = TaskState::Preparing;
        self.options.validate()?;

        let source_field = self.options.source_field.clone();
        let target_field = self.options.target_field.clone();

        if store.field(&source_field).is_none() {
            return Err(LayerError::FieldNotFound(source_field).into());
        }
        let features_before = store.feature_count();

        if store.field(&target_field).is_none() {
            store.add_field(Field::string(target_field.as_str()))?;
            *created_field = true;
            info!("[{}] Created target field '{}'", self.run_id, target_field);
        }

        let mut values = FeatureValueMap::snapshot(&*store, &source_field, &target_field);
        report.total_features = values.len();
        if values.is_empty() {
            self.sink.message(Level::Info, "No features need translation");
            return Ok(());
        }
        self.sink.message(
            Level::Info,
            &format!("Starting translation of {} features...", values.len()),
        );

        if self.cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        let request = TranslationRequest::new(values.texts(), self.options.target_lang.clone(), self.options.batch_size)?
            .with_source_lang(self.options.source_lang.clone())
            .with_model(self.options.model.clone())
            .with_prompt_template(self.options.prompt_template.clone())
            .with_instructions(self.options.instructions.clone());
        let translator = BatchTranslator::new(self.backend, self.options.retry)
            .with_cancellation(self.cancel.clone());

        self.state = TaskState::Running;
        let batches = request.batches();
        let batch_count = batches.len();
        let mut processed = 0;
        let mut translated = 0;
        let mut session = EditSession::begin(store)?;

        for batch in batches {
            if self.cancel.is_cancelled() {
                session.rollback();
                return Err(TranslationError::Cancelled);
            }

            let result = translator.translate_batch(&request, batch).await;

            // The in-flight result is discarded on cancellation
            if self.cancel.is_cancelled() {
                session.rollback();
                return Err(TranslationError::Cancelled);
            }

            for (i, translation) in result.translations.iter().enumerate() {
                let pos = batch.offset + i;
                let Some(id) = values.id_at(pos) else { continue };
                match translation {
                    Some(text) => {
                        session.set(id, &target_field, text.as_str())?;
                        values.mark_written(pos);
                        translated += 1;
                    }
                    None => report.skipped.push(id),
                }
            }
            processed += batch.len();

            if result.succeeded {
                debug!(
                    "[{}] Batch {}/{} done, {} of {} translated",
                    self.run_id,
                    batch.index,
                    batch_count,
                    result.translated_count(),
                    batch.len()
                );
            } else {
                warn!(
                    "[{}] Batch {}/{} failed after {} retries: {}. Continuing with next batch",
                    self.run_id,
                    batch.index,
                    batch_count,
                    result.retries,
                    result
                        .last_error
                        .as_ref()
                        .map_or_else(|| "unknown error".to_string(), ToString::to_string)
                );
            }
            report.batches.push(BatchOutcome {
                index: batch.index,
                size: batch.len(),
                retries: result.retries,
                translated: result.translated_count(),
                succeeded: result.succeeded,
            });
            self.sink.progress(&TaskProgress {
                batch: batch.index,
                batches: batch_count,
                processed,
                translated,
                total: values.len(),
            });
        }

        self.state = TaskState::Committing;
        let committed = session.commit()?;
        debug!("[{}] Committed {} values", self.run_id, committed);
        report.translated_count = values.written_count();

        let features_after = store.feature_count();
        if features_after != features_before {
            error!(
                "[{}] Feature count changed from {} to {} across the commit",
                self.run_id, features_before, features_after
            );
            if !*created_field {
                self.restore_targets(store, &values, &target_field);
            }
            return Err(TransactionError::FeatureCountMismatch {
                before: features_before,
                after: features_after,
            }
            .into());
        }

        Ok(())
    }

    /// Reset written targets to their pre-task values
    fn restore_targets<S: LayerStore + ?Sized>(
        &self,
        store: &mut S,
        values: &FeatureValueMap,
        target_field: &str,
    ) {
        let written: Vec<(FeatureId, AttributeValue)> = values
            .written()
            .map(|(id, original)| (id, original.clone()))
            .collect();
        let existing: HashSet<FeatureId> = store
            .get_features(&FeatureFilter::Ids(written.iter().map(|(id, _)| *id).collect()))
            .into_iter()
            .map(|f| f.id)
            .collect();

        let mut session = match EditSession::begin(store) {
            Ok(session) => session,
            Err(e) => {
                error!("[{}] Cannot restore target values: {}", self.run_id, e);
                return;
            }
        };
        for (id, original) in written.into_iter().filter(|(id, _)| existing.contains(id)) {
            if let Err(e) = session.set(id, target_field, original) {
                error!("[{}] Cannot restore feature {}: {}", self.run_id, id, e);
                session.rollback();
                return;
            }
        }
        match session.commit() {
            Ok(n) => warn!("[{}] Restored {} target values", self.run_id, n),
            Err(e) => error!("[{}] Restoring target values failed: {}", self.run_id, e),
        }
    }

    fn remove_created_field<S: LayerStore + ?Sized>(&self, store: &mut S) {
        let target_field = &self.options.target_field;
        match store.delete_field(target_field) {
            Ok(()) => info!("[{}] Removed target field '{}'", self.run_id, target_field),
            Err(e) => warn!(
                "[{}] Could not remove target field '{}': {}",
                self.run_id, target_field, e
            ),
        }
    }
}
