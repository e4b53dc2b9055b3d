use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, debug, info, log, warn};
use std::path::Path;
use std::sync::Arc;

use crate::app_config::Config;
use crate::cleaning::{self, FindReplaceOptions, FindReplaceReport};
use crate::layer::{AttributeValue, GeoJsonLayer, LayerStore};
use crate::translation::{
    BatchTranslationTask, CancellationFlag, ProgressSink, ProviderBackend, TaskOptions,
    TaskProgress, TaskReport, TaskState, TranslationBackend,
};

// @module: Application controller for layer cleaning and translation

/// Progress sink drawing an indicatif bar
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    // @creates: Hidden until the first progress report sets the length
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} features ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar.set_message("Translating");
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn progress(&self, progress: &TaskProgress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.processed as u64);
        self.bar.set_message(format!("batch {}/{}", progress.batch, progress.batches));
    }

    fn message(&self, level: Level, message: &str) {
        self.bar.suspend(|| log!(level, "{}", message));
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the configured provider into a backend
    pub fn backend(&self) -> Result<ProviderBackend> {
        ProviderBackend::from_config(&self.config)
            .with_context(|| format!("Cannot use provider {}", self.config.translation.provider))
    }

    /// Translate a field of a GeoJSON layer file. Ctrl-C cancels at the
    /// next batch boundary.
    pub async fn translate_file(
        &self,
        layer_path: &Path,
        source_field: &str,
        target_field: &str,
    ) -> Result<TaskReport> {
        let mut layer = GeoJsonLayer::open(layer_path)
            .with_context(|| format!("Failed to open layer {}", layer_path.display()))?;
        let backend = self.backend()?;
        info!(
            "Translating with {} ({}) from {} to {}",
            backend.name(),
            backend.model(),
            self.config.source_language,
            self.config.target_language
        );

        let cancel = CancellationFlag::new();
        let signal_flag = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Cancellation requested, stopping after the current batch");
                signal_flag.cancel();
            }
        });

        let sink = Arc::new(ProgressBarSink::new());
        let report = self
            .translate_layer(&mut layer, &backend, source_field, target_field, cancel, sink.clone())
            .await;
        sink.finish();
        ctrl_c.abort();

        info!(
            "{} in {}",
            report.summary(),
            Self::format_duration(report.elapsed)
        );
        Ok(report)
    }

    /// Run one translation task against any layer store
    pub async fn translate_layer<S: LayerStore + ?Sized>(
        &self,
        store: &mut S,
        backend: &dyn TranslationBackend,
        source_field: &str,
        target_field: &str,
        cancel: CancellationFlag,
        sink: Arc<dyn ProgressSink>,
    ) -> TaskReport {
        let options = TaskOptions::from_config(&self.config, source_field, target_field);
        debug!("Task options: {:?}", options);
        let mut task = BatchTranslationTask::new(backend, options)
            .with_cancellation(cancel)
            .with_progress_sink(sink);
        task.run(store).await
    }

    /// Remove empty or mostly-null columns and optionally normalise null
    /// markers in one field.
    pub fn clean_nulls(
        &self,
        layer_path: &Path,
        threshold: f64,
        null_token: Option<&str>,
        replace_in: Option<(&str, AttributeValue)>,
    ) -> Result<Vec<String>> {
        let mut layer = GeoJsonLayer::open(layer_path)
            .with_context(|| format!("Failed to open layer {}", layer_path.display()))?;

        if let Some((field, replacement)) = replace_in {
            let tokens: Vec<&str> = null_token.into_iter().collect();
            let changed = cleaning::clean_null_values(&mut layer, field, &tokens, replacement)
                .with_context(|| format!("Failed to clean null values in {}", field))?;
            info!("Rewrote {} null values in {}", changed, field);
        }

        let removed = if threshold >= 100.0 && null_token.is_none() {
            cleaning::remove_empty_columns(&mut layer).context("Failed to remove empty columns")?
        } else {
            cleaning::remove_columns_with_null_percentage(&mut layer, threshold, null_token)
                .context("Failed to remove null columns")?
        };
        Ok(removed)
    }

    /// Find and replace values in a field, optionally against a reference layer
    pub fn find_replace(
        &self,
        layer_path: &Path,
        options: &FindReplaceOptions,
        reference_path: Option<&Path>,
    ) -> Result<FindReplaceReport> {
        let mut layer = GeoJsonLayer::open(layer_path)
            .with_context(|| format!("Failed to open layer {}", layer_path.display()))?;
        let reference = reference_path
            .map(|path| {
                GeoJsonLayer::open(path)
                    .with_context(|| format!("Failed to open reference layer {}", path.display()))
            })
            .transpose()?;

        let report = cleaning::find_and_replace(
            &mut layer,
            options,
            reference.as_ref().map(|r| r as &dyn LayerStore),
        )
        .with_context(|| format!("Find and replace on {} failed", options.field))?;
        info!(
            "Replaced {} values in {} ({} unmatched)",
            report.replaced, report.target_field, report.unmatched
        );
        Ok(report)
    }

    /// Models available for the configured provider
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let backend = self.backend()?;
        backend
            .list_models()
            .await
            .map_err(|e| anyhow!("Failed to list {} models: {}", backend.name(), e))
    }

    /// Check that the configured provider answers
    pub async fn test_connection(&self) -> Result<()> {
        let backend = self.backend()?;
        backend
            .test_connection()
            .await
            .map_err(|e| anyhow!("{} connection test failed: {}", backend.name(), e))?;
        info!("{} connection OK", backend.name());
        Ok(())
    }

    /// Whether the report should make the process exit with an error
    pub fn is_failure(report: &TaskReport) -> bool {
        report.state == TaskState::Failed
    }

    // Format duration in a human-readable format (HH:MM:SS)
    pub fn format_duration(duration: std::time::Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
