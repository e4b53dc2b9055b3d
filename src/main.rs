// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use attrclean::app_config::{self, Config, TranslationProvider};
use attrclean::app_controller::Controller;
use attrclean::cleaning::{DEFAULT_PAD_LENGTH, FindReplaceOptions, ReplaceMode};
use attrclean::layer::AttributeValue;
use attrclean::settings::JsonSettings;
use attrclean::translation::TaskState;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Google,
    #[value(name = "openai")]
    OpenAI,
    #[value(name = "deepseek")]
    DeepSeek,
    Ollama,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Google => TranslationProvider::Google,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::DeepSeek => TranslationProvider::DeepSeek,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate one field of a layer into another field
    Translate(TranslateArgs),

    /// Remove empty or mostly-null columns, optionally rewriting null markers
    CleanNulls(CleanNullsArgs),

    /// Find and replace values in a field
    FindReplace(FindReplaceArgs),

    /// List the models of the configured provider
    Models,

    /// Check that the configured provider answers
    TestConnection,

    /// Show the stored settings, or remove them all with --clear
    Settings {
        /// Remove every stored setting
        #[arg(long)]
        clear: bool,
    },

    /// Generate shell completions for attrclean
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// GeoJSON layer file
    #[arg(value_name = "LAYER")]
    layer: PathBuf,

    /// Field holding the text to translate
    #[arg(long)]
    source_field: String,

    /// Field receiving translations, created if missing
    #[arg(long)]
    target_field: String,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code, or 'auto'
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'ar', 'en', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Texts per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Extra instructions appended to the prompt
    #[arg(long)]
    instructions: Option<String>,
}

#[derive(Args, Debug)]
struct CleanNullsArgs {
    /// GeoJSON layer file
    #[arg(value_name = "LAYER")]
    layer: PathBuf,

    /// Remove columns whose null share is at least this percentage
    #[arg(long, default_value_t = 100.0)]
    threshold: f64,

    /// Extra string counted as null (e.g. 'NULL', '-')
    #[arg(long)]
    null_token: Option<String>,

    /// Field whose null markers are rewritten before columns are removed
    #[arg(long)]
    field: Option<String>,

    /// Replacement for null markers in --field; omitted means a real null
    #[arg(long, requires = "field")]
    replace_with: Option<String>,
}

#[derive(Args, Debug)]
struct FindReplaceArgs {
    /// GeoJSON layer file
    #[arg(value_name = "LAYER")]
    layer: PathBuf,

    /// Field to rewrite
    #[arg(long)]
    field: String,

    /// Reference layer for lookups
    #[arg(long, requires_all = ["find_field", "replace_field"])]
    reference: Option<PathBuf>,

    /// Reference field matched against the values
    #[arg(long, requires = "reference")]
    find_field: Option<String>,

    /// Reference field supplying replacements
    #[arg(long, requires = "reference")]
    replace_field: Option<String>,

    /// Regular expression; with --reference, matching values are looked up by their first number
    #[arg(long)]
    pattern: Option<String>,

    /// Substitution for --pattern without a reference layer
    #[arg(long)]
    replacement: Option<String>,

    /// Exact value to find
    #[arg(long, requires = "replace")]
    find: Option<String>,

    /// Value replacing --find
    #[arg(long)]
    replace: Option<String>,

    /// Ignore leading zeros when looking values up
    #[arg(long)]
    strip_zeros: bool,

    /// Left-pad integer values with zeros
    #[arg(long)]
    pad_zeros: bool,

    /// Width used by --pad-zeros
    #[arg(long, default_value_t = DEFAULT_PAD_LENGTH)]
    pad_length: usize,

    /// Write into a new column (default name FIELD_new)
    #[arg(long, num_args = 0..=1, default_missing_value = "", value_name = "NAME")]
    new_column: Option<String>,
}

/// attrclean - attribute table cleaning and translation
///
/// Cleans the attribute tables of GeoJSON layers and translates text fields
/// with Google Translate, OpenAI, DeepSeek or a local Ollama server.
#[derive(Parser, Debug)]
#[command(name = "attrclean")]
#[command(version)]
#[command(about = "Attribute table cleaning and translation for vector layers")]
#[command(long_about = "attrclean cleans attribute tables and translates text fields of GeoJSON layers.

EXAMPLES:
    attrclean translate roads.geojson --source-field name --target-field name_ar
    attrclean translate roads.geojson --source-field name --target-field name_fr -t fr -p openai
    attrclean clean-nulls parcels.geojson --threshold 90 --null-token NULL
    attrclean find-replace parcels.geojson --field code --pad-zeros --pad-length 4
    attrclean find-replace parcels.geojson --field code --reference codes.geojson --find-field id --replace-field label --strip-zeros
    attrclean models
    attrclean completions bash > attrclean.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically. Values saved in the settings file (API keys,
    models, Ollama URL, prompts) are applied on top of it.

SUPPORTED PROVIDERS:
    google    - Google Cloud Translation (requires API key)
    openai    - OpenAI API (requires API key)
    deepseek  - DeepSeek API (requires API key)
    ollama    - Local Ollama server (default: aya on http://localhost:11434)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Settings file path (defaults to the user configuration directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Store the effective provider settings back into the settings file
    #[arg(long, global = true)]
    save_settings: bool,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through
    // log::set_max_level once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "attrclean", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = load_or_create_config(&cli.config)?;
    let settings_path = cli.settings.clone().unwrap_or_else(JsonSettings::default_path);
    let settings = JsonSettings::open(&settings_path)
        .with_context(|| format!("Failed to open settings file: {}", settings_path.display()))?;
    config.apply_settings(&settings);

    if let Commands::Translate(args) = &cli.command {
        apply_translate_overrides(&mut config, args);
    }
    match &cli.log_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    if cli.save_settings {
        config.store_settings(&settings)?;
        info!("Saved settings to {}", settings_path.display());
    }

    if let Commands::Settings { clear } = &cli.command {
        return run_settings(&settings, &settings_path, *clear);
    }

    let controller = Controller::with_config(config)?;

    match cli.command {
        Commands::Translate(args) => run_translate(&controller, args).await,
        Commands::CleanNulls(args) => run_clean_nulls(&controller, args),
        Commands::FindReplace(args) => run_find_replace(&controller, args),
        Commands::Models => {
            for model in controller.list_models().await? {
                println!("{}", model);
            }
            Ok(())
        }
        Commands::TestConnection => controller.test_connection().await,
        Commands::Settings { .. } | Commands::Completions { .. } => Ok(()),
    }
}

fn run_settings(settings: &JsonSettings, path: &Path, clear: bool) -> Result<()> {
    if clear {
        settings
            .clear()
            .with_context(|| format!("Failed to clear settings in {}", path.display()))?;
        info!("Cleared all settings in {}", path.display());
        return Ok(());
    }

    let values = settings.all();
    if values.is_empty() {
        info!("No settings stored in {}", path.display());
    }
    for (key, value) in values {
        println!("{} = {}", key, display_setting(&key, &value));
    }
    Ok(())
}

// API keys are shown by their last four characters only
fn display_setting(key: &str, value: &str) -> String {
    if !key.ends_with("api_key") || value.is_empty() {
        return value.to_string();
    }
    let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

fn load_or_create_config(path: &Path) -> Result<Config> {
    if path.exists() {
        return Config::load(path);
    }
    warn!("Config file not found at '{}', creating default config.", path.display());
    let config = Config::default();
    config.save(path)?;
    Ok(config)
}

fn apply_translate_overrides(config: &mut Config, args: &TranslateArgs) {
    if let Some(provider) = &args.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &args.model {
        let provider = config.translation.provider;
        config.translation.provider_config_mut(provider).model = model.clone();
    }
    if let Some(source_lang) = &args.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &args.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.translation.common.batch_size = batch_size;
    }
    if let Some(instructions) = &args.instructions {
        config.translation.common.instructions = instructions.clone();
    }
}

async fn run_translate(controller: &Controller, args: TranslateArgs) -> Result<()> {
    let report = controller
        .translate_file(&args.layer, &args.source_field, &args.target_field)
        .await?;

    match report.state {
        TaskState::Failed => Err(anyhow!(report.summary())),
        TaskState::Cancelled => {
            warn!("{}; the layer was left unchanged", report.summary());
            Ok(())
        }
        _ => {
            if !report.skipped.is_empty() {
                warn!("Untranslated feature ids: {:?}", report.skipped);
            }
            Ok(())
        }
    }
}

fn run_clean_nulls(controller: &Controller, args: CleanNullsArgs) -> Result<()> {
    let replace_in = args.field.as_deref().map(|field| {
        let replacement = args
            .replace_with
            .clone()
            .map(AttributeValue::from)
            .unwrap_or_default();
        (field, replacement)
    });
    let removed = controller.clean_nulls(
        &args.layer,
        args.threshold,
        args.null_token.as_deref(),
        replace_in,
    )?;
    if removed.is_empty() {
        info!("No columns removed");
    } else {
        info!("Removed columns: {}", removed.join(", "));
    }
    Ok(())
}

fn run_find_replace(controller: &Controller, args: FindReplaceArgs) -> Result<()> {
    let mode = if args.reference.is_some() {
        ReplaceMode::Lookup {
            find_field: args.find_field.clone().unwrap_or_default(),
            replace_field: args.replace_field.clone().unwrap_or_default(),
            pattern: args.pattern.clone(),
        }
    } else if let Some(pattern) = &args.pattern {
        ReplaceMode::Regex {
            pattern: pattern.clone(),
            replacement: args.replacement.clone().unwrap_or_default(),
        }
    } else if args.pad_zeros {
        ReplaceMode::PadZeros { length: args.pad_length }
    } else if let (Some(find), Some(replace)) = (&args.find, &args.replace) {
        ReplaceMode::Literal {
            find: find.clone(),
            replace: replace.clone(),
        }
    } else {
        return Err(anyhow!(
            "choose one of --reference, --pattern, --pad-zeros or --find/--replace"
        ));
    };

    let options = FindReplaceOptions::new(args.field, mode)
        .strip_zeros(args.strip_zeros)
        .new_column(args.new_column);
    controller.find_replace(&args.layer, &options, args.reference.as_deref())?;
    Ok(())
}
