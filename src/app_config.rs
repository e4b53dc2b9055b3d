use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::Path;

use crate::errors::TranslationError;
use crate::language_utils;
use crate::settings::{SettingsStore, keys};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO), or "auto"
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Google Cloud Translation v2
    Google,
    // @provider: OpenAI chat completions
    OpenAI,
    // @provider: DeepSeek (OpenAI-compatible)
    DeepSeek,
    // @provider: Ollama
    #[default]
    Ollama,
}

impl TranslationProvider {
    /// All providers in menu order
    pub const ALL: [TranslationProvider; 4] = [
        TranslationProvider::Google,
        TranslationProvider::OpenAI,
        TranslationProvider::DeepSeek,
        TranslationProvider::Ollama,
    ];

    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Google => "Google Translate",
            Self::OpenAI => "OpenAI",
            Self::DeepSeek => "DeepSeek",
            Self::Ollama => "Ollama",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Google => "google".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::DeepSeek => "deepseek".to_string(),
            Self::Ollama => "ollama".to_string(),
        }
    }

    /// Whether the provider needs an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "google translate" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAI),
            "deepseek" => Ok(Self::DeepSeek),
            "ollama" => Ok(Self::Ollama),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_provider_timeout_secs(provider_type),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Number of texts per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retries per batch after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for chat providers (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Extra instructions appended to every prompt
    #[serde(default)]
    pub instructions: String,

    /// Single-text prompt template
    /// Placeholders: {text}, {target_lang}, {source_lang}, {instructions}
    #[serde(default = "default_single_prompt")]
    pub single_prompt: String,

    /// Batch prompt template
    /// Placeholders: {texts}, {batch_size}, {target_lang}, {source_lang}, {instructions}
    #[serde(default = "default_batch_prompt")]
    pub batch_prompt: String,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
            instructions: String::new(),
            single_prompt: default_single_prompt(),
            batch_prompt: default_batch_prompt(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    language_utils::AUTO_DETECT.to_string()
}

fn default_target_language() -> String {
    "ar".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_provider_timeout_secs(provider: TranslationProvider) -> u64 {
    match provider {
        // Local models are slow on the first call while they load
        TranslationProvider::Ollama => 60,
        _ => default_timeout_secs(),
    }
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Google => "https://translation.googleapis.com".to_string(),
        TranslationProvider::OpenAI => "https://api.openai.com/v1".to_string(),
        TranslationProvider::DeepSeek => "https://api.deepseek.com/v1".to_string(),
        TranslationProvider::Ollama => "http://localhost:11434".to_string(),
    }
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Google => String::new(),
        TranslationProvider::OpenAI => "gpt-3.5-turbo".to_string(),
        TranslationProvider::DeepSeek => "deepseek-chat".to_string(),
        TranslationProvider::Ollama => "aya".to_string(),
    }
}

fn default_single_prompt() -> String {
    crate::translation::prompts::DEFAULT_SINGLE_PROMPT.to_string()
}

fn default_batch_prompt() -> String {
    crate::translation::prompts::DEFAULT_BATCH_PROMPT.to_string()
}

impl Config {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Build a configuration from persisted settings on top of the defaults
    pub fn from_settings(settings: &dyn SettingsStore) -> Self {
        let mut config = Config::default();
        config.apply_settings(settings);
        config
    }

    /// Overlay persisted settings onto this configuration
    pub fn apply_settings(&mut self, settings: &dyn SettingsStore) {
        let translation = &mut self.translation;

        let google = translation.provider_config_mut(TranslationProvider::Google);
        google.api_key = settings.get_or(keys::GOOGLE_API_KEY, &google.api_key);

        let openai = translation.provider_config_mut(TranslationProvider::OpenAI);
        openai.api_key = settings.get_or(keys::OPENAI_API_KEY, &openai.api_key);
        openai.model = settings.get_or(keys::OPENAI_MODEL, &openai.model);

        let deepseek = translation.provider_config_mut(TranslationProvider::DeepSeek);
        deepseek.api_key = settings.get_or(keys::DEEPSEEK_API_KEY, &deepseek.api_key);
        deepseek.model = settings.get_or(keys::DEEPSEEK_MODEL, &deepseek.model);

        let ollama = translation.provider_config_mut(TranslationProvider::Ollama);
        ollama.endpoint = settings.get_or(keys::OLLAMA_URL, &ollama.endpoint);
        ollama.model = settings.get_or(keys::OLLAMA_MODEL, &ollama.model);

        let common = &mut translation.common;
        common.batch_size = settings.get_usize_or(keys::OLLAMA_BATCH_SIZE, common.batch_size);
        common.single_prompt = settings.get_or(keys::TRANSLATION_PROMPT, &common.single_prompt);
        common.batch_prompt =
            settings.get_or(keys::BATCH_TRANSLATION_PROMPT, &common.batch_prompt);
    }

    /// Write the settings-backed values back to the store
    pub fn store_settings(&self, settings: &dyn SettingsStore) -> Result<()> {
        let translation = &self.translation;
        let value = |provider: TranslationProvider| {
            translation
                .get_provider_config(&provider)
                .cloned()
                .unwrap_or_else(|| ProviderConfig::new(provider))
        };
        let google = value(TranslationProvider::Google);
        let openai = value(TranslationProvider::OpenAI);
        let deepseek = value(TranslationProvider::DeepSeek);
        let ollama = value(TranslationProvider::Ollama);

        let pairs = [
            (keys::GOOGLE_API_KEY, google.api_key),
            (keys::OPENAI_API_KEY, openai.api_key),
            (keys::OPENAI_MODEL, openai.model),
            (keys::DEEPSEEK_API_KEY, deepseek.api_key),
            (keys::DEEPSEEK_MODEL, deepseek.model),
            (keys::OLLAMA_URL, ollama.endpoint),
            (keys::OLLAMA_MODEL, ollama.model),
            (keys::OLLAMA_BATCH_SIZE, translation.common.batch_size.to_string()),
            (keys::TRANSLATION_PROMPT, translation.common.single_prompt.clone()),
            (keys::BATCH_TRANSLATION_PROMPT, translation.common.batch_prompt.clone()),
        ];
        for (key, value) in pairs {
            settings
                .set(key, &value)
                .map_err(|e| anyhow!("Failed to store setting {}: {}", key, e))?;
        }
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), TranslationError> {
        language_utils::validate_source_language(&self.source_language).map_err(|e| {
            TranslationError::Configuration(format!("source language: {}", e))
        })?;
        language_utils::validate_language_code(&self.target_language).map_err(|e| {
            TranslationError::Configuration(format!("target language: {}", e))
        })?;

        if self.translation.common.batch_size == 0 {
            return Err(TranslationError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }

        let provider = self.translation.provider;
        if provider.requires_api_key() && self.translation.get_api_key().trim().is_empty() {
            return Err(TranslationError::Configuration(format!(
                "Translation API key is required for {} provider",
                provider.display_name()
            )));
        }

        let endpoint = self.translation.get_endpoint();
        url::Url::parse(&endpoint).map_err(|e| {
            TranslationError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;

        Ok(())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Mutable provider configuration, created with defaults if missing
    pub fn provider_config_mut(&mut self, provider_type: TranslationProvider) -> &mut ProviderConfig {
        let provider_str = provider_type.to_lowercase_string();
        let pos = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(pos) => pos,
            None => {
                self.available_providers.push(ProviderConfig::new(provider_type));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[pos]
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }
        default_model(self.provider)
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }
        default_endpoint(self.provider)
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        match self.get_active_provider_config() {
            Some(provider_config) if provider_config.timeout_secs > 0 => provider_config.timeout_secs,
            _ => default_provider_timeout_secs(self.provider),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: TranslationProvider::ALL
                .iter()
                .map(|p| ProviderConfig::new(*p))
                .collect(),
            common: TranslationCommonConfig::default(),
        }
    }
}
