/*!
 * Persisted key/value settings.
 *
 * Settings hold per-provider credentials, model names, endpoint URLs and the
 * batch size between runs. They are read once into a `Config` and never
 * consulted again while a translation runs.
 */

use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::AppError;

/// Settings keys shared with earlier releases
pub mod keys {
    pub const GOOGLE_API_KEY: &str = "clean_data/google_api_key";
    pub const OPENAI_API_KEY: &str = "clean_data/openai_api_key";
    pub const OPENAI_MODEL: &str = "clean_data/openai_model";
    pub const DEEPSEEK_API_KEY: &str = "clean_data/deepseek_api_key";
    pub const DEEPSEEK_MODEL: &str = "clean_data/deepseek_model";
    pub const OLLAMA_URL: &str = "clean_data/ollama_url";
    pub const OLLAMA_MODEL: &str = "clean_data/ollama_model";
    pub const OLLAMA_BATCH_SIZE: &str = "clean_data/ollama_batch_size";
    pub const TRANSLATION_PROMPT: &str = "clean_data/translation_prompt";
    pub const BATCH_TRANSLATION_PROMPT: &str = "clean_data/batch_translation_prompt";
}

/// Key/value settings backend
pub trait SettingsStore: Send + Sync {
    /// Value for a key, `None` when unset
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Remove a key
    fn remove(&self, key: &str) -> Result<(), AppError>;

    /// Value for a key, or `default` when unset or empty
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    /// Numeric value for a key, or `default` when unset or unparseable
    fn get_usize_or(&self, key: &str, default: usize) -> usize {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid value '{}' for setting {}", raw, key);
                default
            }),
            None => default,
        }
    }
}

/// Process-local settings, mainly for tests
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs
    pub fn with_values<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Settings persisted as a flat JSON object, rewritten atomically on every change
#[derive(Debug)]
pub struct JsonSettings {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonSettings {
    /// Open a settings file; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|e| {
                AppError::File(format!("Invalid settings file {}: {}", path.display(), e))
            })?
        } else {
            debug!("Settings file {} not found, starting empty", path.display());
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Default location under the user's configuration directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("attrclean")
            .join("settings.json")
    }

    /// All stored values
    pub fn all(&self) -> BTreeMap<String, String> {
        self.values.read().clone()
    }

    /// Remove every key
    pub fn clear(&self) -> Result<(), AppError> {
        let mut values = self.values.write();
        values.clear();
        self.persist(&values)
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), AppError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, values)
            .map_err(|e| AppError::File(e.to_string()))?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| AppError::File(e.error.to_string()))?;
        Ok(())
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_or_withEmptyValue_shouldReturnDefault() {
        let settings = MemorySettings::with_values([(keys::OLLAMA_MODEL, "  ")]);
        assert_eq!(settings.get_or(keys::OLLAMA_MODEL, "aya"), "aya");
    }

    #[test]
    fn test_get_usize_or_withGarbage_shouldReturnDefault() {
        let settings = MemorySettings::with_values([(keys::OLLAMA_BATCH_SIZE, "ten")]);
        assert_eq!(settings.get_usize_or(keys::OLLAMA_BATCH_SIZE, 10), 10);
        settings.set(keys::OLLAMA_BATCH_SIZE, "25").unwrap();
        assert_eq!(settings.get_usize_or(keys::OLLAMA_BATCH_SIZE, 10), 25);
    }

    #[test]
    fn test_json_settings_shouldSurviveReopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = JsonSettings::open(&path).unwrap();
        settings.set(keys::OPENAI_API_KEY, "sk-test").unwrap();
        settings.set(keys::OLLAMA_URL, "http://gpu-box:11434").unwrap();
        settings.remove(keys::OLLAMA_URL).unwrap();

        let reopened = JsonSettings::open(&path).unwrap();
        assert_eq!(reopened.get(keys::OPENAI_API_KEY).as_deref(), Some("sk-test"));
        assert!(reopened.get(keys::OLLAMA_URL).is_none());
    }
}
