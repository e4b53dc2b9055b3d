/*!
 * Tests for configuration files and persisted settings
 */

use anyhow::Result;

use attrclean::app_config::{Config, TranslationProvider};
use attrclean::settings::{JsonSettings, SettingsStore, keys};

use crate::common::{create_temp_dir, create_test_file};

#[test]
fn test_config_saveThenLoad_shouldKeepProviderChoice() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.translation.provider = TranslationProvider::DeepSeek;
    config.translation.provider_config_mut(TranslationProvider::DeepSeek).api_key = "ds-key".to_string();
    config.target_language = "fr".to_string();
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.translation.provider, TranslationProvider::DeepSeek);
    assert_eq!(loaded.translation.get_api_key(), "ds-key");
    assert_eq!(loaded.target_language, "fr");
    assert!(loaded.validate().is_ok());
    Ok(())
}

#[test]
fn test_config_load_withMalformedJson_shouldFail() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "conf.json", "{ not json")?;
    assert!(Config::load(&path).is_err());
    Ok(())
}

#[test]
fn test_json_settings_storedConfig_shouldReloadFromDisk() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = dir.path().join("nested").join("settings.json");

    let mut config = Config::default();
    config.translation.provider_config_mut(TranslationProvider::Ollama).model = "llama3".to_string();
    config.translation.common.batch_size = 25;
    config.store_settings(&JsonSettings::open(&path)?)?;

    let reopened = JsonSettings::open(&path)?;
    assert_eq!(reopened.get(keys::OLLAMA_BATCH_SIZE).as_deref(), Some("25"));

    let restored = Config::from_settings(&reopened);
    assert_eq!(restored.translation.get_model(), "llama3");
    assert_eq!(restored.translation.common.batch_size, 25);
    Ok(())
}

#[test]
fn test_json_settings_clear_shouldFallBackToDefaults() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = dir.path().join("settings.json");
    let settings = JsonSettings::open(&path)?;
    settings.set(keys::OLLAMA_MODEL, "mistral")?;
    settings.clear()?;

    let config = Config::from_settings(&JsonSettings::open(&path)?);
    assert_eq!(config.translation.get_model(), "aya");
    assert!(settings.all().is_empty());
    Ok(())
}
