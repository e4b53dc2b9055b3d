/*!
 * # attrclean - attribute table cleaning and translation
 *
 * A Rust library for cleaning the attribute tables of vector layers and
 * translating their text fields with external translation services.
 *
 * ## Features
 *
 * - Remove empty or mostly-null columns and normalise null markers
 * - Find and replace values through lookups, regex, literals or zero padding
 * - Translate a field in batches using various providers:
 *   - Google Cloud Translation
 *   - OpenAI and DeepSeek chat completions
 *   - Ollama (local LLM)
 * - Transactional writes: a failed or cancelled run leaves the layer unchanged
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `settings`: Persisted key/value settings
 * - `layer`: Layer store contract, edit sessions, memory and GeoJSON stores
 * - `cleaning`: Column and value cleaning operations
 * - `translation`: Batch translation:
 *   - `translation::backend`: Provider-neutral translation contract
 *   - `translation::batch`: Batching and retries
 *   - `translation::parser`: Response parsing
 *   - `translation::prompts`: Prompt templates
 *   - `translation::task`: The transactional translation task
 * - `providers`: Client implementations for the translation services:
 *   - `providers::google`: Google Cloud Translation client
 *   - `providers::openai`: OpenAI-compatible client (OpenAI, DeepSeek)
 *   - `providers::ollama`: Ollama API client
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod cleaning;
pub mod errors;
pub mod language_utils;
pub mod layer;
pub mod providers;
pub mod settings;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, CleaningError, LayerError, ProviderError, TransactionError, TranslationError};
pub use language_utils::{get_language_name, validate_language_code};
pub use layer::{EditSession, LayerStore};
pub use translation::{BatchTranslationTask, TaskOptions, TaskReport, TaskState};
