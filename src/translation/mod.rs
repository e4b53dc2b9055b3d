/*!
 * Batch attribute translation.
 *
 * This module translates one text field of a layer into another field
 * using a configured provider. It is split into several submodules:
 *
 * - `backend`: Provider-neutral translation contract and its implementation
 * - `batch`: Order-preserving batching with whole-batch retries
 * - `parser`: Recovery of per-text translations from free-form replies
 * - `prompts`: Prompt templates, numbering, and retry escalation
 * - `task`: The transactional task that writes translations into a layer
 */

// Re-export main types for easier usage
pub use self::backend::{ProviderBackend, TranslateOptions, TranslationBackend};
pub use self::batch::{BatchTranslator, RetryPolicy, TranslationRequest, TranslationResult};
pub use self::parser::parse_translations;
pub use self::prompts::{PromptTemplate, PromptVars};
pub use self::task::{
    BatchTranslationTask, CancellationFlag, LogSink, ProgressSink, TaskOptions, TaskProgress,
    TaskReport, TaskState,
};

// Submodules
pub mod backend;
pub mod batch;
pub mod parser;
pub mod prompts;
pub mod task;
