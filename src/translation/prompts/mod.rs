/*!
 * Prompt construction for attribute translation.
 *
 * - `templates`: default templates and placeholder substitution
 * - retry escalation for batch prompts that came back with the wrong count
 */

pub mod templates;

pub use templates::{PromptTemplate, PromptVars};

/// Default single-text template
pub const DEFAULT_SINGLE_PROMPT: &str = PromptTemplate::SINGLE_TEXT;

/// Default batch template
pub const DEFAULT_BATCH_PROMPT: &str = PromptTemplate::BATCH;

/// Banner prepended to escalated prompts
pub const STRICT_MODE_BANNER: &str =
    "STRICT MODE: YOU MUST RETURN EXACTLY THE RIGHT NUMBER OF TRANSLATIONS!";

/// Number texts one per line, starting at 1
pub fn number_texts(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Add emphasis to a rendered batch prompt for retry `attempt` (1-based).
/// Attempt 0 returns the prompt unchanged.
pub fn escalate(prompt: &str, attempt: u32) -> String {
    if attempt == 0 {
        return prompt.to_string();
    }
    let bangs = "!".repeat(attempt as usize);
    let emphasized = prompt
        .replace("Rules:", &format!("Rules{}:", bangs))
        .replace("items", &format!("items{}", bangs));
    format!("{}\n{}", STRICT_MODE_BANNER, emphasized)
}
