/*!
 * Prompt templates for attribute translation.
 *
 * Templates use `{name}` placeholders. Substitution is a single pass, so
 * placeholder-like text inside the substituted values is left alone.
 */

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder pattern"));

/// Prompt template with `{placeholder}` substitution.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Single-text prompt used by the chat providers.
    pub const SINGLE_TEXT: &'static str = "Translate this text to {target_lang}.

Text: {text}

Rules:
1. Return ONLY the translation
2. Do not add any explanations or notes
3. Maintain the same format (keep numbers, punctuation, etc.)";

    /// Numbered batch prompt used by the local model provider.
    pub const BATCH: &'static str = "Human: Translate these {batch_size} numbered texts to {target_lang}.

Input texts:
{texts}

Rules:
1. Return translations as a Python list with EXACTLY {batch_size} items
2. Keep translations in the SAME ORDER as input numbers
3. Include ONLY the translations, no numbers or original text
4. Each translation should be on a single line
5. Do not add any explanations
6. Count your translations before returning

Example format:
['الترجمة الأولى', 'الترجمة الثانية', 'الترجمة الثالثة']";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// The default single-text template.
    pub fn single_text() -> Self {
        Self::new(Self::SINGLE_TEXT)
    }

    /// The default batch template.
    pub fn batch() -> Self {
        Self::new(Self::BATCH)
    }

    /// Raw template text
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Whether the template references a placeholder
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.template.contains(&format!("{{{}}}", name))
    }

    /// Render the template. Unknown placeholders are kept verbatim.
    pub fn render(&self, vars: &PromptVars) -> String {
        let values = vars.as_map();
        let mut rendered = PLACEHOLDER
            .replace_all(&self.template, |caps: &Captures| {
                values
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();

        let instructions = vars.instructions.trim();
        if !instructions.is_empty() && !self.has_placeholder("instructions") {
            rendered.push_str("\n\nAdditional instructions: ");
            rendered.push_str(instructions);
        }
        rendered
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::batch()
    }
}

/// Values available to a template
#[derive(Debug, Clone, Default)]
pub struct PromptVars {
    pub text: String,
    pub texts: String,
    pub batch_size: usize,
    pub target_lang: String,
    pub source_lang: String,
    pub instructions: String,
}

impl PromptVars {
    fn as_map(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("text", self.text.clone()),
            ("texts", self.texts.clone()),
            ("batch_size", self.batch_size.to_string()),
            ("target_lang", self.target_lang.clone()),
            ("source_lang", self.source_lang.clone()),
            ("instructions", self.instructions.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_batch_shouldFillAllPlaceholders() {
        let vars = PromptVars {
            texts: "1. Road\n2. River".to_string(),
            batch_size: 2,
            target_lang: "Arabic".to_string(),
            ..Default::default()
        };
        let prompt = PromptTemplate::batch().render(&vars);
        assert!(prompt.starts_with("Human: Translate these 2 numbered texts to Arabic."));
        assert!(prompt.contains("1. Road\n2. River"));
        assert!(prompt.contains("EXACTLY 2 items"));
        assert!(!prompt.contains("{batch_size}"));
    }

    #[test]
    fn test_render_shouldNotExpandPlaceholdersInsideValues() {
        let vars = PromptVars {
            text: "literal {target_lang}".to_string(),
            target_lang: "French".to_string(),
            ..Default::default()
        };
        let prompt = PromptTemplate::single_text().render(&vars);
        assert!(prompt.contains("Text: literal {target_lang}"));
    }

    #[test]
    fn test_render_withInstructions_shouldAppendWhenNoPlaceholder() {
        let vars = PromptVars {
            text: "Main St".to_string(),
            target_lang: "Arabic".to_string(),
            instructions: "Keep street numbers in Latin digits".to_string(),
            ..Default::default()
        };
        let prompt = PromptTemplate::single_text().render(&vars);
        assert!(prompt.ends_with("Additional instructions: Keep street numbers in Latin digits"));

        let custom = PromptTemplate::new("{instructions}: {text}").render(&vars);
        assert_eq!(custom, "Keep street numbers in Latin digits: Main St");
    }
}
