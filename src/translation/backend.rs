/*!
 * Translation backend contract and the provider-backed implementation.
 *
 * A backend takes an ordered slice of texts and returns one entry per text,
 * `None` marking a text it could not translate. `Err` means the whole batch
 * failed and should be retried.
 */

use async_trait::async_trait;
use log::{debug, warn};

use crate::app_config::{Config, TranslationProvider};
use crate::errors::{ParseError, ProviderError, TranslationError};
use crate::language_utils;
use crate::providers::Provider;
use crate::providers::google::{Google, GoogleRequest, MAX_SEGMENTS_PER_REQUEST};
use crate::providers::ollama::{GenerationRequest, Ollama};
use crate::providers::openai::{OpenAI, OpenAIRequest};

use super::parser::parse_translations;
use super::prompts::{self, PromptTemplate, PromptVars};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Source language code or "auto"
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Model override
    pub model: Option<String>,
    /// Prompt template override
    pub prompt_template: Option<String>,
    /// Extra prompt instructions
    pub instructions: String,
    /// Retry number of this call, 0 for the first attempt
    pub attempt: u32,
}

/// Translation contract shared by every provider
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Translate `texts` in order; the result has the same length
    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError>;

    /// Check that the provider is reachable and the credentials work
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Provider client variants
#[derive(Debug)]
enum BackendClient {
    /// Google Cloud Translation
    Google {
        /// Client instance
        client: Google,
    },
    /// OpenAI or DeepSeek chat completions
    Chat {
        /// Client instance
        client: OpenAI,
    },
    /// Ollama local server
    Ollama {
        /// Client instance
        client: Ollama,
    },
}

/// Backend resolved once from configuration
#[derive(Debug)]
pub struct ProviderBackend {
    provider: TranslationProvider,
    model: String,
    temperature: f32,
    single_prompt: PromptTemplate,
    batch_prompt: PromptTemplate,
    client: BackendClient,
}

impl ProviderBackend {
    /// Build the backend for the active provider. Fails before any network
    /// call when the credential or endpoint is missing or invalid.
    pub fn from_config(config: &Config) -> Result<Self, TranslationError> {
        let translation = &config.translation;
        let provider = translation.provider;
        let endpoint = translation.get_endpoint();
        let api_key = translation.get_api_key();
        let timeout_secs = translation.get_timeout_secs();

        if endpoint.trim().is_empty() {
            return Err(TranslationError::Configuration(format!(
                "{} endpoint is not set",
                provider.display_name()
            )));
        }
        url::Url::parse(&endpoint).map_err(|e| {
            TranslationError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;
        if provider.requires_api_key() && api_key.trim().is_empty() {
            return Err(TranslationError::Configuration(format!(
                "{} API key is not set",
                provider.display_name()
            )));
        }

        let model = translation.get_model();
        let client = match provider {
            TranslationProvider::Google => BackendClient::Google {
                client: Google::new(api_key, endpoint, timeout_secs),
            },
            TranslationProvider::OpenAI => BackendClient::Chat {
                client: OpenAI::new(api_key, endpoint, model.clone(), timeout_secs),
            },
            TranslationProvider::DeepSeek => BackendClient::Chat {
                client: OpenAI::deepseek(api_key, endpoint, model.clone(), timeout_secs),
            },
            TranslationProvider::Ollama => BackendClient::Ollama {
                client: Ollama::from_url(endpoint, timeout_secs),
            },
        };

        debug!("Resolved {} backend with model '{}'", provider.display_name(), model);

        Ok(Self {
            provider,
            model,
            temperature: translation.common.temperature,
            single_prompt: PromptTemplate::new(&translation.common.single_prompt),
            batch_prompt: PromptTemplate::new(&translation.common.batch_prompt),
            client,
        })
    }

    /// Provider this backend talks to
    pub fn provider(&self) -> TranslationProvider {
        self.provider
    }

    /// Default model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Installed model names; only Ollama can enumerate its models
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        match &self.client {
            BackendClient::Ollama { client } => Ok(client
                .list_models()
                .await?
                .into_iter()
                .map(|m| m.name)
                .collect()),
            _ => Ok(vec![self.model.clone()]),
        }
    }

    fn model_for<'a>(&'a self, options: &'a TranslateOptions) -> &'a str {
        options
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.model.as_str())
    }

    fn template_for(&self, options: &TranslateOptions, default: &PromptTemplate) -> PromptTemplate {
        match options.prompt_template.as_deref() {
            Some(custom) if !custom.trim().is_empty() => PromptTemplate::new(custom),
            _ => default.clone(),
        }
    }

    async fn translate_google(
        &self,
        client: &Google,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        let target = language_utils::normalize_to_part1_or_part2t(&options.target_lang)
            .unwrap_or_else(|_| options.target_lang.clone());
        let source = if language_utils::is_auto(&options.source_lang) {
            None
        } else {
            Some(
                language_utils::normalize_to_part1_or_part2t(&options.source_lang)
                    .unwrap_or_else(|_| options.source_lang.clone()),
            )
        };

        let mut translated = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_SEGMENTS_PER_REQUEST) {
            let mut request = GoogleRequest::new(chunk.to_vec(), target.clone());
            if let Some(source) = &source {
                request = request.source(source.clone());
            }
            let response = client.translate(request).await?;
            let chunk_translations = Google::extract_translations(&response);
            if chunk_translations.len() != chunk.len() {
                return Err(ParseError::Insufficient {
                    expected: chunk.len(),
                    found: chunk_translations.len(),
                }
                .into());
            }
            translated.extend(chunk_translations.into_iter().map(non_blank));
        }
        Ok(translated)
    }

    async fn translate_chat(
        &self,
        client: &OpenAI,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        let template = self.template_for(options, &self.single_prompt);
        let model = self.model_for(options);
        let mut translated = Vec::with_capacity(texts.len());

        for text in texts {
            let prompt = template.render(&PromptVars {
                text: text.clone(),
                target_lang: language_utils::prompt_language_name(&options.target_lang),
                source_lang: language_utils::prompt_language_name(&options.source_lang),
                instructions: options.instructions.clone(),
                ..Default::default()
            });
            let request = OpenAIRequest::new(model)
                .add_message("user", prompt)
                .temperature(self.temperature);

            match client.complete(request).await {
                Ok(response) => {
                    translated.push(non_blank(OpenAI::extract_text(&response)));
                }
                Err(e) => {
                    warn!("{} failed to translate one text: {}", client.label(), e);
                    translated.push(None);
                }
            }
        }
        Ok(translated)
    }

    async fn translate_ollama(
        &self,
        client: &Ollama,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        let template = self.template_for(options, &self.batch_prompt);
        let prompt = template.render(&PromptVars {
            texts: prompts::number_texts(texts),
            batch_size: texts.len(),
            target_lang: language_utils::prompt_language_name(&options.target_lang),
            source_lang: language_utils::prompt_language_name(&options.source_lang),
            instructions: options.instructions.clone(),
            ..Default::default()
        });
        let prompt = prompts::escalate(&prompt, options.attempt);

        let request = GenerationRequest::new(self.model_for(options), prompt).temperature(self.temperature);
        let response = client.complete(request).await?;
        let reply = Ollama::extract_text(&response);
        debug!(
            "Ollama reply for {} texts ({:?} prompt tokens, {:?} generated): {}",
            texts.len(),
            response.prompt_eval_count,
            response.eval_count,
            reply
        );

        let parsed = parse_translations(&reply, texts.len())?;
        Ok(parsed.into_iter().map(non_blank).collect())
    }
}

/// A blank reply entry is an untranslated entry
fn non_blank(text: String) -> Option<String> {
    if text.trim().is_empty() { None } else { Some(text) }
}

#[async_trait]
impl TranslationBackend for ProviderBackend {
    fn name(&self) -> &str {
        self.provider.display_name()
    }

    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match &self.client {
            BackendClient::Google { client } => self.translate_google(client, texts, options).await,
            BackendClient::Chat { client } => self.translate_chat(client, texts, options).await,
            BackendClient::Ollama { client } => self.translate_ollama(client, texts, options).await,
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.client {
            BackendClient::Google { client } => client.test_connection().await,
            BackendClient::Chat { client } => client.test_connection().await,
            BackendClient::Ollama { client } => client.test_connection().await,
        }
    }
}
