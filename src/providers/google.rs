use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Provider, error_from_response, http_client};
use crate::errors::ProviderError;

/// Segments accepted by one v2 translate call
pub const MAX_SEGMENTS_PER_REQUEST: usize = 128;

/// Google Cloud Translation v2 client
#[derive(Debug, Clone)]
pub struct Google {
    /// HTTP client for API requests
    client: Client,
    /// API key passed as the `key` query parameter
    api_key: String,
    /// API base URL, e.g. `https://translation.googleapis.com`
    endpoint: String,
}

/// Bulk translate request
#[derive(Debug, Clone, Serialize)]
pub struct GoogleRequest {
    /// Texts to translate
    q: Vec<String>,
    /// Target language code
    target: String,
    /// Source language code, omitted for detection
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    /// Always "text" so markup characters come back unescaped
    format: String,
}

/// Bulk translate response
#[derive(Debug, Deserialize)]
pub struct GoogleResponse {
    pub data: GoogleData,
}

#[derive(Debug, Deserialize)]
pub struct GoogleData {
    #[serde(default)]
    pub translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTranslation {
    pub translated_text: String,
    #[serde(default)]
    pub detected_source_language: Option<String>,
}

impl GoogleRequest {
    /// Create a request for the given texts
    pub fn new(texts: Vec<String>, target: impl Into<String>) -> Self {
        Self {
            q: texts,
            target: target.into(),
            source: None,
            format: "text".to_string(),
        }
    }

    /// Set the source language
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Number of segments in the request
    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}

impl Google {
    /// Create a new Google client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Translate one request of at most `MAX_SEGMENTS_PER_REQUEST` texts
    pub async fn translate(&self, request: GoogleRequest) -> Result<GoogleResponse, ProviderError> {
        if request.len() > MAX_SEGMENTS_PER_REQUEST {
            return Err(ProviderError::RequestFailed(format!(
                "Google accepts at most {} segments per request, got {}",
                MAX_SEGMENTS_PER_REQUEST,
                request.len()
            )));
        }

        let api_url = format!("{}/language/translate/v2", self.endpoint);
        debug!("Sending {} segments to Google Translate", request.len());

        let response = self.client.post(&api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("Google", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("Google", response).await);
        }

        response.json::<GoogleResponse>().await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse Google API response: {}", e)))
    }

    /// Translated texts in request order
    pub fn extract_translations(response: &GoogleResponse) -> Vec<String> {
        response.data.translations.iter()
            .map(|t| t.translated_text.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for Google {
    type Request = GoogleRequest;
    type Response = GoogleResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        self.translate(request).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.translate(GoogleRequest::new(vec!["Hello".to_string()], "es")).await?;
        Ok(())
    }

    fn extract_text(response: &Self::Response) -> String {
        Self::extract_translations(response).join("\n")
    }
}
