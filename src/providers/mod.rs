/*!
 * Provider implementations for different translation services.
 *
 * This module contains client implementations for the supported services:
 * - Google: Cloud Translation v2 REST API
 * - OpenAI: chat completions, also used for DeepSeek's compatible API
 * - Ollama: Local LLM server
 * - Mock: scripted backend for tests
 */

use async_trait::async_trait;
use log::error;
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::ProviderError;

/// Common trait for all HTTP providers
///
/// This trait defines the interface that all provider clients follow,
/// allowing the translation backend to drive them uniformly.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    ///
    /// # Returns
    /// * `Result<(), ProviderError>` - Ok if the connection is successful, or an error
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Build an HTTP client with the provider timeout
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_default()
}

/// Turn a non-success response into a classified error
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());

    // Most APIs wrap the reason as {"error": {"message": ...}}
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or(body);

    error!("{} API error ({}): {}", provider, status, message);
    ProviderError::from_status(status.as_u16(), message)
}

/// Truncate a response body for logging
pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > 500 {
        text.chars().take(500).collect::<String>()
    } else {
        text.to_string()
    }
}

pub mod google;
pub mod mock;
pub mod ollama;
pub mod openai;
