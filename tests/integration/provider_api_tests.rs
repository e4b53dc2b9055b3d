/*!
 * Integration tests for provider API interactions against a mock HTTP server
 */

use mockito::{Matcher, Server};
use serde_json::json;

use attrclean::app_config::{Config, TranslationProvider};
use attrclean::errors::{ParseError, ProviderError};
use attrclean::layer::AttributeValue;
use attrclean::translation::{
    BatchTranslationTask, ProviderBackend, TaskOptions, TaskState, TranslateOptions, TranslationBackend,
};

use crate::common::{layer_with_names, no_backoff, text_of};

fn config_for(provider: TranslationProvider, endpoint: &str, api_key: &str) -> Config {
    let mut config = Config::default();
    config.translation.provider = provider;
    let provider_config = config.translation.provider_config_mut(provider);
    provider_config.endpoint = endpoint.to_string();
    provider_config.api_key = api_key.to_string();
    config
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn to_arabic() -> TranslateOptions {
    TranslateOptions {
        source_lang: "en".to_string(),
        target_lang: "ar".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ollama_translate_withListReply_shouldReturnOrderedTranslations() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(json!({"model": "aya", "stream": false})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"model": "aya", "response": "['سوق', 'مدرسة']", "done": true}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Ollama, &server.url(), "");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let result = backend.translate(&texts(&["Market", "School"]), &to_arabic()).await.unwrap();

    assert_eq!(result, vec![Some("سوق".to_string()), Some("مدرسة".to_string())]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_translate_withShortReply_shouldFailWithInsufficient() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(json!({"response": "1. سوق", "done": true}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Ollama, &server.url(), "");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let result = backend.translate(&texts(&["Market", "School"]), &to_arabic()).await;

    assert!(matches!(
        result,
        Err(ProviderError::Unparseable(ParseError::Insufficient { expected: 2, found: 1 }))
    ));
}

#[tokio::test]
async fn test_ollama_blankItemInReply_shouldBeSkippedByTask() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(json!({"response": "['سوق', '', 'حديقة']", "done": true}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Ollama, &server.url(), "");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let mut layer = layer_with_names(&[Some("Market"), Some("School"), Some("Park")]);
    let options = TaskOptions {
        retry: no_backoff(),
        ..TaskOptions::new("name", "name_ar")
    };

    let report = BatchTranslationTask::new(&backend, options).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.translated_count, 2);
    assert_eq!(report.skipped, vec![2]);
    assert_eq!(text_of(&layer, 1, "name_ar").as_deref(), Some("سوق"));
    assert_eq!(layer.committed_value(2, "name_ar"), Some(&AttributeValue::Null));
}

#[tokio::test]
async fn test_ollama_retryAttempt_shouldSendEscalatedPrompt() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::Regex("STRICT MODE".to_string()))
        .with_status(200)
        .with_body(json!({"response": "[\"سوق\"]", "done": true}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Ollama, &server.url(), "");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let options = TranslateOptions { attempt: 1, ..to_arabic() };
    let result = backend.translate(&texts(&["Market"]), &options).await.unwrap();

    assert_eq!(result, vec![Some("سوق".to_string())]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_ollama_listModelsAndVersion_shouldUseTagsAndVersionEndpoints() {
    let mut server = Server::new_async().await;
    let _tags = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(json!({"models": [{"name": "aya:latest", "size": 1}, {"name": "llama3"}]}).to_string())
        .create_async()
        .await;
    let version = server
        .mock("GET", "/api/version")
        .with_status(200)
        .with_body(json!({"version": "0.5.1"}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Ollama, &server.url(), "");
    let backend = ProviderBackend::from_config(&config).unwrap();

    assert_eq!(backend.list_models().await.unwrap(), vec!["aya:latest", "llama3"]);
    backend.test_connection().await.unwrap();
    version.assert_async().await;
}

#[tokio::test]
async fn test_google_translate_shouldSendKeyAndOmitAutoSource() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/language/translate/v2")
        .match_query(Matcher::UrlEncoded("key".to_string(), "secret".to_string()))
        .match_body(Matcher::Json(json!({"q": ["Market", "School"], "target": "ar", "format": "text"})))
        .with_status(200)
        .with_body(
            json!({"data": {"translations": [
                {"translatedText": "سوق", "detectedSourceLanguage": "en"},
                {"translatedText": "مدرسة", "detectedSourceLanguage": "en"}
            ]}})
            .to_string(),
        )
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Google, &server.url(), "secret");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let options = TranslateOptions {
        source_lang: "auto".to_string(),
        ..to_arabic()
    };
    let result = backend.translate(&texts(&["Market", "School"]), &options).await.unwrap();

    assert_eq!(result, vec![Some("سوق".to_string()), Some("مدرسة".to_string())]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_google_badKey_shouldMapToAuthenticationError() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/language/translate/v2")
        .match_query(Matcher::Any)
        .with_status(403)
        .with_body(json!({"error": {"code": 403, "message": "API key not valid"}}).to_string())
        .create_async()
        .await;

    let config = config_for(TranslationProvider::Google, &server.url(), "wrong");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let result = backend.translate(&texts(&["Market"]), &to_arabic()).await;

    match result {
        Err(ProviderError::AuthenticationError(message)) => assert_eq!(message, "API key not valid"),
        other => panic!("expected an authentication error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_openai_translate_shouldCallOncePerText() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(200)
        .with_body(
            json!({"choices": [{"message": {"role": "assistant", "content": "  ترجمة \n"}}]}).to_string(),
        )
        .expect(3)
        .create_async()
        .await;

    let config = config_for(TranslationProvider::OpenAI, &server.url(), "sk-test");
    let backend = ProviderBackend::from_config(&config).unwrap();
    let result = backend.translate(&texts(&["a", "b", "c"]), &to_arabic()).await.unwrap();

    assert_eq!(result, vec![Some("ترجمة".to_string()); 3]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_deepseek_serverError_shouldMarkTextsUntranslated() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let config = config_for(TranslationProvider::DeepSeek, &server.url(), "ds-key");
    let backend = ProviderBackend::from_config(&config).unwrap();
    assert_eq!(backend.name(), "DeepSeek");
    let result = backend.translate(&texts(&["a", "b"]), &to_arabic()).await.unwrap();

    assert_eq!(result, vec![None, None]);
}
