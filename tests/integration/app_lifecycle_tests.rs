/*!
 * Integration tests for controller setup and complete file runs
 */

use anyhow::Result;
use mockito::Server;
use serde_json::json;
use std::sync::Arc;

use attrclean::app_config::{Config, TranslationProvider};
use attrclean::app_controller::Controller;
use attrclean::layer::{FeatureFilter, GeoJsonLayer, LayerStore, MemoryLayer};
use attrclean::providers::mock::MockBackend;
use attrclean::translation::{CancellationFlag, TaskState};

use crate::common::layers::RecordingSink;
use crate::common::{self, init_test_logging};

#[test]
fn test_translate_layer_withCustomLanguages_shouldPassThemToBackend() -> Result<()> {
    init_test_logging();
    let mut config = Config::default();
    config.source_language = "es".to_string();
    config.target_language = "de".to_string();
    let controller = Controller::with_config(config)?;
    let backend = MockBackend::working();
    let mut layer: MemoryLayer = common::layer_with_names(&[Some("Mercado"), Some("Escuela")]);
    let sink = Arc::new(RecordingSink::default());

    let report = tokio_test::block_on(controller.translate_layer(
        &mut layer,
        &backend,
        "name",
        "name_de",
        CancellationFlag::new(),
        sink.clone(),
    ));

    assert_eq!(report.state, TaskState::Succeeded);
    assert!(!Controller::is_failure(&report));
    assert_eq!(backend.call_count(), 1);
    assert_eq!(
        common::text_of(&layer, 2, "name_de"),
        Some(MockBackend::translation_of("Escuela", "de"))
    );
    assert_eq!(sink.progress.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_translate_file_withOllamaServer_shouldWriteTargetField() -> Result<()> {
    init_test_logging();
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"response": "['سوق', 'مدرسة']", "done": true}).to_string())
        .create_async()
        .await;

    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "places.geojson", common::sample_geojson())?;
    let mut config = Config::default();
    config.translation.provider_config_mut(TranslationProvider::Ollama).endpoint = server.url();
    let controller = Controller::with_config(config)?;

    let report = controller.translate_file(&path, "name", "name_ar").await?;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.translated_count, 2);
    mock.assert_async().await;

    let layer = GeoJsonLayer::open(&path)?;
    let features = layer.get_features(&FeatureFilter::Ids(vec![2]));
    assert_eq!(features[0].get("name_ar").as_text().as_deref(), Some("مدرسة"));
    Ok(())
}
