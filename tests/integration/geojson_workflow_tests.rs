/*!
 * End-to-end tests on GeoJSON layer files through the application controller
 */

use anyhow::Result;
use std::sync::Arc;

use attrclean::app_config::Config;
use attrclean::app_controller::Controller;
use attrclean::cleaning::{FindReplaceOptions, ReplaceMode};
use attrclean::layer::{AttributeValue, FeatureFilter, GeoJsonLayer, LayerStore};
use attrclean::providers::mock::MockBackend;
use attrclean::translation::{CancellationFlag, LogSink, TaskState};

use crate::common::{create_temp_dir, create_test_file, sample_geojson};

fn value_of(layer: &GeoJsonLayer, id: u64, field: &str) -> AttributeValue {
    layer.get_features(&FeatureFilter::Ids(vec![id]))[0].get(field).clone()
}

#[tokio::test]
async fn test_translate_layer_onGeoJson_shouldPersistTranslations() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "places.geojson", sample_geojson())?;
    let controller = Controller::with_config(Config::default())?;
    let backend = MockBackend::working();

    let mut layer = GeoJsonLayer::open(&path)?;
    let report = controller
        .translate_layer(&mut layer, &backend, "name", "name_ar", CancellationFlag::new(), Arc::new(LogSink))
        .await;
    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.total_features, 2);

    let reopened = GeoJsonLayer::open(&path)?;
    assert_eq!(
        value_of(&reopened, 1, "name_ar"),
        AttributeValue::from(MockBackend::translation_of("Market", "ar"))
    );
    assert_eq!(value_of(&reopened, 3, "name_ar"), AttributeValue::Null);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw["features"][0]["geometry"]["type"], "Point");
    Ok(())
}

#[tokio::test]
async fn test_translate_layer_cancelled_shouldLeaveFileUnchanged() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "places.geojson", sample_geojson())?;
    let controller = Controller::with_config(Config::default())?;
    let backend = MockBackend::working();
    let flag = CancellationFlag::new();
    flag.cancel();

    let mut layer = GeoJsonLayer::open(&path)?;
    let report = controller
        .translate_layer(&mut layer, &backend, "name", "name_ar", flag, Arc::new(LogSink))
        .await;
    assert_eq!(report.state, TaskState::Cancelled);

    let reopened = GeoJsonLayer::open(&path)?;
    assert!(reopened.field("name_ar").is_none());
    Ok(())
}

#[test]
fn test_clean_nulls_shouldRemoveEmptyColumnsFromFile() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "places.geojson", sample_geojson())?;
    let controller = Controller::with_config(Config::default())?;

    let removed = controller.clean_nulls(&path, 100.0, None, None)?;
    assert_eq!(removed, vec!["empty".to_string()]);

    let reopened = GeoJsonLayer::open(&path)?;
    assert!(reopened.field("empty").is_none());
    assert!(reopened.field("name").is_some());
    Ok(())
}

#[test]
fn test_clean_nulls_withReplacement_shouldRewriteMarkers() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "places.geojson", sample_geojson())?;
    let controller = Controller::with_config(Config::default())?;

    controller.clean_nulls(&path, 100.0, Some("x"), Some(("code", AttributeValue::from("-"))))?;

    let reopened = GeoJsonLayer::open(&path)?;
    assert_eq!(value_of(&reopened, 3, "code"), AttributeValue::from("-"));
    Ok(())
}

#[test]
fn test_find_replace_withReferenceFile_shouldWriteNewColumn() -> Result<()> {
    let dir = create_temp_dir()?;
    let path = create_test_file(dir.path(), "places.geojson", sample_geojson())?;
    let reference = create_test_file(
        dir.path(),
        "codes.geojson",
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"id": "007", "label": "Seven"}, "geometry": null},
            {"type": "Feature", "properties": {"id": "012", "label": "Twelve"}, "geometry": null}
        ]}"#,
    )?;
    let controller = Controller::with_config(Config::default())?;
    let options = FindReplaceOptions::new(
        "code",
        ReplaceMode::Lookup {
            find_field: "id".to_string(),
            replace_field: "label".to_string(),
            pattern: None,
        },
    )
    .strip_zeros(true)
    .new_column(Some("label".to_string()));

    let report = controller.find_replace(&path, &options, Some(&reference))?;
    assert_eq!(report.replaced, 2);
    assert_eq!(report.unmatched, 1);

    let reopened = GeoJsonLayer::open(&path)?;
    assert_eq!(value_of(&reopened, 1, "label"), AttributeValue::from("Seven"));
    assert_eq!(value_of(&reopened, 2, "label"), AttributeValue::from("Twelve"));
    assert_eq!(value_of(&reopened, 1, "code"), AttributeValue::from("7"));
    Ok(())
}
