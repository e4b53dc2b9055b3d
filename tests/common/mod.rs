/*!
 * Common test utilities for the attrclean test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use attrclean::layer::{AttributeValue, FeatureId, Field, MemoryLayer};
use attrclean::translation::RetryPolicy;

// Layer stores and sinks with injectable failures
pub mod layers;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Layer with a `name` field holding the given values, ids 1..=n
pub fn layer_with_names(names: &[Option<&str>]) -> MemoryLayer {
    let mut layer = MemoryLayer::new("places", vec![Field::string("name")]);
    for name in names {
        let value = name.map(AttributeValue::from).unwrap_or_default();
        layer.push_feature(vec![("name", value)]);
    }
    layer
}

/// Layer with `n` distinct non-empty names
pub fn layer_with_n_names(n: usize) -> MemoryLayer {
    let names: Vec<String> = (1..=n).map(|i| format!("Place {}", i)).collect();
    let refs: Vec<Option<&str>> = names.iter().map(|s| Some(s.as_str())).collect();
    layer_with_names(&refs)
}

/// Committed value of a field as text
pub fn text_of(layer: &MemoryLayer, id: FeatureId, field: &str) -> Option<String> {
    layer.committed_value(id, field).and_then(AttributeValue::as_text)
}

/// Retries without waiting
pub fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        backoff_ms: 0,
    }
}

/// Small GeoJSON FeatureCollection with a `name` property
pub fn sample_geojson() -> &'static str {
    r#"{
  "type": "FeatureCollection",
  "name": "places",
  "features": [
    {"type": "Feature", "id": 1, "properties": {"name": "Market", "code": "7", "empty": null}, "geometry": {"type": "Point", "coordinates": [31.2, 30.0]}},
    {"type": "Feature", "id": 2, "properties": {"name": "School", "code": "12", "empty": ""}, "geometry": {"type": "Point", "coordinates": [31.3, 30.1]}},
    {"type": "Feature", "id": 3, "properties": {"name": "", "code": "x", "empty": null}, "geometry": null}
  ]
}"#
}

/// Route log output through the test harness; repeated calls are no-ops
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
