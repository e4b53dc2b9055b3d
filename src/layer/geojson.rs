/*!
 * File-backed layer store over a GeoJSON FeatureCollection.
 *
 * Feature properties become the attribute table. Geometry and any other
 * feature members are carried through untouched. Commits and schema changes
 * rewrite the file atomically.
 */

use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::{
    AttributeValue, Feature, FeatureFilter, FeatureId, Field, FieldType, LayerStore, MemoryLayer,
};
use crate::errors::{LayerError, TransactionError};

/// GeoJSON layer file opened as a layer store
#[derive(Debug)]
pub struct GeoJsonLayer {
    path: PathBuf,
    layer: MemoryLayer,
    /// Non-property members of each feature (type, geometry, bbox, ...)
    members: HashMap<FeatureId, Map<String, Value>>,
    /// Top-level members other than `features`
    collection: Map<String, Value>,
}

impl GeoJsonLayer {
    /// Open a GeoJSON file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LayerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LayerError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut layer = Self::parse(&layer_name(path), &text)?;
        layer.path = path.to_path_buf();
        info!(
            "Opened layer '{}' with {} features and {} fields",
            layer.name(),
            layer.feature_count(),
            layer.layer.fields().len()
        );
        Ok(layer)
    }

    /// Parse GeoJSON text. The result is not tied to a file until `save_as`.
    pub fn parse(name: &str, text: &str) -> Result<Self, LayerError> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| LayerError::InvalidData(format!("not valid JSON: {}", e)))?;
        let Value::Object(mut collection) = root else {
            return Err(LayerError::InvalidData("root is not an object".to_string()));
        };
        if collection.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
            return Err(LayerError::InvalidData(
                "root is not a FeatureCollection".to_string(),
            ));
        }
        let features = match collection.remove("features") {
            Some(Value::Array(features)) => features,
            Some(_) => {
                return Err(LayerError::InvalidData(
                    "'features' is not an array".to_string(),
                ));
            }
            None => Vec::new(),
        };

        let ids = assign_ids(&features);
        let mut fields: Vec<Field> = Vec::new();
        let mut parsed = Vec::with_capacity(features.len());
        let mut members = HashMap::new();

        for (feature, id) in features.into_iter().zip(ids) {
            let Value::Object(mut object) = feature else {
                return Err(LayerError::InvalidData(format!(
                    "feature {} is not an object",
                    id
                )));
            };
            let properties = match object.remove("properties") {
                Some(Value::Object(props)) => props,
                _ => Map::new(),
            };

            let mut feature = Feature::new(id);
            for (key, raw) in properties.iter() {
                let value = AttributeValue::from_json(raw);
                match fields.iter_mut().find(|f| &f.name == key) {
                    Some(field) => {
                        // Fields first seen as null are typed by their first value
                        if field.field_type == FieldType::String && feature_is_untyped(&parsed, key) {
                            if let Some(t) = value.field_type() {
                                field.field_type = t;
                            }
                        }
                    }
                    None => fields.push(Field::new(
                        key.clone(),
                        value.field_type().unwrap_or(FieldType::String),
                    )),
                }
                feature.attributes.insert(key.clone(), value);
            }
            members.insert(id, object);
            parsed.push(feature);
        }

        let mut layer = MemoryLayer::new(name, fields);
        for feature in parsed {
            layer.insert_feature(feature);
        }
        debug!("Parsed GeoJSON layer '{}' ({} features)", name, layer.feature_count());

        Ok(Self {
            path: PathBuf::new(),
            layer,
            members,
            collection,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the committed state as a GeoJSON value
    pub fn to_geojson(&self) -> Value {
        let field_names: Vec<String> = self.layer.fields().into_iter().map(|f| f.name).collect();
        let features: Vec<Value> = self
            .committed_features()
            .into_iter()
            .map(|feature| {
                let mut object = self.members.get(&feature.id).cloned().unwrap_or_else(|| {
                    let mut m = Map::new();
                    m.insert("type".to_string(), Value::String("Feature".to_string()));
                    m
                });
                let properties: Map<String, Value> = field_names
                    .iter()
                    .map(|name| (name.clone(), feature.get(name).to_json()))
                    .collect();
                object.insert("properties".to_string(), Value::Object(properties));
                Value::Object(object)
            })
            .collect();

        let mut root = self.collection.clone();
        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }

    /// Write the committed state to the backing file
    pub fn save(&self) -> Result<(), LayerError> {
        self.write_to(&self.path)
    }

    /// Write the committed state to another file and make it the backing file
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), LayerError> {
        self.path = path.as_ref().to_path_buf();
        self.save()
    }

    fn write_to(&self, path: &Path) -> Result<(), LayerError> {
        let io_err = |message: String| LayerError::Io {
            path: path.display().to_string(),
            message,
        };
        if path.as_os_str().is_empty() {
            return Err(io_err("layer has no backing file".to_string()));
        }
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_err(e.to_string()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.to_geojson())
            .map_err(|e| io_err(e.to_string()))?;
        tmp.flush().map_err(|e| io_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| io_err(e.error.to_string()))?;
        debug!("Wrote layer '{}' to {}", self.name(), path.display());
        Ok(())
    }

    fn committed_features(&self) -> Vec<Feature> {
        if self.layer.is_editing() {
            // Strip the edit buffer by reading through a rolled-back copy
            let mut copy = self.layer.clone();
            copy.rollback();
            copy.get_features(&FeatureFilter::All)
        } else {
            self.layer.get_features(&FeatureFilter::All)
        }
    }
}

impl LayerStore for GeoJsonLayer {
    fn name(&self) -> &str {
        self.layer.name()
    }

    fn fields(&self) -> Vec<Field> {
        self.layer.fields()
    }

    fn get_features(&self, filter: &FeatureFilter) -> Vec<Feature> {
        self.layer.get_features(filter)
    }

    fn feature_count(&self) -> usize {
        self.layer.feature_count()
    }

    fn add_field(&mut self, field: Field) -> Result<(), LayerError> {
        let name = field.name.clone();
        self.layer.add_field(field)?;
        if let Err(e) = self.save() {
            self.layer.delete_field(&name)?;
            return Err(e);
        }
        Ok(())
    }

    fn delete_field(&mut self, name: &str) -> Result<(), LayerError> {
        let before = self.layer.clone();
        self.layer.delete_field(name)?;
        if let Err(e) = self.save() {
            self.layer = before;
            return Err(e);
        }
        Ok(())
    }

    fn start_edit(&mut self) -> Result<(), TransactionError> {
        self.layer.start_edit()
    }

    fn is_editing(&self) -> bool {
        self.layer.is_editing()
    }

    fn change_value(
        &mut self,
        id: FeatureId,
        field: &str,
        value: AttributeValue,
    ) -> Result<(), TransactionError> {
        self.layer.change_value(id, field, value)
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        let before = self.layer.clone();
        self.layer.commit()?;
        if let Err(e) = self.save() {
            // Restore the open edit buffer so the caller can roll back
            self.layer = before;
            return Err(TransactionError::CommitFailed(e.to_string()));
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.layer.rollback();
    }
}

/// Layer name from the file stem
fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layer".to_string())
}

/// Use the features' own integer ids when they are present and unique,
/// otherwise number features by position.
fn assign_ids(features: &[Value]) -> Vec<FeatureId> {
    let own: Vec<Option<u64>> = features
        .iter()
        .map(|f| f.get("id").and_then(Value::as_u64))
        .collect();
    let mut seen = std::collections::HashSet::new();
    if own.iter().all(|id| id.is_some_and(|id| seen.insert(id))) {
        own.into_iter().flatten().collect()
    } else {
        (0..features.len() as u64).collect()
    }
}

fn feature_is_untyped(parsed: &[Feature], key: &str) -> bool {
    parsed.iter().all(|f| f.get(key).field_type().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "name": "cities",
        "features": [
            {"type": "Feature", "id": 10, "geometry": {"type": "Point", "coordinates": [1, 2]},
             "properties": {"name": "Cairo", "pop": 100}},
            {"type": "Feature", "id": 11, "geometry": null,
             "properties": {"name": null, "pop": 5}}
        ]
    }"#;

    #[test]
    fn test_parse_withFeatureIds_shouldUseThem() {
        let layer = GeoJsonLayer::parse("cities", SAMPLE).unwrap();
        let ids: Vec<FeatureId> = layer
            .get_features(&FeatureFilter::All)
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(layer.field("pop").unwrap().field_type, FieldType::Integer);
        assert_eq!(layer.field("name").unwrap().field_type, FieldType::String);
    }

    #[test]
    fn test_parse_notACollection_shouldFail() {
        let result = GeoJsonLayer::parse("x", r#"{"type": "Feature"}"#);
        assert!(matches!(result, Err(LayerError::InvalidData(_))));
    }

    #[test]
    fn test_commit_shouldPersistToFile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cities.geojson");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut layer = GeoJsonLayer::open(&path).unwrap();
        layer.add_field(Field::string("name_ar")).unwrap();
        layer.start_edit().unwrap();
        layer.change_value(10, "name_ar", "القاهرة".into()).unwrap();
        layer.commit().unwrap();

        let reopened = GeoJsonLayer::open(&path).unwrap();
        let features = reopened.get_features(&FeatureFilter::Ids(vec![10]));
        assert_eq!(features[0].get("name_ar"), &AttributeValue::from("القاهرة"));

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["name"], "cities");
        assert_eq!(raw["features"][0]["geometry"]["type"], "Point");
    }

    #[test]
    fn test_to_geojson_duringEdit_shouldOnlyContainCommittedValues() {
        let mut layer = GeoJsonLayer::parse("cities", SAMPLE).unwrap();
        layer.start_edit().unwrap();
        layer.change_value(10, "name", "Changed".into()).unwrap();
        let json = layer.to_geojson();
        assert_eq!(json["features"][0]["properties"]["name"], "Cairo");
    }
}
