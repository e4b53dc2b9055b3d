/*!
 * In-memory layer store.
 *
 * Holds committed features plus an optional edit buffer. Used directly by
 * tests and as the working copy behind the GeoJSON store.
 */

use std::collections::{BTreeMap, HashMap};

use super::{AttributeValue, Feature, FeatureFilter, FeatureId, Field, LayerStore};
use crate::errors::{LayerError, TransactionError};

/// In-memory attribute table with an edit buffer
#[derive(Debug, Clone)]
pub struct MemoryLayer {
    name: String,
    fields: Vec<Field>,
    features: Vec<Feature>,
    index: HashMap<FeatureId, usize>,
    /// Buffered changes per feature, `None` when not editing
    pending: Option<BTreeMap<FeatureId, BTreeMap<String, AttributeValue>>>,
    next_id: FeatureId,
    fail_next_commit: bool,
}

impl MemoryLayer {
    /// Create an empty layer with the given schema
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            features: Vec::new(),
            index: HashMap::new(),
            pending: None,
            next_id: 1,
            fail_next_commit: false,
        }
    }

    /// Append a feature with an auto-assigned id and return the id
    pub fn push_feature(&mut self, attributes: Vec<(&str, AttributeValue)>) -> FeatureId {
        let id = self.next_id;
        let mut feature = Feature::new(id);
        for (name, value) in attributes {
            feature.attributes.insert(name.to_string(), value);
        }
        self.insert_feature(feature);
        id
    }

    /// Append a feature with an explicit id, replacing any feature with the same id
    pub fn insert_feature(&mut self, feature: Feature) {
        self.next_id = self.next_id.max(feature.id + 1);
        if let Some(&pos) = self.index.get(&feature.id) {
            self.features[pos] = feature;
        } else {
            self.index.insert(feature.id, self.features.len());
            self.features.push(feature);
        }
    }

    /// Remove a feature outright, bypassing the edit buffer
    pub fn remove_feature(&mut self, id: FeatureId) -> Option<Feature> {
        let pos = self.index.remove(&id)?;
        let feature = self.features.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(feature)
    }

    /// Make the next `commit` fail, for exercising rollback paths
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    /// Committed value of a field, ignoring the edit buffer
    pub fn committed_value(&self, id: FeatureId, field: &str) -> Option<&AttributeValue> {
        self.index
            .get(&id)
            .map(|&pos| self.features[pos].get(field))
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

impl LayerStore for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<Field> {
        self.fields.clone()
    }

    fn get_features(&self, filter: &FeatureFilter) -> Vec<Feature> {
        self.features
            .iter()
            .filter(|f| filter.accepts(f.id))
            .map(|f| {
                let mut feature = f.clone();
                if let Some(changes) = self.pending.as_ref().and_then(|p| p.get(&f.id)) {
                    feature
                        .attributes
                        .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                feature
            })
            .collect()
    }

    fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn add_field(&mut self, field: Field) -> Result<(), LayerError> {
        if self.has_field(&field.name) {
            return Err(LayerError::FieldExists(field.name));
        }
        for feature in self.features.iter_mut() {
            feature
                .attributes
                .entry(field.name.clone())
                .or_insert(AttributeValue::Null);
        }
        self.fields.push(field);
        Ok(())
    }

    fn delete_field(&mut self, name: &str) -> Result<(), LayerError> {
        if !self.has_field(name) {
            return Err(LayerError::FieldNotFound(name.to_string()));
        }
        self.fields.retain(|f| f.name != name);
        for feature in self.features.iter_mut() {
            feature.attributes.remove(name);
        }
        if let Some(pending) = self.pending.as_mut() {
            for changes in pending.values_mut() {
                changes.remove(name);
            }
        }
        Ok(())
    }

    fn start_edit(&mut self) -> Result<(), TransactionError> {
        if self.pending.is_some() {
            return Err(TransactionError::AlreadyEditing(self.name.clone()));
        }
        self.pending = Some(BTreeMap::new());
        Ok(())
    }

    fn is_editing(&self) -> bool {
        self.pending.is_some()
    }

    fn change_value(
        &mut self,
        id: FeatureId,
        field: &str,
        value: AttributeValue,
    ) -> Result<(), TransactionError> {
        if !self.has_field(field) {
            return Err(TransactionError::UnknownField(field.to_string()));
        }
        if !self.index.contains_key(&id) {
            return Err(TransactionError::UnknownFeature(id));
        }
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| TransactionError::NotEditing(self.name.clone()))?;
        pending.entry(id).or_default().insert(field.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        if self.pending.is_none() {
            return Err(TransactionError::NotEditing(self.name.clone()));
        }
        if self.fail_next_commit {
            self.fail_next_commit = false;
            return Err(TransactionError::CommitFailed(format!(
                "layer '{}' rejected the edit buffer",
                self.name
            )));
        }
        let pending = self.pending.take().unwrap_or_default();
        for (id, changes) in pending {
            if let Some(&pos) = self.index.get(&id) {
                self.features[pos].attributes.extend(changes);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending = None;
    }
}
