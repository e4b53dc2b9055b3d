/*!
 * Layer store abstraction.
 *
 * A layer is an attribute table: rows are features identified by a stable id,
 * columns are named, typed fields. The host application owns the real storage;
 * this crate only talks to it through the `LayerStore` trait:
 * - `memory`: in-memory store with an edit buffer
 * - `geojson`: file-backed store over a GeoJSON FeatureCollection
 *
 * Writes go through an `EditSession`, which must end in commit or rollback.
 */

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{LayerError, TransactionError};

pub mod geojson;
pub mod memory;

pub use self::geojson::GeoJsonLayer;
pub use self::memory::MemoryLayer;

/// Stable feature identifier
pub type FeatureId = u64;

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Real,
    Boolean,
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Shorthand for a string field
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    /// True for null values and strings that are empty after trimming
    pub fn is_null_or_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String form of the value, `None` for null
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Convert from a JSON property value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Real(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Text(s.clone()),
            // Nested values are flattened to their JSON text
            other => Self::Text(other.to_string()),
        }
    }

    /// Convert to a JSON property value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Field type that best describes this value
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(FieldType::Boolean),
            Self::Integer(_) => Some(FieldType::Integer),
            Self::Real(_) => Some(FieldType::Real),
            Self::Text(_) => Some(FieldType::String),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Real(r) => write!(f, "{}", r),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// One row of a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(id: FeatureId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Value of a field; missing fields read as null
    pub fn get(&self, field: &str) -> &AttributeValue {
        static NULL: AttributeValue = AttributeValue::Null;
        self.attributes.get(field).unwrap_or(&NULL)
    }
}

/// Feature selection for `LayerStore::get_features`
#[derive(Debug, Clone, Default)]
pub enum FeatureFilter {
    /// Every feature in store order
    #[default]
    All,
    /// Only the listed ids, in store order
    Ids(Vec<FeatureId>),
}

impl FeatureFilter {
    pub fn accepts(&self, id: FeatureId) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&id),
        }
    }
}

/// Contract of the host layer/feature API.
///
/// Schema changes (`add_field`, `delete_field`) apply immediately, as a data
/// provider would. Value changes are buffered between `start_edit` and
/// `commit`/`rollback`; reads during an edit see the buffered values.
pub trait LayerStore: Send {
    /// Display name of the layer
    fn name(&self) -> &str;

    /// Fields in declaration order
    fn fields(&self) -> Vec<Field>;

    /// Look up a field by name
    fn field(&self, name: &str) -> Option<Field> {
        self.fields().into_iter().find(|f| f.name == name)
    }

    /// Features matching the filter, in store order
    fn get_features(&self, filter: &FeatureFilter) -> Vec<Feature>;

    /// Number of features in the layer
    fn feature_count(&self) -> usize;

    /// Add a field; existing features read it as null
    fn add_field(&mut self, field: Field) -> Result<(), LayerError>;

    /// Remove a field and its values
    fn delete_field(&mut self, name: &str) -> Result<(), LayerError>;

    /// Open the edit buffer
    fn start_edit(&mut self) -> Result<(), TransactionError>;

    /// Whether an edit buffer is open
    fn is_editing(&self) -> bool;

    /// Buffer a value change
    fn change_value(
        &mut self,
        id: FeatureId,
        field: &str,
        value: AttributeValue,
    ) -> Result<(), TransactionError>;

    /// Apply the edit buffer. On error the buffer is left open for rollback.
    fn commit(&mut self) -> Result<(), TransactionError>;

    /// Discard the edit buffer
    fn rollback(&mut self);
}

/// Scoped edit session over a layer store.
///
/// The session holds the only mutable borrow of the store, so no other writer
/// can exist while it is open. `commit` and `rollback` consume it; dropping an
/// unfinished session rolls back.
pub struct EditSession<'a, S: LayerStore + ?Sized> {
    store: &'a mut S,
    changes: usize,
    finished: bool,
}

impl<'a, S: LayerStore + ?Sized> EditSession<'a, S> {
    /// Open an edit session
    pub fn begin(store: &'a mut S) -> Result<Self, TransactionError> {
        store.start_edit()?;
        Ok(Self {
            store,
            changes: 0,
            finished: false,
        })
    }

    /// Buffer a value change
    pub fn set(
        &mut self,
        id: FeatureId,
        field: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<(), TransactionError> {
        self.store.change_value(id, field, value.into())?;
        self.changes += 1;
        Ok(())
    }

    /// Number of buffered changes
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Read access to the store while editing
    pub fn store(&self) -> &S {
        &*self.store
    }

    /// Commit the buffered changes. A failed commit is rolled back before the
    /// error is returned.
    pub fn commit(mut self) -> Result<usize, TransactionError> {
        self.finished = true;
        match self.store.commit() {
            Ok(()) => Ok(self.changes),
            Err(e) => {
                self.store.rollback();
                Err(e)
            }
        }
    }

    /// Discard the buffered changes
    pub fn rollback(mut self) {
        self.finished = true;
        self.store.rollback();
    }
}

impl<S: LayerStore + ?Sized> Drop for EditSession<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Edit session on layer '{}' dropped with {} pending changes, rolling back",
                self.store.name(),
                self.changes
            );
            self.store.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layer() -> MemoryLayer {
        let mut layer = MemoryLayer::new("roads", vec![Field::string("name")]);
        layer.push_feature(vec![("name", AttributeValue::from("Main St"))]);
        layer.push_feature(vec![("name", AttributeValue::Null)]);
        layer
    }

    #[test]
    fn test_attribute_value_blank_shouldTreatWhitespaceAsBlank() {
        assert!(AttributeValue::Null.is_null_or_blank());
        assert!(AttributeValue::from("   ").is_null_or_blank());
        assert!(!AttributeValue::from("x").is_null_or_blank());
        assert!(!AttributeValue::Integer(0).is_null_or_blank());
    }

    #[test]
    fn test_attribute_value_json_shouldPreserveNumbersAndText() {
        let json = serde_json::json!({"a": 3, "b": 2.5, "c": "x", "d": null});
        assert_eq!(AttributeValue::from_json(&json["a"]), AttributeValue::Integer(3));
        assert_eq!(AttributeValue::from_json(&json["b"]), AttributeValue::Real(2.5));
        assert_eq!(AttributeValue::from_json(&json["c"]), AttributeValue::from("x"));
        assert_eq!(AttributeValue::from_json(&json["d"]), AttributeValue::Null);
        assert_eq!(AttributeValue::Integer(7).as_text(), Some("7".to_string()));
    }

    #[test]
    fn test_edit_session_commit_shouldApplyChanges() {
        let mut layer = sample_layer();
        let mut session = EditSession::begin(&mut layer).unwrap();
        session.set(2, "name", "Side St").unwrap();
        assert_eq!(session.commit().unwrap(), 1);

        let features = layer.get_features(&FeatureFilter::Ids(vec![2]));
        assert_eq!(features[0].get("name"), &AttributeValue::from("Side St"));
        assert!(!layer.is_editing());
    }

    #[test]
    fn test_edit_session_drop_shouldRollBack() {
        let mut layer = sample_layer();
        {
            let mut session = EditSession::begin(&mut layer).unwrap();
            session.set(1, "name", "Changed").unwrap();
        }
        assert!(!layer.is_editing());
        let features = layer.get_features(&FeatureFilter::All);
        assert_eq!(features[0].get("name"), &AttributeValue::from("Main St"));
    }

    #[test]
    fn test_edit_session_failedCommit_shouldRollBack() {
        let mut layer = sample_layer();
        layer.fail_next_commit();
        let mut session = EditSession::begin(&mut layer).unwrap();
        session.set(1, "name", "Changed").unwrap();
        assert!(session.commit().is_err());
        assert!(!layer.is_editing());
        let features = layer.get_features(&FeatureFilter::All);
        assert_eq!(features[0].get("name"), &AttributeValue::from("Main St"));
    }
}
