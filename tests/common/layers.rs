/*!
 * Layer stores and progress sinks with injectable behavior
 */

use log::Level;
use parking_lot::Mutex;

use attrclean::errors::{LayerError, TransactionError};
use attrclean::layer::{
    AttributeValue, Feature, FeatureFilter, FeatureId, Field, LayerStore, MemoryLayer,
};
use attrclean::translation::{ProgressSink, TaskProgress};

/// Memory layer that loses a feature when a commit succeeds, as a
/// misbehaving data provider would
pub struct FlakyLayer {
    pub inner: MemoryLayer,
    drop_on_commit: Option<FeatureId>,
}

impl FlakyLayer {
    pub fn new(inner: MemoryLayer, drop_on_commit: FeatureId) -> Self {
        Self {
            inner,
            drop_on_commit: Some(drop_on_commit),
        }
    }
}

impl LayerStore for FlakyLayer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fields(&self) -> Vec<Field> {
        self.inner.fields()
    }

    fn get_features(&self, filter: &FeatureFilter) -> Vec<Feature> {
        self.inner.get_features(filter)
    }

    fn feature_count(&self) -> usize {
        self.inner.feature_count()
    }

    fn add_field(&mut self, field: Field) -> Result<(), LayerError> {
        self.inner.add_field(field)
    }

    fn delete_field(&mut self, name: &str) -> Result<(), LayerError> {
        self.inner.delete_field(name)
    }

    fn start_edit(&mut self) -> Result<(), TransactionError> {
        self.inner.start_edit()
    }

    fn is_editing(&self) -> bool {
        self.inner.is_editing()
    }

    fn change_value(
        &mut self,
        id: FeatureId,
        field: &str,
        value: AttributeValue,
    ) -> Result<(), TransactionError> {
        self.inner.change_value(id, field, value)
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        self.inner.commit()?;
        if let Some(id) = self.drop_on_commit.take() {
            self.inner.remove_feature(id);
        }
        Ok(())
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }
}

/// Sink recording every report it receives
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<TaskProgress>>,
    pub messages: Mutex<Vec<(Level, String)>>,
}

impl ProgressSink for RecordingSink {
    fn progress(&self, progress: &TaskProgress) {
        self.progress.lock().push(*progress);
    }

    fn message(&self, level: Level, message: &str) {
        self.messages.lock().push((level, message.to_string()));
    }
}
