/*!
 * Integration tests for the batch translation task
 */

use std::sync::Arc;

use attrclean::errors::{TransactionError, TranslationError};
use attrclean::layer::{AttributeValue, Field, LayerStore, MemoryLayer};
use attrclean::providers::mock::{MockBackend, MockBehavior};
use attrclean::translation::{BatchTranslationTask, CancellationFlag, TaskOptions, TaskState};

use crate::common::layers::{FlakyLayer, RecordingSink};
use crate::common::{layer_with_n_names, layer_with_names, no_backoff, text_of};

fn options(batch_size: usize) -> TaskOptions {
    TaskOptions {
        batch_size,
        retry: no_backoff(),
        ..TaskOptions::new("name", "name_ar")
    }
}

#[tokio::test]
async fn test_run_withEmptySources_shouldSkipThemAndLeaveTargetsUntouched() {
    let names = [
        Some("Cairo"),
        None,
        Some("Giza"),
        Some("   "),
        Some("Luxor"),
        Some("Aswan"),
        Some(""),
        Some("Alexandria"),
        Some("Suez"),
        Some("Tanta"),
    ];
    let mut layer = layer_with_names(&names);
    layer.add_field(Field::string("name_ar")).unwrap();
    let backend = MockBackend::working();
    let mut task = BatchTranslationTask::new(&backend, options(4));

    let report = task.run(&mut layer).await;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.total_features, 7);
    assert_eq!(report.translated_count, 7);
    for (i, name) in names.iter().enumerate() {
        let id = i as u64 + 1;
        match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => assert_eq!(
                text_of(&layer, id, "name_ar"),
                Some(MockBackend::translation_of(name, "ar"))
            ),
            None => assert_eq!(layer.committed_value(id, "name_ar"), Some(&AttributeValue::Null)),
        }
    }
}

#[tokio::test]
async fn test_run_secondBatchTimesOutTwice_shouldRecordRetriesForThatBatchOnly() {
    let mut layer = layer_with_n_names(12);
    let backend = MockBackend::scripted([
        MockBehavior::Working,
        MockBehavior::Timeout,
        MockBehavior::Timeout,
    ]);
    let mut task = BatchTranslationTask::new(&backend, options(5));

    let report = task.run(&mut layer).await;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.translated_count, 12);
    assert!(report.skipped.is_empty());
    assert_eq!(report.batches.len(), 3);
    assert_eq!(report.retries_for(1), Some(0));
    assert_eq!(report.retries_for(2), Some(2));
    assert_eq!(report.retries_for(3), Some(0));
    assert_eq!(backend.call_count(), 5);
}

#[tokio::test]
async fn test_run_twice_shouldTranslateNothingTheSecondTime() {
    let mut layer = layer_with_n_names(6);
    let backend = MockBackend::working();

    let first = BatchTranslationTask::new(&backend, options(4)).run(&mut layer).await;
    assert_eq!(first.translated_count, 6);
    let calls_after_first = backend.call_count();

    let second = BatchTranslationTask::new(&backend, options(4)).run(&mut layer).await;
    assert_eq!(second.state, TaskState::Succeeded);
    assert_eq!(second.total_features, 0);
    assert_eq!(second.translated_count, 0);
    assert_eq!(backend.call_count(), calls_after_first);
}

#[tokio::test]
async fn test_run_batchCount_shouldBeCeilOfTextsOverBatchSize() {
    let mut layer = layer_with_n_names(23);
    let backend = MockBackend::working();
    let report = BatchTranslationTask::new(&backend, options(5)).run(&mut layer).await;

    assert_eq!(report.batches.len(), 5);
    let sizes: Vec<usize> = backend.calls().iter().map(|c| c.texts.len()).collect();
    assert_eq!(sizes, vec![5, 5, 5, 5, 3]);

    let sent: Vec<String> = backend.calls().into_iter().flat_map(|c| c.texts).collect();
    let expected: Vec<String> = (1..=23).map(|i| format!("Place {}", i)).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_run_failedCommit_shouldLeaveLayerAsBefore() {
    let mut layer = layer_with_n_names(4);
    layer.fail_next_commit();
    let before = layer.clone();
    let backend = MockBackend::working();

    let report = BatchTranslationTask::new(&backend, options(2)).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Failed);
    assert!(matches!(
        report.error,
        Some(TranslationError::Transaction(TransactionError::CommitFailed(_)))
    ));
    assert_eq!(report.translated_count, 0);
    assert_eq!(layer.feature_count(), before.feature_count());
    assert_eq!(layer.fields(), before.fields());
    assert!(!layer.is_editing());
    for id in 1..=4 {
        assert_eq!(layer.committed_value(id, "name"), before.committed_value(id, "name"));
    }
}

#[tokio::test]
async fn test_run_featureLostDuringCommit_shouldRestoreTargets() {
    let mut inner = layer_with_n_names(3);
    inner.add_field(Field::string("name_ar")).unwrap();
    let mut layer = FlakyLayer::new(inner, 2);
    let backend = MockBackend::working();

    let report = BatchTranslationTask::new(&backend, options(5)).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Failed);
    assert!(matches!(
        report.error,
        Some(TranslationError::Transaction(TransactionError::FeatureCountMismatch { before: 3, after: 2 }))
    ));
    assert_eq!(layer.inner.committed_value(1, "name_ar"), Some(&AttributeValue::Null));
    assert_eq!(layer.inner.committed_value(3, "name_ar"), Some(&AttributeValue::Null));
    assert!(!layer.is_editing());
}

#[tokio::test]
async fn test_run_featureLostWithCreatedField_shouldRemoveField() {
    let mut layer = FlakyLayer::new(layer_with_n_names(3), 1);
    let backend = MockBackend::working();

    let report = BatchTranslationTask::new(&backend, options(5)).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Failed);
    assert!(layer.field("name_ar").is_none());
}

#[tokio::test]
async fn test_run_cancelledDuringFirstBatch_shouldDiscardResult() {
    let mut layer = layer_with_n_names(6);
    let flag = CancellationFlag::new();
    let backend = MockBackend::working().cancel_after(1, flag.clone());
    let mut task = BatchTranslationTask::new(&backend, options(2)).with_cancellation(flag);

    let report = task.run(&mut layer).await;

    assert_eq!(report.state, TaskState::Cancelled);
    assert!(matches!(report.error, Some(TranslationError::Cancelled)));
    assert_eq!(backend.call_count(), 1);
    assert_eq!(report.translated_count, 0);
    assert!(layer.field("name_ar").is_none());
    assert!(!layer.is_editing());
    assert!(report.into_result().is_err());
}

#[tokio::test]
async fn test_run_partialResults_shouldReportSkippedIds() {
    let mut layer = layer_with_n_names(4);
    let backend = MockBackend::new(MockBehavior::PartialEvery { every: 2 });

    let report = BatchTranslationTask::new(&backend, options(4)).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.translated_count, 2);
    assert_eq!(report.skipped, vec![2, 4]);
    assert_eq!(report.summary(), "Translated 2 out of 4 features, 2 skipped");
    assert_eq!(layer.committed_value(2, "name_ar"), Some(&AttributeValue::Null));
}

#[tokio::test]
async fn test_run_exhaustedBatch_shouldContinueWithNextBatch() {
    let mut layer = layer_with_n_names(4);
    let backend = MockBackend::scripted([
        MockBehavior::Failing,
        MockBehavior::Failing,
        MockBehavior::Failing,
    ]);

    let report = BatchTranslationTask::new(&backend, options(2)).run(&mut layer).await;

    assert_eq!(report.state, TaskState::Succeeded);
    assert_eq!(report.skipped, vec![1, 2]);
    assert!(!report.batches[0].succeeded);
    assert_eq!(report.batches[0].retries, 2);
    assert!(report.batches[1].succeeded);
    assert_eq!(
        text_of(&layer, 3, "name_ar"),
        Some(MockBackend::translation_of("Place 3", "ar"))
    );
}

#[tokio::test]
async fn test_run_progress_shouldReachOneInBatchOrder() {
    let mut layer = layer_with_n_names(7);
    let backend = MockBackend::working();
    let sink = Arc::new(RecordingSink::default());
    let mut task = BatchTranslationTask::new(&backend, options(3)).with_progress_sink(sink.clone());

    task.run(&mut layer).await;

    let progress = sink.progress.lock().clone();
    let processed: Vec<usize> = progress.iter().map(|p| p.processed).collect();
    assert_eq!(processed, vec![3, 6, 7]);
    assert!(progress.iter().all(|p| p.batches == 3 && p.total == 7));
    assert!((progress[2].fraction() - 1.0).abs() < f64::EPSILON);

    let messages = sink.messages.lock();
    assert!(messages.iter().any(|(_, m)| m == "Successfully translated 7 out of 7 features"));
}

#[tokio::test]
async fn test_run_existingTargetValues_shouldBeKept() {
    let mut layer = MemoryLayer::new("places", vec![Field::string("name"), Field::string("name_ar")]);
    layer.push_feature(vec![("name", "Cairo".into()), ("name_ar", "القاهرة".into())]);
    layer.push_feature(vec![("name", "Giza".into()), ("name_ar", AttributeValue::Null)]);
    let backend = MockBackend::working();

    let report = BatchTranslationTask::new(&backend, options(10)).run(&mut layer).await;

    assert_eq!(report.total_features, 1);
    assert_eq!(text_of(&layer, 1, "name_ar").as_deref(), Some("القاهرة"));
    assert_eq!(backend.calls()[0].texts, vec!["Giza".to_string()]);
}
