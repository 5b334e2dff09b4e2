//! End-to-end batch processor behavior: bounds, ordering, retry, events,
//! cancellation, and accounting.

use parking_lot::Mutex;
use ragkit_batch::{
    BatchConfig, BatchError, BatchEvent, BatchProcessor, CollectingObserver, ProcessOptions,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn strings(count: usize, len: usize) -> Vec<String> {
    (0..count).map(|_| "x".repeat(len)).collect()
}

/// 300 items of 40 chars (10 estimated tokens each) against a 1000-token /
/// 100-item budget pack into exactly 3 full batches.
#[tokio::test]
async fn test_batch_bounds_pack_exactly() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_tokens_per_batch(1000)
            .max_items_per_batch(100)
            .target_batch_utilization(1.0),
    );
    let observer = Arc::new(CollectingObserver::new());

    let results = processor
        .process_batches(
            strings(300, 40),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(|s| s.len()).collect::<Vec<_>>())
            },
            ProcessOptions::new().with_observer(observer.clone()),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 300);
    assert_eq!(observer.count("batch_complete"), 3);
    for event in observer.events() {
        if let BatchEvent::BatchComplete { batch_size, .. } = event {
            assert_eq!(batch_size, 100);
        }
    }

    let metrics = processor.metrics();
    assert_eq!(metrics.total_batches, 3);
    assert_eq!(metrics.api_calls_saved, 297);
    assert_eq!(metrics.processed_items, 300);
}

/// First attempt fails, the retry succeeds: exactly one batch_retry event
/// with retry_count 1, and results are intact.
#[tokio::test]
async fn test_batch_retry_recovers() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_items_per_batch(50)
            .max_retries(3)
            .retry_delay(std::time::Duration::from_millis(1)),
    );
    let observer = Arc::new(CollectingObserver::new());
    let calls = Arc::new(AtomicU32::new(0));

    let calls_seen = calls.clone();
    let results = processor
        .process_batches(
            strings(10, 8),
            move |batch: Vec<String>| {
                let calls_seen = calls_seen.clone();
                async move {
                    if calls_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err("transient upstream failure".into());
                    }
                    Ok(batch.iter().map(|s| s.len()).collect::<Vec<_>>())
                }
            },
            ProcessOptions::new().with_observer(observer.clone()),
        )
        .await
        .unwrap();

    assert_eq!(results, vec![8; 10]);
    assert_eq!(observer.count("batch_retry"), 1);
    let retry = observer
        .events()
        .into_iter()
        .find(|e| e.name() == "batch_retry")
        .unwrap();
    assert_eq!(
        retry,
        BatchEvent::BatchRetry {
            batch_index: 0,
            retry_count: 1,
            max_retries: 3
        }
    );
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_call() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_retries(2)
            .retry_delay(std::time::Duration::from_millis(1)),
    );
    let err = processor
        .process_batches(
            strings(3, 4),
            |_batch: Vec<String>| async move {
                Err::<Vec<usize>, _>("permanently down".into())
            },
            ProcessOptions::new(),
        )
        .await
        .unwrap_err();

    match err {
        BatchError::BatchFailed {
            batch_index,
            attempts,
            ..
        } => {
            assert_eq!(batch_index, 0);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected BatchFailed, got {other:?}"),
    }
    assert_eq!(processor.metrics().failed_batches, 1);
}

/// Order is preserved end-to-end: processing is an element-wise map.
#[tokio::test]
async fn test_order_preservation() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_tokens_per_batch(64)
            .max_items_per_batch(7),
    );
    let items: Vec<String> = (0..100).map(|i| format!("item-{i:03}")).collect();
    let expected: Vec<String> = items.iter().map(|s| s.to_uppercase()).collect();

    let results = processor
        .process_batches(
            items,
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(|s| s.to_uppercase()).collect::<Vec<_>>())
            },
            ProcessOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(results, expected);
}

/// An item bigger than the whole token budget still ships, alone.
#[tokio::test]
async fn test_oversize_item_gets_its_own_batch() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_tokens_per_batch(10)
            .max_items_per_batch(50)
            .target_batch_utilization(1.0),
    );
    let observer = Arc::new(CollectingObserver::new());

    // 200-char item = 50 estimated tokens, way over the 10-token budget.
    let items = vec!["a".repeat(8), "b".repeat(200), "c".repeat(8)];
    let results = processor
        .process_batches(
            items,
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new().with_observer(observer.clone()),
        )
        .await
        .unwrap();

    assert_eq!(results, vec![8, 200, 8]);
    let sizes: Vec<usize> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            BatchEvent::BatchComplete { batch_size, .. } => Some(batch_size),
            _ => None,
        })
        .collect();
    assert!(sizes.contains(&1), "oversize item isolated: {sizes:?}");
}

#[tokio::test]
async fn test_empty_items_rejected() {
    let processor = BatchProcessor::new(BatchConfig::new());
    let err = processor
        .process_batches(
            Vec::<String>::new(),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_result_length_mismatch_is_fatal() {
    let processor = BatchProcessor::new(BatchConfig::new());
    let err = processor
        .process_batches(
            strings(4, 4),
            |_batch: Vec<String>| async move { Ok(vec![1usize]) },
            ProcessOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::ResultLengthMismatch { .. }));
}

#[tokio::test]
async fn test_abort_signal_cancels_between_batches() {
    let processor = BatchProcessor::new(BatchConfig::new().max_items_per_batch(1));
    let observer = Arc::new(CollectingObserver::new());
    let abort = ragkit::CancelToken::new();

    let trip = abort.clone();
    let err = processor
        .process_batches(
            strings(10, 4),
            move |batch: Vec<String>| {
                let trip = trip.clone();
                async move {
                    // Cancel from inside the first batch; the call must
                    // settle that batch and then stop.
                    trip.cancel();
                    Ok(batch.iter().map(String::len).collect::<Vec<_>>())
                }
            },
            ProcessOptions::new()
                .with_observer(observer.clone())
                .with_abort(abort),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::Cancelled));
    assert_eq!(observer.count("cancelled"), 1);
    assert_eq!(observer.count("batch_complete"), 1);
}

#[tokio::test]
async fn test_adaptive_sizing_respects_hard_limits() {
    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_items_per_batch(10)
            .adaptive_sizing(true),
    );
    let observer = Arc::new(CollectingObserver::new());

    processor
        .process_batches(
            strings(100, 4),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new().with_observer(observer.clone()),
        )
        .await
        .unwrap();

    for event in observer.events() {
        if let BatchEvent::BatchComplete { batch_size, .. } = event {
            assert!(batch_size <= 10);
            assert!(batch_size >= 1);
        }
    }
}

/// api_calls_saved == total_items - total_batches, and the batch count can
/// never beat ceil(items / max_items).
#[tokio::test]
async fn test_api_call_accounting() {
    for (count, max_items) in [(30usize, 7usize), (100, 100), (101, 100), (5, 1)] {
        let processor = BatchProcessor::new(
            BatchConfig::new()
                .max_items_per_batch(max_items)
                .max_tokens_per_batch(1_000_000),
        );
        processor
            .process_batches(
                strings(count, 4),
                |batch: Vec<String>| async move {
                    Ok(batch.iter().map(String::len).collect::<Vec<_>>())
                },
                ProcessOptions::new(),
            )
            .await
            .unwrap();

        let metrics = processor.metrics();
        assert_eq!(
            metrics.api_calls_saved,
            metrics.total_items - metrics.total_batches
        );
        assert!(metrics.total_batches >= count.div_ceil(max_items));
    }
}

/// Custom estimators replace the chars/4 heuristic entirely.
#[tokio::test]
async fn test_custom_estimator_drives_packing() {
    struct OneTokenEach;
    impl ragkit_batch::TokenEstimator for OneTokenEach {
        fn estimate(&self, _text: &str) -> usize {
            1
        }
    }

    let processor = BatchProcessor::new(
        BatchConfig::new()
            .max_tokens_per_batch(5)
            .max_items_per_batch(1000)
            .target_batch_utilization(1.0),
    );
    let observer = Arc::new(CollectingObserver::new());

    processor
        .process_batches(
            strings(20, 400),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new()
                .with_estimator(Arc::new(OneTokenEach))
                .with_observer(observer.clone()),
        )
        .await
        .unwrap();

    // 20 one-token items against a 5-token budget: 4 batches of 5.
    assert_eq!(observer.count("batch_complete"), 4);
}

/// The metrics reset between calls but accumulate within one.
#[tokio::test]
async fn test_metrics_reset() {
    let processor = BatchProcessor::new(BatchConfig::new().max_items_per_batch(5));
    processor
        .process_batches(
            strings(10, 4),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(processor.metrics().total_items, 10);

    processor.reset_metrics();
    assert_eq!(processor.metrics(), ragkit_batch::BatchMetrics::default());
}

/// Events arrive over a channel bridge in emission order.
#[tokio::test]
async fn test_channel_observer_bridge() {
    let (observer, mut rx) = ragkit_batch::ChannelObserver::new();
    let processor = BatchProcessor::new(BatchConfig::new().max_items_per_batch(100));

    processor
        .process_batches(
            strings(3, 4),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new().with_observer(Arc::new(observer)),
        )
        .await
        .unwrap();

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["start", "batch_complete", "progress", "complete"]
    );
}

/// Progress percentages are monotonically non-decreasing.
#[tokio::test]
async fn test_progress_is_monotonic() {
    let processor = BatchProcessor::new(BatchConfig::new().max_items_per_batch(3));
    let seen = Arc::new(Mutex::new(Vec::new()));

    struct ProgressRecorder(Arc<Mutex<Vec<f64>>>);
    impl ragkit_batch::BatchObserver for ProgressRecorder {
        fn on_event(&self, event: &BatchEvent) {
            if let BatchEvent::Progress { percentage, .. } = event {
                self.0.lock().push(*percentage);
            }
        }
    }

    processor
        .process_batches(
            strings(20, 4),
            |batch: Vec<String>| async move {
                Ok(batch.iter().map(String::len).collect::<Vec<_>>())
            },
            ProcessOptions::new().with_observer(Arc::new(ProgressRecorder(seen.clone()))),
        )
        .await
        .unwrap();

    let progress = seen.lock().clone();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!((progress.last().unwrap() - 100.0).abs() < 1e-9);
}
