// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! End-to-end tests for pipeline execution semantics.

use ragkit::{
    CancelToken, Error, ExecuteOptions, NodeContext, NodeInput, Pipeline,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn int_of(input: &NodeInput, dep: &str) -> i64 {
    input.dependency(dep).and_then(Value::as_i64).unwrap_or(0)
}

#[tokio::test]
async fn test_single_sink_chain_returns_sink_value() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("a", |input: NodeInput, _ctx: NodeContext| async move {
            Ok(json!(input.into_value().as_i64().unwrap_or(0) + 1))
        })
        .unwrap();
    pipeline
        .add_node("b", |input: NodeInput, _ctx: NodeContext| async move {
            Ok(json!(int_of(&input, "a") * 2))
        })
        .unwrap();
    pipeline.connect("a", "b").unwrap();

    let result = pipeline.run(json!(3)).await.unwrap();
    assert_eq!(result, json!(8));
}

#[tokio::test]
async fn test_cycle_is_rejected_with_forward_path() {
    let mut pipeline = Pipeline::new();
    for id in ["a", "b", "c"] {
        pipeline
            .add_node(id, |input: NodeInput, _ctx| async move {
                Ok(input.into_value())
            })
            .unwrap();
    }
    pipeline.connect("a", "b").unwrap();
    pipeline.connect("b", "c").unwrap();
    pipeline.connect("c", "a").unwrap();

    let err = pipeline.validate().unwrap_err();
    match err {
        Error::Cycle { path } => assert_eq!(path, vec!["a", "b", "c", "a"]),
        other => panic!("expected Cycle, got {other:?}"),
    }

    // The same cycle escaping execute() keeps its path behind the wrapper.
    let err = pipeline.run(json!(0)).await.unwrap_err();
    match err.root() {
        Error::Cycle { path } => assert_eq!(path, &["a", "b", "c", "a"]),
        other => panic!("expected wrapped Cycle, got {other:?}"),
    }
}

fn diamond_with_failing_left() -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("source", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();
    pipeline
        .add_node("left", |_input: NodeInput, _ctx| async move {
            Err(Error::InvalidArgument("left branch exploded".into()))
        })
        .unwrap();
    pipeline
        .add_node("right", |_input: NodeInput, _ctx| async move { Ok(json!("right-ok")) })
        .unwrap();
    pipeline
        .add_node("sink", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();
    pipeline.connect("source", "left").unwrap();
    pipeline.connect("source", "right").unwrap();
    pipeline.connect("left", "sink").unwrap();
    pipeline.connect("right", "sink").unwrap();
    pipeline
}

#[tokio::test]
async fn test_graceful_degradation_returns_partial_map() {
    let pipeline = diamond_with_failing_left();
    let result = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!("doc"))
                .with_graceful_degradation(),
        )
        .await
        .unwrap();

    let map = result.as_object().unwrap();
    assert_eq!(map["source"], json!("doc"));
    assert_eq!(map["right"], json!("right-ok"));
    assert!(!map.contains_key("left"));
    assert!(!map.contains_key("sink"), "sink depends on the failed branch");
}

#[tokio::test]
async fn test_required_node_failure_is_aggregate() {
    let pipeline = diamond_with_failing_left();
    let err = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!("doc"))
                .with_graceful_degradation()
                .with_required_nodes(["sink"]),
        )
        .await
        .unwrap_err();

    match err.root() {
        Error::Aggregate { errors } => {
            assert!(errors.iter().any(|e| e.node_id == "left"));
        }
        other => panic!("expected Aggregate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_error_aborts_without_degradation() {
    let pipeline = diamond_with_failing_left();
    let err = pipeline.run(json!("doc")).await.unwrap_err();
    match err.root() {
        Error::NodeFailure { id, message } => {
            assert_eq!(id, "left");
            assert!(message.contains("left branch exploded"));
        }
        other => panic!("expected NodeFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_multiple_sinks_return_object() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("src", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();
    pipeline
        .add_node("upper", |input: NodeInput, _ctx| async move {
            let s = input
                .dependency("src")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            Ok(json!(s))
        })
        .unwrap();
    pipeline
        .add_node("len", |input: NodeInput, _ctx| async move {
            let n = input
                .dependency("src")
                .and_then(Value::as_str)
                .map_or(0, str::len);
            Ok(json!(n))
        })
        .unwrap();
    pipeline.connect("src", "upper").unwrap();
    pipeline.connect("src", "len").unwrap();

    let result = pipeline.run(json!("abc")).await.unwrap();
    assert_eq!(result, json!({"upper": "ABC", "len": 3}));
}

#[tokio::test]
async fn test_retry_recovers_flaky_node() {
    let attempts = Arc::new(AtomicU32::new(0));
    let seen = attempts.clone();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("flaky", move |input: NodeInput, _ctx: NodeContext| {
            let seen = seen.clone();
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::InvalidArgument("transient".into()))
                } else {
                    Ok(input.into_value())
                }
            }
        })
        .unwrap();

    // Retry mode switches the return shape to the full results map.
    let result = pipeline
        .execute(ExecuteOptions::new().with_seed(json!(7)).with_retries(3))
        .await
        .unwrap();
    assert_eq!(result, json!({"flaky": 7}));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_exhausted_reports_node_failure() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("broken", |_input: NodeInput, _ctx| async move {
            Err::<Value, _>(Error::InvalidArgument("always".into()))
        })
        .unwrap();

    let err = pipeline
        .execute(ExecuteOptions::new().with_seed(json!(1)).with_retries(2))
        .await
        .unwrap_err();
    match err.root() {
        Error::NodeFailure { id, .. } => assert_eq!(id, "broken"),
        other => panic!("expected NodeFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_execution_matches_sequential() {
    fn build() -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline
            .add_node("src", |input: NodeInput, _ctx| async move {
                Ok(input.into_value())
            })
            .unwrap();
        for id in ["w1", "w2", "w3"] {
            pipeline
                .add_node(id, move |input: NodeInput, _ctx| async move {
                    Ok(json!(int_of(&input, "src") + 1))
                })
                .unwrap();
            pipeline.connect("src", id).unwrap();
        }
        pipeline
            .add_node("sum", |input: NodeInput, _ctx| async move {
                let total = int_of(&input, "w1") + int_of(&input, "w2") + int_of(&input, "w3");
                Ok(json!(total))
            })
            .unwrap();
        for id in ["w1", "w2", "w3"] {
            pipeline.connect(id, "sum").unwrap();
        }
        pipeline
    }

    let sequential = build().run(json!(10)).await.unwrap();
    let concurrent = build()
        .execute(
            ExecuteOptions::new()
                .with_seed(json!(10))
                .with_max_concurrency(3),
        )
        .await
        .unwrap();
    assert_eq!(sequential, json!(33));
    assert_eq!(concurrent, sequential);
}

#[tokio::test]
async fn test_concurrent_failures_aggregate() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("bad1", |_input: NodeInput, _ctx| async move {
            Err::<Value, _>(Error::InvalidArgument("first".into()))
        })
        .unwrap();
    pipeline
        .add_node("bad2", |_input: NodeInput, _ctx| async move {
            Err::<Value, _>(Error::InvalidArgument("second".into()))
        })
        .unwrap();

    let err = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!(0))
                .with_max_concurrency(2),
        )
        .await
        .unwrap_err();
    match err.root() {
        Error::Aggregate { errors } => {
            assert_eq!(errors.len(), 2);
            let ids: Vec<&str> = errors.iter().map(|e| e.node_id.as_str()).collect();
            assert!(ids.contains(&"bad1"));
            assert!(ids.contains(&"bad2"));
        }
        other => panic!("expected Aggregate, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_wall_clock_timeout_cancels_cooperatively() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("slow", |_input: NodeInput, ctx: NodeContext| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            Ok(json!("never"))
        })
        .unwrap();

    let err = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!(0))
                .with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::ExecutionTimeout { .. }));
}

#[tokio::test]
async fn test_external_cancellation() {
    let token = CancelToken::new();
    token.cancel();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("work", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();

    let err = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!(1))
                .with_cancel_token(token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::Cancelled));
}

/// Chain a -> b -> c where b fails until repaired; first run checkpoints,
/// resume finishes the tail without re-running a.
#[tokio::test]
async fn test_checkpoint_then_resume_completes_the_tail() {
    let a_runs = Arc::new(AtomicU32::new(0));
    let b_healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut pipeline = Pipeline::new();
    {
        let a_runs = a_runs.clone();
        pipeline
            .add_node("a", move |input: NodeInput, _ctx: NodeContext| {
                let a_runs = a_runs.clone();
                async move {
                    a_runs.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(input.into_value().as_i64().unwrap_or(0) + 1))
                }
            })
            .unwrap();
    }
    {
        let b_healthy = b_healthy.clone();
        pipeline
            .add_node("b", move |input: NodeInput, _ctx: NodeContext| {
                let b_healthy = b_healthy.clone();
                async move {
                    if b_healthy.load(Ordering::SeqCst) {
                        Ok(json!(int_of(&input, "a") * 2))
                    } else {
                        Err(Error::InvalidArgument("b is down".into()))
                    }
                }
            })
            .unwrap();
    }
    pipeline
        .add_node("c", |input: NodeInput, _ctx| async move {
            Ok(json!(int_of(&input, "b") + 100))
        })
        .unwrap();
    pipeline.connect("a", "b").unwrap();
    pipeline.connect("b", "c").unwrap();

    let partial = pipeline
        .execute(
            ExecuteOptions::new()
                .with_seed(json!(3))
                .with_graceful_degradation()
                .with_checkpointing("run-1"),
        )
        .await
        .unwrap();
    let map = partial.as_object().unwrap();
    assert_eq!(map["a"], json!(4));
    assert!(!map.contains_key("b"));

    let checkpoint = pipeline.load_checkpoint("run-1").await.unwrap().unwrap();
    assert_eq!(checkpoint.results["a"], json!(4));
    assert!(checkpoint.errors.contains_key("b"));

    // Repair b, resume from the snapshot.
    b_healthy.store(true, Ordering::SeqCst);
    let resumed = pipeline.resume(&checkpoint, Some(json!(3))).await.unwrap();
    let map = resumed.as_object().unwrap();
    assert_eq!(map["a"], json!(4));
    assert_eq!(map["b"], json!(8));
    assert_eq!(map["c"], json!(108));

    // The checkpointed node was rehydrated, not re-executed.
    assert_eq!(a_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resume_silently_skips_unsatisfied_nodes() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_node("a", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();
    pipeline
        .add_node("b", |_input: NodeInput, _ctx| async move {
            Err::<Value, _>(Error::InvalidArgument("still broken".into()))
        })
        .unwrap();
    pipeline
        .add_node("c", |input: NodeInput, _ctx| async move {
            Ok(input.into_value())
        })
        .unwrap();
    pipeline.connect("a", "b").unwrap();
    pipeline.connect("b", "c").unwrap();

    let checkpoint = ragkit::Checkpoint::new(
        "run-2",
        [("a".to_string(), json!(1))].into_iter().collect(),
        Default::default(),
    );
    let resumed = pipeline.resume(&checkpoint, None).await.unwrap();
    let map = resumed.as_object().unwrap();
    assert_eq!(map["a"], json!(1));
    assert!(!map.contains_key("b"), "b still fails");
    assert!(!map.contains_key("c"), "c's dependency is missing, skipped silently");
}

#[tokio::test]
async fn test_execute_resumes_from_stored_checkpoint() {
    let runs = Arc::new(AtomicU32::new(0));

    let mut pipeline = Pipeline::new();
    {
        let runs = runs.clone();
        pipeline
            .add_node("expensive", move |input: NodeInput, _ctx: NodeContext| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(input.into_value())
                }
            })
            .unwrap();
    }
    pipeline
        .add_node("finish", |input: NodeInput, _ctx| async move {
            Ok(json!(int_of(&input, "expensive") + 1))
        })
        .unwrap();
    pipeline.connect("expensive", "finish").unwrap();

    pipeline
        .save_checkpoint(
            "warm",
            [("expensive".to_string(), json!(41))].into_iter().collect(),
            Default::default(),
        )
        .await
        .unwrap();

    let result = pipeline
        .execute(ExecuteOptions::new().with_seed(json!(0)).with_resume("warm"))
        .await
        .unwrap();
    let map = result.as_object().unwrap();
    assert_eq!(map["finish"], json!(42));
    assert_eq!(runs.load(Ordering::SeqCst), 0, "stored result is trusted");
}
