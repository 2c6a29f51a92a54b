//! Test: Factory context - shared limits, instrumentation and validation

use crate::helpers::*;
use hookflow::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

async fn add_one(value: Value, _ctx: Arc<()>, _info: ExecutionInfo<Value>) -> anyhow::Result<Outcome<Value>> {
    let n = value["n"].as_i64().unwrap_or_default();
    Ok(Outcome::Value(json!({ "n": n + 1 })))
}

fn mark(draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>) -> anyhow::Result<Outcome<Value>> {
    draft["marked"] = json!(true);
    Ok(Outcome::Pass)
}

/// A limit of 1 rejects the second run of any pipeline on the context
#[tokio::test]
async fn test_limit_spans_pipeline_kinds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let hooks = Hooks::<Value, ()>::new(HookOptions::new().with_executions_count_limit(1));
    let waterfall = hooks.waterfall();
    let parallel = hooks.parallel();

    waterfall.register(WaterfallMiddleware::from_fn(add_one)).unwrap();
    parallel
        .register(ParallelMiddleware::named(
            "counted",
            move |_draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::Pass)
            },
        ))
        .unwrap();

    assert_eq!(waterfall.exec(json!({"n": 0}), ()).await.unwrap(), json!({"n": 1}));

    let mut payload = json!({});
    let err = parallel.exec(&mut payload, ()).unwrap_err();
    assert!(matches!(err, HookError::ExecutionLimitExceeded { limit: 1, next: 2 }));
    assert_eq!(
        err.to_string(),
        "This plugin has a executions count limit of 1.\nThe next run count would be 2."
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Rejected runs never move the counter
    assert!(waterfall.exec(json!({}), ()).await.is_err());
    assert_eq!(hooks.context().last_execution_start_count(), 1);
    assert_eq!(hooks.context().last_execution_end_count(), 1);
}

#[tokio::test]
async fn test_end_count_includes_failed_runs() {
    let hook = Waterfall::<i64, ()>::default();
    hook.register(WaterfallMiddleware::named(
        "fails",
        |_v: i64, _ctx: Arc<()>, _info: ExecutionInfo<i64>| async move { Err(anyhow::anyhow!("nope")) },
    ))
    .unwrap();

    assert!(hook.exec(1, ()).await.is_err());
    assert!(hook.exec(1, ()).await.is_err());
    assert_eq!(hook.factory().last_execution_start_count(), 2);
    assert_eq!(hook.factory().last_execution_end_count(), 2);
}

/// Registrations through any pipeline land in the shared list
#[test]
fn test_shared_registration_list() {
    let hooks = Hooks::<Value, ()>::default();
    let first = hooks.parallel();
    let second = hooks.parallel();

    let p1 = ParallelMiddleware::from_fn(mark);
    let info = first.register(p1.clone()).unwrap();
    assert_eq!(info.index, 0);

    let info = second.register(p1.clone()).unwrap();
    assert_eq!(info.index, 0);
    assert_eq!(info.existing.len(), 2);
    assert_eq!(second.get_handler_index(&p1), Some(0));
}

/// Start and end hooks see every call and can replace the running value
#[tokio::test]
async fn test_waterfall_instrumentation() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let starts = Arc::clone(&seen);
    let ends = Arc::clone(&seen);

    let hook = Waterfall::<i64, ()>::new(
        HookOptions::new()
            .with_on_exec_start(move |payload: ExecPayload<i64, ()>| {
                starts
                    .lock()
                    .unwrap()
                    .push(format!("start {} {} {}", payload.kind, payload.middleware.name, payload.current));
                HookReturn::Keep
            })
            .with_on_exec_end(move |payload: ExecPayload<i64, ()>| {
                ends.lock()
                    .unwrap()
                    .push(format!("end {} {}", payload.middleware.name, payload.current));
                // Deferred values are awaited before the next middleware
                HookReturn::Deferred(Box::pin(async move {
                    tokio::task::yield_now().await;
                    Some(payload.current + 1)
                }))
            }),
    );

    let log = CallLog::new();
    hook.register(recording_multiplier(&log, "double", 2)).unwrap();
    hook.register(recording_multiplier(&log, "triple", 3)).unwrap();

    // (1*2 + 1) * 3 + 1
    assert_eq!(hook.exec(1, ()).await.unwrap(), 10);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "start waterfall double 1",
            "end double 2",
            "start waterfall triple 3",
            "end triple 9",
        ]
    );
}

#[test]
fn test_parallel_start_hook_feeds_the_draft() {
    let hook = Parallel::<Value, ()>::new(HookOptions::new().with_on_exec_start(
        |payload: ExecPayload<Value, ()>| {
            let mut value = payload.current;
            value["via"] = json!(payload.middleware.name.to_string());
            HookReturn::Replace(value)
        },
    ));
    hook.register(ParallelMiddleware::from_fn(mark)).unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();
    assert_eq!(payload, json!({"via": "mark", "marked": true}));
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Counter {
    n: u32,
}

/// The value a run settles on must keep the declared shape
#[tokio::test]
async fn test_shape_validation() {
    let hook = Waterfall::<Value, ()>::new(HookOptions::new().with_validator(SerdeShape::<Counter>::new()));
    hook.register(WaterfallMiddleware::from_fn(add_one)).unwrap();
    hook.register(WaterfallMiddleware::named(
        "corrupt",
        |_v: Value, _ctx: Arc<()>, _info: ExecutionInfo<Value>| async move {
            Ok(Outcome::Value(json!({"n": "many"})))
        },
    ))
    .unwrap();

    let err = hook.exec(json!({"n": 0}), ()).await.unwrap_err();
    match err {
        HookError::ShapeValidation { reason } => {
            assert!(reason.contains("invalid type"));
        }
        other => panic!("Expected shape validation error, got {:?}", other),
    }
}

/// Parallel runs validate the committed payload, not each draft
#[test]
fn test_parallel_validates_committed_payload() {
    let hook = Parallel::<Value, ()>::new(HookOptions::new().with_validator(SerdeShape::<Counter>::new()));
    hook.register(ParallelMiddleware::named(
        "drop_n",
        |draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| {
            draft.as_object_mut().map(|map| map.remove("n"));
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();

    let mut payload = json!({"n": 1});
    let err = hook.exec(&mut payload, ()).unwrap_err();
    assert!(matches!(err, HookError::ShapeValidation { .. }));
    assert_eq!(payload, json!({}));
    assert!(hook.last_terminal().unwrap().is_error());

    let hook = Parallel::<Value, ()>::new(HookOptions::new().with_validator(SerdeShape::<Counter>::new()));
    hook.register(ParallelMiddleware::from_fn(mark)).unwrap();

    let mut payload = json!({"n": 1});
    hook.exec(&mut payload, ()).unwrap();
    assert_eq!(payload, json!({"n": 1, "marked": true}));
}
