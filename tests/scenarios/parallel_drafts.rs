//! Test: Parallel drafts - independent edits committed in one step

use crate::helpers::*;
use hookflow::core::{PatchOp, PathSegment};
use hookflow::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u32,
    items: Vec<String>,
    total: f64,
    #[serde(default)]
    flags: Vec<String>,
}

fn order() -> Order {
    Order {
        id: 7,
        items: vec!["apple".into(), "pear".into()],
        total: 10.0,
        flags: Vec::new(),
    }
}

/// `draft.foo = 123` and `draft.bar = 456` on `{}`
#[test]
fn test_independent_edits_are_merged() {
    let log = CallLog::new();
    let hook = Parallel::<Value, ()>::default();
    hook.register(recording_setter(&log, "foo", "foo", json!(123))).unwrap();
    hook.register(recording_setter(&log, "bar", "bar", json!(456))).unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload, json!({"foo": 123, "bar": 456}));
    assert_calls(&log, &["foo", "bar"]);
}

#[test]
fn test_empty_ledger_leaves_payload_untouched() {
    let hook = Parallel::<Order, ()>::default();
    let mut payload = order();
    hook.exec(&mut payload, ()).unwrap();
    assert_eq!(payload, order());
    assert!(hook.last_patches().is_empty());
}

#[test]
fn test_typed_payload_edits() {
    let hook = Parallel::<Order, ()>::default();
    hook.register(ParallelMiddleware::named(
        "add_item",
        |draft: &mut Order, _ctx: &(), _info: &ExecutionInfo<Order>| {
            draft.items.push("plum".into());
            draft.total += 2.5;
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();
    hook.register(ParallelMiddleware::named(
        "drop_first",
        |draft: &mut Order, _ctx: &(), _info: &ExecutionInfo<Order>| {
            assert_eq!(draft.items.len(), 2, "drafts start from the pristine payload");
            draft.flags.push("reviewed".into());
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();

    let mut payload = order();
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload.items, vec!["apple", "pear", "plum"]);
    assert_eq!(payload.total, 12.5);
    assert_eq!(payload.flags, vec!["reviewed"]);

    let patches = hook.last_patches();
    assert!(patches
        .iter()
        .any(|p| p.op == PatchOp::Add && p.path == vec![PathSegment::Key("items".into()), PathSegment::Index(2)]));
}

/// A middleware that fails contributes nothing, earlier ones still land
#[test]
fn test_failure_keeps_completed_edits() {
    let log = CallLog::new();
    let hook = Parallel::<Value, ()>::default();
    hook.register(recording_setter(&log, "first", "first", json!(true))).unwrap();
    hook.register(ParallelMiddleware::named(
        "broken",
        |draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| {
            draft["partial"] = json!(1);
            anyhow::bail!("foo")
        },
    ))
    .unwrap();
    hook.register(recording_setter(&log, "never", "never", json!(true))).unwrap();

    let mut payload = json!({});
    let err = hook.exec(&mut payload, ()).unwrap_err();

    assert_eq!(err.middleware_source().unwrap().to_string(), "foo");
    assert_eq!(payload, json!({"first": true}));
    assert_calls(&log, &["first"]);
}

/// The finishing middleware never completes, so only earlier edits land
#[test]
fn test_finish_drops_own_edits_and_stops() {
    let log = CallLog::new();
    let hook = Parallel::<Value, ()>::default();
    hook.register(recording_setter(&log, "a", "a", json!(1))).unwrap();
    hook.register(ParallelMiddleware::named(
        "closer",
        |draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| {
            draft["closed"] = json!(true);
            Ok(info.finish(json!("done")))
        },
    ))
    .unwrap();
    hook.register(recording_setter(&log, "b", "b", json!(2))).unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload, json!({"a": 1}));
    assert_calls(&log, &["a"]);

    let terminal = hook.last_terminal().unwrap();
    assert_eq!(terminal.value, Some(json!("done")));
    assert_eq!(terminal.handled + terminal.ignored, 3);
}

#[test]
fn test_early_result_drops_own_edits() {
    let hook = Parallel::<Value, ()>::default();
    hook.register(ParallelMiddleware::named(
        "early",
        |draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| {
            draft["leaked"] = json!(true);
            Err(anyhow::Error::new(EarlyResult::new(json!("done"))))
        },
    ))
    .unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload, json!({}));
    assert!(hook.last_patches().is_empty());
    assert_eq!(hook.last_terminal().unwrap().value, Some(json!("done")));
}

/// Two drafts popping the same list must not sink unrelated edits
#[test]
fn test_overlapping_pops_commit_cleanly() {
    fn pop(draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>) -> anyhow::Result<Outcome<Value>> {
        if let Some(list) = draft["list"].as_array_mut() {
            list.pop();
        }
        Ok(Outcome::Pass)
    }

    let log = CallLog::new();
    let hook = Parallel::<Value, ()>::default();
    hook.register(ParallelMiddleware::named("a", pop)).unwrap();
    hook.register(ParallelMiddleware::named("b", pop)).unwrap();
    hook.register(recording_setter(&log, "c", "other", json!(1))).unwrap();

    let mut payload = json!({"list": [1, 2, 3]});
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload, json!({"list": [1, 2], "other": 1}));
    assert_eq!(hook.last_patches().len(), 3);
    assert_eq!(hook.last_terminal().unwrap().handled, 3);
}

/// Infos kept past the end of the run report the terminal snapshot
#[test]
fn test_infos_see_terminal_counts() {
    let kept: Arc<Mutex<Vec<ExecutionInfo<Value>>>> = Arc::default();

    let hook = Parallel::<Value, ()>::default();
    for name in ["a", "b", "c"] {
        let kept = Arc::clone(&kept);
        hook.register(ParallelMiddleware::named(
            name,
            move |draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| {
                assert!(!info.finished());
                if info.index() != 1 {
                    draft[name] = json!(true);
                }
                kept.lock().unwrap().push(info.clone());
                Ok(Outcome::Pass)
            },
        ))
        .unwrap();
    }

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();

    let kept = kept.lock().unwrap();
    assert_eq!(kept.len(), 3);
    for info in kept.iter() {
        assert!(info.finished());
        assert_eq!(info.finished_value(), Some(json!({"a": true, "c": true})));
        assert_eq!(info.handled_count(), 2);
        assert_eq!(info.ignored_count(), 1);
        assert!(info.finished_error().is_none());
    }
}

#[test]
fn test_infos_see_terminal_error() {
    let kept: Arc<Mutex<Vec<ExecutionInfo<Value>>>> = Arc::default();
    let first = Arc::clone(&kept);
    let second = Arc::clone(&kept);

    let hook = Parallel::<Value, ()>::default();
    hook.register(ParallelMiddleware::named(
        "writer",
        move |draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| {
            draft["written"] = json!(true);
            first.lock().unwrap().push(info.clone());
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();
    hook.register(ParallelMiddleware::named(
        "broken",
        move |_draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| {
            second.lock().unwrap().push(info.clone());
            anyhow::bail!("foo")
        },
    ))
    .unwrap();
    hook.register(ParallelMiddleware::named(
        "unreached",
        |_draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| Ok(Outcome::Pass),
    ))
    .unwrap();

    let mut payload = json!({});
    assert!(hook.exec(&mut payload, ()).is_err());
    assert_eq!(payload, json!({"written": true}));

    let kept = kept.lock().unwrap();
    assert_eq!(kept.len(), 2);
    for info in kept.iter() {
        assert!(info.finished());
        assert!(info.finished_value().is_none());
        assert!(info.finished_error().unwrap().contains("foo"));
        assert_eq!(info.handled_count() + info.ignored_count(), 3);
        assert_eq!(info.handled_count(), 1);
    }
}

/// Later middleware can see what earlier ones committed
#[test]
fn test_accumulated_patches_are_visible() {
    let hook = Parallel::<Value, ()>::default();
    hook.register(ParallelMiddleware::named(
        "writer",
        |draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| {
            draft["x"] = json!(1);
            draft["y"] = json!(2);
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();
    hook.register(ParallelMiddleware::named(
        "reader",
        |draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| {
            let seen = info.accumulated_patches().len();
            draft["seen"] = json!(seen);
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();
    assert_eq!(payload["seen"], 2);
}

#[test]
fn test_return_on_first_mutation() {
    let log = CallLog::new();
    let hook = Parallel::<Value, ()>::new(HookOptions::new().with_return_on_first(true));
    hook.register(ParallelMiddleware::named(
        "reader",
        |_draft: &mut Value, _ctx: &(), _info: &ExecutionInfo<Value>| Ok(Outcome::Pass),
    ))
    .unwrap();
    hook.register(recording_setter(&log, "winner", "winner", json!(true))).unwrap();
    hook.register(recording_setter(&log, "loser", "loser", json!(true))).unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, ()).unwrap();

    assert_eq!(payload, json!({"winner": true}));
    assert_calls(&log, &["winner"]);
}

#[test]
fn test_scalar_payload_is_replaced() {
    let hook = Parallel::<i64, ()>::default();
    hook.register(ParallelMiddleware::named(
        "bump",
        |draft: &mut i64, _ctx: &(), _info: &ExecutionInfo<i64>| {
            *draft += 1;
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();

    let mut payload = 41;
    hook.exec(&mut payload, ()).unwrap();
    assert_eq!(payload, 42);
}

#[test]
fn test_ignore_is_rejected_at_run_time() {
    let hook = Parallel::<Value, ()>::default();
    hook.register(ParallelMiddleware::named(
        "polite",
        |_draft: &mut Value, _ctx: &(), info: &ExecutionInfo<Value>| Ok(info.ignore()),
    ))
    .unwrap();

    let mut payload = json!({});
    let err = hook.exec(&mut payload, ()).unwrap_err();
    assert!(matches!(err, HookError::UnsupportedControl { control: "ignore", .. }));
}

#[test]
fn test_context_is_shared_with_every_middleware() {
    #[derive(Debug)]
    struct Tenant {
        name: &'static str,
    }

    let hook = Parallel::<Value, Tenant>::default();
    hook.register(ParallelMiddleware::named(
        "stamp",
        |draft: &mut Value, ctx: &Tenant, _info: &ExecutionInfo<Value>| {
            draft["tenant"] = json!(ctx.name);
            Ok(Outcome::Pass)
        },
    ))
    .unwrap();

    let mut payload = json!({});
    hook.exec(&mut payload, Tenant { name: "acme" }).unwrap();
    assert_eq!(payload, json!({"tenant": "acme"}));
}
