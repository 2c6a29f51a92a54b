//! Test: YAML definitions - builtin middleware through both engines

use hookflow::builtin::PipelineDefinition;
use hookflow::prelude::*;
use serde_json::json;

#[tokio::test]
async fn test_waterfall_definition() {
    let yaml = r#"
name: "Test: Pricing"
description: "Apply discounts in order"

initial:
  role: member
  price: 100

middleware:
  - name: member_discount
    kind: multiply
    path: price
    value: 0.9
    when:
      path: role
      matches: "^(member|admin)$"

  - name: guest_block
    kind: finish
    value: {blocked: true}
    when:
      path: role
      matches: "^guest$"

  - name: audit
    kind: append
    path: log
    value: priced

  - name: noop
    kind: ignore
"#;

    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    let built = definition.build().unwrap();

    let report = built
        .run(&definition.name, definition.initial.clone(), definition.context.clone())
        .await;
    assert!(report.succeeded(), "{:?}", report.error);
    assert_eq!(
        report.value,
        Some(json!({"role": "member", "price": 90, "log": ["priced"]}))
    );
    assert_eq!(report.handled, 2);
    assert_eq!(report.ignored, 2);

    let report = built
        .run(&definition.name, json!({"role": "guest", "price": 100}), json!(null))
        .await;
    assert_eq!(report.value, Some(json!({"blocked": true})));
}

#[tokio::test]
async fn test_parallel_definition_with_limit() {
    let yaml = r#"
name: "Test: Tagging"
kind: parallel
settings:
  executions_count_limit: 1

initial: {}

middleware:
  - name: foo
    kind: set
    path: foo
    value: 123
  - name: bar
    kind: set
    path: bar
    value: 456
"#;

    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    let built = definition.build().unwrap();

    let report = built.run(&definition.name, json!({}), json!(null)).await;
    assert_eq!(report.kind, PipelineKind::Parallel);
    assert_eq!(report.value, Some(json!({"foo": 123, "bar": 456})));
    assert_eq!(report.patches.len(), 2);

    let report = built.run(&definition.name, json!({}), json!(null)).await;
    assert!(!report.succeeded());
    assert!(report.error.unwrap().contains("executions count limit of 1"));
}

#[tokio::test]
async fn test_early_result_declaration() {
    let yaml = r#"
name: "Test: Early"
initial: 1
middleware:
  - name: bail
    kind: early
    value: 99
  - name: never
    kind: set
    path: x
    value: 1
"#;

    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    let report = definition
        .build()
        .unwrap()
        .run(&definition.name, definition.initial.clone(), json!(null))
        .await;

    assert!(report.succeeded());
    assert_eq!(report.value, Some(json!(99)));
}

#[test]
fn test_parallel_ignore_is_accepted_at_build_time() {
    let yaml = r#"
name: "Test: Ignore"
kind: parallel
middleware:
  - name: shrug
    kind: ignore
"#;

    let definition = PipelineDefinition::from_yaml(yaml).unwrap();
    assert!(definition.build().is_ok());
}

#[test]
fn test_invalid_declarations() {
    let unknown = r#"
name: "Test: Unknown"
middleware:
  - name: warp
    kind: teleport
"#;
    let err = PipelineDefinition::from_yaml(unknown).unwrap_err();
    let root = err.root_cause().downcast_ref::<HookError>();
    assert!(matches!(root, Some(HookError::InvalidMiddlewareKind(kind)) if kind == "teleport"));

    let unnamed = r#"
name: "Test: Unnamed"
middleware:
  - kind: exit
"#;
    let err = PipelineDefinition::from_yaml(unnamed).unwrap_err();
    let root = err.root_cause().downcast_ref::<HookError>();
    assert!(matches!(root, Some(HookError::InvalidMiddlewareName)));
}
