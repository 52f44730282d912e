// ABOUTME: Integration tests for task wrappers running on the in-process and serverless executors
// ABOUTME: Covers partial binding, keyword-only submission, validation, and overlapping futures

use serde_json::{json, Value};
use std::sync::{Arc, Barrier};

use taskloom::executors::{Executor, ExecutorError, ServerlessConfig};
use taskloom::tasks::{kwargs, Arguments, Callable, Signature, Task, TaskChanges, TaskError};

mod common;
use common::{add_task, double_task};

fn serverless() -> Executor {
    Executor::serverless(&ServerlessConfig {
        workers: 2,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_partial_round_trip_on_every_executor() {
    for executor in [Executor::in_process(), serverless()] {
        let add = add_task().set_executor(executor).unwrap();
        let direct = add
            .call_kwargs(kwargs([("a", json!(1)), ("b", json!(2))]))
            .unwrap()
            .gather()
            .unwrap();
        let bound = add
            .partial(kwargs([("a", json!(1))]))
            .unwrap()
            .call_kwargs(kwargs([("b", json!(2))]))
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(direct, json!(3));
        assert_eq!(bound, direct);
    }
}

#[test]
fn test_serverless_returns_futures() {
    let double = double_task().set_executor(serverless()).unwrap();
    let output = double.call_kwargs(kwargs([("a", json!(4))])).unwrap();
    assert!(output.is_future());
    assert_eq!(output.gather().unwrap(), json!(8));

    let local = double_task().call_kwargs(kwargs([("a", json!(4))])).unwrap();
    assert!(!local.is_future());
}

#[test]
fn test_serverless_rejects_positional_arguments() {
    let double = double_task().set_executor("serverless").unwrap();
    let err = double.call(Arguments::positional(vec![json!(1)])).unwrap_err();
    assert!(matches!(
        err,
        TaskError::Executor(ExecutorError::PositionalArgsRejected { count: 1, .. })
    ));

    // The in-process executor binds positionals onto the signature.
    let local = double_task()
        .call(Arguments::positional(vec![json!(5)]))
        .unwrap()
        .gather()
        .unwrap();
    assert_eq!(local, json!(10));
}

#[test]
fn test_serverless_calls_overlap() {
    let barrier = Arc::new(Barrier::new(2));
    let wait = Arc::clone(&barrier);
    let rendezvous = Task::from_fn("rendezvous", Signature::from_names(&["tag"]), move |kw| {
        // Completes only when both calls are running at the same time.
        wait.wait();
        Ok(kw.get("tag").cloned().unwrap_or(Value::Null))
    })
    .set_executor(serverless())
    .unwrap();

    let first = rendezvous.call_kwargs(kwargs([("tag", json!("a"))])).unwrap();
    let second = rendezvous.call_kwargs(kwargs([("tag", json!("b"))])).unwrap();
    assert_eq!(first.gather().unwrap(), json!("a"));
    assert_eq!(second.gather().unwrap(), json!("b"));
}

#[test]
fn test_mapvalues_on_serverless() {
    let double = double_task().set_executor(serverless()).unwrap();
    let pairs = double
        .mapvalues(
            &["a"],
            vec![(json!("x"), json!(1)), (json!("y"), json!({"a": 2}))],
        )
        .unwrap()
        .gather()
        .unwrap();
    assert_eq!(pairs, vec![(json!("x"), json!(2)), (json!("y"), json!(4))]);
}

#[test]
fn test_validators_follow_the_task_to_the_worker() {
    let positive = Task::builder(Callable::new(
        "positive",
        Signature::from_names(&["n"]),
        |kw| Ok(kw.get("n").cloned().unwrap_or(Value::Null)),
    ))
    .with_prevalidator("n", |value| match value.as_i64() {
        Some(n) if n > 0 => Ok(value),
        _ => Err("must be positive".to_string()),
    })
    .build()
    .unwrap();

    for executor in [Executor::in_process(), serverless()] {
        let task = positive.set_executor(executor).unwrap();

        // validate=false: the prevalidator is configured but never applied.
        let unchecked = task
            .call_kwargs(kwargs([("n", json!(-1))]))
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(unchecked, json!(-1));

        let checked = task
            .validated()
            .call_kwargs(kwargs([("n", json!(-1))]))
            .and_then(|output| output.gather())
            .unwrap_err();
        assert!(checked.is_validation());
    }
}

#[test]
fn test_derived_instances_leave_original_untouched() {
    let original = add_task();
    let validated = original.replace(TaskChanges {
        validate: Some(true),
        ..Default::default()
    });
    let moved = original.set_executor("serverless").unwrap();
    let bound = original.partial(kwargs([("a", json!(1))])).unwrap();

    assert!(!original.validate());
    assert!(validated.validate());
    assert_eq!(original.executor().name(), "in_process");
    assert_eq!(moved.executor().name(), "serverless");
    assert!(original.signature().get("a").unwrap().default.is_none());
    assert_eq!(bound.signature().get("a").unwrap().default, Some(json!(1)));
}
