// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a YAML spec builder and a registry of small arithmetic tasks

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::path::Path;
use tokio::fs;

use taskloom::tasks::{KnownTasks, Kwargs, ParamKind, Parameter, Signature, Task, TaskError};

pub struct TestSpecBuilder {
    id: String,
    instances: Vec<TestInstance>,
}

pub struct TestInstance {
    pub id: String,
    pub name: String,
    pub task: String,
    pub partial: Map<String, Value>,
    pub map: Option<(Value, Value)>,
    pub mapvalues: Option<(Value, Value)>,
}

impl TestInstance {
    pub fn new(id: &str, task: &str) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Step {}", id),
            task: task.to_string(),
            partial: Map::new(),
            map: None,
            mapvalues: None,
        }
    }

    pub fn with_partial(mut self, argument: &str, value: Value) -> Self {
        self.partial.insert(argument.to_string(), value);
        self
    }

    pub fn with_map(mut self, argnames: Value, argvalues: Value) -> Self {
        self.map = Some((argnames, argvalues));
        self
    }

    pub fn with_mapvalues(mut self, argnames: Value, argvalues: Value) -> Self {
        self.mapvalues = Some((argnames, argvalues));
        self
    }

    fn to_value(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("name".to_string(), json!(self.name));
        doc.insert("id".to_string(), json!(self.id));
        doc.insert("task".to_string(), json!(self.task));
        if !self.partial.is_empty() {
            doc.insert("partial".to_string(), Value::Object(self.partial.clone()));
        }
        if let Some((argnames, argvalues)) = &self.map {
            doc.insert(
                "map".to_string(),
                json!({"argnames": argnames, "argvalues": argvalues}),
            );
        }
        if let Some((argnames, argvalues)) = &self.mapvalues {
            doc.insert(
                "mapvalues".to_string(),
                json!({"argnames": argnames, "argvalues": argvalues}),
            );
        }
        Value::Object(doc)
    }
}

impl TestSpecBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            instances: Vec::new(),
        }
    }

    pub fn with_instance(mut self, instance: TestInstance) -> Self {
        self.instances.push(instance);
        self
    }

    /// Adds a `double` instance reading `a` from each upstream id in turn (summed via `add`
    /// when there are two).
    pub fn add_reader(self, id: &str, upstream: &[&str]) -> Self {
        let instance = match upstream {
            [] => TestInstance::new(id, "double").with_partial("a", json!(1)),
            [only] => TestInstance::new(id, "double").with_partial("a", reference(only)),
            [first, second, ..] => TestInstance::new(id, "add")
                .with_partial("a", reference(first))
                .with_partial("b", reference(second)),
        };
        self.with_instance(instance)
    }

    pub fn generate_yaml(&self) -> String {
        let document = json!({
            "id": self.id,
            "workflow": self.instances.iter().map(TestInstance::to_value).collect::<Vec<_>>(),
        });
        serde_yaml::to_string(&document).unwrap()
    }

    pub async fn write_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::write(path, self.generate_yaml()).await?;
        Ok(())
    }
}

/// `${{ workflow.<id>.return }}`
pub fn reference(id: &str) -> Value {
    json!(format!("${{{{ workflow.{}.return }}}}", id))
}

fn int(kw: &Kwargs, name: &str) -> i64 {
    kw.get(name).and_then(Value::as_i64).unwrap_or_default()
}

pub fn add_task() -> Task {
    Task::from_fn(
        "add",
        Signature::new(vec![
            Parameter::new("a", ParamKind::Int),
            Parameter::new("b", ParamKind::Int),
        ]),
        |kw| Ok(json!(int(&kw, "a") + int(&kw, "b"))),
    )
}

pub fn double_task() -> Task {
    Task::from_fn(
        "double",
        Signature::new(vec![Parameter::new("a", ParamKind::Int)]),
        |kw| Ok(json!(int(&kw, "a") * 2)),
    )
}

pub fn test_registry() -> KnownTasks {
    KnownTasks::new()
        .with_task(add_task())
        .with_task(double_task())
        .with_task(Task::from_fn(
            "numbers",
            Signature::new(vec![Parameter::new("count", ParamKind::Int)]),
            |kw| Ok(json!((1..=int(&kw, "count")).collect::<Vec<_>>())),
        ))
        .with_task(Task::from_fn(
            "total",
            Signature::new(vec![Parameter::new("values", ParamKind::List)]),
            |kw| {
                let values = kw.get("values").and_then(Value::as_array).ok_or_else(|| {
                    TaskError::failed("values must be a list")
                })?;
                Ok(json!(values.iter().filter_map(Value::as_i64).sum::<i64>()))
            },
        ))
        .with_task(Task::from_fn(
            "greet",
            Signature::new(vec![Parameter::new("who", ParamKind::String)]),
            |kw| {
                let who = kw.get("who").and_then(Value::as_str).unwrap_or("nobody");
                Ok(json!(format!("hello {}", who)))
            },
        ))
        .with_task(Task::from_fn("explode", Signature::default(), |_| {
            Err(TaskError::failed("boom"))
        }))
}
