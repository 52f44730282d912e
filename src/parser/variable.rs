// ABOUTME: Workflow variables and the argument values that may contain them
// ABOUTME: Parses the ${{ workflow.<id>.return }} and ${{ env.<NAME> }} template syntax

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// A reference to another task instance's result or to a process environment value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkflowVariable {
    TaskId(String),
    Env(String),
}

impl WorkflowVariable {
    /// Returns `None` for plain strings, `Some(Err)` for malformed `${{ }}` expressions.
    pub fn parse(text: &str) -> Option<std::result::Result<Self, String>> {
        if !text.contains(OPEN) {
            return None;
        }
        Some(Self::parse_expression(text))
    }

    fn parse_expression(text: &str) -> std::result::Result<Self, String> {
        let inner = text
            .trim()
            .strip_prefix(OPEN)
            .and_then(|rest| rest.strip_suffix(CLOSE))
            .ok_or_else(|| {
                format!(
                    "'{}' must be a single expression of the form {} ... {}",
                    text, OPEN, CLOSE
                )
            })?
            .trim();

        let parts: Vec<&str> = inner.split('.').collect();
        match parts.as_slice() {
            ["workflow", id, "return"] if is_word(id) => Ok(WorkflowVariable::TaskId(id.to_string())),
            ["env", name] if is_word(name) => Ok(WorkflowVariable::Env(name.to_string())),
            _ => Err(format!(
                "unsupported expression '{}'; expected workflow.<task_id>.return or env.<NAME>",
                inner
            )),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            WorkflowVariable::TaskId(id) => Some(id),
            WorkflowVariable::Env(_) => None,
        }
    }

    pub fn env_name(&self) -> Option<&str> {
        match self {
            WorkflowVariable::Env(name) => Some(name),
            WorkflowVariable::TaskId(_) => None,
        }
    }
}

impl fmt::Display for WorkflowVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowVariable::TaskId(id) => write!(f, "{} workflow.{}.return {}", OPEN, id, CLOSE),
            WorkflowVariable::Env(name) => write!(f, "{} env.{} {}", OPEN, name, CLOSE),
        }
    }
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An argument value: a literal, one variable, or a list of variables.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Value),
    Variable(WorkflowVariable),
    Variables(Vec<WorkflowVariable>),
}

impl ArgValue {
    pub fn parse(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(text) => match WorkflowVariable::parse(&text) {
                Some(var) => var.map(ArgValue::Variable),
                None => Ok(ArgValue::Literal(Value::String(text))),
            },
            Value::Array(items) => {
                let parsed: Vec<Option<std::result::Result<WorkflowVariable, String>>> = items
                    .iter()
                    .map(|item| item.as_str().and_then(WorkflowVariable::parse))
                    .collect();
                if parsed.iter().all(Option::is_none) {
                    return literal(Value::Array(items));
                }
                if parsed.iter().any(Option::is_none) {
                    return Err("a list may not mix variables and literal values".to_string());
                }
                parsed
                    .into_iter()
                    .flatten()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(ArgValue::Variables)
            }
            other => literal(other),
        }
    }

    pub fn variables(&self) -> Vec<&WorkflowVariable> {
        match self {
            ArgValue::Literal(_) => Vec::new(),
            ArgValue::Variable(var) => vec![var],
            ArgValue::Variables(vars) => vars.iter().collect(),
        }
    }

    /// Ids of task instances this value reads from, in order of appearance.
    pub fn dependencies(&self) -> Vec<&str> {
        self.variables()
            .into_iter()
            .filter_map(WorkflowVariable::task_id)
            .collect()
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ArgValue::Literal(_))
    }

    /// The value as written in a workflow document.
    pub fn to_value(&self) -> Value {
        match self {
            ArgValue::Literal(value) => value.clone(),
            ArgValue::Variable(var) => Value::String(var.to_string()),
            ArgValue::Variables(vars) => {
                Value::Array(vars.iter().map(|v| Value::String(v.to_string())).collect())
            }
        }
    }
}

impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Variables are only recognised as a whole value or as items of a flat list.
fn literal(value: Value) -> std::result::Result<ArgValue, String> {
    if contains_variable(&value) {
        return Err(format!(
            "variables may not be nested inside a literal value: {}",
            value
        ));
    }
    Ok(ArgValue::Literal(value))
}

fn contains_variable(value: &Value) -> bool {
    match value {
        Value::String(text) => text.contains(OPEN),
        Value::Array(items) => items.iter().any(contains_variable),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains(OPEN) || contains_variable(value)),
        _ => false,
    }
}
