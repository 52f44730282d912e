// ABOUTME: Introspectable call signatures and the type-erased callable they describe
// ABOUTME: Handles positional/keyword binding, defaults, and lax argument coercion

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::error::{Result, TaskError};

/// Keyword arguments in declaration order.
pub type Kwargs = IndexMap<String, Value>;

/// The underlying task body: receives fully bound keyword arguments.
pub type TaskFn = Arc<dyn Fn(Kwargs) -> Result<Value> + Send + Sync>;

/// Build a `Kwargs` map from literal pairs.
pub fn kwargs<K: Into<String>, const N: usize>(pairs: [(K, Value); N]) -> Kwargs {
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kwargs(kwargs: Kwargs) -> Self {
        Self {
            args: Vec::new(),
            kwargs,
        }
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Kwargs::new(),
        }
    }

    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn is_keyword_only(&self) -> bool {
        self.args.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    String,
    List,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Any => "any",
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::String => "string",
            ParamKind::List => "list",
            ParamKind::Object => "object",
        }
    }

    /// Check `value` against this kind, coercing where the conversion is lossless.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (ParamKind::Any, value) => Ok(value),
            (ParamKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamKind::Bool, Value::String(s)) => match s.trim() {
                "true" | "True" | "1" => Ok(Value::Bool(true)),
                "false" | "False" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("expected bool, got string '{}'", other)),
            },
            (ParamKind::Int, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Ok(Value::Number(n))
                } else {
                    match n.as_f64() {
                        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
                        Some(f)
                            if f.fract() == 0.0
                                && f >= i64::MIN as f64
                                && f < i64::MAX as f64 =>
                        {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(format!("expected int, got float {}", n)),
                    }
                }
            }
            (ParamKind::Int, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected int, got string '{}'", s)),
            (ParamKind::Float, Value::Number(n)) => n
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("expected float, got {}", n)),
            (ParamKind::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("expected float, got string '{}'", s)),
            (ParamKind::String, Value::String(s)) => Ok(Value::String(s)),
            (ParamKind::List, Value::Array(items)) => Ok(Value::Array(items)),
            (ParamKind::Object, Value::Object(map)) => Ok(Value::Object(map)),
            (kind, other) => Err(format!("expected {}, got {}", kind, describe(&other))),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self { params }
    }

    /// Untyped, required parameters in the given order.
    pub fn from_names(names: &[&str]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| Parameter::new(*name, ParamKind::Any))
                .collect(),
        )
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// A copy of this signature with `bound` recorded as parameter defaults.
    ///
    /// Returns the offending name if `bound` contains a parameter this
    /// signature does not declare.
    pub fn with_defaults(&self, bound: &Kwargs) -> std::result::Result<Signature, String> {
        if let Some(unknown) = bound.keys().find(|name| !self.contains(name)) {
            return Err(unknown.clone());
        }
        let params = self
            .params
            .iter()
            .map(|p| match bound.get(&p.name) {
                Some(value) => p.clone().with_default(value.clone()),
                None => p.clone(),
            })
            .collect();
        Ok(Signature { params })
    }

    /// Bind call arguments to parameters, filling defaults, in signature order.
    pub fn bind(&self, task: &str, arguments: Arguments) -> Result<Kwargs> {
        if arguments.args.len() > self.params.len() {
            return Err(TaskError::TooManyPositional {
                task: task.to_string(),
                expected: self.params.len(),
                given: arguments.args.len(),
            });
        }

        let mut supplied: Kwargs = self
            .params
            .iter()
            .zip(arguments.args)
            .map(|(param, value)| (param.name.clone(), value))
            .collect();

        for (name, value) in arguments.kwargs {
            if !self.contains(&name) {
                return Err(TaskError::UnexpectedArgument {
                    task: task.to_string(),
                    argument: name,
                });
            }
            if supplied.contains_key(&name) {
                return Err(TaskError::DuplicateArgument {
                    task: task.to_string(),
                    argument: name,
                });
            }
            supplied.insert(name, value);
        }

        let mut bound = Kwargs::with_capacity(self.params.len());
        for param in &self.params {
            let value = match supplied.shift_remove(&param.name) {
                Some(value) => value,
                None => param
                    .default
                    .clone()
                    .ok_or_else(|| TaskError::MissingArgument {
                        task: task.to_string(),
                        argument: param.name.clone(),
                    })?,
            };
            bound.insert(param.name.clone(), value);
        }
        Ok(bound)
    }
}

/// A task body paired with the signature that describes it.
#[derive(Clone)]
pub struct Callable {
    name: String,
    signature: Signature,
    func: TaskFn,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, signature: Signature, func: F) -> Self
    where
        F: Fn(Kwargs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn invoke(&self, arguments: Arguments) -> Result<Value> {
        let kwargs = self.signature.bind(&self.name, arguments)?;
        (self.func)(kwargs)
    }

    pub fn invoke_kwargs(&self, kwargs: Kwargs) -> Result<Value> {
        self.invoke(Arguments::from_kwargs(kwargs))
    }

    /// Same body, different signature (used for partial binding).
    pub(crate) fn with_signature(&self, signature: Signature) -> Self {
        Self {
            name: self.name.clone(),
            signature,
            func: Arc::clone(&self.func),
        }
    }

    /// Compose `wrapper` around this body; `wrapper` receives the inner body.
    pub(crate) fn wrap<W>(&self, name: impl Into<String>, signature: Signature, wrapper: W) -> Self
    where
        W: Fn(&TaskFn, Kwargs) -> Result<Value> + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.func);
        Self {
            name: name.into(),
            signature,
            func: Arc::new(move |kwargs| wrapper(&inner, kwargs)),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("signature", &self.signature.names())
            .finish()
    }
}
