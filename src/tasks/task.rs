// ABOUTME: The task wrapper: an immutable, executor-bound unit of work around a callable
// ABOUTME: Provides call/map/mapvalues dispatch, partial binding, and optional validation

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::error::{Result, TaskError};
use super::operator::{OperatorKws, TaskTag};
use super::signature::{Arguments, Callable, Kwargs, Signature};
use crate::executors::{
    mapvalues_wrapper, Executor, ExecutorChoice, KeyedOutput, SequenceOutput, TaskOutput,
};

/// Checks (and may transform) a single value; `Err` carries the rejection message.
pub type Validator = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// A callable wrapped with validation settings, deployment metadata and an executor.
///
/// Fields are private and there are no setters; every change goes through a
/// method that returns a new `Task`:
///
/// ```compile_fail
/// use taskloom::tasks::Task;
///
/// fn enable_validation(task: &mut Task) {
///     task.validate = true;
/// }
/// ```
#[derive(Clone)]
pub struct Task {
    func: Callable,
    arg_prevalidators: IndexMap<String, Validator>,
    return_postvalidator: Option<Validator>,
    validate: bool,
    operator_kws: OperatorKws,
    tags: Vec<TaskTag>,
    executor: Executor,
    dispatch: Callable,
}

/// Field overrides for `Task::replace`; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub validate: Option<bool>,
    pub operator_kws: Option<OperatorKws>,
    pub tags: Option<Vec<TaskTag>>,
}

impl Task {
    pub fn builder(func: Callable) -> TaskBuilder {
        TaskBuilder::new(func)
    }

    /// Wrap a plain function with default settings.
    pub fn from_fn<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Kwargs) -> Result<Value> + Send + Sync + 'static,
    {
        Self::assemble(
            Callable::new(name, signature, f),
            IndexMap::new(),
            None,
            false,
            OperatorKws::default(),
            Vec::new(),
            Executor::default(),
        )
    }

    fn assemble(
        func: Callable,
        arg_prevalidators: IndexMap<String, Validator>,
        return_postvalidator: Option<Validator>,
        validate: bool,
        operator_kws: OperatorKws,
        tags: Vec<TaskTag>,
        executor: Executor,
    ) -> Self {
        let dispatch = compose_dispatch(
            &func,
            &arg_prevalidators,
            return_postvalidator.as_ref(),
            validate,
        );
        Self {
            func,
            arg_prevalidators,
            return_postvalidator,
            validate,
            operator_kws,
            tags,
            executor,
            dispatch,
        }
    }

    /// Rebuild with a subset of fields changed, carrying everything else forward.
    fn rebuilt(&self, func: Callable, validate: bool, executor: Executor) -> Self {
        Self::assemble(
            func,
            self.arg_prevalidators.clone(),
            self.return_postvalidator.clone(),
            validate,
            self.operator_kws.clone(),
            self.tags.clone(),
            executor,
        )
    }

    pub fn name(&self) -> &str {
        self.func.name()
    }

    /// Full parameter list, including parameters already bound by `partial`.
    pub fn signature(&self) -> &Signature {
        self.func.signature()
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn operator_kws(&self) -> &OperatorKws {
        &self.operator_kws
    }

    pub fn tags(&self) -> &[TaskTag] {
        &self.tags
    }

    pub fn has_tag(&self, tag: TaskTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn has_validators(&self) -> bool {
        !self.arg_prevalidators.is_empty() || self.return_postvalidator.is_some()
    }

    pub fn call(&self, arguments: Arguments) -> Result<TaskOutput> {
        self.executor.call(&self.dispatch, arguments)
    }

    pub fn call_kwargs(&self, kwargs: Kwargs) -> Result<TaskOutput> {
        self.call(Arguments::from_kwargs(kwargs))
    }

    /// Invoke once per tuple in `argvalues`, binding tuple items to `argnames` positionally.
    pub fn map<S: AsRef<str>>(
        &self,
        argnames: &[S],
        argvalues: Vec<Vec<Value>>,
    ) -> Result<SequenceOutput> {
        let names: Vec<String> = argnames.iter().map(|s| s.as_ref().to_string()).collect();
        let iterable = argvalues
            .into_iter()
            .map(|values| {
                if values.len() != names.len() {
                    return Err(TaskError::ArgvaluesArity {
                        argnames: names.clone(),
                        expected: names.len(),
                        given: values.len(),
                    });
                }
                Ok(Arguments::from_kwargs(
                    names.iter().cloned().zip(values).collect(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.executor.map(&self.dispatch, iterable)
    }

    /// Invoke once per `(key, value)` pair, returning `(key, result)` pairs in input order.
    ///
    /// An object `value` containing the argname is used as the call's keyword
    /// arguments; any other value is bound to the single argname.
    pub fn mapvalues<S: AsRef<str>>(
        &self,
        argnames: &[S],
        argvalues: Vec<(Value, Value)>,
    ) -> Result<KeyedOutput> {
        let argname = match argnames {
            [only] => only.as_ref().to_string(),
            _ => {
                return Err(TaskError::MapValuesArgnames(
                    argnames.iter().map(|s| s.as_ref().to_string()).collect(),
                ))
            }
        };
        let iterable = argvalues
            .into_iter()
            .map(|(key, value)| {
                let kwargs = match value {
                    Value::Object(map) if map.contains_key(&argname) => Value::Object(map),
                    other => {
                        let mut map = serde_json::Map::new();
                        map.insert(argname.clone(), other);
                        Value::Object(map)
                    }
                };
                Arguments::new()
                    .with_kwarg("key", key)
                    .with_kwarg("kwargs", kwargs)
            })
            .collect();
        let wrapped = mapvalues_wrapper(&self.dispatch);
        Ok(KeyedOutput::new(self.executor.map(&wrapped, iterable)?))
    }

    /// Pre-bind `bound` as defaults; nothing is executed.
    pub fn partial(&self, bound: Kwargs) -> Result<Task> {
        let signature = self.func.signature().with_defaults(&bound).map_err(|argument| {
            TaskError::UnexpectedArgument {
                task: self.name().to_string(),
                argument,
            }
        })?;
        let func = self.func.with_signature(signature);
        Ok(self.rebuilt(func, self.validate, self.executor.clone()))
    }

    pub fn set_executor(&self, executor: impl Into<ExecutorChoice>) -> Result<Task> {
        let executor = executor.into().resolve()?;
        Ok(self.rebuilt(self.func.clone(), self.validate, executor))
    }

    pub fn replace(&self, changes: TaskChanges) -> Task {
        let task = Self::assemble(
            self.func.clone(),
            self.arg_prevalidators.clone(),
            self.return_postvalidator.clone(),
            changes.validate.unwrap_or(self.validate),
            changes.operator_kws.unwrap_or_else(|| self.operator_kws.clone()),
            changes.tags.unwrap_or_else(|| self.tags.clone()),
            self.executor.clone(),
        );
        if self.validate {
            task.warn_if_validators_ignored();
        }
        task
    }

    /// Validators are configured but `validate` is off, so calls skip them.
    pub fn validators_ignored(&self) -> bool {
        !self.validate
            && (!self.arg_prevalidators.is_empty() || self.return_postvalidator.is_some())
    }

    /// Only called where `validate` is first decided, so derived copies stay quiet.
    fn warn_if_validators_ignored(&self) {
        if self.validators_ignored() {
            warn!(
                "Task '{}' has validators configured but validate=false; calls will not be validated",
                self.name()
            );
        }
    }

    pub fn validated(&self) -> Task {
        self.replace(TaskChanges {
            validate: Some(true),
            ..Default::default()
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("signature", &self.signature().names())
            .field(
                "arg_prevalidators",
                &self.arg_prevalidators.keys().collect::<Vec<_>>(),
            )
            .field("return_postvalidator", &self.return_postvalidator.is_some())
            .field("validate", &self.validate)
            .field("operator_kws", &self.operator_kws)
            .field("tags", &self.tags)
            .field("executor", &self.executor.name())
            .finish()
    }
}

fn compose_dispatch(
    func: &Callable,
    prevalidators: &IndexMap<String, Validator>,
    postvalidator: Option<&Validator>,
    validate: bool,
) -> Callable {
    if !validate {
        return func.clone();
    }

    let task = func.name().to_string();
    let signature = func.signature().clone();
    let prevalidators = prevalidators.clone();
    let postvalidator = postvalidator.cloned();

    func.wrap(func.name(), signature.clone(), move |inner, kwargs| {
        let mut checked = Kwargs::with_capacity(kwargs.len());
        for (argument, value) in kwargs {
            let value = match prevalidators.get(&argument) {
                Some(validator) => validator(value),
                None => Ok(value),
            }
            .and_then(|value| {
                let kind = signature
                    .get(&argument)
                    .map(|p| p.kind)
                    .unwrap_or_default();
                kind.coerce(value)
            })
            .map_err(|message| TaskError::ArgumentValidation {
                task: task.clone(),
                argument: argument.clone(),
                message,
            })?;
            checked.insert(argument, value);
        }

        let result = inner(checked)?;
        match &postvalidator {
            Some(validator) => validator(result).map_err(|message| TaskError::ReturnValidation {
                task: task.clone(),
                message,
            }),
            None => Ok(result),
        }
    })
}

pub struct TaskBuilder {
    func: Callable,
    arg_prevalidators: IndexMap<String, Validator>,
    return_postvalidator: Option<Validator>,
    validate: bool,
    operator_kws: OperatorKws,
    tags: Vec<TaskTag>,
    executor: Executor,
}

impl TaskBuilder {
    pub fn new(func: Callable) -> Self {
        Self {
            func,
            arg_prevalidators: IndexMap::new(),
            return_postvalidator: None,
            validate: false,
            operator_kws: OperatorKws::default(),
            tags: Vec::new(),
            executor: Executor::default(),
        }
    }

    pub fn with_prevalidator<F>(mut self, argument: impl Into<String>, validator: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.arg_prevalidators
            .insert(argument.into(), Arc::new(validator));
        self
    }

    pub fn with_postvalidator<F>(mut self, validator: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.return_postvalidator = Some(Arc::new(validator));
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_operator_kws(mut self, operator_kws: OperatorKws) -> Self {
        self.operator_kws = operator_kws;
        self
    }

    pub fn with_tag(mut self, tag: TaskTag) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Fails if a prevalidator names a parameter the callable does not have.
    pub fn build(self) -> Result<Task> {
        if let Some(argument) = self
            .arg_prevalidators
            .keys()
            .find(|name| !self.func.signature().contains(name))
        {
            return Err(TaskError::UnexpectedArgument {
                task: self.func.name().to_string(),
                argument: argument.clone(),
            });
        }
        let task = Task::assemble(
            self.func,
            self.arg_prevalidators,
            self.return_postvalidator,
            self.validate,
            self.operator_kws,
            self.tags,
            self.executor,
        );
        task.warn_if_validators_ignored();
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::ServerlessExecutor;
    use crate::tasks::signature::{kwargs, ParamKind, Parameter};
    use serde_json::json;

    fn int(kw: &Kwargs, name: &str) -> i64 {
        kw.get(name).and_then(Value::as_i64).unwrap_or_default()
    }

    fn add() -> Task {
        Task::from_fn("add", Signature::from_names(&["a", "b"]), |kw| {
            Ok(json!(int(&kw, "a") + int(&kw, "b")))
        })
    }

    fn double() -> Task {
        Task::from_fn("double", Signature::from_names(&["a"]), |kw| {
            Ok(json!(int(&kw, "a") * 2))
        })
    }

    #[test]
    fn test_partial_then_call_matches_direct_call() {
        let direct = add()
            .call_kwargs(kwargs([("a", json!(1)), ("b", json!(2))]))
            .unwrap()
            .gather()
            .unwrap();
        let partial = add()
            .partial(kwargs([("b", json!(2))]))
            .unwrap()
            .call_kwargs(kwargs([("a", json!(1))]))
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(direct, partial);
        assert_eq!(partial, json!(3));
    }

    #[test]
    fn test_partial_rejects_unknown_argument() {
        let err = add().partial(kwargs([("c", json!(1))])).unwrap_err();
        assert!(matches!(err, TaskError::UnexpectedArgument { .. }));
    }

    #[test]
    fn test_map_preserves_order() {
        let out = add()
            .map(
                &["a", "b"],
                vec![
                    vec![json!(1), json!(1)],
                    vec![json!(2), json!(2)],
                    vec![json!(3), json!(3)],
                ],
            )
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(out, vec![json!(2), json!(4), json!(6)]);
    }

    #[test]
    fn test_partial_then_map() {
        let out = add()
            .partial(kwargs([("a", json!(1))]))
            .unwrap()
            .map(&["b"], vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]])
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(out, vec![json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn test_map_arity_mismatch() {
        let err = add()
            .map(&["a", "b"], vec![vec![json!(1)]])
            .unwrap_err();
        assert!(matches!(err, TaskError::ArgvaluesArity { expected: 2, given: 1, .. }));
    }

    #[test]
    fn test_mapvalues_keyed_results() {
        let out = double()
            .mapvalues(
                &["a"],
                vec![(json!("x"), json!({"a": 1})), (json!("y"), json!({"a": 2}))],
            )
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(out, vec![(json!("x"), json!(2)), (json!("y"), json!(4))]);

        let bare = double()
            .mapvalues(&["a"], vec![(json!("z"), json!(3))])
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(bare, vec![(json!("z"), json!(6))]);
    }

    #[test]
    fn test_mapvalues_requires_single_argname() {
        let err = add()
            .mapvalues(&["a", "b"], vec![(json!("x"), json!(1))])
            .unwrap_err();
        assert!(matches!(err, TaskError::MapValuesArgnames(_)));
    }

    #[test]
    fn test_validation_coerces_and_runs_validators() {
        let func = Callable::new(
            "scaled",
            Signature::new(vec![Parameter::new("a", ParamKind::Int)]),
            |kw| Ok(json!(kw["a"].as_i64().unwrap_or_default() * 10)),
        );
        let task = Task::builder(func)
            .with_prevalidator("a", |v| match v.as_i64() {
                Some(n) if n < 0 => Err("must be non-negative".to_string()),
                _ => Ok(v),
            })
            .with_postvalidator(|v| {
                if v.as_i64().unwrap_or_default() > 100 {
                    Err("too large".to_string())
                } else {
                    Ok(v)
                }
            })
            .build()
            .unwrap();

        // Without validate the string is passed straight through.
        let raw = task
            .call_kwargs(kwargs([("a", json!("1"))]))
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(raw, json!(0));

        let validated = task.validated();
        let coerced = validated
            .call_kwargs(kwargs([("a", json!("1"))]))
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(coerced, json!(10));

        let err = validated
            .call_kwargs(kwargs([("a", json!(-1))]))
            .unwrap_err();
        assert!(err.is_validation());

        let err = validated
            .call_kwargs(kwargs([("a", json!(11))]))
            .unwrap_err();
        assert!(matches!(err, TaskError::ReturnValidation { .. }));
    }

    #[test]
    fn test_builder_rejects_unknown_prevalidator() {
        let result = Task::builder(Callable::new("f", Signature::from_names(&["a"]), |_| {
            Ok(Value::Null)
        }))
        .with_prevalidator("b", Ok)
        .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_replace_changes_only_requested_field() {
        let original = Task::builder(add().func.clone())
            .with_tag(TaskTag::Io)
            .with_operator_kws(OperatorKws::new("img:latest"))
            .build()
            .unwrap();
        let replaced = original.replace(TaskChanges {
            validate: Some(true),
            ..Default::default()
        });

        assert!(!original.validate());
        assert!(replaced.validate());
        assert_eq!(replaced.tags(), original.tags());
        assert_eq!(replaced.operator_kws(), original.operator_kws());
        assert_eq!(replaced.signature(), original.signature());
        assert_eq!(replaced.executor().name(), original.executor().name());
    }

    #[test]
    fn test_set_executor_returns_new_instance() {
        let local = add();
        let remote = local.set_executor(ServerlessExecutor::default()).unwrap();
        assert_eq!(local.executor().name(), "in_process");
        assert_eq!(remote.executor().name(), "serverless");

        let out = remote
            .call_kwargs(kwargs([("a", json!(1)), ("b", json!(2))]))
            .unwrap();
        assert!(out.is_future());
        assert_eq!(out.gather().unwrap(), json!(3));

        assert!(local.set_executor("nope").is_err());
    }

    #[test]
    fn test_serverless_partial_keeps_signature() {
        let remote = add()
            .partial(kwargs([("a", json!(1))]))
            .unwrap()
            .set_executor("serverless")
            .unwrap();
        assert_eq!(remote.signature().names(), vec!["a", "b"]);
        let out = remote
            .map(&["b"], vec![vec![json!(1)], vec![json!(2)]])
            .unwrap()
            .gather()
            .unwrap();
        assert_eq!(out, vec![json!(2), json!(3)]);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn count(&self, needle: &str) -> usize {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .matches(needle)
                .count()
        }
    }

    #[test]
    fn test_ignored_validators_warn_once() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let needle = "validators configured but validate=false";

        tracing::subscriber::with_default(subscriber, || {
            let task = Task::builder(Callable::new(
                "checked",
                Signature::from_names(&["n"]),
                |kw| Ok(kw.get("n").cloned().unwrap_or(Value::Null)),
            ))
            .with_prevalidator("n", |value| Ok(value))
            .build()
            .unwrap();
            assert!(task.validators_ignored());
            assert_eq!(logs.count(needle), 1);

            // Derived copies carry the setting forward without repeating the warning.
            let derived = task
                .set_executor("serverless")
                .unwrap()
                .partial(kwargs([("n", json!(1))]))
                .unwrap();
            assert!(derived.validators_ignored());
            let validated = derived.validated();
            assert!(!validated.validators_ignored());
            assert_eq!(logs.count(needle), 1);

            // Turning validation back off is a new decision and warns again.
            let unvalidated = validated.replace(TaskChanges {
                validate: Some(false),
                ..Default::default()
            });
            assert!(unvalidated.validators_ignored());
            assert_eq!(logs.count(needle), 2);
        });
    }
}
