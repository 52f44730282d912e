// ABOUTME: Structural validation for workflow specification documents
// ABOUTME: Checks identifiers, registry references, parallel operations, and declaration order

use std::collections::{HashMap, HashSet};

use super::error::ValidationError;
use super::spec::{lower, ParallelOpDocument, SpecDocument, TaskInstance};
use crate::tasks::TaskRegistry;

pub const MAX_TASK_ID_LEN: usize = 32;
pub const MAX_SPEC_ID_LEN: usize = 64;

/// Keywords and builtins of the generated script target; none may be used as an id.
const RESERVED_WORDS: &[&str] = &[
    // keywords
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
    // soft keywords
    "case", "match",
    // builtins
    "ArithmeticError", "AssertionError", "AttributeError", "BaseException", "BaseExceptionGroup",
    "BlockingIOError", "BrokenPipeError", "BufferError", "BytesWarning", "ChildProcessError",
    "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError", "ConnectionResetError",
    "DeprecationWarning", "EOFError", "Ellipsis", "EncodingWarning", "EnvironmentError",
    "Exception", "ExceptionGroup", "False", "FileExistsError", "FileNotFoundError",
    "FloatingPointError", "FutureWarning", "GeneratorExit", "IOError", "ImportError",
    "ImportWarning", "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError",
    "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError",
    "NameError", "None", "NotADirectoryError", "NotImplemented", "NotImplementedError", "OSError",
    "OverflowError", "PendingDeprecationWarning", "PermissionError", "ProcessLookupError",
    "RecursionError", "ReferenceError", "ResourceWarning", "RuntimeError", "RuntimeWarning",
    "StopAsyncIteration", "StopIteration", "SyntaxError", "SyntaxWarning", "SystemError",
    "SystemExit", "TabError", "TimeoutError", "True", "TypeError", "UnboundLocalError",
    "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError",
    "UnicodeWarning", "UserWarning", "ValueError", "Warning", "ZeroDivisionError",
    "__build_class__", "__debug__", "__import__", "abs", "aiter", "all", "anext", "any", "ascii",
    "bin", "bool", "breakpoint", "bytearray", "bytes", "callable", "chr", "classmethod",
    "compile", "complex", "copyright", "credits", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "exit", "filter", "float", "format", "frozenset", "getattr", "globals",
    "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter",
    "len", "license", "list", "locals", "map", "max", "memoryview", "min", "next", "object",
    "oct", "open", "ord", "pow", "print", "property", "quit", "range", "repr", "reversed",
    "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple",
    "type", "vars", "zip",
];

pub fn is_valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub fn is_reserved_word(value: &str) -> bool {
    RESERVED_WORDS.contains(&value)
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub is_valid: bool,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpecValidator {
    strict_mode: bool,
}

impl SpecValidator {
    pub fn new() -> Self {
        Self { strict_mode: false }
    }

    /// In strict mode, unset environment variables are reported as warnings.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Validate a complete workflow document
    pub fn validate(&self, document: &SpecDocument, registry: &dyn TaskRegistry) -> ValidationReport {
        self.check(document, registry).0
    }

    pub(crate) fn check(
        &self,
        document: &SpecDocument,
        registry: &dyn TaskRegistry,
    ) -> (ValidationReport, Vec<TaskInstance>) {
        let mut report = ValidationReport::new();
        let (instances, lowering_errors) = lower(document);

        check_identifier("workflow id", &document.id, MAX_SPEC_ID_LEN, &mut report);
        if instances.is_empty() {
            report.errors.push(ValidationError::EmptyWorkflow);
        }

        self.validate_instance_ids(&document.id, &instances, registry, &mut report);
        self.validate_unique_ids(&instances, &mut report);
        self.validate_tasks(&instances, registry, &mut report);
        self.validate_parallel_ops(document, &instances, &mut report);
        report.errors.extend(lowering_errors);
        self.validate_dependencies(&instances, &mut report);

        if self.strict_mode {
            self.check_environment(&instances, &mut report);
        }

        report.is_valid = report.errors.is_empty();
        (report, instances)
    }

    fn validate_instance_ids(
        &self,
        spec_id: &str,
        instances: &[TaskInstance],
        registry: &dyn TaskRegistry,
        report: &mut ValidationReport,
    ) {
        for instance in instances {
            check_identifier("task instance id", &instance.id, MAX_TASK_ID_LEN, report);
            if registry.exists(&instance.id) {
                report.errors.push(ValidationError::TaskNameCollision {
                    id: instance.id.clone(),
                });
            }
            if instance.id == spec_id {
                report.errors.push(ValidationError::IdMatchesSpecId {
                    id: instance.id.clone(),
                });
            }
        }
    }

    fn validate_unique_ids(&self, instances: &[TaskInstance], report: &mut ValidationReport) {
        let mut names_by_id: HashMap<&str, Vec<String>> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for instance in instances {
            let names = names_by_id.entry(instance.id.as_str()).or_default();
            if names.is_empty() {
                order.push(instance.id.as_str());
            }
            names.push(instance.name.clone());
        }
        for id in order {
            let names = &names_by_id[id];
            if names.len() > 1 {
                report.errors.push(ValidationError::DuplicateId {
                    id: id.to_string(),
                    names: names.clone(),
                });
            }
        }

        let mut seen_names = HashSet::new();
        for instance in instances {
            if !seen_names.insert(instance.name.as_str()) {
                report.warnings.push(format!(
                    "Task instance name '{}' is used more than once",
                    instance.name
                ));
            }
        }
    }

    /// Registry references and argument names
    fn validate_tasks(
        &self,
        instances: &[TaskInstance],
        registry: &dyn TaskRegistry,
        report: &mut ValidationReport,
    ) {
        for instance in instances {
            let descriptor = registry.resolve(&instance.known_task_name);
            if descriptor.is_none() {
                report.errors.push(ValidationError::UnknownTask {
                    id: instance.id.clone(),
                    task: instance.known_task_name.clone(),
                });
            }

            let argnames = instance.partial.keys().chain(
                [&instance.map, &instance.mapvalues]
                    .into_iter()
                    .flatten()
                    .flat_map(|op| op.argnames.iter()),
            );
            for argument in argnames {
                if !is_valid_identifier(argument) {
                    report.errors.push(ValidationError::InvalidArgname {
                        id: instance.id.clone(),
                        argument: argument.clone(),
                    });
                } else if let Some(descriptor) = &descriptor {
                    if !descriptor.signature.contains(argument) {
                        report.errors.push(ValidationError::UnknownArgument {
                            id: instance.id.clone(),
                            task: instance.known_task_name.clone(),
                            argument: argument.clone(),
                        });
                    }
                }
            }
        }
    }

    fn validate_parallel_ops(
        &self,
        document: &SpecDocument,
        instances: &[TaskInstance],
        report: &mut ValidationReport,
    ) {
        for doc in document.instances() {
            let is_set =
                |op: &Option<ParallelOpDocument>| op.as_ref().map_or(false, |op| !op.is_unset());
            if is_set(&doc.map) && is_set(&doc.mapvalues) {
                report.errors.push(ValidationError::ConflictingParallelOps {
                    id: doc.id.clone(),
                });
            }
        }

        for instance in instances {
            if let Some(op) = &instance.mapvalues {
                if op.argnames.len() != 1 {
                    report.errors.push(ValidationError::MapValuesArgnames {
                        id: instance.id.clone(),
                        argnames: op.argnames.clone(),
                    });
                }
            }
        }
    }

    /// Linear scan: every reference must point at an instance declared earlier.
    fn validate_dependencies(&self, instances: &[TaskInstance], report: &mut ValidationReport) {
        let all_ids: HashSet<&str> = instances.iter().map(|t| t.id.as_str()).collect();
        let mut declared: HashSet<&str> = HashSet::new();

        for instance in instances {
            for dependency in instance.dependencies() {
                if dependency == instance.id {
                    report.errors.push(ValidationError::SelfDependency {
                        id: instance.id.clone(),
                    });
                } else if !all_ids.contains(dependency.as_str()) {
                    report.errors.push(ValidationError::UnknownDependency {
                        id: instance.id.clone(),
                        dependency,
                    });
                } else if !declared.contains(dependency.as_str()) {
                    report.errors.push(ValidationError::NotTopological {
                        id: instance.id.clone(),
                        dependency,
                    });
                }
            }
            declared.insert(&instance.id);
        }
    }

    fn check_environment(&self, instances: &[TaskInstance], report: &mut ValidationReport) {
        for instance in instances {
            let values = instance.partial.values().chain(
                [&instance.map, &instance.mapvalues]
                    .into_iter()
                    .flatten()
                    .map(|op| &op.argvalues),
            );
            for name in values
                .flat_map(|value| value.variables())
                .filter_map(|var| var.env_name())
            {
                if std::env::var_os(name).is_none() {
                    report.warnings.push(format!(
                        "Environment variable '{}' used by task instance '{}' is not set",
                        name, instance.id
                    ));
                }
            }
        }
    }
}

fn check_identifier(field: &str, value: &str, max: usize, report: &mut ValidationReport) {
    if !is_valid_identifier(value) {
        report.errors.push(ValidationError::InvalidIdentifier {
            field: field.to_string(),
            value: value.to_string(),
        });
    } else if is_reserved_word(value) {
        report.errors.push(ValidationError::ReservedWord {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    if value.len() > max {
        report.errors.push(ValidationError::TooLong {
            field: field.to_string(),
            value: value.to_string(),
            max,
            len: value.len(),
        });
    }
}
