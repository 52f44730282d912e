// ABOUTME: Workflow specification documents and the validated WorkflowSpec model
// ABOUTME: Derives dependency maps, omit-lists, and digests consumed by the engine and generators

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use super::error::{ParserError, Result, ValidationError};
use super::validation::SpecValidator;
use super::variable::ArgValue;
use crate::tasks::TaskRegistry;

/// The workflow document exactly as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecDocument {
    pub id: String,
    pub workflow: Vec<WorkflowItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowItem {
    Group(TaskGroup),
    Instance(TaskInstanceDocument),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskGroup {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<TaskInstanceDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskInstanceDocument {
    pub name: String,
    pub id: String,
    #[serde(rename = "task")]
    pub known_task_name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub partial: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<ParallelOpDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapvalues: Option<ParallelOpDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParallelOpDocument {
    #[serde(default)]
    pub argnames: Argnames,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argvalues: Option<Value>,
}

impl ParallelOpDocument {
    pub fn is_unset(&self) -> bool {
        self.argnames.is_empty() && self.argvalues.is_none()
    }
}

/// `argnames: a` and `argnames: [a, b]` are both accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argnames {
    One(String),
    Many(Vec<String>),
}

impl Argnames {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Argnames::One(name) => vec![name.clone()],
            Argnames::Many(names) => names.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Argnames::One(_) => false,
            Argnames::Many(names) => names.is_empty(),
        }
    }
}

impl Default for Argnames {
    fn default() -> Self {
        Argnames::Many(Vec::new())
    }
}

impl SpecDocument {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(ParserError::YamlError)
    }

    /// Task instance documents with groups flattened in place.
    pub fn instances(&self) -> impl Iterator<Item = &TaskInstanceDocument> {
        self.workflow.iter().flat_map(|item| match item {
            WorkflowItem::Group(group) => group.tasks.iter().collect::<Vec<_>>(),
            WorkflowItem::Instance(instance) => vec![instance],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Call,
    Map,
    Mapvalues,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Call => write!(f, "call"),
            Method::Map => write!(f, "map"),
            Method::Mapvalues => write!(f, "mapvalues"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelOp {
    pub argnames: Vec<String>,
    pub argvalues: ArgValue,
}

impl ParallelOp {
    fn dependencies(&self) -> Vec<&str> {
        self.argvalues.dependencies()
    }
}

/// One validated node of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInstance {
    pub id: String,
    pub name: String,
    pub known_task_name: String,
    pub partial: IndexMap<String, ArgValue>,
    pub map: Option<ParallelOp>,
    pub mapvalues: Option<ParallelOp>,
}

impl TaskInstance {
    pub fn method(&self) -> Method {
        if self.map.is_some() {
            Method::Map
        } else if self.mapvalues.is_some() {
            Method::Mapvalues
        } else {
            Method::Call
        }
    }

    pub fn parallel_op(&self) -> Option<&ParallelOp> {
        self.map.as_ref().or(self.mapvalues.as_ref())
    }

    /// Every task id referenced, with repeats, in partial/map/mapvalues order.
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .partial
            .values()
            .flat_map(|value| value.dependencies())
            .collect();
        for op in [&self.map, &self.mapvalues].into_iter().flatten() {
            ids.extend(op.dependencies());
        }
        ids
    }

    /// Distinct task ids referenced, in first-appearance order.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for id in self.referenced_ids() {
            if !deps.iter().any(|d| d == id) {
                deps.push(id.to_string());
            }
        }
        deps
    }

    /// Arguments supplied by the workflow itself rather than by the user.
    pub fn omit_args(&self) -> Vec<String> {
        let mut omit = vec!["return".to_string()];
        omit.extend(self.partial.keys().cloned());
        for op in [&self.map, &self.mapvalues].into_iter().flatten() {
            omit.extend(op.argnames.iter().cloned());
        }
        omit
    }
}

/// Lower a document into task instances, collecting variable and shape errors.
pub(crate) fn lower(document: &SpecDocument) -> (Vec<TaskInstance>, Vec<ValidationError>) {
    let mut errors = Vec::new();
    let instances = document
        .instances()
        .map(|doc| {
            let partial = doc
                .partial
                .iter()
                .filter_map(|(arg, value)| match ArgValue::parse(value.clone()) {
                    Ok(parsed) => Some((arg.clone(), parsed)),
                    Err(reason) => {
                        errors.push(ValidationError::InvalidVariable {
                            location: format!("{}.partial.{}", doc.id, arg),
                            reason,
                        });
                        None
                    }
                })
                .collect();
            let map = lower_parallel(&doc.id, "map", doc.map.as_ref(), &mut errors);
            let mapvalues = lower_parallel(&doc.id, "mapvalues", doc.mapvalues.as_ref(), &mut errors);
            TaskInstance {
                id: doc.id.clone(),
                name: doc.name.clone(),
                known_task_name: doc.known_task_name.clone(),
                partial,
                map,
                mapvalues,
            }
        })
        .collect();
    (instances, errors)
}

fn lower_parallel(
    id: &str,
    operation: &str,
    doc: Option<&ParallelOpDocument>,
    errors: &mut Vec<ValidationError>,
) -> Option<ParallelOp> {
    let doc = doc.filter(|d| !d.is_unset())?;
    let argvalues = match (&doc.argvalues, doc.argnames.is_empty()) {
        (Some(argvalues), false) => argvalues.clone(),
        _ => {
            errors.push(ValidationError::IncompleteParallelOp {
                id: id.to_string(),
                operation: operation.to_string(),
            });
            return None;
        }
    };
    match ArgValue::parse(argvalues) {
        Ok(argvalues) => Some(ParallelOp {
            argnames: doc.argnames.to_vec(),
            argvalues,
        }),
        Err(reason) => {
            errors.push(ValidationError::InvalidVariable {
                location: format!("{}.{}.argvalues", id, operation),
                reason,
            });
            None
        }
    }
}

/// A validated workflow. Constructing one checks every structural rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSpec {
    document: SpecDocument,
    instances: Vec<TaskInstance>,
}

impl WorkflowSpec {
    pub fn from_document(document: SpecDocument, registry: &dyn TaskRegistry) -> Result<Self> {
        Self::from_document_with(document, registry, &SpecValidator::new())
    }

    pub fn from_document_with(
        document: SpecDocument,
        registry: &dyn TaskRegistry,
        validator: &SpecValidator,
    ) -> Result<Self> {
        let (report, instances) = validator.check(&document, registry);
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        if report.has_errors() {
            warn!(
                "Workflow '{}' failed validation with {} error(s)",
                document.id,
                report.errors.len()
            );
            return Err(ParserError::ValidationFailed {
                errors: report.errors,
            });
        }
        info!(
            "Validated workflow '{}' with {} task instances",
            document.id,
            instances.len()
        );
        Ok(Self {
            document,
            instances,
        })
    }

    pub fn from_yaml(content: &str, registry: &dyn TaskRegistry) -> Result<Self> {
        Self::from_document(SpecDocument::from_yaml(content)?, registry)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, registry: &dyn TaskRegistry) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ParserError::IoError)?;
        Self::from_yaml(&content, registry)
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn document(&self) -> &SpecDocument {
        &self.document
    }

    pub fn instances(&self) -> &[TaskInstance] {
        &self.instances
    }

    pub fn get(&self, id: &str) -> Option<&TaskInstance> {
        self.instances.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// id -> ids of the instances it reads from.
    pub fn task_instance_dependencies(&self) -> IndexMap<String, Vec<String>> {
        self.instances
            .iter()
            .map(|t| (t.id.clone(), t.dependencies()))
            .collect()
    }

    /// Display name -> id.
    pub fn all_task_ids(&self) -> IndexMap<String, String> {
        self.instances
            .iter()
            .map(|t| (t.name.clone(), t.id.clone()))
            .collect()
    }

    pub fn per_task_instance_omit_args(&self) -> IndexMap<String, Vec<String>> {
        self.instances
            .iter()
            .map(|t| (t.id.clone(), t.omit_args()))
            .collect()
    }

    pub fn method(&self, id: &str) -> Option<Method> {
        self.get(id).map(TaskInstance::method)
    }

    /// Hex-encoded SHA-256 of the document's canonical JSON form.
    pub fn sha256(&self) -> Result<String> {
        let canonical = serde_json::to_vec(&self.document)?;
        let digest = Sha256::digest(&canonical);
        Ok(hex::encode(digest))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.document).map_err(ParserError::YamlError)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        std::fs::write(path.as_ref(), yaml).map_err(ParserError::IoError)?;
        Ok(())
    }
}

pub struct SpecParser<'a> {
    registry: &'a dyn TaskRegistry,
    validator: SpecValidator,
}

impl<'a> SpecParser<'a> {
    pub fn new(registry: &'a dyn TaskRegistry) -> Self {
        Self {
            registry,
            validator: SpecValidator::new(),
        }
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.validator = self.validator.with_strict_mode(strict);
        self
    }

    pub async fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowSpec> {
        debug!("Reading workflow from {}", path.as_ref().display());
        let content = fs::read_to_string(path.as_ref())
            .await
            .map_err(ParserError::IoError)?;
        self.parse_string(&content)
    }

    pub fn parse_string(&self, content: &str) -> Result<WorkflowSpec> {
        WorkflowSpec::from_document_with(
            SpecDocument::from_yaml(content)?,
            self.registry,
            &self.validator,
        )
    }
}
