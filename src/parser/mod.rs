// ABOUTME: Parser module for declarative workflow specifications
// ABOUTME: Exports spec documents, variables, validation, and run parameters

pub mod error;
pub mod params;
pub mod spec;
pub mod validation;
pub mod variable;

pub use error::{ParserError, ValidationError};
pub use params::WorkflowParams;
pub use spec::{
    Argnames, Method, ParallelOp, ParallelOpDocument, SpecDocument, SpecParser, TaskGroup,
    TaskInstance, TaskInstanceDocument, WorkflowItem, WorkflowSpec,
};
pub use validation::{
    is_reserved_word, is_valid_identifier, SpecValidator, ValidationReport, MAX_SPEC_ID_LEN,
    MAX_TASK_ID_LEN,
};
pub use variable::{ArgValue, WorkflowVariable};
