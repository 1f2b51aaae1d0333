//! # uast-transform - Reversible tree rewriting for Universal ASTs
//!
//! Language drivers describe how their native parser's tree maps onto the
//! canonical UAST shape as a list of declarative, reversible rules.
//!
//! uast-transform provides:
//! - A closed `Node` tree model shared copy-on-write between passes
//! - Pattern operators with two capabilities: check (match + bind) and construct
//! - Object and array matchers with strict/partial field policies
//! - `Mapping`: a reversible (source, destination) rule applied bottom-up
//! - `MappingSet`: a type-tag index that routes nodes only to relevant rules
//! - A staged `Transforms` pipeline with built-in preprocessing transformers

pub mod node;
pub mod path;
pub mod state;
pub mod ops;
pub mod mapping;
pub mod dispatch;
pub mod transformer;
pub mod annotate;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use node::{Array, Kind, Kinds, Node, Object, Value};
pub use path::NodePath;
pub use state::State;
pub use ops::{IntoOp, Op, OpRef};
pub use mapping::Mapping;
pub use dispatch::{MappingSet, MappingSetBuilder};
pub use transformer::{Mode, Transformer, Transforms};

/// Result type alias for transformation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for transformation operations.
///
/// A pattern that simply does not fit a node is not an error; operators
/// report that as `Ok(false)`. These variants cover construction and
/// consistency failures. The wrapping variants (`Key`, `Elem`, `Op`,
/// `Append`, `Mapping`) record where inside a pattern or a tree the
/// underlying failure happened.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("variable {name:?} redeclared ({old} vs {new})")]
    VariableRedeclared { name: String, old: String, new: String },

    #[error("variable {0:?} is not defined")]
    VariableNotDefined(String),

    #[error("expected object, got {0}")]
    ExpectedObject(Kind),

    #[error("expected list, got {0}")]
    ExpectedList(Kind),

    #[error("expected value, got {0}")]
    ExpectedValue(Kind),

    #[error("unhandled value: {0}")]
    UnhandledValue(String),

    #[error("expected node to be nil, got: {0}")]
    UnexpectedNode(String),

    #[error("unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("unexpected type: {0}")]
    UnexpectedType(String),

    #[error("map has ambiguous value {0}")]
    AmbiguousValue(String),

    #[error("field was not used: {0}")]
    UnusedField(String),

    #[error("duplicate field: {0}")]
    DuplicateField(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("key {key:?}: {source}")]
    Key { key: String, source: Box<Error> },

    #[error("elem {index}: {source}")]
    Elem { index: usize, source: Box<Error> },

    #[error("op {index}: {source}")]
    Op { index: usize, source: Box<Error> },

    #[error("append: {source}")]
    Append { source: Box<Error> },

    #[error("mapping {name:?} at {path}: {source}")]
    Mapping {
        name: String,
        path: NodePath,
        source: Box<Error>,
    },

    #[error("{} transformation error(s): {}", .0.len(), join_errors(.0))]
    Multiple(Vec<Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn key(key: impl Into<String>, err: Error) -> Self {
        Error::Key { key: key.into(), source: Box::new(err) }
    }

    pub(crate) fn elem(index: usize, err: Error) -> Self {
        Error::Elem { index, source: Box::new(err) }
    }

    pub(crate) fn op(index: usize, err: Error) -> Self {
        Error::Op { index, source: Box::new(err) }
    }

    /// Strip all location wrappers and return the underlying failure
    pub fn root(&self) -> &Error {
        match self {
            Error::Key { source, .. }
            | Error::Elem { source, .. }
            | Error::Op { source, .. }
            | Error::Append { source }
            | Error::Mapping { source, .. } => source.root(),
            other => other,
        }
    }

    /// Individual errors of an aggregate, or this error alone
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Multiple(errs) => errs,
            other => std::slice::from_ref(other),
        }
    }

    /// Fold the errors collected during a pass into one aggregate.
    pub fn collect(errs: Vec<Error>) -> Result<()> {
        if errs.is_empty() {
            Ok(())
        } else {
            Err(Error::Multiple(errs))
        }
    }
}

fn join_errors(errs: &[Error]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
