//! Error types accumulated and returned by query execution.

use std::fmt::Display;

use derive_more::with_trait::{Display as DisplayDerive, Error as ErrorDerive, From};
use fnv::FnvHashSet;
use serde::Serialize;

use crate::{
    path::{Path, PathSegment},
    value::Value,
};

/// A position in the query source, used for error locations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct SourceLocation {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl From<graphql_parser::Pos> for SourceLocation {
    fn from(pos: graphql_parser::Pos) -> Self {
        Self {
            line: pos.line,
            column: pos.column,
        }
    }
}

/// Error type for failures that occur during field resolution.
///
/// Field errors are represented by a human-readable message and an optional
/// [`Value`] with additional information that surfaces under the error's
/// `extensions` key. They convert from any type implementing [`Display`],
/// which makes error chaining with the `?` operator a breeze.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    kind: FieldErrorKind,
}

#[derive(Clone, Debug, PartialEq)]
enum FieldErrorKind {
    Message { message: String, extensions: Value },
    // Private sentinel: the resolver awaited a wrapped value and must be
    // restaged after the current batch materializes.
    NextStage,
}

impl<T: Display> From<T> for FieldError {
    fn from(e: T) -> Self {
        Self {
            kind: FieldErrorKind::Message {
                message: e.to_string(),
                extensions: Value::Null,
            },
        }
    }
}

impl FieldError {
    /// Constructs a new [`FieldError`] with additional `extensions` data.
    #[must_use]
    pub fn new<T: Display>(e: T, extensions: Value) -> Self {
        Self {
            kind: FieldErrorKind::Message {
                message: e.to_string(),
                extensions,
            },
        }
    }

    pub(crate) fn next_stage() -> Self {
        Self {
            kind: FieldErrorKind::NextStage,
        }
    }

    pub(crate) fn is_next_stage(&self) -> bool {
        matches!(self.kind, FieldErrorKind::NextStage)
    }

    /// Returns the message of this [`FieldError`].
    #[must_use]
    pub fn message(&self) -> &str {
        match &self.kind {
            FieldErrorKind::Message { message, .. } => message,
            FieldErrorKind::NextStage => "deferred value is not materialized yet",
        }
    }

    /// Returns the `extensions` of this [`FieldError`], [`Value::Null`] when
    /// absent.
    #[must_use]
    pub fn extensions(&self) -> &Value {
        match &self.kind {
            FieldErrorKind::Message { extensions, .. } => extensions,
            FieldErrorKind::NextStage => &Value::Null,
        }
    }

    fn into_parts(self) -> (String, Value) {
        match self.kind {
            FieldErrorKind::Message {
                message,
                extensions,
            } => (message, extensions),
            FieldErrorKind::NextStage => (
                "deferred value is not materialized yet".into(),
                Value::Null,
            ),
        }
    }
}

/// The result of resolving the value of a field.
pub type FieldResult<T> = Result<T, FieldError>;

/// Error raised by the deferred backend for an entire batch call.
#[derive(Clone, Debug, DisplayDerive, ErrorDerive, PartialEq)]
#[display("backend error: {message}")]
pub struct BackendError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl BackendError {
    /// Constructs a new [`BackendError`] from the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An error that occurred during execution, bound for the response's
/// `errors` list.
///
/// Carries the source positions of the field nodes it originated from and
/// the response path of the failed field.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionError {
    message: String,
    locations: Vec<SourceLocation>,
    path: Vec<PathSegment>,
    extensions: Value,
    original: Option<BackendError>,
}

impl ExecutionError {
    /// Constructs an [`ExecutionError`] from a [`FieldError`] raised at
    /// `path`.
    pub fn at_path(error: FieldError, locations: Vec<SourceLocation>, path: &Path) -> Self {
        let (message, extensions) = error.into_parts();
        Self {
            message,
            locations,
            path: path.to_vec(),
            extensions,
            original: None,
        }
    }

    /// Constructs an [`ExecutionError`] from forward path segments.
    pub fn at_segments(
        error: FieldError,
        locations: Vec<SourceLocation>,
        path: Vec<PathSegment>,
    ) -> Self {
        let (message, extensions) = error.into_parts();
        Self {
            message,
            locations,
            path,
            extensions,
            original: None,
        }
    }

    /// Constructs the single error covering a failed batch call.
    ///
    /// Such errors carry an empty path; every field awaiting the batch is
    /// implicitly null.
    pub fn from_backend(error: BackendError) -> Self {
        Self {
            message: error.message.clone(),
            locations: vec![],
            path: vec![],
            extensions: Value::Null,
            original: Some(error),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source positions in the query of the field that failed to resolve.
    pub fn locations(&self) -> &[SourceLocation] {
        &self.locations
    }

    /// The response path of the field that generated this error.
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// The raw backend error for batch failures, if any.
    pub fn original(&self) -> Option<&BackendError> {
        self.original.as_ref()
    }

    /// Structural fingerprint used for deduplication.
    fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap as _;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("message", &self.message)?;
        if !self.locations.is_empty() {
            map.serialize_entry("locations", &self.locations)?;
        }
        map.serialize_entry("path", &self.path)?;
        if !self.extensions.is_null() {
            map.serialize_entry("extensions", &self.extensions)?;
        }
        map.end()
    }
}

/// Drops errors whose JSON fingerprint already appeared, preserving the
/// order of first appearance.
pub(crate) fn dedupe_errors(errors: Vec<ExecutionError>) -> Vec<ExecutionError> {
    let mut seen = FnvHashSet::default();
    errors
        .into_iter()
        .filter(|e| seen.insert(e.fingerprint()))
        .collect()
}

/// Indicates whether a recorded error path is a prefix of `path`.
///
/// Work below an errored position is pruned instead of producing values or
/// further errors.
pub(crate) fn did_parent_error(path: &[PathSegment], errors: &[ExecutionError]) -> bool {
    errors.iter().any(|e| {
        !e.path.is_empty()
            && e.path.len() <= path.len()
            && e.path
                .iter()
                .zip(path)
                .all(|(a, b)| a.is_equivalent(b))
    })
}

/// An error that prevented query execution as a whole.
#[expect(missing_docs, reason = "self-explanatory")]
#[derive(Debug, DisplayDerive, From)]
pub enum GraphQLError {
    ParseError(graphql_parser::query::ParseError),
    #[display("No operation provided")]
    NoOperationProvided,
    #[display("Multiple operations provided")]
    MultipleOperationsProvided,
    #[display("Unknown operation name")]
    UnknownOperationName,
    #[display("Schema does not support mutations")]
    MutationsNotSupported,
    #[display("Schema does not support subscriptions")]
    SubscriptionsNotSupported,
}

impl std::error::Error for GraphQLError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ParseError(e) => Some(e),
            Self::NoOperationProvided
            | Self::MultipleOperationsProvided
            | Self::UnknownOperationName
            | Self::MutationsNotSupported
            | Self::SubscriptionsNotSupported => None,
        }
    }
}
