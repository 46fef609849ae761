//! Error types for the Optimus control plane.
//!
//! Every layer reports failures as an [`OptimusError`]. A domain error
//! carries an [`ErrorKind`] that the transport boundary maps onto a
//! status code; batch operations aggregate several errors into a
//! [`MultiError`] and surface it as [`OptimusError::Multi`].

use std::fmt;

use thiserror::Error;

/// Boxed lower-layer error kept as the `source` of a domain error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Internal,
    FailedPrecondition,
    InvalidStateTransition,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "resource already exists",
            Self::InvalidArgument => "invalid argument",
            Self::Internal => "internal error",
            Self::FailedPrecondition => "failed precondition",
            Self::InvalidStateTransition => "invalid state transition",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum OptimusError {
    #[error("{kind} for entity {entity}: {message}{}", source_suffix(.source))]
    Domain {
        kind: ErrorKind,
        entity: String,
        message: String,
        source: Option<BoxError>,
    },

    #[error("{}", render_multi(.message, .errors))]
    Multi {
        message: String,
        errors: Vec<OptimusError>,
    },
}

pub type OptimusResult<T> = Result<T, OptimusError>;

fn source_suffix(source: &Option<BoxError>) -> String {
    match source {
        Some(err) => format!(": {err}"),
        None => String::new(),
    }
}

fn render_multi(message: &str, errors: &[OptimusError]) -> String {
    let mut leaves = Vec::new();
    for err in errors {
        err.collect_leaves(&mut leaves);
    }

    let mut out = format!("{message}:");
    for leaf in leaves {
        out.push_str("\n - ");
        out.push_str(&leaf.to_string());
    }
    out
}

impl OptimusError {
    fn domain(kind: ErrorKind, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            kind,
            entity: entity.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::domain(ErrorKind::NotFound, entity, message)
    }

    pub fn already_exists(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::domain(ErrorKind::AlreadyExists, entity, message)
    }

    pub fn invalid_argument(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::domain(ErrorKind::InvalidArgument, entity, message)
    }

    pub fn failed_precondition(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::domain(ErrorKind::FailedPrecondition, entity, message)
    }

    pub fn invalid_state_transition(
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::domain(ErrorKind::InvalidStateTransition, entity, message)
    }

    pub fn internal(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::domain(ErrorKind::Internal, entity, message)
    }

    /// Internal error wrapping a foreign (non-domain) failure.
    pub fn internal_with(
        entity: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Domain {
            kind: ErrorKind::Internal,
            entity: entity.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Kind of this error. A multi error reports the kind shared by all
    /// of its children, or [`ErrorKind::Internal`] when they disagree.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain { kind, .. } => *kind,
            Self::Multi { errors, .. } => {
                let mut kinds = errors.iter().map(OptimusError::kind);
                match kinds.next() {
                    Some(first) if kinds.all(|k| k == first) => first,
                    _ => ErrorKind::Internal,
                }
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Flattened list of the non-aggregate errors contained in `self`.
    pub fn leaves(&self) -> Vec<&OptimusError> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a OptimusError>) {
        match self {
            Self::Domain { .. } => out.push(self),
            Self::Multi { errors, .. } => {
                for err in errors {
                    err.collect_leaves(out);
                }
            }
        }
    }
}

/// Wraps `err` with higher-level context, keeping its kind.
pub fn add_error_context(
    err: OptimusError,
    entity: impl Into<String>,
    message: impl Into<String>,
) -> OptimusError {
    OptimusError::Domain {
        kind: err.kind(),
        entity: entity.into(),
        message: message.into(),
        source: Some(Box::new(err)),
    }
}

/// Accumulates errors from a batch operation.
///
/// An empty aggregate is equivalent to success, see
/// [`MultiError::into_result`].
#[derive(Debug, Default)]
pub struct MultiError {
    message: String,
    errors: Vec<OptimusError>,
}

impl MultiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn append(&mut self, err: OptimusError) {
        self.errors.push(err);
    }

    /// Records the error of `result`, if any, and hands back the value.
    pub fn append_result<T>(&mut self, result: OptimusResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.append(err);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_result(self) -> OptimusResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(OptimusError::Multi {
            message: self.message,
            errors: self.errors,
        })
    }
}
