//! Error types for the markweave compiler
//!
//! Follows the dual-error pattern: specific error enums per stage
//! (syntax, validation, reference resolution, transformation, adapters)
//! and [`CompileError`] for library consumers. [`ProcessingError`] is the
//! diagnostic record collected by the visitor pipeline.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::node::SourcePosition;
use crate::tags::ContentModel;

/// Malformed markup input.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Syntax error{}: {message}", .position.map(|p| format!(" at {p}")).unwrap_or_default())]
pub struct SyntaxError {
    pub message: String,
    pub position: Option<SourcePosition>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = Some(position);
        self
    }
}

/// Content-model, attribute and id-uniqueness violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("<{tag}> at {position}: attribute '{attribute}' is not allowed")]
    DisallowedAttribute {
        tag: String,
        attribute: String,
        position: SourcePosition,
    },

    #[error("<{tag}> at {position}: missing required attribute '{attribute}'")]
    MissingAttribute {
        tag: String,
        attribute: String,
        position: SourcePosition,
    },

    #[error("<{tag}> at {position}: content model {model} does not allow {found}")]
    ContentModelViolation {
        tag: String,
        model: ContentModel,
        found: String,
        position: SourcePosition,
    },

    #[error("<{tag}> at {position}: child <{child}> is forbidden")]
    ForbiddenChild {
        tag: String,
        child: String,
        position: SourcePosition,
    },

    #[error("<{tag}> at {position}: child <{child}> is not in the allowed children")]
    DisallowedChild {
        tag: String,
        child: String,
        position: SourcePosition,
    },

    #[error("<{tag}> at {position}: {message}")]
    Custom {
        tag: String,
        message: String,
        position: SourcePosition,
    },

    /// Every repeated id with all positions where it occurs.
    #[error("Duplicate ids: {}", format_duplicates(.duplicates))]
    DuplicateIds {
        duplicates: BTreeMap<String, Vec<SourcePosition>>,
    },
}

fn format_duplicates(duplicates: &BTreeMap<String, Vec<SourcePosition>>) -> String {
    duplicates
        .iter()
        .map(|(id, positions)| {
            let at: Vec<String> = positions.iter().map(ToString::to_string).collect();
            format!("'{id}' at {}", at.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Position of the offending element (first occurrence for duplicate ids).
    pub fn position(&self) -> Option<SourcePosition> {
        match self {
            ValidationError::DisallowedAttribute { position, .. }
            | ValidationError::MissingAttribute { position, .. }
            | ValidationError::ContentModelViolation { position, .. }
            | ValidationError::ForbiddenChild { position, .. }
            | ValidationError::DisallowedChild { position, .. }
            | ValidationError::Custom { position, .. } => Some(*position),
            ValidationError::DuplicateIds { duplicates } => {
                duplicates.values().flatten().next().copied()
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::DuplicateIds { .. } => ErrorCode::DuplicateId,
            _ => ErrorCode::Validation,
        }
    }
}

/// Failures while resolving a reference or `extends` URI.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("Reference not found: {uri}")]
    NotFound { uri: String },

    #[error("No protocol handler for '{protocol}' (in {uri})")]
    UnsupportedProtocol { protocol: String, uri: String },

    #[error("Circular reference detected: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    #[error("Resolution of {uri} timed out after {}ms", .timeout.as_millis())]
    Timeout { uri: String, timeout: Duration },

    #[error("HTTP error {status} while fetching {uri}")]
    Http { uri: String, status: u16 },

    #[error("Transport error while fetching {uri}: {message}")]
    Transport { uri: String, message: String },

    #[error("IO error while reading {uri}: {message}")]
    Io { uri: String, message: String },

    #[error("Failed to decode content of {uri}: {message}")]
    Decode { uri: String, message: String },

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("{uri} resolved to {found}, expected {expected}")]
    InvalidTarget {
        uri: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Resolution depth exceeded {limit} levels at {uri}")]
    DepthExceeded { uri: String, limit: usize },
}

impl ReferenceError {
    /// Cycles and runaway depth always abort; everything else is an
    /// `error` whose effect depends on the document mode.
    pub fn severity(&self) -> Severity {
        match self {
            ReferenceError::CircularReference { .. } | ReferenceError::DepthExceeded { .. } => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ReferenceError::NotFound { .. } => ErrorCode::ReferenceNotFound,
            ReferenceError::UnsupportedProtocol { .. } => ErrorCode::UnsupportedProtocol,
            ReferenceError::CircularReference { .. } => ErrorCode::CircularReference,
            ReferenceError::Timeout { .. } => ErrorCode::Timeout,
            ReferenceError::Http { .. } => ErrorCode::Http,
            ReferenceError::Transport { .. } => ErrorCode::Transport,
            ReferenceError::Io { .. } => ErrorCode::Io,
            ReferenceError::Decode { .. } => ErrorCode::Decode,
            ReferenceError::InvalidUri(_) => ErrorCode::InvalidUri,
            ReferenceError::InvalidTarget { .. } => ErrorCode::InvalidTarget,
            ReferenceError::DepthExceeded { .. } => ErrorCode::DepthExceeded,
        }
    }

    /// Whether the failure depends on the path that led to the key rather
    /// than on the key itself. Such failures are never cached.
    pub fn is_path_dependent(&self) -> bool {
        matches!(
            self,
            ReferenceError::CircularReference { .. } | ReferenceError::DepthExceeded { .. }
        )
    }
}

/// Tag registry errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Tag <{0}> is already registered")]
    DuplicateTag(String),
}

/// Mapping rule and transformer errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid target path '{0}'")]
    InvalidTargetPath(String),

    #[error("Unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("Cannot convert '{input}' to {expected}")]
    Conversion { input: String, expected: &'static str },

    #[error("Rule {index} ({selector}): {message}")]
    Rule {
        index: usize,
        selector: String,
        message: String,
    },
}

/// Output adapter errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("No output adapter for format '{0}'")]
    NotFound(String),
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recorded, processing continues
    Warning,
    /// Aborts in strict mode, degrades to a warning in loose mode
    Error,
    /// Always aborts
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// Stable machine-readable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Syntax,
    Validation,
    DuplicateId,
    ReferenceNotFound,
    UnsupportedProtocol,
    CircularReference,
    Timeout,
    Http,
    Transport,
    Io,
    Decode,
    InvalidUri,
    InvalidTarget,
    DepthExceeded,
    InheritedChildrenDiscarded,
    UnknownTag,
    Visitor,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Syntax => "SYNTAX",
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::DuplicateId => "DUPLICATE_ID",
            ErrorCode::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            ErrorCode::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            ErrorCode::CircularReference => "CIRCULAR_REFERENCE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Http => "HTTP_ERROR",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Io => "IO",
            ErrorCode::Decode => "DECODE",
            ErrorCode::InvalidUri => "INVALID_URI",
            ErrorCode::InvalidTarget => "INVALID_TARGET",
            ErrorCode::DepthExceeded => "DEPTH_EXCEEDED",
            ErrorCode::InheritedChildrenDiscarded => "INHERITED_CHILDREN_DISCARDED",
            ErrorCode::UnknownTag => "UNKNOWN_TAG",
            ErrorCode::Visitor => "VISITOR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic collected while processing a document.
#[derive(Debug, Clone)]
pub struct ProcessingError {
    pub message: String,
    pub position: Option<SourcePosition>,
    pub file_path: Option<PathBuf>,
    pub severity: Severity,
    pub code: ErrorCode,
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ProcessingError {
    pub fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            file_path: None,
            severity,
            code,
            cause: None,
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, code, message)
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        if !position.is_unknown() {
            self.position = Some(position);
        }
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// The same diagnostic, downgraded to a warning.
    pub fn degraded(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// The underlying reference error, if this diagnostic came from one.
    pub fn reference_error(&self) -> Option<&ReferenceError> {
        self.cause.as_ref()?.downcast_ref::<ReferenceError>()
    }

    /// The underlying validation error, if this diagnostic came from one.
    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.cause.as_ref()?.downcast_ref::<ValidationError>()
    }
}

impl From<ReferenceError> for ProcessingError {
    fn from(err: ReferenceError) -> Self {
        Self::new(err.severity(), err.code(), err.to_string()).with_cause(err)
    }
}

impl From<ValidationError> for ProcessingError {
    fn from(err: ValidationError) -> Self {
        let position = err.position();
        let diagnostic = Self::error(err.code(), err.to_string()).with_cause(err);
        match position {
            Some(position) => diagnostic.with_position(position),
            None => diagnostic,
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.severity, self.code)?;
        if let Some(path) = &self.file_path {
            write!(f, " {}", path.display())?;
            if let Some(position) = self.position {
                write!(f, ":{position}")?;
            }
        } else if let Some(position) = self.position {
            write!(f, " at {position}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ProcessingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Main error type for compiler operations
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Processing was aborted by a fatal (or strict-mode) diagnostic
    #[error("Processing aborted: {0}")]
    Aborted(ProcessingError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Position;

    fn pos(line: usize, column: usize) -> SourcePosition {
        SourcePosition::new(Position::new(line, column, 0), Position::new(line, column, 0))
    }

    #[test]
    fn test_circular_reference_display() {
        let err = ReferenceError::CircularReference {
            cycle: vec!["id:a".into(), "id:b".into(), "id:a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Circular reference detected: id:a -> id:b -> id:a"
        );
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.code().as_str(), "CIRCULAR_REFERENCE");
    }

    #[test]
    fn test_not_found_is_error_severity() {
        let err = ReferenceError::NotFound {
            uri: "id:missing".into(),
        };
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.to_string(), "Reference not found: id:missing");
        assert!(!err.is_path_dependent());
        assert!(ReferenceError::DepthExceeded {
            uri: "id:deep".into(),
            limit: 2
        }
        .is_path_dependent());
    }

    #[test]
    fn test_duplicate_ids_lists_every_occurrence() {
        let mut duplicates = BTreeMap::new();
        duplicates.insert("x".to_string(), vec![pos(1, 1), pos(3, 5)]);
        let err = ValidationError::DuplicateIds { duplicates };
        assert_eq!(err.to_string(), "Duplicate ids: 'x' at 1:1, 3:5");
        assert_eq!(err.position(), Some(pos(1, 1)));
    }

    #[test]
    fn test_processing_error_keeps_cause() {
        let diagnostic = ProcessingError::from(ReferenceError::NotFound {
            uri: "id:gone".into(),
        })
        .with_position(pos(2, 4));

        assert_eq!(diagnostic.code, ErrorCode::ReferenceNotFound);
        assert_eq!(diagnostic.severity, Severity::Error);
        assert!(matches!(
            diagnostic.reference_error(),
            Some(ReferenceError::NotFound { .. })
        ));
        assert_eq!(
            diagnostic.to_string(),
            "error [REFERENCE_NOT_FOUND] at 2:4: Reference not found: id:gone"
        );
    }

    #[test]
    fn test_degraded_becomes_warning() {
        let diagnostic = ProcessingError::error(ErrorCode::Validation, "bad").degraded();
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert!(!diagnostic.is_fatal());
    }

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new("unexpected end").at(pos(4, 2));
        assert_eq!(err.to_string(), "Syntax error at 4:2: unexpected end");
    }
}
