//! Error types for the Trackflow pipeline engine.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`ConfigErrors`] - aggregated schema violations, raised before any step runs
//! - [`FilterError`] - malformed filter shorthand
//! - [`TemplateError`] - unknown or malformed template tags
//! - [`ProviderError`] / [`SinkError`] - collaborator failures
//! - [`StepError`] - everything a single step can fail with
//! - [`PipelineError`] - top-level run errors
//! - [`LoadError`] - reading pipeline definition files
//! - [`OptionsError`] - run options from the environment
//!
//! Lower layers convert into upper ones via `From`, so `?` works across
//! boundaries. Collaborator failures are wrapped with a stable prefix naming
//! the high-level operation that failed.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// What kind of rule a definition violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The document (or a step) is not a JSON object.
    InvalidDocument,
    /// A required field is absent.
    MissingField,
    /// A field is not declared by the step's descriptor.
    UnknownField,
    /// A field is present but its value breaks the field's rule.
    InvalidValue,
    /// `type` names no registered step.
    UnknownStepType { found: String, allowed: Vec<String> },
}

/// A single schema violation, keyed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Every violation found in a pipeline definition, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pipeline definition ({} violation(s)): {}", .0.len(), join_violations(.0))]
pub struct ConfigErrors(pub Vec<Violation>);

impl ConfigErrors {
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    /// Violations reported at exactly `path`.
    pub fn at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.0.iter().filter(move |v| v.path == path)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Filter / Template Errors
// =============================================================================

/// Errors while compiling a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The operator prefix of a shorthand string could not be parsed.
    #[error("malformed filter shorthand for field '{field}': {input:?}")]
    MalformedShorthand { field: String, input: String },

    /// A release date comparand that names no calendar day (`2008-02-30`).
    #[error("invalid date for filter field '{field}': {input:?}")]
    InvalidDate { field: String, input: String },
}

/// Errors while rendering a template string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{...}}` tag names no known helper.
    #[error("unknown template tag: {{{{{0}}}}}")]
    UnknownTag(String),

    /// A `{{` with no closing `}}`.
    #[error("unterminated template tag in {0:?}")]
    Unterminated(String),

    /// The strftime format given to `date` is not valid.
    #[error("invalid date format: {0:?}")]
    InvalidDateFormat(String),
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Errors raised by a [`crate::provider::Provider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing access token.
    #[error("missing {0} environment variable")]
    MissingToken(String),

    /// The locator does not name an item of the expected kind.
    #[error("invalid {kind} locator: {locator}")]
    InvalidLocator { kind: String, locator: String },

    /// The item does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Remote answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// Catalog file could not be read.
    #[error("catalog IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog JSON error.
    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a [`crate::sink::Sink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The filename would escape the sink's root.
    #[error("invalid export filename: {0}")]
    InvalidFilename(String),

    /// IO error.
    #[error("sink IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Step Errors
// =============================================================================

/// Errors raised while a single step executes.
#[derive(Debug, Error)]
pub enum StepError {
    /// A step referenced a collection no earlier step produced.
    #[error("invalid track source \"{key}\": no earlier step produced a collection with this key")]
    InvalidTrackSource { key: String },

    /// The step's config could not be deserialized into its typed form.
    #[error("invalid step config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Serializing an export payload failed.
    #[error("an error occurred serializing export: {0}")]
    Export(String),

    #[error("an error occurred fetching album tracks: {0}")]
    FetchAlbum(#[source] ProviderError),

    #[error("an error occurred fetching library tracks: {0}")]
    FetchLibrary(#[source] ProviderError),

    #[error("an error occurred fetching playlist tracks: {0}")]
    FetchPlaylist(#[source] ProviderError),

    #[error("an error occurred replacing playlist tracks: {0}")]
    ReplaceTracks(#[source] ProviderError),

    #[error("an error occurred updating playlist details: {0}")]
    UpdateDetails(#[source] ProviderError),

    #[error("an error occurred writing export: {0}")]
    Write(#[source] SinkError),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline run errors.
///
/// This is what [`crate::transform::pipeline::Executor::run`] and
/// [`crate::transform::pipeline::run_pipeline`] return.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The definition failed schema validation.
    #[error(transparent)]
    Config(#[from] ConfigErrors),

    /// A step's type has no registered descriptor. Validation should have caught this.
    #[error("step '{key}' has unregistered type '{step_type}'")]
    UnregisteredStep { key: String, step_type: String },

    /// A step failed; the run stopped here.
    #[error("step '{key}' ({step_type}) failed: {source}")]
    Step {
        key: String,
        step_type: String,
        #[source]
        source: StepError,
    },
}

impl PipelineError {
    /// The step error behind this failure, if a step raised it.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            PipelineError::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

// =============================================================================
// Loader Errors
// =============================================================================

/// Errors while reading a pipeline definition file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read pipeline file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON pipeline: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML pipeline: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("pipeline file is empty")]
    Empty,
}

/// Errors in run options taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("invalid {var} value {value:?}: expected an unsigned integer")]
    InvalidNumber { var: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for step execution.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;
