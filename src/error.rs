//! Error types for the Forge engine
//!
//! Compile errors are the only errors allowed to abort an operation outright;
//! everything raised while a template runs degrades to a fallback value and is
//! reported through tracing or the context's error channel instead.

use std::io;
use thiserror::Error;

/// Path reported for templates compiled without an explicit origin.
pub const DEFAULT_TEMPLATE_PATH: &str = "index file";

/// Top-level engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Template failed to compile
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Delivery to the render target failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Combined function pattern could not be built
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Line/column pair pointing into template source.
///
/// Lines are 1-based, columns 0-based, both counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (0-based)
    pub column: usize,
}

impl Location {
    /// Locate the character at `index` within `chars`.
    pub fn locate(chars: &[char], index: usize) -> Self {
        let mut location = Location { line: 1, column: 0 };
        for ch in chars.iter().take(index) {
            if *ch == '\n' {
                location.line += 1;
                location.column = 0;
            } else {
                location.column += 1;
            }
        }
        location
    }
}

/// Positioned compile failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (at {path}:{line}:{column})")]
pub struct CompileError {
    /// What went wrong
    pub kind: CompileErrorKind,
    /// Line of the offending tag (1-based)
    pub line: usize,
    /// Column of the offending tag (0-based)
    pub column: usize,
    /// Template path the source came from
    pub path: String,
}

impl CompileError {
    /// Build an error at a resolved location.
    pub fn new(kind: CompileErrorKind, location: Location, path: Option<&str>) -> Self {
        Self {
            kind,
            line: location.line,
            column: location.column,
            path: path.unwrap_or(DEFAULT_TEMPLATE_PATH).to_string(),
        }
    }

    /// Name of the function the error refers to.
    pub fn function(&self) -> &str {
        match &self.kind {
            CompileErrorKind::UnregisteredFunction(name) => name,
            CompileErrorKind::MissingBrackets { function }
            | CompileErrorKind::TooManyArguments { function, .. }
            | CompileErrorKind::UnclosedField { function } => function,
        }
    }
}

/// Compile failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// Name matched no registered function or alias
    #[error("Function {0} is not registered")]
    UnregisteredFunction(String),

    /// Function requires a bracketed argument list but none follows
    #[error("Function {function} requires brackets")]
    MissingBrackets {
        /// Function name
        function: String,
    },

    /// More arguments were supplied than the schema declares
    #[error("Function {function} expects {max} arguments at most")]
    TooManyArguments {
        /// Function name
        function: String,
        /// Declared field count
        max: usize,
    },

    /// Input ended before the field's `;` or `]`
    #[error("Function {function} is missing brace closure")]
    UnclosedField {
        /// Function name
        function: String,
    },
}

/// Convenience result alias for compile operations
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Errors raised by a render target while sending a container.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Target rejected the payload
    #[error("Target rejected payload: {0}")]
    Rejected(String),

    /// Transport-level failure
    #[error("Delivery failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// Convenience result alias for delivery operations
pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;
