//! Error types for Curly Core.

use thiserror::Error;

/// Result type alias for Curly operations.
pub type Result<T> = std::result::Result<T, CurlyError>;

/// Main error type for the template compiler.
#[derive(Debug, Error)]
pub enum CurlyError {
    /// Malformed delimiter pair or configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A class shorthand key was not found where one was expected.
    #[error("Can't parse {{ {expr} }}")]
    Shorthand {
        /// The normalized expression that failed to parse.
        expr: String,
    },

    /// A class shorthand guard opens a bracket that never closes.
    #[error("Unbalanced expression: {{ {expr} }}")]
    Unbalanced {
        /// The normalized expression that failed to parse.
        expr: String,
    },

    /// The evaluator rejected the generated code.
    #[error("Syntax error at {position}: {message}")]
    Syntax {
        /// What the parser expected or found.
        message: String,
        /// Byte offset into the generated code.
        position: usize,
    },

    /// An evaluation error that no guarded access absorbed.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
