//! Unified error types for the splitstack workspace.
//!
//! Library crates return [`StackError`]; only the CLI binary converts it
//! into `anyhow::Error` at the edge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StackError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An identifier was declared twice within the same scope.
    #[error("duplicate {scope} identifier: {id}")]
    DuplicateId {
        /// Scope in which the collision happened (stack, export, template).
        scope: &'static str,
        /// The colliding identifier.
        id: String,
    },

    /// A template value points at something that is not declared.
    #[error("unresolved reference in stack {stack}: {from} -> {target}")]
    UnresolvedReference {
        /// Stack containing the dangling reference.
        stack: String,
        /// Logical ID (or output) holding the reference.
        from: String,
        /// Target that could not be resolved.
        target: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// YAML rendering failed.
    #[error("yaml error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_message_names_both_ends() {
        let err = StackError::UnresolvedReference {
            stack: "EcsStack".into(),
            from: "Service".into(),
            target: "Missing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("EcsStack"), "got: {msg}");
        assert!(msg.contains("Service -> Missing"), "got: {msg}");
    }

    #[test]
    fn json_errors_convert() {
        let source = serde_json::from_str::<u8>("not json").unwrap_err();
        let err: StackError = source.into();
        assert!(err.to_string().starts_with("serialization error"));
    }
}
