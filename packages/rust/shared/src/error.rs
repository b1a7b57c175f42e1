//! Error types for FOA Intel.
//!
//! Library crates use [`FoaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Outcomes that are expected during normal ingestion (an unparsable date, a
//! URL without an identifier) are not errors; they surface as `None` or as a
//! tagged payload instead.

use std::path::PathBuf;

/// Top-level error type for all FOA Intel operations.
#[derive(Debug, thiserror::Error)]
pub enum FoaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure talking to an upstream API (timeout, connection, HTTP status).
    #[error("network error: {0}")]
    Network(String),

    /// Malformed upstream payload or export document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record or input validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Ontology document could not be loaded.
    #[error("ontology error: {0}")]
    Ontology(String),

    /// The embedding strategy cannot run in this environment.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A source returned nothing usable for the requested opportunity.
    #[error("ingestion failed: {0}")]
    Ingestion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FoaError>;

impl FoaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the embedding strategy should be skipped.
    pub fn is_strategy_unavailable(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FoaError::config("missing ontology path");
        assert_eq!(err.to_string(), "config error: missing ontology path");

        let err = FoaError::Ingestion("Could not extract opportunity ID".into());
        assert!(err.to_string().contains("opportunity ID"));
    }

    #[test]
    fn embedding_unavailable_is_skippable() {
        assert!(FoaError::EmbeddingUnavailable("no endpoint".into()).is_strategy_unavailable());
        assert!(!FoaError::Network("timeout".into()).is_strategy_unavailable());
    }
}
