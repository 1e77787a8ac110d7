//! Error types for textpipe
//!
//! This module defines the error types used throughout the engine.
//! All errors are designed to be informative and actionable.
//!
//! Engine errors raised while a command is being dispatched are wrapped
//! once as [`EngineError::FilterFailure`], which stamps the failing
//! command's original text and normalized name onto the error before it
//! reaches the caller of `execute`. Errors raised by filter code that are
//! *not* engine errors travel through the [`EngineError::External`]
//! variant untouched, so host error handlers see the original cause.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// Boxed error type carried by [`EngineError::External`].
pub type ExternalError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for textpipe
#[derive(Error, Debug)]
pub enum EngineError {
    /// The invoked name has no live registration and no hidden-command record
    #[error("no filter is registered under '{name}'")]
    CommandMissing { name: String },

    /// The invoked name matches a hidden-command record; the recorded
    /// reason (missing dependency or explicit removal) is surfaced
    #[error("the command '{name}' is unavailable: {reason}")]
    CommandUnavailable { name: String, reason: String },

    /// The interpreter's next-label cursor names a label absent from the queue
    #[error("no command carries the label '{label}'")]
    UnknownLabel { label: String },

    /// Retrieval of a variable not present in the local (and, if
    /// requested, global) store
    #[error("the variable '{name}' has not been set")]
    UnknownVariable { name: String },

    /// A safe-set attempted to overwrite a read-only variable
    #[error("the variable '{name}' is read-only and cannot be overwritten")]
    ReadOnlyViolation { name: String },

    /// An engine error observed while dispatching a command, annotated
    /// with the command's original text and normalized name
    #[error("command '{text}' ({name}) failed: {source}")]
    FilterFailure {
        name: String,
        text: String,
        #[source]
        source: Box<EngineError>,
    },

    /// A configuration document could not be parsed or validated
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A non-engine error raised by filter code; propagated unchanged
    #[error(transparent)]
    External(#[from] ExternalError),
}

impl EngineError {
    /// Create a command-missing error
    pub fn command_missing(name: impl Into<String>) -> Self {
        Self::CommandMissing { name: name.into() }
    }

    /// Create a command-unavailable error
    pub fn command_unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-label error
    pub fn unknown_label(label: impl Into<String>) -> Self {
        Self::UnknownLabel {
            label: label.into(),
        }
    }

    /// Create an unknown-variable error
    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    /// Create a read-only-violation error
    pub fn read_only_violation(name: impl Into<String>) -> Self {
        Self::ReadOnlyViolation { name: name.into() }
    }

    /// Create an invalid-config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap an externally-typed error raised by filter code
    pub fn external(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::External(Box::new(err))
    }

    /// Annotate this error with the failing command's text and normalized
    /// name.
    ///
    /// Engine errors are wrapped once as [`EngineError::FilterFailure`];
    /// an error that is already annotated, and any [`EngineError::External`],
    /// passes through unchanged.
    pub fn annotate(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        match self {
            Self::External(_) | Self::FilterFailure { .. } => self,
            other => Self::FilterFailure {
                name: name.into(),
                text: text.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost engine error, unwrapping any [`EngineError::FilterFailure`]
    /// annotation layers.
    pub fn root(&self) -> &EngineError {
        match self {
            Self::FilterFailure { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error (or its root) is a read-only violation
    pub fn is_read_only_violation(&self) -> bool {
        matches!(self.root(), Self::ReadOnlyViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::command_missing("text.append");
        assert!(err.to_string().contains("no filter is registered"));
        assert!(err.to_string().contains("text.append"));

        let err = EngineError::command_unavailable("text.fetch", "missing dependency 'HttpClient'");
        assert!(err.to_string().contains("unavailable"));
        assert!(err.to_string().contains("HttpClient"));
    }

    #[test]
    fn test_annotate_wraps_engine_error_once() {
        let err = EngineError::unknown_variable("name")
            .annotate("text.replace", "Text.Replace $name")
            .annotate("text.replace", "Text.Replace $name");

        match &err {
            EngineError::FilterFailure { name, text, source } => {
                assert_eq!(name, "text.replace");
                assert_eq!(text, "Text.Replace $name");
                assert!(matches!(**source, EngineError::UnknownVariable { .. }));
            }
            other => panic!("expected FilterFailure, got {other:?}"),
        }
        assert!(matches!(err.root(), EngineError::UnknownVariable { .. }));
    }

    #[test]
    fn test_annotate_passes_external_through() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = EngineError::external(io).annotate("http.get", "Http.Get url");
        assert!(matches!(err, EngineError::External(_)));
        assert_eq!(err.to_string(), "socket closed");
    }

    #[test]
    fn test_root_and_predicates() {
        let err = EngineError::read_only_violation("title").annotate("text.set", "Text.Set");
        assert!(err.is_read_only_violation());
        assert!(!EngineError::command_missing("x").is_read_only_violation());
    }
}
