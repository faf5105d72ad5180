//! Error handling for trice-rs
//!
//! This module defines the error taxonomy shared by the ID registry and the
//! decoder, plus a Result alias for use throughout the crate.
//!
//! Recoverable categories ([`TriceError::Parse`], [`TriceError::Collision`],
//! [`TriceError::Framing`]) are logged and processing continues. Fatal
//! categories ([`TriceError::Persistence`], [`TriceError::Transport`]) end the
//! affected subsystem with a non-zero exit code.

use crate::types::TriceId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for trice-rs operations
#[derive(Error, Debug)]
pub enum TriceError {
    /// Malformed call-site syntax or a format/parameter inconsistency
    #[error("Parse error at {location}: {message}")]
    Parse { location: String, message: String },

    /// The same ID is mapped to two different formats
    #[error("ID collision for {id}: kept {kept:?}, rejected {rejected:?} at {location}")]
    Collision {
        id: TriceId,
        kept: String,
        rejected: String,
        location: String,
    },

    /// Bad frame header, length mismatch or undecodable payload
    #[error("Framing error: {0}")]
    Framing(String),

    /// Failure reading or writing a persisted table
    #[error("Persistence error for {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// The underlying byte stream failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TriceError>,
    },
}

impl TriceError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TriceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build a persistence error for a table file
    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        TriceError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error must terminate the affected subsystem
    pub fn is_fatal(&self) -> bool {
        match self {
            TriceError::Persistence { .. } | TriceError::Transport(_) => true,
            TriceError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for trice-rs operations
pub type Result<T> = std::result::Result<T, TriceError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TriceError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TriceError::Io(e).with_context(f()))
    }
}
