//! Error handling for the session replay engine
//!
//! This module defines the error taxonomy used throughout the crate and a
//! Result alias. Every failure is either retried locally (transient store
//! failures) or handed back to the caller as a typed outcome; nothing here is
//! fatal to the hosting process.

use thiserror::Error;

/// Main error type for session replay operations
#[derive(Error, Debug)]
pub enum ReplayError {
    /// A recording (or marker) id that is absent from the store
    #[error("Not found: {id}")]
    NotFound { id: String },

    /// Rejected input, e.g. a marker timestamp outside the recording
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not valid in the current state (start while recording, ...)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The backing key-value store could not complete an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Errors related to channel communication with the store worker
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ReplayError>,
    },
}

impl ReplayError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ReplayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a not-found error for a recording id
    pub fn not_found(id: impl Into<String>) -> Self {
        ReplayError::NotFound { id: id.into() }
    }

    /// Whether a retry at the next flush interval may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ReplayError::Store(_) | ReplayError::Channel(_) | ReplayError::Io(_) => true,
            ReplayError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether this error (or the error it wraps) is a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            ReplayError::NotFound { .. } => true,
            ReplayError::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for session replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

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
