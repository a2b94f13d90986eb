//! Error types for the Searchline library.
//!
//! Two kinds of failure exist side by side. [`SearchlineError`] covers the
//! plumbing around a search (configuration loading, I/O, serialization,
//! invalid arguments). A search that reached the pipeline and failed is
//! reported as a [`SearchFailure`] instead, which carries a stable message
//! key for display and a diagnostic string for logs.
//!
//! # Examples
//!
//! ```
//! use searchline::error::{Result, SearchlineError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SearchlineError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::classify::ErrorClass;

/// The main error type for Searchline operations.
#[derive(Error, Debug)]
pub enum SearchlineError {
    /// I/O errors (config files, network sockets, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query-related errors
    #[error("Query error: {0}")]
    Query(String),

    /// Backend transport errors that happen outside a search execution
    #[error("Backend error: {0}")]
    Backend(String),

    /// A search reached the pipeline and failed
    #[error("Search failed: {0}")]
    Search(SearchFailure),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regular expression compilation errors
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SearchlineError.
pub type Result<T> = std::result::Result<T, SearchlineError>;

impl SearchlineError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SearchlineError::Config(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        SearchlineError::Query(msg.into())
    }

    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        SearchlineError::Backend(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SearchlineError::Other(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SearchlineError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// The search failure carried by this error, if any.
    pub fn as_search_failure(&self) -> Option<&SearchFailure> {
        match self {
            SearchlineError::Search(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<SearchFailure> for SearchlineError {
    fn from(failure: SearchFailure) -> Self {
        SearchlineError::Search(failure)
    }
}

/// Stable, localizable message keys.
pub mod keys {
    pub const PARSE_ERROR: &str = "searchline-parse-error";
    pub const REGEX_TOO_COMPLEX: &str = "searchline-regex-too-complex-error";
    pub const REGEX_SYNTAX: &str = "searchline-regex-syntax-error";
    pub const BACKEND_REFUSED: &str = "searchline-backend-refused";
    pub const BACKEND_ERROR: &str = "searchline-backend-error";
    pub const TOO_BUSY: &str = "searchline-too-busy-error";
    pub const REGEX_TOO_BUSY: &str = "searchline-regex-too-busy-error";
    pub const TIMED_OUT: &str = "searchline-timed-out";
    pub const REGEX_TIMED_OUT: &str = "searchline-regex-timed-out";
    pub const DEGRADED_QUERY: &str = "searchline-degraded-query";
}

/// What went wrong with a search, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend could not parse the query, even after degrading it.
    ParseError,
    /// The regex compiled to an automaton larger than the backend allows.
    RegexTooComplex { detail: String },
    /// The regex itself is malformed.
    RegexSyntax { message: String, position: String },
    /// The backend refused to serve the query.
    BackendRefused,
    /// The backend failed to answer.
    BackendError,
    /// No admission slot was available.
    TooBusy,
    /// The client-side deadline elapsed.
    Timeout,
}

/// A typed, user-presentable search failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Stable message key (see [`keys`]).
    pub message_key: &'static str,
    /// Human-oriented diagnostic for logs. Never shown to end users.
    pub diagnostic: String,
    /// Classification of the backend error, when a backend call was made.
    pub class: Option<ErrorClass>,
}

impl SearchFailure {
    pub fn new(
        kind: FailureKind,
        message_key: &'static str,
        diagnostic: impl Into<String>,
        class: Option<ErrorClass>,
    ) -> Self {
        SearchFailure {
            kind,
            message_key,
            diagnostic: diagnostic.into(),
            class,
        }
    }

    /// No admission slot was available within the wait budget.
    pub fn too_busy(message_key: &'static str, diagnostic: impl Into<String>) -> Self {
        SearchFailure::new(FailureKind::TooBusy, message_key, diagnostic, None)
    }

    /// The client-side deadline elapsed before the backend answered.
    pub fn timeout(message_key: &'static str, diagnostic: impl Into<String>) -> Self {
        SearchFailure::new(FailureKind::Timeout, message_key, diagnostic, None)
    }

    /// True for failures that never reached the backend.
    pub fn is_admission_failure(&self) -> bool {
        self.kind == FailureKind::TooBusy
    }
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message_key, self.diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SearchlineError::config("Test config error");
        assert_eq!(error.to_string(), "Configuration error: Test config error");

        let error = SearchlineError::query("Test query error");
        assert_eq!(error.to_string(), "Query error: Test query error");

        let error = SearchlineError::invalid_argument("offset");
        assert_eq!(error.to_string(), "Error: Invalid argument: offset");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = SearchlineError::from(io_error);

        match error {
            SearchlineError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_search_failure_round_trips_through_error() {
        let failure = SearchFailure::too_busy(keys::TOO_BUSY, "pool search exhausted");
        assert!(failure.is_admission_failure());

        let error: SearchlineError = failure.clone().into();
        assert_eq!(error.as_search_failure(), Some(&failure));
        assert_eq!(
            error.to_string(),
            "Search failed: searchline-too-busy-error (pool search exhausted)"
        );
    }
}
