//! Error types for askdb.
//!
//! Every pipeline stage returns its own typed failure; only the session
//! layer and the CLI turn these into user-facing text. Driver diagnostics
//! are preserved verbatim so the user can correct input and retry manually.

use std::time::Duration;

use thiserror::Error;

use crate::connect::BackendKind;

/// Failure to establish a database connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A field the chosen backend requires was not supplied. Raised before
    /// any socket or file is touched.
    #[error("missing required field `{field}` for a {backend} connection")]
    MissingField {
        backend: BackendKind,
        field: &'static str,
    },

    /// The driver rejected the connection attempt.
    #[error("connection failed: {0}")]
    Driver(String),
}

/// Failure while reading the database catalog.
#[derive(Debug, Error)]
pub enum IntrospectError {
    /// The connected server exposes no catalog askdb knows how to read.
    #[error("schema introspection is not supported here: {0}")]
    Unsupported(String),

    /// A catalog query failed.
    #[error("introspection failed: {0}")]
    Driver(String),
}

/// Failure while turning a question into SQL.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The model produced no usable SQL after stripping fences and prose.
    #[error("model response contained no usable SQL")]
    EmptyResponse,

    /// More than one statement came back. Refusing to guess which to run.
    #[error("model response contained {0} statements; expected exactly one")]
    MultiStatement(usize),

    /// The model call exceeded its bound.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport or API failure (quota, invalid key, HTTP error).
    #[error("model backend failure: {0}")]
    Backend(String),
}

/// Failure while executing a generated statement.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The statement's leading keyword is in the configured write set and
    /// the session is read-only. A policy gate, not a security boundary.
    #[error("{0} statements are not allowed in read-only mode (pass --read-write to lift the gate)")]
    WriteNotAllowed(String),

    /// The driver reported a syntax problem in the generated SQL.
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    /// Any other driver-level failure, diagnostic text preserved.
    #[error("query failed: {0}")]
    Runtime(String),

    /// The statement exceeded its execution bound.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// The main error type for askdb operations.
#[derive(Debug, Error)]
pub enum AskdbError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for askdb operations.
pub type AskdbResult<T> = Result<T, AskdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = ConnectError::MissingField {
            backend: BackendKind::Postgres,
            field: "host",
        };
        assert_eq!(
            err.to_string(),
            "missing required field `host` for a PostgreSQL connection"
        );
    }

    #[test]
    fn test_multi_statement_display() {
        let err = GenerateError::MultiStatement(3);
        assert_eq!(
            err.to_string(),
            "model response contained 3 statements; expected exactly one"
        );
    }

    #[test]
    fn test_top_level_is_transparent() {
        let err: AskdbError = GenerateError::EmptyResponse.into();
        assert_eq!(err.to_string(), "model response contained no usable SQL");
    }
}
