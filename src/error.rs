//! Error types for request validation and schema loading.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::path::FieldPath;
use crate::types::Source;

/// Errors while loading schemas or route configuration files.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid route config {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

/// A route was configured with something that cannot act as a schema.
///
/// Never turned into a 400: it is a programming error, surfaced as a 500 by
/// the middleware and logged at `error` level.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("{slot} schema is not a usable schema: {reason}")]
    NonConformingSchema { slot: Source, reason: String },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

impl IntoResponse for ConfigError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "route validation misconfigured");

        let body = serde_json::json!({
            "statusCode": 500,
            "error": "Internal Server Error",
            "message": "An internal error occurred",
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// A JSON value that does not compile as a JSON Schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid schema: {message}")]
pub struct InvalidSchema {
    pub message: String,
}

/// Malformed dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty segment in path \"{path}\"")]
    EmptySegment { path: String },

    #[error("unclosed bracket in path \"{path}\"")]
    UnclosedBracket { path: String },

    #[error("invalid index \"{index}\" in path \"{path}\"")]
    InvalidIndex { path: String, index: String },

    #[error("unexpected '{character}' in path \"{path}\"")]
    UnexpectedCharacter { path: String, character: char },
}

/// Single validation issue reported by a schema.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// Location of the invalid value within its request source.
    pub path: FieldPath,
    /// Human-readable error message.
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_root() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}
