//! Error types for translation-apply
//!
//! This module provides the error handling for the library, including:
//! - The crate-wide [`Error`] enum and [`Result`] alias
//! - Machine-readable error codes for surfacing failures to a UI layer
//! - [`RemoteErrorBody`], the structured error shape returned by remote APIs
//! - Human-readable message extraction used by progress reporting

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for translation-apply operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error code reported when a deep copy in `Throw` mode meets a cycle
pub const CYCLIC_DEPENDENCY_CODE: &str = "CONTENT_ITEM_CYCLIC_DEPENDENCY";

/// Main error type for translation-apply
///
/// Each variant carries enough context to report the failure back to the
/// remote task system and to a progress observer.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// A remote API answered with a non-success HTTP status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code of the response
        status: u16,
        /// Error message (response text or extracted message)
        message: String,
        /// Parsed JSON error body, when the response carried one
        body: Option<serde_json::Value>,
    },

    /// Network error (connection refused, timeout, TLS failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Content item or task not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency failure while updating a content item
    #[error("version conflict while updating content item {id}")]
    VersionConflict {
        /// The content item whose version was stale
        id: String,
    },

    /// Circular dependency met while deep copying in `Throw` mode
    #[error("CONTENT_ITEM_CYCLIC_DEPENDENCY: Circular dependency ({from}) -> ({to}) is not allowed.")]
    CyclicDependency {
        /// Item holding the edge that closes the cycle
        from: String,
        /// Ancestor the edge points back to
        to: String,
    },

    /// All progress slots are in use
    #[error("progress context overflow")]
    ProgressOverflow,

    /// A body path could not be parsed or resolved
    #[error("invalid body path: {0}")]
    InvalidPath(String),

    /// A downloaded translation payload could not be understood
    #[error("invalid translation payload: {0}")]
    InvalidPayload(String),

    /// A requested localization never appeared within the configured poll timeout
    #[error("localization {locale} of content item {id} is still pending")]
    LocalizationPending {
        /// Source content item id
        id: String,
        /// Target locale that was requested
        locale: String,
    },

    /// Applying a task failed; wraps the underlying cause
    #[error("task {task_id} failed: {source}")]
    TaskFailed {
        /// Remote task id
        task_id: i64,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error code for this error
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Api { .. } => "api_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::VersionConflict { .. } => "version_conflict",
            Error::CyclicDependency { .. } => CYCLIC_DEPENDENCY_CODE,
            Error::ProgressOverflow => "progress_overflow",
            Error::InvalidPath(_) => "invalid_path",
            Error::InvalidPayload(_) => "invalid_payload",
            Error::LocalizationPending { .. } => "localization_pending",
            Error::TaskFailed { source, .. } => source.error_code(),
            Error::Other(_) => "internal_error",
        }
    }

    /// HTTP status of the failed remote call, if this error came from one
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            Error::TaskFailed { source, .. } => source.http_status(),
            _ => None,
        }
    }

    /// Strip [`Error::TaskFailed`] wrappers and return the root cause
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::TaskFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Human-readable message, preferring the structured message of an API error body
    ///
    /// Bodies carrying `message` produce `"Status {status}: {message}"`; bodies carrying
    /// an `errors` list produce `"{code} ({entity}): {message}"` from its first entry.
    /// Everything else falls back to the `Display` form.
    pub fn display_message(&self) -> String {
        if let Error::Api {
            status,
            body: Some(body),
            ..
        } = self.root_cause()
            && let Ok(parsed) = serde_json::from_value::<RemoteErrorBody>(body.clone())
            && let Some(message) = parsed.describe(*status)
        {
            return message;
        }

        self.to_string()
    }
}

/// Structured error body returned by the content and task APIs
///
/// # Example JSON
///
/// ```json
/// {
///   "status": 409,
///   "message": "Content item version mismatch",
///   "errors": [
///     { "code": "FIELD_INVALID", "entity": "ContentItem", "message": "bad", "invalidValue": 3 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteErrorBody {
    /// Status echoed in the body (may differ from the transport status)
    #[serde(default)]
    pub status: Option<u16>,

    /// Top-level message
    #[serde(default)]
    pub message: Option<String>,

    /// Field-level errors
    #[serde(default)]
    pub errors: Vec<RemoteFieldError>,
}

/// A single field-level error inside [`RemoteErrorBody`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFieldError {
    /// Machine-readable code (e.g., "FIELD_INVALID")
    #[serde(default)]
    pub code: Option<String>,

    /// Entity the error refers to
    #[serde(default)]
    pub entity: Option<String>,

    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,

    /// The value that was rejected
    #[serde(default)]
    pub invalid_value: Option<serde_json::Value>,
}

impl RemoteErrorBody {
    /// Render the body as a single message line, or `None` if it carries nothing useful
    pub fn describe(&self, transport_status: u16) -> Option<String> {
        if let Some(message) = &self.message {
            return Some(format!(
                "Status {}: {}",
                self.status.unwrap_or(transport_status),
                message
            ));
        }

        let first = self.errors.first()?;
        let mut text = format!(
            "{} ({}): {}",
            first.code.as_deref().unwrap_or("ERROR"),
            first.entity.as_deref().unwrap_or("unknown"),
            first.message.as_deref().unwrap_or_default()
        );
        if let Some(invalid) = &first.invalid_value {
            let rendered = match invalid {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            text.push_str(&format!(" ({rendered})"));
        }
        Some(text)
    }
}
