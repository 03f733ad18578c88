//! Unified error handling for the route-skeleton library.
//!
//! The pure pipeline stages never fail: degenerate input yields empty
//! output. Errors come from configuration misuse, ingestion I/O, the
//! road-matching collaborator, and cancellation.

use thiserror::Error;

/// Unified error type for route-skeleton operations.
#[derive(Debug, Error)]
pub enum RouteSkeletonError {
    /// A configuration option violates a precondition
    #[error("Configuration error: {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Configuration JSON could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// The road-matching collaborator failed for a chunk
    #[error("{}", format_road_match(.message, .status_code))]
    RoadMatch {
        message: String,
        status_code: Option<u16>,
    },

    /// The external cancellation signal fired
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Malformed delimited input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl RouteSkeletonError {
    pub(crate) fn invalid_config(field: &str, message: impl Into<String>) -> Self {
        RouteSkeletonError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Error for a failed road-matching request.
    pub fn road_match(message: impl Into<String>, status_code: Option<u16>) -> Self {
        RouteSkeletonError::RoadMatch {
            message: message.into(),
            status_code,
        }
    }
}

fn format_road_match(message: &str, status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!("Road matching error ({}): {}", code, message),
        None => format!("Road matching error: {}", message),
    }
}

/// Result type alias for route-skeleton operations.
pub type Result<T> = std::result::Result<T, RouteSkeletonError>;
