//! @ai:module:intent Error types for client operations
//! @ai:module:layer domain
//! @ai:module:public_api Error, Operation, Result
//! @ai:module:stateless true

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// @ai:intent Backend operation an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Health,
    Analyze,
    Feedback,
    Metrics,
    Embeddings,
}

impl Operation {
    /// @ai:intent Get string representation
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Health => "Health",
            Operation::Analyze => "Analyze",
            Operation::Feedback => "Feedback",
            Operation::Metrics => "Metrics",
            Operation::Embeddings => "Embeddings",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// @ai:intent Unified error type for all client operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation} failed: {status} {body}")]
    Http {
        operation: Operation,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{operation} request was canceled")]
    Canceled { operation: Operation },

    #[error(
        "{operation} request timed out after {}ms. Check your connection and try again.",
        timeout.as_millis()
    )]
    TimedOut {
        operation: Operation,
        timeout: Duration,
    },

    #[error("No API base reachable (tried {})", tried.join(", "))]
    NoReachableBase { tried: Vec<String> },

    #[error("{operation} request failed: {source}")]
    Network {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode {operation} response: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Cannot read image {reference}: {reason}")]
    Image { reference: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Error {
    /// @ai:intent True for caller-initiated cancellation
    /// @ai:effects pure
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled { .. })
    }

    /// @ai:intent True when an internal deadline elapsed
    /// @ai:effects pure
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }

    /// @ai:intent HTTP status of a non-success response, if any
    /// @ai:effects pure
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
