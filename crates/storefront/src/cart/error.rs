//! Cart error types.

use std::time::Duration;

use thiserror::Error;

/// Generic message used when a failed response carries nothing readable.
const GENERIC_FAILURE: &str = "Request failed with status";

/// Errors that can occur when calling the storefront cart endpoints.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The storefront answered with a non-success status.
    ///
    /// `message` is already human readable (see [`GatewayError::from_response`]).
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Connection, TLS or protocol failure. The source has its URL stripped.
    #[error("Could not reach the store, please try again")]
    Transport(#[source] reqwest::Error),

    /// A success response that is not a cart snapshot.
    #[error("Invalid cart response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request did not resolve in time.
    #[error("Cart request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// An endpoint URL could not be built from the configured base.
    #[error("Invalid storefront URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl GatewayError {
    /// Build a status error, extracting the best human message from the body.
    ///
    /// Tries the JSON `description`, `message` and `error` fields in that
    /// order, then the raw body text, then a generic message.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            message: error_message(status, body),
        }
    }

    /// HTTP status for [`GatewayError::Status`] errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url())
    }
}

fn error_message(status: u16, body: &str) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        let from_json = ["description", "message", "error"].iter().find_map(|name| {
            fields
                .get(*name)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        });
        if let Some(message) = from_json {
            return message.to_string();
        }
    }

    let text = body.trim();
    if text.is_empty() {
        format!("{GENERIC_FAILURE} {status}")
    } else {
        text.to_string()
    }
}

/// Local precondition failures detected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The submission carried no variant identifier.
    #[error("Missing variant id")]
    MissingVariant,

    /// The variant identifier is not a storefront variant id.
    #[error("Invalid variant id: {0}")]
    InvalidVariant(String),

    /// The quantity is not a positive integer.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A bundle submission with no lines.
    #[error("No items to add")]
    EmptyBundle,
}

/// A failed mutation attempt, as surfaced through the store's error message.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
