//! API error type.

use serde_json::Value;
use thiserror::Error;

/// Errors raised by the Schedules Direct transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP request could not be sent or its body read.
    #[error("request to {path} failed: {source}")]
    Http {
        /// Request path.
        path: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        /// Request path.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The server answered with an error envelope (`response` key present).
    #[error("server error {code}: {message}")]
    Server {
        /// Numeric error code (`0` when absent).
        code: i64,
        /// Human readable message.
        message: String,
        /// Full envelope.
        payload: Box<Value>,
    },

    /// The token endpoint reported a nonzero status code.
    #[error("service offline: {message}")]
    ServiceOffline {
        /// Human readable message.
        message: String,
        /// Full response.
        payload: Box<Value>,
    },

    /// A data endpoint was called before `login()`.
    #[error("call login() first")]
    LoginRequired,

    /// The request URL could not be built.
    #[error("invalid request path {path}: {source}")]
    InvalidUrl {
        /// Request path.
        path: String,
        /// Underlying URL error.
        #[source]
        source: url::ParseError,
    },
}

impl ApiError {
    /// Builds a `Server` error from an error envelope.
    #[must_use]
    pub fn from_envelope(payload: Value) -> Self {
        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = envelope_message(&payload);
        Self::Server {
            code,
            message,
            payload: Box::new(payload),
        }
    }

    /// Returns the server error code, if this is a `Server` error.
    #[must_use]
    pub const fn server_code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Returns `true` when `value` is an error envelope.
#[must_use]
pub fn is_error_envelope(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key("response"))
}

/// Extracts the message of an envelope, falling back to the `response` tag.
#[must_use]
pub fn envelope_message(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| value.get("response").and_then(Value::as_str))
        .map_or_else(|| String::from("unknown error"), String::from)
}
