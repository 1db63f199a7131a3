//! Response definitions
//!
//! Represents responses to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response status as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

/// A response to send to client
///
/// Tagged by `status`, so a success always carries `result` and an error
/// always carries `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        #[serde(default)]
        result: Value,
    },
    Error {
        message: String,
    },
}

impl Response {
    /// Create a success response
    pub fn success(result: impl Into<Value>) -> Self {
        Response::Success {
            result: result.into(),
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    /// Get the status
    pub fn status(&self) -> Status {
        match self {
            Response::Success { .. } => Status::Success,
            Response::Error { .. } => Status::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    /// The result payload, if this is a success
    pub fn result(&self) -> Option<&Value> {
        match self {
            Response::Success { result } => Some(result),
            Response::Error { .. } => None,
        }
    }

    /// The error message, if this is an error
    pub fn message(&self) -> Option<&str> {
        match self {
            Response::Success { .. } => None,
            Response::Error { message } => Some(message),
        }
    }
}
