//! Command definitions
//!
//! Represents commands from clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handler-specific keyword arguments
pub type Params = Map<String, Value>;

/// A parsed command envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Selects the handler
    #[serde(rename = "type")]
    pub command_type: String,

    /// Handler arguments, empty when the client omitted them
    #[serde(default)]
    pub params: Params,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            params: Params::new(),
        }
    }

    /// Create a command with the given parameters
    pub fn with_params(command_type: impl Into<String>, params: Params) -> Self {
        Self {
            command_type: command_type.into(),
            params,
        }
    }

    /// Add a single parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get the command type
    pub fn command_type(&self) -> &str {
        &self.command_type
    }
}
