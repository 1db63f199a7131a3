//! The command type -> handler lookup table

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::handler::{call, Handler, HandlerError, HandlerResult};
use crate::protocol::{Command, Params, Response};

/// Error response for a command type nobody registered
pub fn unknown_command(command_type: &str) -> Response {
    Response::error(format!("Unknown command type: {command_type}"))
}

/// Immutable registry of handlers
pub struct Dispatcher<S> {
    handlers: HashMap<String, Arc<Handler<S>>>,
}

impl<S> Dispatcher<S> {
    /// Start building a dispatcher
    pub fn builder() -> DispatcherBuilder<S> {
        DispatcherBuilder::default()
    }

    /// Look up the handler for a command type
    pub fn resolve(&self, command_type: &str) -> Option<Arc<Handler<S>>> {
        self.handlers.get(command_type).cloned()
    }

    pub fn contains(&self, command_type: &str) -> bool {
        self.handlers.contains_key(command_type)
    }

    /// Registered command types, sorted
    pub fn command_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run a command against the host state
    ///
    /// Must be called from the host loop.
    pub fn invoke(&self, state: &mut S, command: Command) -> Response {
        let Command {
            command_type,
            params,
        } = command;

        match self.handlers.get(&command_type) {
            Some(handler) => call(handler.as_ref(), state, &command_type, params),
            None => {
                tracing::debug!("Unknown command type: {}", command_type);
                unknown_command(&command_type)
            }
        }
    }
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("command_types", &self.command_types())
            .finish()
    }
}

/// Builder for Dispatcher
pub struct DispatcherBuilder<S> {
    handlers: HashMap<String, Arc<Handler<S>>>,
}

impl<S> Default for DispatcherBuilder<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S: 'static> DispatcherBuilder<S> {
    /// Register a handler that takes the raw params map
    pub fn register<F>(mut self, command_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, Params) -> HandlerResult + Send + Sync + 'static,
    {
        let command_type = command_type.into();
        if self
            .handlers
            .insert(command_type.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!("Handler for {} registered twice, keeping the last one", command_type);
        }
        self
    }

    /// Register a handler whose params deserialize into `P`
    ///
    /// Missing or mistyped arguments are reported as
    /// [`HandlerError::InvalidParams`] without calling `handler`.
    pub fn register_typed<P, R, F>(self, command_type: impl Into<String>, handler: F) -> Self
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(&mut S, P) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.register(command_type, move |state: &mut S, params: Params| {
            let args: P = serde_json::from_value(Value::Object(params))
                .map_err(|e| HandlerError::InvalidParams(e.to_string()))?;
            let result = handler(state, args)?;
            serde_json::to_value(result)
                .map_err(|e| HandlerError::Failed(format!("failed to serialize result: {e}")))
        })
    }

    pub fn build(self) -> Dispatcher<S> {
        Dispatcher {
            handlers: self.handlers,
        }
    }
}
