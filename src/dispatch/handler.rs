//! Handler signature and the uniform success/error wrapping

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;

use crate::protocol::{Params, Response};

/// What a handler returns
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// A host-side operation registered under a command type
///
/// Runs on the host loop only, so it gets `&mut S` and needs no locking.
pub type Handler<S> = dyn Fn(&mut S, Params) -> HandlerResult + Send + Sync;

/// Failures raised by a handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Generic failure with a message
    pub fn msg(message: impl std::fmt::Display) -> Self {
        HandlerError::Failed(message.to_string())
    }
}

/// Invoke a resolved handler and wrap its outcome as a Response
///
/// Panics are caught here; the host loop keeps running either way.
pub fn call<S>(handler: &Handler<S>, state: &mut S, command_type: &str, params: Params) -> Response {
    tracing::trace!("Executing handler for {}", command_type);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(state, params)))
        .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))));

    match outcome {
        Ok(result) => Response::success(result),
        Err(e @ HandlerError::Panicked(_)) => {
            tracing::error!("Handler for {} panicked: {}", command_type, e);
            Response::error(e.to_string())
        }
        Err(e) => {
            tracing::warn!("Handler for {} failed: {}", command_type, e);
            Response::error(e.to_string())
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
