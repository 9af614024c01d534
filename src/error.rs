//! Fault categories surfaced by the dispatch layer.
//!
//! Callers must be able to tell "the remote code failed" from "the remote code
//! never ran", and both of those from a local misuse of the API, so each has
//! its own type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::Node;

/// The command never ran (or its result never came back).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("node {0} is not a member of the current view")]
    NodeUnavailable(Node),

    #[error("node {node} has no command dispatcher '{id}'")]
    NoSuchDispatcher { node: Node, id: String },

    #[error("command '{command}' is not registered with dispatcher '{id}' on node {node}")]
    UnknownCommand {
        node: Node,
        id: String,
        command: String,
    },

    #[error("failed to reach node {node}: {reason}")]
    Unreachable { node: Node, reason: String },

    #[error("failed to encode or decode a command payload: {0}")]
    Codec(String),

    #[error("dispatch to node {node} was interrupted: {reason}")]
    Interrupted { node: Node, reason: String },
}

/// Misuse of a dispatcher or factory. Raised before any network work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("command dispatcher '{0}' is closed")]
    Closed(String),

    #[error("command dispatcher '{id}' is bound to context type {existing}, not {requested}")]
    ContextMismatch {
        id: String,
        existing: &'static str,
        requested: &'static str,
    },
}

/// Outcome of a failed command: either its own fault or a dispatch fault.
#[derive(Debug, Error)]
pub enum CommandError<E> {
    #[error("command execution failed: {0}")]
    Execution(#[source] E),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl<E> CommandError<E> {
    pub fn is_execution(&self) -> bool {
        matches!(self, CommandError::Execution(_))
    }

    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match self {
            CommandError::Dispatch(e) => Some(e),
            CommandError::Execution(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
