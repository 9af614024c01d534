use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CommandError, DispatchError};

/// A command on its way to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Dispatcher id, i.e. the logical channel.
    pub id: String,
    /// Registered name of the command type.
    pub command: String,
    pub payload: Value,
}

/// What came back from the target node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Reply {
    /// The command ran and returned this result.
    Success(Value),
    /// The command ran and returned this error.
    Failure(Value),
    /// The command did not run.
    Rejected(DispatchError),
}

impl Reply {
    pub fn success<R: Serialize>(result: &R) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Reply::Success(value),
            Err(e) => Reply::Rejected(DispatchError::Codec(e.to_string())),
        }
    }

    pub fn failure<E: Serialize>(error: &E) -> Self {
        match serde_json::to_value(error) {
            Ok(value) => Reply::Failure(value),
            Err(e) => Reply::Rejected(DispatchError::Codec(e.to_string())),
        }
    }

    pub fn decode<R: DeserializeOwned, E: DeserializeOwned>(self) -> Result<R, CommandError<E>> {
        match self {
            Reply::Success(value) => Ok(serde_json::from_value(value).map_err(codec)?),
            Reply::Failure(value) => Err(CommandError::Execution(
                serde_json::from_value(value).map_err(codec)?,
            )),
            Reply::Rejected(e) => Err(CommandError::Dispatch(e)),
        }
    }
}

fn codec(e: serde_json::Error) -> DispatchError {
    DispatchError::Codec(e.to_string())
}
