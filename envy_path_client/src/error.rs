// Error types for the client crate.
//
// `ClientError` covers everything a controller or the channel can report to
// its caller. Dispatch-time failures (unknown action, unbound action, bad
// payload) are also `ClientError`s, but the channel catches and logs them per
// frame instead of returning them; see `channel.rs`.

use envy_path_protocol::{Action, FrameError, InstanceError};
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("channel is already connected")]
    AlreadyConnected,
    #[error("channel is not connected")]
    NotConnected,
    #[error("no handler bound for action `{0}`")]
    Unbound(Action),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("bad `{action}` payload: {source}")]
    Payload {
        action: Action,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{action}` payload rejected: {reason}")]
    Rejected { action: Action, reason: String },
    #[error("invalid instance: {0}")]
    Instance(#[from] InstanceError),
    #[error("selection ({actor}, {slot}) is outside a size-{size} instance")]
    InvalidSelection {
        actor: usize,
        slot: usize,
        size: usize,
    },
    #[error("no player token available; visit the menu first")]
    MissingPlayerToken,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
