// Protocol messages for the menu and room channels.
//
// Every inbound frame is an `InboundFrame`: an `action` name plus an opaque
// `client_data` payload that is handed to whichever handler is bound to that
// action. Outbound room frames are `OutboundFrame`s, which carry their
// payload under `csmr_data` instead. The two directions name the payload
// field differently; the server expects exactly these names, so both are
// kept as they are.
//
// `Action` is the closed set of action names either side uses. Inbound
// frames keep `action` as a raw string so that an unknown name still parses
// and can be rejected per message by the dispatcher rather than failing the
// whole frame.
//
// Payload structs mirror what the server serializes. Fields the client does
// not act on (`username`, `connected_to`, `connected_count`) are still
// modelled, with defaults, so that frames from older servers decode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::framing::FrameError;
use crate::instance::Instance;
use crate::types::{PlayerToken, RoomToken, Selection};

/// Logical operation named by a frame's `action` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Menu: identity + active rooms. Room: the two players.
    LoadContext,
    /// The instance to solve (possibly already solved).
    LoadInstance,
    /// The other player dropped.
    NotifyDisconnect,
    /// Submission (outbound) and verdict (inbound).
    CheckSolution,
    /// Mark self ready (outbound only).
    SetReady,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::LoadContext,
        Action::LoadInstance,
        Action::NotifyDisconnect,
        Action::CheckSolution,
        Action::SetReady,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::LoadContext => "load_context",
            Action::LoadInstance => "load_instance",
            Action::NotifyDisconnect => "notify_disconnect",
            Action::CheckSolution => "check_solution",
            Action::SetReady => "set_ready",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| FrameError::UnknownAction(s.to_owned()))
    }
}

/// A frame received from the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub action: String,
    /// Missing payloads decode as `null`.
    #[serde(default)]
    pub client_data: serde_json::Value,
}

impl InboundFrame {
    /// Resolve the action name against the known vocabulary.
    pub fn kind(&self) -> Result<Action, FrameError> {
        self.action.parse()
    }
}

/// A frame sent to the room server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame<T> {
    pub action: Action,
    pub csmr_data: T,
}

impl<T> OutboundFrame<T> {
    pub fn new(action: Action, csmr_data: T) -> Self {
        Self { action, csmr_data }
    }
}

/// Empty `{}` payload (room context request).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

/// Menu on-connect announcement. Sent bare, without an `action`; an absent
/// token is omitted so the server issues a new one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityAnnouncement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_token: Option<PlayerToken>,
}

/// Menu `load_context` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuContext {
    pub player_token: PlayerToken,
    pub next_room_token: RoomToken,
    #[serde(default)]
    pub rooms: Vec<RoomSummary>,
}

/// One active room as listed in the menu.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub token: RoomToken,
    #[serde(default)]
    pub connected_count: u32,
}

/// Room `load_context` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomContext {
    #[serde(default)]
    pub players: Vec<Player>,
}

/// A participant as serialized by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub token: PlayerToken,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub connected_to: Option<RoomToken>,
}

/// `load_instance` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceLoad {
    pub instance: Instance,
}

/// Inbound `check_solution` payload. The server sends `"is_solved": null`
/// for an instance that was already solved; that reads as `false`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionVerdict {
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_solved: bool,
    #[serde(default)]
    pub instance: Option<Instance>,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Outbound `set_ready` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadyRequest {
    pub player_token: PlayerToken,
}

/// Outbound `check_solution` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionSubmission {
    pub solution: Selection,
    pub player_token: PlayerToken,
}
