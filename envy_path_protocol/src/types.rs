// Core identifier and index types for the Envy Path protocol.
//
// Tokens are opaque strings issued by the server: a `PlayerToken` identifies
// a participant across sessions (the client persists it), a `RoomToken`
// identifies a room and appears in the room endpoint path. Both serialize as
// bare JSON strings.
//
// Actors and slots are plain `usize` indices in `0..size`. A `Selection`
// maps actor index to the chosen slot index; it is a `BTreeMap` so that
// iteration is in actor order and JSON serialization produces the
// string-keyed object the server expects (`{"0": 1, "1": 0}`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of an actor on the line, `0..size`.
pub type ActorIndex = usize;

/// Index into an actor's value row, `0..size`.
pub type SlotIndex = usize;

/// Value of the object occupying a slot, as seen by one actor.
pub type ObjectValue = i64;

/// Actor → chosen slot. Partial until every actor has an entry.
pub type Selection = BTreeMap<ActorIndex, SlotIndex>;

/// Server-issued player identity, persisted client-side across sessions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerToken(pub String);

/// Server-issued room identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomToken(pub String);

impl PlayerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl RoomToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RoomToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for RoomToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
