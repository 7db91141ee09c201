// Room controller: one player's view of one room.
//
// `RoomState` is the per-session context: who we are, who the adversary is,
// the instance being solved, the local selection with its envy flags, and
// the room status. Status only ever moves in response to inbound frames:
//
//   Loading --load_instance (unsolved)--> Playing
//   Loading/Playing --load_instance (solved) / check_solution (ok)--> Solved
//   Playing --notify_disconnect--> Loading   (pause; selection kept)
//
// Solved is terminal for the instance it was reached on. Only a
// `load_instance` carrying a different puzzle starts over.
//
// `RoomSession` owns the room's `Channel<RoomState>` and the state it
// dispatches into. On every (re)open it asks the server for context again,
// since the server forgets per-connection state when a link drops. User
// actions (`set_ready`, `select`) go through the session so that any frame
// they produce is sent on the same channel.
//
// See also: `envy.rs` for the evaluation `select` runs, `menu.rs` for the
// other channel owner.

use std::fmt;
use std::time::Duration;

use envy_path_protocol::{
    Action, ActorIndex, Empty, Instance, InstanceLoad, OutboundFrame, Player, PlayerToken,
    ReadyRequest, RoomContext, RoomToken, Selection, SlotIndex, SolutionSubmission,
    SolutionVerdict,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelSender};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::endpoint::room_endpoint;
use crate::envy::{self, EnvyFlags, Evaluation};
use crate::error::ClientError;
use crate::transport::Transport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Loading,
    Playing,
    Solved,
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomStatus::Loading => "loading",
            RoomStatus::Playing => "playing",
            RoomStatus::Solved => "solved",
        })
    }
}

/// Everything the room controller knows about its room.
#[derive(Clone, Debug)]
pub struct RoomState {
    room: RoomToken,
    player_token: PlayerToken,
    status: RoomStatus,
    player: Option<Player>,
    adversary: Option<Player>,
    instance: Option<Instance>,
    selection: Selection,
    envy: EnvyFlags,
}

impl RoomState {
    pub fn new(room: RoomToken, player_token: PlayerToken) -> Self {
        Self {
            room,
            player_token,
            status: RoomStatus::Loading,
            player: None,
            adversary: None,
            instance: None,
            selection: Selection::new(),
            envy: EnvyFlags::new(),
        }
    }

    pub fn room(&self) -> &RoomToken {
        &self.room
    }

    pub fn player_token(&self) -> &PlayerToken {
        &self.player_token
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    pub fn adversary(&self) -> Option<&Player> {
        self.adversary.as_ref()
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn envy(&self) -> &EnvyFlags {
        &self.envy
    }

    fn set_status(&mut self, status: RoomStatus) {
        if self.status != status {
            info!(room = %self.room, from = %self.status, to = %status, "room status");
            self.status = status;
        }
    }

    /// Re-run the evaluator over the current selection.
    fn reevaluate(&mut self) -> Option<Evaluation> {
        let eval = envy::evaluate(self.instance.as_ref()?, &self.selection);
        self.envy = eval.envy.clone();
        Some(eval)
    }

    /// Split the server's player list into self and adversary.
    pub fn load_context(&mut self, context: RoomContext) {
        let (mine, theirs): (Vec<Player>, Vec<Player>) = context
            .players
            .into_iter()
            .partition(|p| p.token == self.player_token);
        self.player = mine.into_iter().next();
        self.adversary = theirs.into_iter().next();
        debug!(
            room = %self.room,
            ready = self.player.as_ref().is_some_and(|p| p.is_ready),
            adversary = self.adversary.is_some(),
            "loaded room context"
        );
    }

    /// Replace the instance and derive the status from it.
    pub fn load_instance(&mut self, instance: Instance) -> Result<(), ClientError> {
        instance.validate()?;
        let same = self
            .instance
            .as_ref()
            .is_some_and(|current| current.same_puzzle(&instance));
        if same && self.status == RoomStatus::Solved {
            debug!(room = %self.room, "instance already solved, ignoring re-delivery");
            return Ok(());
        }
        if !same {
            self.selection.clear();
            self.envy.clear();
        }
        let solved = instance.is_solved();
        if let Some(solution) = instance.solution_selection().filter(|_| solved) {
            self.selection = solution;
        }
        self.instance = Some(instance);
        self.reevaluate();
        self.set_status(if solved {
            RoomStatus::Solved
        } else {
            RoomStatus::Playing
        });
        Ok(())
    }

    /// The other player dropped. Pauses play; anything else is unaffected.
    pub fn notify_disconnect(&mut self) {
        if self.status == RoomStatus::Playing {
            self.set_status(RoomStatus::Loading);
        } else {
            debug!(room = %self.room, status = %self.status, "ignoring notify_disconnect");
        }
    }

    /// Apply the server's verdict on a submitted solution.
    pub fn check_solution(&mut self, verdict: SolutionVerdict) -> Result<(), ClientError> {
        if !verdict.is_solved {
            debug!(room = %self.room, "solution rejected by server");
            return Ok(());
        }
        let rejected = |reason: &str| ClientError::Rejected {
            action: Action::CheckSolution,
            reason: reason.to_owned(),
        };
        let instance = verdict
            .instance
            .ok_or_else(|| rejected("solved verdict without an instance"))?;
        instance.validate()?;
        let selection = instance
            .solution_selection()
            .ok_or_else(|| rejected("solved instance without a solution"))?;
        self.instance = Some(instance);
        self.selection = selection;
        self.reevaluate();
        self.set_status(RoomStatus::Solved);
        Ok(())
    }

    /// Record `actor → slot` and re-evaluate. Returns the submission to send
    /// if the selection is now complete and valid.
    pub fn select(
        &mut self,
        actor: ActorIndex,
        slot: SlotIndex,
    ) -> Result<Option<SolutionSubmission>, ClientError> {
        let Some(instance) = self.instance.as_ref() else {
            debug!(room = %self.room, "select before any instance, ignoring");
            return Ok(None);
        };
        if self.status == RoomStatus::Solved || instance.is_solved() {
            return Ok(None);
        }
        if actor >= instance.size || slot >= instance.size {
            return Err(ClientError::InvalidSelection {
                actor,
                slot,
                size: instance.size,
            });
        }
        self.selection.insert(actor, slot);
        let Some(eval) = self.reevaluate() else {
            return Ok(None);
        };
        debug!(
            room = %self.room,
            actor,
            slot,
            envious = eval.envious_count,
            distinct = eval.distinct_values(),
            "selection updated"
        );
        Ok(eval.is_valid_submission().then(|| SolutionSubmission {
            solution: self.selection.clone(),
            player_token: self.player_token.clone(),
        }))
    }

    /// The `set_ready` request, unless we are already known to be ready.
    pub fn ready_request(&self) -> Option<ReadyRequest> {
        if self.player.as_ref().is_some_and(|p| p.is_ready) {
            return None;
        }
        Some(ReadyRequest {
            player_token: self.player_token.clone(),
        })
    }
}

/// A connected room controller.
pub struct RoomSession {
    channel: Channel<RoomState>,
    state: RoomState,
}

impl RoomSession {
    /// Build the controller and its handler table without connecting.
    pub fn new(room: RoomToken, player_token: PlayerToken, reconnect: ReconnectPolicy) -> Self {
        let mut channel = Channel::new(reconnect);
        channel.set_on_connect(Box::new(|state: &mut RoomState, sender: &ChannelSender| {
            debug!(room = %state.room, "requesting room context");
            sender.send(&OutboundFrame::new(Action::LoadContext, Empty {}));
        }));
        channel.set_payload_handler(Action::LoadContext, |state: &mut RoomState, _, ctx: RoomContext| {
            state.load_context(ctx);
            Ok(())
        });
        channel.set_payload_handler(
            Action::LoadInstance,
            |state: &mut RoomState, _, load: InstanceLoad| state.load_instance(load.instance),
        );
        channel.set_handler(
            Action::NotifyDisconnect,
            Box::new(|state: &mut RoomState, _: &ChannelSender, _: serde_json::Value| {
                state.notify_disconnect();
                Ok(())
            }),
        );
        channel.set_payload_handler(
            Action::CheckSolution,
            |state: &mut RoomState, _, verdict: SolutionVerdict| state.check_solution(verdict),
        );
        Self {
            channel,
            state: RoomState::new(room, player_token),
        }
    }

    /// Join `room` as `player_token` on the server named in `config`.
    pub fn open<T: Transport>(
        config: &ClientConfig,
        room: RoomToken,
        player_token: PlayerToken,
        transport: T,
    ) -> Result<Self, ClientError> {
        let endpoint = room_endpoint(&config.server_url, &room, &player_token)?;
        let mut session = Self::new(room, player_token, config.reconnect.clone());
        session.channel.connect(&endpoint, transport)?;
        info!(endpoint, "joined room");
        Ok(session)
    }

    /// Leave the room. Anything in flight is abandoned.
    pub fn close(mut self) -> Result<(), ClientError> {
        self.channel.disconnect()
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Apply every inbound event already received.
    pub fn poll(&mut self) -> usize {
        self.channel.poll(&mut self.state)
    }

    /// Wait up to `timeout` for inbound events, then apply them.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        self.channel.pump(&mut self.state, timeout)
    }

    /// Ask the server to mark us ready. Returns whether a request went out.
    pub fn set_ready(&mut self) -> bool {
        match self.state.ready_request() {
            Some(request) => self
                .channel
                .send(&OutboundFrame::new(Action::SetReady, request)),
            None => {
                debug!("already ready");
                false
            }
        }
    }

    /// Select `slot` for `actor`. If that completes a valid allocation it is
    /// submitted to the server; returns whether a submission was sent.
    pub fn select(&mut self, actor: ActorIndex, slot: SlotIndex) -> Result<bool, ClientError> {
        let Some(submission) = self.state.select(actor, slot)? else {
            return Ok(false);
        };
        info!(room = %self.state.room, solution = ?submission.solution, "submitting solution");
        let sent = self
            .channel
            .send(&OutboundFrame::new(Action::CheckSolution, submission));
        if !sent {
            warn!("solution not sent; it will need resubmitting once reconnected");
        }
        Ok(sent)
    }
}
