// Menu controller: identity and the list of active rooms.
//
// On every open the menu channel announces the stored player token (or no
// token at all, which asks the server to issue one). The server answers with
// `load_context`: the token to use from now on, the token of the next room
// to create, and the rooms currently active. The token is written back to the
// `TokenStore` every time, so a later session (menu or room) reuses it.
//
// The menu announcement is a bare `{"player_token": ...}` record with no
// `action`; the server treats any frame on the menu endpoint as that request.

use std::time::{Duration, Instant};

use envy_path_protocol::{
    Action, IdentityAnnouncement, MenuContext, PlayerToken, RoomSummary, RoomToken,
};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelSender};
use crate::config::{ClientConfig, ReconnectPolicy};
use crate::endpoint::menu_endpoint;
use crate::error::ClientError;
use crate::token_store::TokenStore;
use crate::transport::Transport;

pub struct MenuState {
    store: Box<dyn TokenStore>,
    player_token: Option<PlayerToken>,
    next_room_token: Option<RoomToken>,
    rooms: Vec<RoomSummary>,
    contexts: u32,
}

impl MenuState {
    /// Start from whatever token `store` already holds.
    pub fn new(store: Box<dyn TokenStore>) -> Result<Self, ClientError> {
        let player_token = store.load()?;
        Ok(Self {
            store,
            player_token,
            next_room_token: None,
            rooms: Vec::new(),
            contexts: 0,
        })
    }

    pub fn player_token(&self) -> Option<&PlayerToken> {
        self.player_token.as_ref()
    }

    pub fn next_room_token(&self) -> Option<&RoomToken> {
        self.next_room_token.as_ref()
    }

    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    /// Number of `load_context` replies applied so far.
    pub fn contexts_loaded(&self) -> u32 {
        self.contexts
    }

    pub fn announcement(&self) -> IdentityAnnouncement {
        IdentityAnnouncement {
            player_token: self.player_token.clone(),
        }
    }

    /// Apply a menu context and persist the token it carries. A failed save
    /// is logged; the context still applies for this session.
    pub fn load_context(&mut self, context: MenuContext) {
        if self.player_token.as_ref() != Some(&context.player_token) {
            info!(token = %context.player_token, "player token issued");
        }
        self.player_token = Some(context.player_token);
        self.next_room_token = Some(context.next_room_token);
        self.rooms = context.rooms;
        self.contexts += 1;
        debug!(rooms = self.rooms.len(), "loaded menu context");
        if let Some(token) = &self.player_token {
            if let Err(e) = self.store.save(token) {
                warn!(error = %e, "could not persist player token");
            }
        }
    }
}

pub struct MenuSession {
    channel: Channel<MenuState>,
    state: MenuState,
}

impl MenuSession {
    pub fn new(store: Box<dyn TokenStore>, reconnect: ReconnectPolicy) -> Result<Self, ClientError> {
        let mut channel = Channel::new(reconnect);
        channel.set_on_connect(Box::new(|state: &mut MenuState, sender: &ChannelSender| {
            sender.send(&state.announcement());
        }));
        channel.set_payload_handler(
            Action::LoadContext,
            |state: &mut MenuState, _, context: MenuContext| {
                state.load_context(context);
                Ok(())
            },
        );
        Ok(Self {
            channel,
            state: MenuState::new(store)?,
        })
    }

    pub fn open<T: Transport>(
        config: &ClientConfig,
        store: Box<dyn TokenStore>,
        transport: T,
    ) -> Result<Self, ClientError> {
        let endpoint = menu_endpoint(&config.server_url)?;
        let mut session = Self::new(store, config.reconnect.clone())?;
        session.channel.connect(&endpoint, transport)?;
        Ok(session)
    }

    /// Leave the menu.
    pub fn close(mut self) -> Result<(), ClientError> {
        self.channel.disconnect()
    }

    pub fn state(&self) -> &MenuState {
        &self.state
    }

    pub fn poll(&mut self) -> usize {
        self.channel.poll(&mut self.state)
    }

    pub fn pump(&mut self, timeout: Duration) -> usize {
        self.channel.pump(&mut self.state, timeout)
    }

    /// Pump until the first `load_context` has been applied. False if
    /// `timeout` runs out first.
    pub fn wait_for_context(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.contexts == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump(deadline - now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::token_store::MemoryTokenStore;
    use crate::transport::{MemoryPeer, MemoryTransport};

    const WAIT: Duration = Duration::from_secs(5);

    fn open_with(store: &MemoryTokenStore) -> (MenuSession, MemoryPeer) {
        let (transport, listener) = MemoryTransport::pair(Duration::from_millis(5));
        let config = ClientConfig {
            server_url: "ws://game.test".into(),
            ..ClientConfig::default()
        };
        let session = MenuSession::open(&config, Box::new(store.clone()), transport).unwrap();
        let peer = listener.accept(WAIT).unwrap();
        (session, peer)
    }

    fn next_frame(session: &mut MenuSession, peer: &MemoryPeer) -> serde_json::Value {
        let start = Instant::now();
        loop {
            if let Some(text) = peer.try_recv() {
                return serde_json::from_str(&text).unwrap();
            }
            assert!(start.elapsed() < WAIT, "timed out waiting for announcement");
            session.pump(Duration::from_millis(5));
        }
    }

    fn context(token: &str) -> String {
        json!({
            "action": "load_context",
            "client_data": {
                "player_token": token,
                "next_room_token": "r9",
                "rooms": [{"token": "r1", "connected_count": 1}]
            }
        })
        .to_string()
    }

    #[test]
    fn new_player_announces_without_token_and_stores_issued_one() {
        let store = MemoryTokenStore::default();
        let (mut session, peer) = open_with(&store);
        assert_eq!(peer.endpoint, "ws://game.test/menu/");
        assert_eq!(next_frame(&mut session, &peer), json!({}));

        assert!(peer.send(context("p1")));
        assert!(session.wait_for_context(WAIT));
        assert_eq!(store.get(), Some(PlayerToken::from("p1")));
        let state = session.state();
        assert_eq!(state.player_token().map(|t| t.as_str()), Some("p1"));
        assert_eq!(state.next_room_token().map(|t| t.as_str()), Some("r9"));
        assert_eq!(state.rooms().len(), 1);
        session.close().unwrap();
        assert!(peer.is_closed());
    }

    #[test]
    fn returning_player_announces_stored_token() {
        let store = MemoryTokenStore::with_token("p7".into());
        let (mut session, peer) = open_with(&store);
        assert_eq!(next_frame(&mut session, &peer), json!({"player_token": "p7"}));
        session.close().unwrap();
    }

    #[test]
    fn context_without_rooms_is_accepted() {
        let mut state = MenuState::new(Box::new(MemoryTokenStore::default())).unwrap();
        state
            .load_context(MenuContext {
                player_token: "p2".into(),
                next_room_token: "r2".into(),
                rooms: Vec::new(),
            });
        assert_eq!(state.contexts_loaded(), 1);
        assert!(state.rooms().is_empty());
        assert_eq!(state.announcement().player_token, Some("p2".into()));
    }

    /// Store that holds nothing and refuses every write.
    struct ReadOnlyStore;

    impl TokenStore for ReadOnlyStore {
        fn load(&self) -> Result<Option<PlayerToken>, ClientError> {
            Ok(None)
        }

        fn save(&mut self, _: &PlayerToken) -> Result<(), ClientError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[test]
    fn failed_token_save_still_applies_context() {
        let mut state = MenuState::new(Box::new(ReadOnlyStore)).unwrap();
        state.load_context(MenuContext {
            player_token: "p3".into(),
            next_room_token: "r3".into(),
            rooms: Vec::new(),
        });
        assert_eq!(state.contexts_loaded(), 1);
        assert_eq!(state.player_token().map(|t| t.as_str()), Some("p3"));
        assert_eq!(state.next_room_token().map(|t| t.as_str()), Some("r3"));

        // Over a live channel the frame is consumed, not dropped.
        let (transport, listener) = MemoryTransport::pair(Duration::from_millis(5));
        let config = ClientConfig {
            server_url: "ws://game.test".into(),
            ..ClientConfig::default()
        };
        let mut session = MenuSession::open(&config, Box::new(ReadOnlyStore), transport).unwrap();
        let peer = listener.accept(WAIT).unwrap();
        assert!(peer.send(context("p4")));
        assert!(session.wait_for_context(WAIT));
        assert_eq!(session.state().player_token().map(|t| t.as_str()), Some("p4"));
        session.close().unwrap();
    }

    #[test]
    fn wait_for_context_times_out() {
        let store = MemoryTokenStore::default();
        let (mut session, _peer) = open_with(&store);
        assert!(!session.wait_for_context(Duration::from_millis(30)));
        session.close().unwrap();
    }
}
