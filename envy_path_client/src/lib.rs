// envy_path_client: room and menu client for the Envy Path allocation game.
//
// Two players share a room and cooperatively assign one object to each actor
// on a line so that no actor envies a neighbour. This crate is the client
// side: it keeps a persistent channel to the game server, mirrors the room's
// state locally, evaluates envy after every local edit, and submits a
// candidate allocation only once it is complete and envy-free. The server
// stays the final arbiter.
//
// Module overview:
// - `channel.rs`:     Channel manager. A connection worker thread per channel
//                     reconnects with backoff and feeds an mpsc inbox; the
//                     owner drains it and dispatches frames to per-action
//                     handlers.
// - `transport.rs`:   `Transport`/`Link` seam: `ws://` via `tungstenite`, and
//                     an in-memory transport for tests.
// - `envy.rs`:        Pure envy evaluator over an instance and a selection.
// - `room.rs`:        Room controller state machine and `RoomSession`.
// - `menu.rs`:        Menu controller (identity, active rooms).
// - `token_store.rs`: Player token persistence.
// - `endpoint.rs`:    Menu and room endpoint URLs.
// - `palette.rs`:     Board colours.
// - `config.rs`:      `ClientConfig` and `ReconnectPolicy`.
// - `error.rs`:       `ClientError`.
//
// Dependencies: `envy_path_protocol` (message types and framing).

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod envy;
pub mod error;
pub mod menu;
pub mod palette;
pub mod room;
pub mod token_store;
pub mod transport;

pub use channel::{Channel, ChannelSender};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::ClientError;
pub use menu::{MenuSession, MenuState};
pub use room::{RoomSession, RoomState, RoomStatus};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{MemoryTransport, Transport, TransportError, WebSocketTransport};
