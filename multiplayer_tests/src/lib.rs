// Test-only game server for end-to-end client tests.
//
// `ScriptedServer` listens on a random local port and speaks real WebSocket
// (via `tungstenite`) so the client's `WebSocketTransport`, channel worker,
// reconnect loop and controllers are exercised exactly as they run against a
// live server. The server has no game logic of its own: each accepted
// connection is handed to the test as a `ServerConnection`, and the test
// decides what to read and what to send.
//
// Threads: one accept thread (non-blocking accept polled against a
// `keep_running` flag) performs the handshake, records the request path and
// passes the connection over an mpsc channel. Connections are then driven
// from the test thread only.
//
// Because client hooks and handlers run inside `pump`, every blocking helper
// here takes the client as `&mut impl Pump` and pumps it while waiting.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use envy_path_client::{ClientConfig, MenuSession, ReconnectPolicy, RoomSession};
use serde_json::{Value, json};
use tungstenite::handshake::server::{Request, Response};
use tungstenite::{Message, WebSocket};

/// Default timeout for blocking helpers.
pub const WAIT: Duration = Duration::from_secs(5);

/// Granularity of every poll loop.
pub const TICK: Duration = Duration::from_millis(5);

/// Anything that applies inbound events when pumped.
pub trait Pump {
    fn pump_once(&mut self);
}

impl Pump for RoomSession {
    fn pump_once(&mut self) {
        self.pump(TICK);
    }
}

impl Pump for MenuSession {
    fn pump_once(&mut self) {
        self.pump(TICK);
    }
}

/// Client config pointed at `url` with fast polling and reconnects.
pub fn test_config(url: &str) -> ClientConfig {
    ClientConfig {
        server_url: url.to_owned(),
        reconnect: ReconnectPolicy {
            initial_delay_ms: 10,
            multiplier: 1.0,
            max_delay_ms: 10,
        },
        read_poll_ms: 5,
        ..ClientConfig::default()
    }
}

/// Pump `client` until `done` holds.
pub fn pump_until<C: Pump>(client: &mut C, what: &str, mut done: impl FnMut(&C) -> bool) {
    let start = Instant::now();
    while !done(client) {
        assert!(start.elapsed() < WAIT, "timed out waiting for {what}");
        client.pump_once();
    }
}

pub struct ScriptedServer {
    addr: SocketAddr,
    keep_running: Arc<AtomicBool>,
    connections: Receiver<ServerConnection>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScriptedServer {
    pub fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let keep_running = Arc::new(AtomicBool::new(true));
        let running = keep_running.clone();
        let (tx, rx) = mpsc::channel();

        let thread = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        if let Some(conn) = ServerConnection::handshake(stream) {
                            if tx.send(conn).is_err() {
                                break;
                            }
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(TICK);
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            addr,
            keep_running,
            connections: rx,
            thread: Some(thread),
        })
    }

    /// Base URL for `ClientConfig::server_url`.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next accepted connection, pumping `client` while waiting.
    pub fn accept<C: Pump>(&self, client: &mut C) -> ServerConnection {
        let start = Instant::now();
        loop {
            if let Ok(conn) = self.connections.try_recv() {
                return conn;
            }
            assert!(start.elapsed() < WAIT, "timed out waiting for a connection");
            client.pump_once();
        }
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// One client connection, driven by the test.
pub struct ServerConnection {
    pub path: String,
    socket: WebSocket<TcpStream>,
}

impl ServerConnection {
    fn handshake(stream: TcpStream) -> Option<Self> {
        stream.set_nonblocking(false).ok()?;
        stream.set_read_timeout(Some(WAIT)).ok()?;
        let mut path = String::new();
        let socket = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_owned();
            Ok(resp)
        })
        .ok()?;
        socket.get_ref().set_read_timeout(Some(TICK)).ok()?;
        Some(Self { path, socket })
    }

    /// One read attempt. `None` on timeout or a non-text frame.
    fn try_recv(&mut self) -> Option<Value> {
        match self.socket.read() {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()).ok(),
            _ => None,
        }
    }

    /// Next JSON frame from the client, pumping `client` while waiting.
    pub fn recv<C: Pump>(&mut self, client: &mut C) -> Value {
        let start = Instant::now();
        loop {
            if let Some(value) = self.try_recv() {
                return value;
            }
            assert!(start.elapsed() < WAIT, "timed out waiting for a client frame");
            client.pump_once();
        }
    }

    /// Pump `client` for `window` and return every frame it sent meanwhile.
    pub fn drain<C: Pump>(&mut self, client: &mut C, window: Duration) -> Vec<Value> {
        let start = Instant::now();
        let mut frames = Vec::new();
        while start.elapsed() < window {
            client.pump_once();
            if let Some(value) = self.try_recv() {
                frames.push(value);
            }
        }
        frames
    }

    pub fn send_raw(&mut self, text: &str) {
        self.socket
            .send(Message::text(text.to_owned()))
            .expect("server send failed");
    }

    /// Send `{"action": action, "client_data": data}`.
    pub fn send_action(&mut self, action: &str, data: Value) {
        self.send_raw(&json!({ "action": action, "client_data": data }).to_string());
    }
}
