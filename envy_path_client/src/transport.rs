// Transports: how the channel's connection worker reaches the server.
//
// The channel never touches sockets directly. Its worker thread asks a
// `Transport` to open a `Link` to an endpoint and then alternates between
// flushing queued outbound text and waiting a bounded time for one inbound
// text frame. Two implementations live here:
//
// - `WebSocketTransport`: plain `ws://` over a blocking `TcpStream` using
//   `tungstenite`. The stream's read timeout is the bounded wait, so a quiet
//   connection yields `Ok(None)` every `read_poll` and the worker gets a
//   chance to send.
// - `MemoryTransport`: an mpsc-backed transport for tests and embedding.
//   Every `open` creates a fresh link and hands the server-side end
//   (`MemoryPeer`) to whoever holds the paired `MemoryListener`. Dropping a
//   peer looks like transport loss to the client; the listener can also be
//   told to refuse opens.
//
// Links are owned by the worker thread only, so neither trait needs interior
// synchronisation.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use tungstenite::{Message, WebSocket};
use url::Url;

/// Failures opening or using a link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("connection closed")]
    Closed,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opens links to endpoints. Moved into the channel's worker thread.
pub trait Transport: Send + 'static {
    fn open(&mut self, endpoint: &str) -> Result<Box<dyn Link>, TransportError>;
}

/// One open connection carrying text frames.
pub trait Link: Send {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;
    /// Wait a bounded time for one text frame; `Ok(None)` if none arrived.
    fn recv_text(&mut self) -> Result<Option<String>, TransportError>;
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Plain `ws://` transport.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    read_poll: Duration,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(read_poll: Duration) -> Self {
        Self {
            read_poll,
            connect_timeout: Duration::from_secs(5),
        }
    }

    fn connect_err(endpoint: &str, reason: impl ToString) -> TransportError {
        TransportError::Connect {
            endpoint: endpoint.to_owned(),
            reason: reason.to_string(),
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, endpoint: &str) -> Result<Box<dyn Link>, TransportError> {
        let url = Url::parse(endpoint).map_err(|e| Self::connect_err(endpoint, e))?;
        if url.scheme() != "ws" {
            return Err(Self::connect_err(
                endpoint,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Self::connect_err(endpoint, "missing host"))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Self::connect_err(endpoint, "host did not resolve"))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        // Bound the handshake; switched to the poll interval once open.
        stream.set_read_timeout(Some(self.connect_timeout))?;
        let (socket, _response) =
            tungstenite::client(endpoint, stream).map_err(|e| Self::connect_err(endpoint, e))?;
        socket.get_ref().set_read_timeout(Some(self.read_poll))?;
        Ok(Box::new(WebSocketLink { socket }))
    }
}

struct WebSocketLink {
    socket: WebSocket<TcpStream>,
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

impl Link for WebSocketLink {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket.send(Message::text(text.to_owned()))?;
        Ok(())
    }

    fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text.as_str().to_owned())),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    warn!(len = bytes.len(), error = %e, "dropping binary frame that is not UTF-8");
                    Ok(None)
                }
            },
            Ok(Message::Close(_)) => Err(TransportError::Closed),
            Ok(_) => Ok(None),
            Err(e) if is_timeout(&e) => {
                // Pending pongs go out on the next flush.
                match self.socket.flush() {
                    Err(e) if !is_timeout(&e) => Err(e.into()),
                    _ => Ok(None),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        let _ = self.socket.close(None);
        let _ = self.socket.flush();
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Client half of an in-memory transport. See `MemoryListener`.
pub struct MemoryTransport {
    peers: Sender<MemoryPeer>,
    refusing: Arc<AtomicBool>,
    read_poll: Duration,
}

/// Server half of an in-memory transport: receives one `MemoryPeer` per
/// successful `open`.
pub struct MemoryListener {
    peers: Receiver<MemoryPeer>,
    refusing: Arc<AtomicBool>,
}

/// The server-side end of one in-memory link.
pub struct MemoryPeer {
    pub endpoint: String,
    to_client: Sender<String>,
    from_client: Receiver<String>,
    closed: Arc<AtomicBool>,
}

struct MemoryLink {
    to_peer: Sender<String>,
    from_peer: Receiver<String>,
    read_poll: Duration,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn pair(read_poll: Duration) -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::channel();
        let refusing = Arc::new(AtomicBool::new(false));
        (
            Self {
                peers: tx,
                refusing: refusing.clone(),
                read_poll,
            },
            MemoryListener {
                peers: rx,
                refusing,
            },
        )
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, endpoint: &str) -> Result<Box<dyn Link>, TransportError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_owned(),
                reason: "refused".into(),
            });
        }
        let (to_client, from_peer) = mpsc::channel();
        let (to_peer, from_client) = mpsc::channel();
        let closed = Arc::new(AtomicBool::new(false));
        let peer = MemoryPeer {
            endpoint: endpoint.to_owned(),
            to_client,
            from_client,
            closed: closed.clone(),
        };
        self.peers.send(peer).map_err(|_| TransportError::Connect {
            endpoint: endpoint.to_owned(),
            reason: "listener dropped".into(),
        })?;
        Ok(Box::new(MemoryLink {
            to_peer,
            from_peer,
            read_poll: self.read_poll,
            closed,
        }))
    }
}

impl Link for MemoryLink {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.to_peer
            .send(text.to_owned())
            .map_err(|_| TransportError::Closed)
    }

    fn recv_text(&mut self) -> Result<Option<String>, TransportError> {
        match self.from_peer.recv_timeout(self.read_poll) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MemoryListener {
    /// Wait up to `timeout` for the client to open a link.
    pub fn accept(&self, timeout: Duration) -> Option<MemoryPeer> {
        self.peers.recv_timeout(timeout).ok()
    }

    /// While set, every `open` fails.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

impl MemoryPeer {
    /// Deliver a text frame to the client. False if the client closed.
    pub fn send(&self, text: impl Into<String>) -> bool {
        !self.is_closed() && self.to_client.send(text.into()).is_ok()
    }

    /// Wait up to `timeout` for the next frame the client sent.
    pub fn recv(&self, timeout: Duration) -> Option<String> {
        self.from_client.recv_timeout(timeout).ok()
    }

    /// Next already-delivered frame, without waiting.
    pub fn try_recv(&self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// True once the client has closed or dropped its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn memory_link_carries_text_both_ways() {
        let (mut transport, listener) = MemoryTransport::pair(POLL);
        let mut link = transport.open("mem://room").unwrap();
        let peer = listener.accept(WAIT).unwrap();
        assert_eq!(peer.endpoint, "mem://room");

        link.send_text("up").unwrap();
        assert_eq!(peer.recv(WAIT).as_deref(), Some("up"));

        assert!(peer.send("down"));
        assert_eq!(link.recv_text().unwrap().as_deref(), Some("down"));
        assert_eq!(link.recv_text().unwrap(), None);
    }

    #[test]
    fn dropped_peer_reads_as_closed() {
        let (mut transport, listener) = MemoryTransport::pair(POLL);
        let mut link = transport.open("mem://x").unwrap();
        drop(listener.accept(WAIT).unwrap());
        assert!(matches!(link.recv_text(), Err(TransportError::Closed)));
        assert!(matches!(link.send_text("x"), Err(TransportError::Closed)));
    }

    #[test]
    fn closed_link_is_visible_to_peer() {
        let (mut transport, listener) = MemoryTransport::pair(POLL);
        let mut link = transport.open("mem://x").unwrap();
        let peer = listener.accept(WAIT).unwrap();
        assert!(!peer.is_closed());
        link.close();
        assert!(peer.is_closed());
    }

    #[test]
    fn refusing_listener_fails_open() {
        let (mut transport, listener) = MemoryTransport::pair(POLL);
        listener.set_refusing(true);
        assert!(matches!(
            transport.open("mem://x"),
            Err(TransportError::Connect { .. })
        ));
        listener.set_refusing(false);
        assert!(transport.open("mem://x").is_ok());
    }

    #[test]
    fn websocket_skips_binary_frames_that_are_not_utf8() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            socket.send(Message::binary(vec![0xff, 0xfe, 0x00])).unwrap();
            socket.send(Message::binary(b"ok".to_vec())).unwrap();
            socket.send(Message::text("after")).unwrap();
            // Hold the connection until the client hangs up.
            while socket.read().is_ok() {}
        });

        let mut transport = WebSocketTransport::new(POLL);
        let mut link = transport.open(&format!("ws://{addr}/room/")).unwrap();
        let mut received = Vec::new();
        let start = std::time::Instant::now();
        while received.len() < 2 {
            assert!(start.elapsed() < WAIT, "timed out, got {received:?}");
            if let Some(text) = link.recv_text().unwrap() {
                received.push(text);
            }
        }
        assert_eq!(received, ["ok", "after"]);
        link.close();
        drop(link);
        server.join().unwrap();
    }

    #[test]
    fn websocket_rejects_non_ws_scheme() {
        let mut transport = WebSocketTransport::new(POLL);
        assert!(matches!(
            transport.open("http://127.0.0.1:1/menu/"),
            Err(TransportError::Connect { .. })
        ));
    }
}
