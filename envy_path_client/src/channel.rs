// Channel manager: one persistent, self-healing connection to one endpoint.
//
// Architecture (same split as a reader thread feeding an mpsc inbox):
// - `connect()` spawns a connection worker thread that owns the `Transport`
//   and the live `Link`. The worker opens the link, forwards every inbound
//   text frame to the owner as `ChannelEvent::Frame`, writes queued outbound
//   text, and on loss re-opens with the `ReconnectPolicy` backoff. Callers
//   never see reconnect attempts, only `Opened`/`Closed`.
// - The owner thread drains the inbox with `poll()` (non-blocking) or
//   `pump()` (waits for the first event). Every handler, the on-connect hook
//   and the on-close hook run there, one at a time, in arrival order. A
//   handler therefore gets `&mut S` with no locking.
// - `ChannelSender` is the outbound half: it checks the shared `open` flag
//   and either queues the serialized frame for the worker or drops it with a
//   warning. Nothing is queued across a disconnect: frames still waiting when
//   a new link opens are discarded, since the on-connect hook re-syncs state.
//
// Teardown never waits on the network: `disconnect` (and drop) send `Close`,
// stop reading the inbox and give the worker a short grace period to exit.
// A worker still blocked inside `Transport::open` is detached; it sees the
// close request as soon as `open` returns and closes the new link unused.
//
// Handler table: one handler per `Action`. `set_handler` replaces any handler
// already bound to the action (last writer wins) and reports whether it did.
// A frame whose action is unknown or unbound, or whose payload does not
// decode, fails only that frame: the error is logged and dispatch carries on.
//
// See also: `transport.rs` for `Transport`/`Link`, `room.rs` and `menu.rs`
// for the two owners of a channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use envy_path_protocol::{Action, decode_frame, encode_frame};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::ClientError;
use crate::transport::{Link, Transport};

/// Handler bound to one inbound action.
pub type Handler<S> =
    Box<dyn FnMut(&mut S, &ChannelSender, serde_json::Value) -> Result<(), ClientError>>;

/// On-connect / on-close hook.
pub type Hook<S> = Box<dyn FnMut(&mut S, &ChannelSender)>;

/// Events from the connection worker to the owner thread.
#[derive(Debug)]
enum ChannelEvent {
    Opened,
    Closed,
    Frame(String),
}

/// Requests from the owner thread to the connection worker.
enum Outbound {
    Text(String),
    Close,
}

/// Outbound half of a channel. Handed to handlers and hooks.
#[derive(Clone)]
pub struct ChannelSender {
    tx: Option<Sender<Outbound>>,
    open: Arc<AtomicBool>,
}

impl ChannelSender {
    fn detached() -> Self {
        Self {
            tx: None,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a link is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Serialize and transmit `message`. If the channel is not open the
    /// frame is dropped, not queued. Returns whether it was handed to the
    /// connection worker; delivery is never guaranteed.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let text = match encode_frame(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "dropping frame that failed to encode");
                return false;
            }
        };
        if !self.is_open() {
            warn!(frame = %text, "channel not open, dropping frame");
            return false;
        }
        match &self.tx {
            Some(tx) if tx.send(Outbound::Text(text.clone())).is_ok() => {
                debug!(frame = %text, "queued frame");
                true
            }
            _ => {
                warn!(frame = %text, "connection worker gone, dropping frame");
                false
            }
        }
    }
}

/// How long teardown waits for the worker to exit before detaching it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// A managed connection plus the handler table dispatched against `S`.
pub struct Channel<S> {
    handlers: BTreeMap<Action, Handler<S>>,
    on_connect: Option<Hook<S>>,
    on_close: Option<Hook<S>>,
    sender: ChannelSender,
    inbox: Option<Receiver<ChannelEvent>>,
    worker: Option<JoinHandle<()>>,
    reconnect: ReconnectPolicy,
}

impl<S: 'static> Channel<S> {
    pub fn new(reconnect: ReconnectPolicy) -> Self {
        Self {
            handlers: BTreeMap::new(),
            on_connect: None,
            on_close: None,
            sender: ChannelSender::detached(),
            inbox: None,
            worker: None,
            reconnect,
        }
    }

    /// Bind `handler` to `action`. Exactly one handler exists per action:
    /// binding again replaces the previous one. Returns true if a handler
    /// was replaced.
    pub fn set_handler(&mut self, action: Action, handler: Handler<S>) -> bool {
        let replaced = self.handlers.insert(action, handler).is_some();
        if replaced {
            debug!(%action, "replaced handler");
        }
        replaced
    }

    /// Bind a handler that receives its payload already decoded as `P`.
    /// A payload that fails to decode is reported as `ClientError::Payload`.
    pub fn set_payload_handler<P, F>(&mut self, action: Action, mut handler: F) -> bool
    where
        P: DeserializeOwned + 'static,
        F: FnMut(&mut S, &ChannelSender, P) -> Result<(), ClientError> + 'static,
    {
        self.set_handler(
            action,
            Box::new(move |state: &mut S, sender: &ChannelSender, payload: serde_json::Value| {
                let payload = serde_json::from_value::<P>(payload)
                    .map_err(|source| ClientError::Payload { action, source })?;
                handler(state, sender, payload)
            }),
        )
    }

    /// Hook run after every successful open, including each reconnect.
    pub fn set_on_connect(&mut self, hook: Hook<S>) {
        self.on_connect = Some(hook);
    }

    /// Hook run whenever an open link is lost.
    pub fn set_on_close(&mut self, hook: Hook<S>) {
        self.on_close = Some(hook);
    }

    pub fn sender(&self) -> &ChannelSender {
        &self.sender
    }

    /// True between `connect` and `disconnect`, whether or not a link is
    /// currently open.
    pub fn is_connected(&self) -> bool {
        self.worker.is_some()
    }

    /// True while a link is open.
    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }

    /// See `ChannelSender::send`.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        self.sender.send(message)
    }

    /// Start the connection worker for `endpoint`. Returns immediately; the
    /// on-connect hook runs from `poll` once the link is open.
    pub fn connect<T: Transport>(&mut self, endpoint: &str, transport: T) -> Result<(), ClientError> {
        if self.worker.is_some() {
            return Err(ClientError::AlreadyConnected);
        }
        let (out_tx, out_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let open = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            endpoint: endpoint.to_owned(),
            transport,
            outbound: out_rx,
            events: event_tx,
            open: open.clone(),
            reconnect: self.reconnect.clone(),
        };
        let handle = thread::Builder::new()
            .name("envy-channel".into())
            .spawn(move || worker.run())?;

        info!(endpoint, "channel connecting");
        self.sender = ChannelSender {
            tx: Some(out_tx),
            open,
        };
        self.inbox = Some(event_rx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Close the link and stop the worker. Anything still in flight is
    /// abandoned. Fails with `NotConnected` if there is nothing to close.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        let worker = self.worker.take().ok_or(ClientError::NotConnected)?;
        self.shut_down(worker);
        info!("channel disconnected");
        Ok(())
    }

    /// Dispatch every event already received, without blocking. Returns the
    /// number of events handled.
    pub fn poll(&mut self, state: &mut S) -> usize {
        let mut handled = 0;
        while let Some(event) = self.inbox.as_ref().and_then(|rx| rx.try_recv().ok()) {
            self.handle_event(state, event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for an event, then dispatch it and everything
    /// queued behind it. Returns immediately with 0 when not connected.
    pub fn pump(&mut self, state: &mut S, timeout: Duration) -> usize {
        let first = match &self.inbox {
            Some(rx) => rx.recv_timeout(timeout).ok(),
            None => None,
        };
        match first {
            Some(event) => {
                self.handle_event(state, event);
                1 + self.poll(state)
            }
            None => 0,
        }
    }

    /// Route one inbound text frame to its handler.
    pub fn dispatch(&mut self, state: &mut S, text: &str) -> Result<Action, ClientError> {
        let frame = decode_frame(text)?;
        let action = frame.kind()?;
        let handler = self
            .handlers
            .get_mut(&action)
            .ok_or(ClientError::Unbound(action))?;
        handler(state, &self.sender, frame.client_data)?;
        Ok(action)
    }

    fn handle_event(&mut self, state: &mut S, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                info!("channel open");
                if let Some(hook) = self.on_connect.as_mut() {
                    hook(state, &self.sender);
                }
            }
            ChannelEvent::Closed => {
                info!("channel closed, reconnecting");
                if let Some(hook) = self.on_close.as_mut() {
                    hook(state, &self.sender);
                }
            }
            ChannelEvent::Frame(text) => {
                debug!(frame = %text, "received frame");
                match self.dispatch(state, &text) {
                    Ok(action) => debug!(%action, "dispatched"),
                    Err(e) => warn!(error = %e, frame = %text, "dropping undeliverable frame"),
                }
            }
        }
    }
}

impl<S> Channel<S> {
    /// Ask the worker to close and stop listening to it. The worker is
    /// joined only if it exits within `SHUTDOWN_GRACE`; one still blocked in
    /// `Transport::open` is detached and closes its link once `open` returns.
    fn shut_down(&mut self, worker: JoinHandle<()>) {
        self.sender.open.store(false, Ordering::SeqCst);
        if let Some(tx) = self.sender.tx.take() {
            let _ = tx.send(Outbound::Close);
        }
        self.inbox = None;
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if !worker.is_finished() {
            debug!("connection worker still busy, detaching");
        } else if worker.join().is_err() {
            warn!("connection worker panicked");
        }
    }
}

impl<S> Drop for Channel<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shut_down(worker);
        }
    }
}

// ---------------------------------------------------------------------------
// Connection worker
// ---------------------------------------------------------------------------

/// How a served link ended.
enum LinkEnd {
    /// The owner asked to close, or went away.
    Shutdown,
    /// The link failed; reconnect.
    Lost,
}

struct Worker<T> {
    endpoint: String,
    transport: T,
    outbound: Receiver<Outbound>,
    events: Sender<ChannelEvent>,
    open: Arc<AtomicBool>,
    reconnect: ReconnectPolicy,
}

impl<T: Transport> Worker<T> {
    fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            match self.transport.open(&self.endpoint) {
                Ok(mut link) => {
                    attempt = 0;
                    if self.discard_stale() {
                        link.close();
                        return;
                    }
                    self.open.store(true, Ordering::SeqCst);
                    if self.events.send(ChannelEvent::Opened).is_err() {
                        link.close();
                        return;
                    }
                    let end = self.serve(link.as_mut());
                    self.open.store(false, Ordering::SeqCst);
                    match end {
                        LinkEnd::Shutdown => {
                            link.close();
                            return;
                        }
                        LinkEnd::Lost => {
                            if self.events.send(ChannelEvent::Closed).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, attempt, error = %e, "connect failed");
                }
            }
            let delay = self.reconnect.delay(attempt);
            attempt = attempt.saturating_add(1);
            if self.wait(delay) {
                return;
            }
        }
    }

    /// Drop frames queued before this link opened. True if a close request
    /// was among them.
    fn discard_stale(&self) -> bool {
        loop {
            match self.outbound.try_recv() {
                Ok(Outbound::Text(text)) => debug!(frame = %text, "discarding stale frame"),
                Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => return true,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }

    fn serve(&self, link: &mut dyn Link) -> LinkEnd {
        loop {
            loop {
                match self.outbound.try_recv() {
                    Ok(Outbound::Text(text)) => {
                        if let Err(e) = link.send_text(&text) {
                            warn!(error = %e, "send failed, link lost");
                            return LinkEnd::Lost;
                        }
                    }
                    Ok(Outbound::Close) | Err(TryRecvError::Disconnected) => {
                        return LinkEnd::Shutdown;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }
            match link.recv_text() {
                Ok(Some(text)) => {
                    if self.events.send(ChannelEvent::Frame(text)).is_err() {
                        return LinkEnd::Shutdown;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    info!(error = %e, "link lost");
                    return LinkEnd::Lost;
                }
            }
        }
    }

    /// Sleep out a reconnect delay, waking early for a close request. True
    /// if the worker should exit.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.outbound.recv_timeout(deadline - now) {
                Ok(Outbound::Text(text)) => debug!(frame = %text, "not open, dropping frame"),
                Ok(Outbound::Close) | Err(RecvTimeoutError::Disconnected) => return true,
                Err(RecvTimeoutError::Timeout) => return false,
            }
        }
    }
}
