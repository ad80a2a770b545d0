//! Realtime session manager.
//!
//! # Responsibilities
//! - Maintain at most one STOMP-over-WebSocket connection to a candidate server
//! - Rotate through candidates on failure, rejecting after the configured passes
//! - Keep the subscription table authoritative and replay it on every connect
//! - Dispatch inbound messages to handlers as JSON or raw text
//!
//! # Data Flow
//! ```text
//! SessionManager (Clone handle)
//!     → mpsc command queue
//!     → SessionActor (single task, owns all state)
//!         ├─ Pending: dialing a candidate / waiting out the retry delay
//!         ├─ Link: live socket, reader task, heart-beat ticker
//!         └─ watch::Sender<ConnectionState> → observers
//! ```
//!
//! # Design Decisions
//! - Every state transition happens inside the actor task, so no locks
//! - Subscriptions are kept in insertion order; replacing one keeps its slot
//! - A dropped link re-enters Connecting at the next candidate until
//!   `disconnect()` is called
//! - Handlers run on the actor task and should return quickly

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::RealtimeConfig;
use crate::observability::metrics;
use crate::realtime::correlation::CorrelationId;
use crate::realtime::destinations;
use crate::realtime::frame::{Command, Frame, FrameError, HEARTBEAT};
use crate::realtime::state::{AttemptOutcome, ConnectionState};
use crate::resilience::backoff::fixed_delay;
use crate::resilience::timeouts::{deadline, TimedOut};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Missed incoming heart-beat intervals tolerated before the link is dropped.
const STALE_MULTIPLIER: u32 = 3;

/// Callback invoked for each message on a subscribed destination.
pub type Handler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Body of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Body that did not parse as JSON, passed through untouched.
    Raw(String),
}

impl Payload {
    fn from_body(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(body.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }
}

/// Outcome of a `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame written to the live connection.
    Sent,
    /// Not connected; nothing was sent.
    Dropped,
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Every candidate failed for the configured number of passes.
    #[error("connection rejected after {attempts} attempt(s)")]
    Rejected { attempts: usize },

    /// A pending connect was abandoned by `disconnect()`.
    #[error("connect cancelled by disconnect")]
    Cancelled,

    /// The session task is gone.
    #[error("session manager is closed")]
    Closed,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of a single connection attempt or of a live link.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("handshake {0}")]
    TimedOut(#[from] TimedOut),

    #[error("server sent ERROR: {0}")]
    Rejected(String),

    #[error("unexpected {0} frame during handshake")]
    Unexpected(Command),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("no data from server for {0:?}")]
    Stale(Duration),

    #[error("connection closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
}

enum SessionCommand {
    Connect(oneshot::Sender<Result<(), SessionError>>),
    Disconnect(oneshot::Sender<()>),
    Subscribe {
        destination: String,
        handler: Handler,
        ack: oneshot::Sender<()>,
    },
    Unsubscribe {
        destination: String,
        ack: oneshot::Sender<()>,
    },
    Send {
        destination: String,
        body: String,
        ack: oneshot::Sender<Delivery>,
    },
}

/// Handle to the realtime session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl SessionManager {
    /// Spawn the session task. Must be called from within a Tokio runtime.
    ///
    /// The session starts Disconnected; nothing is dialed until `connect()`.
    pub fn spawn(config: RealtimeConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::new());

        let actor = SessionActor {
            config,
            commands: rx,
            state: ConnectionState::new(),
            state_tx,
            subscriptions: Vec::new(),
            link: None,
            pending: Pending::Idle,
            waiters: Vec::new(),
            auto_reconnect: false,
        };
        tokio::spawn(actor.run());

        Self {
            commands: tx,
            state: state_rx,
        }
    }

    /// Connect, resolving once a server accepted the session.
    ///
    /// Resolves immediately when already connected.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Connect(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Close the connection and stop reconnecting. Subscriptions are kept
    /// for the next `connect()`.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Disconnect(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Register `handler` for `destination`, replacing any previous handler.
    pub async fn subscribe<F>(&self, destination: impl Into<String>, handler: F) -> Result<(), SessionError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let (ack, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Subscribe {
            destination: destination.into(),
            handler: Arc::new(handler),
            ack,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn unsubscribe(&self, destination: impl Into<String>) -> Result<(), SessionError> {
        let (ack, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Unsubscribe {
            destination: destination.into(),
            ack,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Publish a JSON payload. A no-op returning `Delivery::Dropped` while
    /// not connected.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        destination: impl Into<String>,
        payload: &T,
    ) -> Result<Delivery, SessionError> {
        let body = serde_json::to_string(payload)?;
        let (ack, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Send {
            destination: destination.into(),
            body,
            ack,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Send to `/app/{action}` with a fresh `sessionId` embedded.
    pub async fn send_action(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<(CorrelationId, Delivery), SessionError> {
        let id = CorrelationId::generate();
        let body = with_session_id(payload, &id);
        let delivery = self.send(destinations::action(action), &body).await?;
        Ok((id, delivery))
    }

    /// Request/response over the session: listen on `/user/queue/{reply_queue}`
    /// then send the action.
    pub async fn request<F>(
        &self,
        action: &str,
        reply_queue: &str,
        payload: Value,
        on_reply: F,
    ) -> Result<(CorrelationId, Delivery), SessionError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(destinations::user_queue(reply_queue), on_reply).await?;
        self.send_action(action, payload).await
    }

    /// Follow a single resource: subscribe to `/topic/{kind}/{id}` and
    /// announce interest with the `subscribe` action.
    pub async fn follow_resource<F>(
        &self,
        kind: &str,
        id: &str,
        payload: Value,
        on_update: F,
    ) -> Result<(CorrelationId, Delivery), SessionError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(destinations::resource_topic(kind, id), on_update).await?;
        self.send_action("subscribe", payload).await
    }

    /// Reverse of `follow_resource`.
    pub async fn unfollow_resource(
        &self,
        kind: &str,
        id: &str,
        payload: Value,
    ) -> Result<(CorrelationId, Delivery), SessionError> {
        let sent = self.send_action("unsubscribe", payload).await?;
        self.unsubscribe(destinations::resource_topic(kind, id)).await?;
        Ok(sent)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    async fn dispatch(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }
}

fn with_session_id(payload: Value, id: &CorrelationId) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("sessionId".to_string(), Value::String(id.to_string()));
            Value::Object(map)
        }
        Value::Null => serde_json::json!({ "sessionId": id.as_str() }),
        other => serde_json::json!({ "payload": other, "sessionId": id.as_str() }),
    }
}

struct Subscription {
    destination: String,
    handler: Handler,
}

enum Pending {
    Idle,
    Dialing(BoxFuture<'static, Result<Link, ProtocolError>>),
    Backoff(Pin<Box<Sleep>>),
}

enum PendingOutcome {
    Dialed(Result<Link, ProtocolError>),
    BackoffElapsed,
}

impl Pending {
    /// Completes when the in-progress dial or delay finishes. Cancel-safe:
    /// the work stays in `self` if this future is dropped.
    async fn wait(&mut self) -> PendingOutcome {
        let outcome = match self {
            Pending::Idle => return std::future::pending().await,
            Pending::Dialing(dial) => PendingOutcome::Dialed(dial.await),
            Pending::Backoff(sleep) => {
                sleep.await;
                PendingOutcome::BackoffElapsed
            }
        };
        *self = Pending::Idle;
        outcome
    }
}

enum LinkEvent {
    Frame(Frame),
    /// Heart-beat or other non-frame traffic.
    Activity,
    Closed(Option<String>),
    Tick,
}

struct Link {
    endpoint: String,
    sink: SplitSink<WsStream, Message>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    reader: JoinHandle<()>,
    /// destination -> subscription id on this connection
    live: HashMap<String, String>,
    next_id: u64,
    outgoing: Option<Duration>,
    incoming: Option<Duration>,
    last_sent: Instant,
    last_seen: Instant,
    ticker: Option<Interval>,
}

impl Link {
    fn new(
        endpoint: String,
        sink: SplitSink<WsStream, Message>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
        reader: JoinHandle<()>,
        outgoing: Option<Duration>,
        incoming: Option<Duration>,
    ) -> Self {
        let period = match (outgoing, incoming) {
            (Some(o), Some(i)) => Some(o.min(i)),
            (o, i) => o.or(i),
        };
        let ticker = period.map(|p| {
            let mut ticker = time::interval_at(Instant::now() + p, p);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker
        });

        Self {
            endpoint,
            sink,
            inbound,
            reader,
            live: HashMap::new(),
            next_id: 0,
            outgoing,
            incoming,
            last_sent: Instant::now(),
            last_seen: Instant::now(),
            ticker,
        }
    }

    async fn next_event(&mut self) -> LinkEvent {
        tokio::select! {
            event = self.inbound.recv() => {
                self.last_seen = Instant::now();
                event.unwrap_or(LinkEvent::Closed(None))
            }
            _ = tick(&mut self.ticker) => LinkEvent::Tick,
        }
    }

    async fn write(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        self.sink.send(Message::text(frame.encode())).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn subscribe(&mut self, destination: &str) -> Result<(), ProtocolError> {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        self.write(&Frame::subscribe(&id, destination)).await?;
        self.live.insert(destination.to_string(), id);
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<(), ProtocolError> {
        match self.live.remove(destination) {
            Some(id) => self.write(&Frame::unsubscribe(&id)).await,
            None => Ok(()),
        }
    }

    fn destination_of(&self, frame: &Frame) -> Option<String> {
        frame
            .get("subscription")
            .and_then(|sub| {
                self.live
                    .iter()
                    .find(|(_, id)| id.as_str() == sub)
                    .map(|(destination, _)| destination.clone())
            })
            .or_else(|| frame.get("destination").map(str::to_string))
    }

    /// Heart-beat bookkeeping on every tick.
    async fn on_tick(&mut self) -> Result<(), ProtocolError> {
        if let Some(incoming) = self.incoming {
            let limit = incoming * STALE_MULTIPLIER;
            if self.last_seen.elapsed() > limit {
                return Err(ProtocolError::Stale(limit));
            }
        }
        if let Some(outgoing) = self.outgoing {
            if self.last_sent.elapsed() >= outgoing {
                self.sink.send(Message::text(HEARTBEAT.to_string())).await?;
                self.last_sent = Instant::now();
            }
        }
        Ok(())
    }

    async fn close(mut self) {
        let _ = self.write(&Frame::disconnect()).await;
        let _ = self.sink.close().await;
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

struct SessionActor {
    config: RealtimeConfig,
    commands: mpsc::Receiver<SessionCommand>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions: Vec<Subscription>,
    link: Option<Link>,
    pending: Pending,
    waiters: Vec<oneshot::Sender<Result<(), SessionError>>>,
    /// Set by `connect()`, cleared by `disconnect()` and rejection.
    auto_reconnect: bool,
}

impl SessionActor {
    async fn run(mut self) {
        tracing::debug!(candidates = self.config.endpoints.len(), "Session task started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                outcome = self.pending.wait() => self.on_pending(outcome).await,
                event = next_link_event(&mut self.link) => self.on_link_event(event).await,
            }
        }

        if let Some(link) = self.link.take() {
            link.close().await;
        }
        self.fail_waiters(|| SessionError::Closed);
        tracing::debug!("Session task stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(reply) => {
                if self.state.is_connected() {
                    let _ = reply.send(Ok(()));
                    return;
                }
                self.waiters.push(reply);
                self.auto_reconnect = true;
                if matches!(self.pending, Pending::Idle) {
                    self.start_cycle(0, false);
                }
            }
            SessionCommand::Disconnect(reply) => {
                self.auto_reconnect = false;
                self.pending = Pending::Idle;
                if let Some(link) = self.link.take() {
                    tracing::info!(endpoint = %link.endpoint, "Disconnecting realtime session");
                    link.close().await;
                    metrics::record_session_connected(false);
                }
                self.state.reset();
                self.publish();
                self.fail_waiters(|| SessionError::Cancelled);
                let _ = reply.send(());
            }
            SessionCommand::Subscribe {
                destination,
                handler,
                ack,
            } => {
                match self
                    .subscriptions
                    .iter_mut()
                    .find(|s| s.destination == destination)
                {
                    Some(existing) => existing.handler = handler,
                    None => self.subscriptions.push(Subscription {
                        destination: destination.clone(),
                        handler,
                    }),
                }

                let result = match self.link.as_mut() {
                    Some(link) if link.live.contains_key(&destination) => Ok(()),
                    Some(link) => link.subscribe(&destination).await,
                    None => {
                        tracing::debug!(destination = %destination, "Subscription queued until connected");
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    self.on_link_lost(e).await;
                }
                let _ = ack.send(());
            }
            SessionCommand::Unsubscribe { destination, ack } => {
                self.subscriptions.retain(|s| s.destination != destination);
                let result = match self.link.as_mut() {
                    Some(link) => link.unsubscribe(&destination).await,
                    None => Ok(()),
                };
                if let Err(e) = result {
                    self.on_link_lost(e).await;
                }
                let _ = ack.send(());
            }
            SessionCommand::Send {
                destination,
                body,
                ack,
            } => {
                let result = match self.link.as_mut() {
                    Some(link) => Some(link.write(&Frame::send(&destination, body)).await),
                    None => None,
                };
                let delivery = match result {
                    Some(Ok(())) => Delivery::Sent,
                    Some(Err(e)) => {
                        self.on_link_lost(e).await;
                        Delivery::Dropped
                    }
                    None => {
                        tracing::warn!(destination = %destination, "Realtime session not connected, message dropped");
                        Delivery::Dropped
                    }
                };
                let _ = ack.send(delivery);
            }
        }
    }

    async fn on_pending(&mut self, outcome: PendingOutcome) {
        match outcome {
            PendingOutcome::BackoffElapsed => self.dial_current(),
            PendingOutcome::Dialed(Ok(link)) => self.on_connected(link).await,
            PendingOutcome::Dialed(Err(e)) => self.on_attempt_failed(e),
        }
    }

    async fn on_connected(&mut self, link: Link) {
        tracing::info!(
            endpoint = %link.endpoint,
            candidate = self.state.candidate_index,
            "Realtime session connected"
        );
        self.state.on_connected(&link.endpoint);
        self.publish();
        metrics::record_session_connected(true);

        let link = self.link.insert(link);
        let destinations: Vec<String> = self
            .subscriptions
            .iter()
            .map(|s| s.destination.clone())
            .collect();
        let mut replay_error = None;
        for destination in &destinations {
            if let Err(e) = link.subscribe(destination).await {
                replay_error = Some(e);
                break;
            }
        }
        if !destinations.is_empty() {
            tracing::debug!(count = destinations.len(), "Replayed subscriptions");
        }

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        if let Some(e) = replay_error {
            self.on_link_lost(e).await;
        }
    }

    fn on_attempt_failed(&mut self, error: ProtocolError) {
        let candidates = self.config.endpoints.len();
        let failed = self.current_endpoint().unwrap_or_default().to_string();
        metrics::record_reconnect_attempt(&failed);

        match self
            .state
            .on_attempt_failed(candidates, self.config.max_reconnect_attempts)
        {
            AttemptOutcome::Retry { next_index } => {
                tracing::warn!(
                    endpoint = %failed,
                    error = %error,
                    next = next_index,
                    passes = self.state.reconnect_attempts,
                    "Realtime connect attempt failed, rotating"
                );
                self.publish();
                self.pending = Pending::Backoff(Box::pin(time::sleep(fixed_delay(
                    self.config.reconnect_delay_ms,
                ))));
            }
            AttemptOutcome::Rejected { attempts } => {
                tracing::error!(
                    endpoint = %failed,
                    error = %error,
                    attempts,
                    "Realtime connection rejected, giving up"
                );
                self.auto_reconnect = false;
                self.state.reset();
                self.publish();
                self.fail_waiters(|| SessionError::Rejected { attempts });
            }
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(frame) => self.on_frame(frame).await,
            LinkEvent::Activity => {}
            LinkEvent::Tick => {
                let result = match self.link.as_mut() {
                    Some(link) => link.on_tick().await,
                    None => Ok(()),
                };
                if let Err(e) = result {
                    self.on_link_lost(e).await;
                }
            }
            LinkEvent::Closed(reason) => self.on_link_lost(ProtocolError::Closed(reason)).await,
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Message => {
                let Some(destination) = self.link.as_ref().and_then(|l| l.destination_of(&frame)) else {
                    tracing::debug!("MESSAGE without a known destination, ignored");
                    return;
                };
                let handler = self
                    .subscriptions
                    .iter()
                    .find(|s| s.destination == destination)
                    .map(|s| Arc::clone(&s.handler));

                match handler {
                    Some(handler) => {
                        let payload = Payload::from_body(&frame.body);
                        if let Payload::Raw(_) = payload {
                            tracing::debug!(destination = %destination, "Non-JSON message body passed through raw");
                        }
                        handler(payload);
                    }
                    None => tracing::debug!(destination = %destination, "MESSAGE for unsubscribed destination"),
                }
            }
            Command::Error => {
                let message = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                self.on_link_lost(ProtocolError::Rejected(message)).await;
            }
            other => tracing::debug!(command = %other, "Ignoring frame"),
        }
    }

    /// The live link failed. Reconnect from the next candidate unless the
    /// session was explicitly disconnected.
    async fn on_link_lost(&mut self, error: ProtocolError) {
        let Some(link) = self.link.take() else {
            return;
        };
        tracing::warn!(endpoint = %link.endpoint, error = %error, "Realtime link lost");
        drop(link);
        metrics::record_session_connected(false);

        if self.auto_reconnect && !self.config.endpoints.is_empty() {
            let next = (self.state.candidate_index + 1) % self.config.endpoints.len();
            self.start_cycle(next, true);
        } else {
            self.state.reset();
            self.publish();
        }
    }

    /// Enter Connecting at `start_index`, dialing now or after the retry delay.
    fn start_cycle(&mut self, start_index: usize, delayed: bool) {
        let start_index = start_index % self.config.endpoints.len().max(1);
        self.state.begin(start_index);
        self.publish();

        if delayed {
            self.pending = Pending::Backoff(Box::pin(time::sleep(fixed_delay(
                self.config.reconnect_delay_ms,
            ))));
        } else {
            self.dial_current();
        }
    }

    fn dial_current(&mut self) {
        let Some(endpoint) = self.current_endpoint().map(str::to_string) else {
            self.on_attempt_failed(ProtocolError::Closed(Some("no realtime endpoints configured".into())));
            return;
        };
        tracing::debug!(endpoint = %endpoint, candidate = self.state.candidate_index, "Dialing realtime server");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let heartbeat = (self.config.heartbeat_outgoing_ms, self.config.heartbeat_incoming_ms);
        self.pending = Pending::Dialing(
            async move { deadline(timeout, handshake(endpoint, heartbeat)).await? }.boxed(),
        );
    }

    fn current_endpoint(&self) -> Option<&str> {
        self.config
            .endpoints
            .get(self.state.candidate_index)
            .map(String::as_str)
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn fail_waiters(&mut self, error: impl Fn() -> SessionError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(error()));
        }
    }
}

/// Open the socket and complete the STOMP CONNECT exchange.
async fn handshake(endpoint: String, heartbeat: (u64, u64)) -> Result<Link, ProtocolError> {
    let (ws, _) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let host = Url::parse(&endpoint)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());
    let (out_ms, in_ms) = heartbeat;
    sink.send(Message::text(Frame::connect(&host, out_ms, in_ms).encode()))
        .await?;

    let reply = loop {
        match stream.next().await {
            None => return Err(ProtocolError::Closed(None)),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(Message::Close(frame))) => {
                return Err(ProtocolError::Closed(frame.map(|f| f.reason.to_string())))
            }
            Some(Ok(msg)) => {
                if let Some(text) = message_text(&msg) {
                    if let Some(frame) = Frame::parse(text)? {
                        break frame;
                    }
                }
            }
        }
    };

    match reply.command {
        Command::Connected => {}
        Command::Error => {
            let message = reply.get("message").unwrap_or(reply.body.as_str()).to_string();
            return Err(ProtocolError::Rejected(message));
        }
        other => return Err(ProtocolError::Unexpected(other)),
    }

    let (outgoing, incoming) = negotiate_heartbeat(out_ms, in_ms, reply.get("heart-beat"));
    let (tx, rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_loop(stream, tx));

    Ok(Link::new(endpoint, sink, rx, reader, outgoing, incoming))
}

/// Combine our offer with the server's `heart-beat: sx,sy` reply.
fn negotiate_heartbeat(
    out_ms: u64,
    in_ms: u64,
    server: Option<&str>,
) -> (Option<Duration>, Option<Duration>) {
    let (sx, sy) = server
        .and_then(|h| h.split_once(','))
        .and_then(|(x, y)| Some((x.trim().parse::<u64>().ok()?, y.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));

    let outgoing = (out_ms > 0 && sy > 0).then(|| Duration::from_millis(out_ms.max(sy)));
    let incoming = (in_ms > 0 && sx > 0).then(|| Duration::from_millis(in_ms.max(sx)));
    (outgoing, incoming)
}

fn message_text(msg: &Message) -> Option<&str> {
    match msg {
        Message::Text(_) | Message::Binary(_) => msg.to_text().ok(),
        _ => None,
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<LinkEvent>) {
    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Close(frame)) => {
                let reason = frame.map(|f| f.reason.to_string());
                let _ = tx.send(LinkEvent::Closed(reason));
                return;
            }
            Ok(msg) => match message_text(&msg).map(Frame::parse) {
                Some(Ok(Some(frame))) => LinkEvent::Frame(frame),
                Some(Ok(None)) | None => LinkEvent::Activity,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Discarding malformed frame");
                    LinkEvent::Activity
                }
            },
            Err(e) => {
                let _ = tx.send(LinkEvent::Closed(Some(e.to_string())));
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(LinkEvent::Closed(None));
}
