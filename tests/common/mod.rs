//! Shared utilities for integration testing: mock HTTP replicas and a mock
//! STOMP-over-WebSocket server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;

use replica_client::config::ClientConfig;
use replica_client::realtime::frame::{Command, Frame};

/// A mock replica that answers every request with a configurable status.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub url: String,
    hits: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
    status: Arc<AtomicU16>,
}

impl MockBackend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

/// Start a mock backend on an ephemeral port.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));
    let status = Arc::new(AtomicU16::new(status));

    let (hits_c, paths_c, status_c) = (hits.clone(), paths.clone(), status.clone());
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let hits = hits_c.clone();
                    let paths = paths_c.clone();
                    let status = status_c.clone();
                    tokio::spawn(async move {
                        let Some(path) = read_request_path(&mut socket).await else {
                            return;
                        };
                        hits.fetch_add(1, Ordering::SeqCst);
                        paths.lock().unwrap().push(path);

                        let code = status.load(Ordering::SeqCst);
                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            code,
                            reason(code),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockBackend {
        addr,
        url: format!("http://{}", addr),
        hits,
        paths,
        status,
    }
}

/// Read the request head (and any body) and return the request path.
async fn read_request_path(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }

    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

fn reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A replica that accepts connections and reads requests but never answers.
pub struct HungBackend {
    pub url: String,
    accepted: Arc<AtomicUsize>,
}

impl HungBackend {
    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub async fn start_hung_backend() -> HungBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let accepted_c = accepted.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted_c.fetch_add(1, Ordering::SeqCst);
            // Drain until the client gives up; the socket stays open meanwhile.
            tokio::spawn(async move {
                let mut chunk = [0u8; 1024];
                while let Ok(n) = socket.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });

    HungBackend {
        url: format!("http://{}", addr),
        accepted,
    }
}

/// An address nothing listens on.
pub async fn closed_port_url(scheme: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    match scheme {
        "ws" => format!("ws://{}/ws", addr),
        _ => format!("http://{}", addr),
    }
}

/// Client config for tests: fast retries, no background probing.
pub fn test_config(http_endpoints: Vec<String>, ws_endpoints: Vec<String>) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.http.endpoints = http_endpoints;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config.health_check.enabled = false;
    config.health_check.timeout_secs = 1;
    if !ws_endpoints.is_empty() {
        config.realtime.endpoints = ws_endpoints;
    }
    config.realtime.reconnect_delay_ms = 20;
    config.realtime.connect_timeout_ms = 2000;
    config.realtime.heartbeat_outgoing_ms = 0;
    config.realtime.heartbeat_incoming_ms = 0;
    config
}

/// How the mock STOMP server treats new connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompBehavior {
    /// Complete the handshake and serve frames.
    Accept,
    /// Accept the TCP connection and drop it immediately.
    Hangup,
}

/// Frames the mock server received, tagged by connection number (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompEvent {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Send { destination: String, body: String },
}

pub struct MockStompServer {
    pub url: String,
    connects: Arc<AtomicUsize>,
    events: Arc<Mutex<Vec<(usize, StompEvent)>>>,
    kill: Arc<watch::Sender<u64>>,
    publish: broadcast::Sender<(String, String)>,
}

impl MockStompServer {
    /// TCP connections accepted so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<(usize, StompEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Events received on the given connection.
    pub fn events_on(&self, connection: usize) -> Vec<StompEvent> {
        self.events()
            .into_iter()
            .filter(|(n, _)| *n == connection)
            .map(|(_, e)| e)
            .collect()
    }

    /// Abruptly close every open connection.
    pub fn drop_connections(&self) {
        self.kill.send_modify(|generation| *generation += 1);
    }

    /// Deliver a MESSAGE to every connection subscribed to `destination`.
    pub fn publish(&self, destination: &str, body: &str) {
        let _ = self.publish.send((destination.to_string(), body.to_string()));
    }
}

pub async fn start_stomp_server(behavior: StompBehavior) -> MockStompServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connects = Arc::new(AtomicUsize::new(0));
    let events = Arc::new(Mutex::new(Vec::new()));
    let (kill, _) = watch::channel(0u64);
    let kill = Arc::new(kill);
    let (publish, _) = broadcast::channel(64);

    let (connects_c, events_c, kill_c, publish_c) =
        (connects.clone(), events.clone(), kill.clone(), publish.clone());
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let n = connects_c.fetch_add(1, Ordering::SeqCst) + 1;
            if behavior == StompBehavior::Hangup {
                drop(socket);
                continue;
            }
            tokio::spawn(serve_stomp(
                socket,
                n,
                events_c.clone(),
                kill_c.subscribe(),
                publish_c.subscribe(),
            ));
        }
    });

    MockStompServer {
        url: format!("ws://{}/ws", addr),
        connects,
        events,
        kill,
        publish,
    }
}

async fn serve_stomp(
    socket: TcpStream,
    connection: usize,
    events: Arc<Mutex<Vec<(usize, StompEvent)>>>,
    mut kill: watch::Receiver<u64>,
    mut publish: broadcast::Receiver<(String, String)>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let record = |event: StompEvent| events.lock().unwrap().push((connection, event));

    loop {
        tokio::select! {
            _ = kill.changed() => return,
            published = publish.recv() => {
                let Ok((destination, body)) = published else { continue };
                if let Some(id) = subscriptions.get(&destination) {
                    let frame = Frame::new(Command::Message)
                        .header("destination", destination.as_str())
                        .header("subscription", id.as_str())
                        .header("message-id", "m-1")
                        .body(body);
                    if sink.send(Message::text(frame.encode())).await.is_err() {
                        return;
                    }
                }
            }
            message = stream.next() => {
                let Some(Ok(message)) = message else { return };
                let Ok(text) = message.to_text() else { continue };
                let Ok(Some(frame)) = Frame::parse(text) else { continue };

                match frame.command {
                    Command::Connect => {
                        record(StompEvent::Connect);
                        let connected = Frame::new(Command::Connected).header("version", "1.2");
                        if sink.send(Message::text(connected.encode())).await.is_err() {
                            return;
                        }
                    }
                    Command::Subscribe => {
                        let destination = frame.get("destination").unwrap_or_default().to_string();
                        let id = frame.get("id").unwrap_or_default().to_string();
                        record(StompEvent::Subscribe(destination.clone()));
                        subscriptions.insert(destination, id);
                    }
                    Command::Unsubscribe => {
                        let id = frame.get("id").unwrap_or_default();
                        let destination = subscriptions
                            .iter()
                            .find(|(_, v)| v.as_str() == id)
                            .map(|(k, _)| k.clone());
                        if let Some(destination) = destination {
                            subscriptions.remove(&destination);
                            record(StompEvent::Unsubscribe(destination));
                        }
                    }
                    Command::Send => {
                        record(StompEvent::Send {
                            destination: frame.get("destination").unwrap_or_default().to_string(),
                            body: frame.body.clone(),
                        });
                    }
                    Command::Disconnect => return,
                    _ => {}
                }
            }
        }
    }
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, condition: F) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
