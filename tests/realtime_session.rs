//! Realtime session behavior against mock STOMP servers.

mod common;

use std::time::Duration;

use common::{eventually, start_stomp_server, test_config, StompBehavior, StompEvent};
use replica_client::realtime::{Delivery, Payload, Phase, SessionError, SessionManager};
use serde_json::json;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

fn session_for(endpoints: Vec<String>, max_passes: u32) -> SessionManager {
    let mut config = test_config(vec!["http://127.0.0.1:1".to_string()], endpoints);
    config.realtime.max_reconnect_attempts = max_passes;
    SessionManager::spawn(config.realtime)
}

#[tokio::test]
async fn test_replays_subscriptions_in_order_after_reconnect() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);

    session.subscribe("/topic/a", |_| {}).await.unwrap();
    session.subscribe("/topic/b", |_| {}).await.unwrap();
    session.connect().await.unwrap();

    let expected = vec![
        StompEvent::Connect,
        StompEvent::Subscribe("/topic/a".into()),
        StompEvent::Subscribe("/topic/b".into()),
    ];
    eventually(WAIT, || server.events_on(1) == expected).await;

    server.drop_connections();
    eventually(WAIT, || server.events_on(2) == expected).await;
    eventually(WAIT, || session.is_connected()).await;
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);

    session.connect().await.unwrap();
    session.connect().await.unwrap();
    assert_eq!(server.connects(), 1);
    assert_eq!(session.state().phase, Phase::Connected);
    assert_eq!(session.state().endpoint.as_deref(), Some(server.url.as_str()));
}

#[tokio::test]
async fn test_rejected_after_max_passes_without_further_attempts() {
    let servers = vec![
        start_stomp_server(StompBehavior::Hangup).await,
        start_stomp_server(StompBehavior::Hangup).await,
        start_stomp_server(StompBehavior::Hangup).await,
    ];
    let session = session_for(servers.iter().map(|s| s.url.clone()).collect(), 2);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected { attempts: 6 }));
    assert_eq!(session.state().phase, Phase::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    for server in &servers {
        assert_eq!(server.connects(), 2);
    }
}

#[tokio::test]
async fn test_rotates_to_next_candidate() {
    let broken = start_stomp_server(StompBehavior::Hangup).await;
    let healthy = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![broken.url.clone(), healthy.url.clone()], 5);

    session.connect().await.unwrap();
    let state = session.state();
    assert_eq!(state.candidate_index, 1);
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(broken.connects(), 1);
    assert_eq!(healthy.connects(), 1);
}

#[tokio::test]
async fn test_dispatches_json_and_raw_bodies() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);
    let (tx, mut rx) = mpsc::unbounded_channel();

    session
        .subscribe("/topic/auctions", move |payload| {
            let _ = tx.send(payload);
        })
        .await
        .unwrap();
    session.connect().await.unwrap();
    eventually(WAIT, || {
        server
            .events_on(1)
            .contains(&StompEvent::Subscribe("/topic/auctions".into()))
    })
    .await;

    server.publish("/topic/auctions", r#"{"id":1,"price":250}"#);
    server.publish("/topic/auctions", "server restarting");

    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, Payload::Json(json!({"id": 1, "price": 250})));
    assert_eq!(second, Payload::Raw("server restarting".into()));
}

#[tokio::test]
async fn test_send_is_noop_until_connected() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);

    let (_, delivery) = session.send_action("bid", json!({"amount": 5})).await.unwrap();
    assert_eq!(delivery, Delivery::Dropped);

    session.connect().await.unwrap();
    let (id, delivery) = session.send_action("bid", json!({"amount": 5})).await.unwrap();
    assert_eq!(delivery, Delivery::Sent);

    eventually(WAIT, || {
        server.events_on(1).iter().any(|e| match e {
            StompEvent::Send { destination, body } => {
                let body: serde_json::Value = serde_json::from_str(body).unwrap();
                destination == "/app/bid" && body["amount"] == 5 && body["sessionId"] == id.as_str()
            }
            _ => false,
        })
    })
    .await;
}

#[tokio::test]
async fn test_follow_and_unfollow_resource() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);
    session.connect().await.unwrap();

    session
        .follow_resource("auction", "42", json!({"auctionId": 42, "userId": 7}), |_| {})
        .await
        .unwrap();
    session
        .unfollow_resource("auction", "42", json!({"auctionId": 42}))
        .await
        .unwrap();

    eventually(WAIT, || {
        let events = server.events_on(1);
        let destinations: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                StompEvent::Subscribe(d) => Some(format!("sub {d}")),
                StompEvent::Unsubscribe(d) => Some(format!("unsub {d}")),
                StompEvent::Send { destination, .. } => Some(format!("send {destination}")),
                StompEvent::Connect => None,
            })
            .collect();
        destinations
            == vec![
                "sub /topic/auction/42".to_string(),
                "send /app/subscribe".to_string(),
                "send /app/unsubscribe".to_string(),
                "unsub /topic/auction/42".to_string(),
            ]
    })
    .await;
}

#[tokio::test]
async fn test_unsubscribed_destination_is_not_replayed() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);

    session.subscribe("/topic/a", |_| {}).await.unwrap();
    session.subscribe("/topic/b", |_| {}).await.unwrap();
    session.connect().await.unwrap();
    session.unsubscribe("/topic/a").await.unwrap();
    eventually(WAIT, || {
        server
            .events_on(1)
            .contains(&StompEvent::Unsubscribe("/topic/a".into()))
    })
    .await;

    server.drop_connections();
    eventually(WAIT, || {
        server.events_on(2)
            == vec![StompEvent::Connect, StompEvent::Subscribe("/topic/b".into())]
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_stops_reconnecting() {
    let server = start_stomp_server(StompBehavior::Accept).await;
    let session = session_for(vec![server.url.clone()], 5);
    let mut changes = session.state_changes();

    session.connect().await.unwrap();
    session.disconnect().await.unwrap();
    assert_eq!(session.state().phase, Phase::Disconnected);
    assert!(changes.has_changed().unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connects(), 1);
    assert!(!session.is_connected());
}
