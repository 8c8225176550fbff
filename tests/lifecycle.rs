mod common;

use common::{
    config, eventually, next_event, raw_offer, spawn_node, spawn_node_with, Hub, StallingRequest,
    TestNode,
};
use ssc_negotiator::peer::engine::{ConnectivityState, EngineEvent};
use ssc_negotiator::signaling::MessageType;
use ssc_negotiator::{CloseReason, Error, PeerEvent, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

async fn connected_pair(hub: &Arc<Hub>, config: &ssc_negotiator::Config) -> (TestNode, TestNode) {
    hub.drop_announcements();
    let mut a = spawn_node(hub, "aaa", config);
    let mut b = spawn_node(hub, "bbb", config);
    a.handle.connect("bbb").unwrap();
    next_event(&mut a.events, |e| matches!(e, PeerEvent::Connected { .. })).await;
    next_event(&mut b.events, |e| matches!(e, PeerEvent::Connected { .. })).await;
    (a, b)
}

#[tokio::test(start_paused = true)]
async fn stalled_negotiation_times_out() {
    let hub = Hub::new();
    hub.drop_announcements();
    let mut config = config();
    config.negotiation_timeout_secs = Some(2);
    let mut a = spawn_node(&hub, "aaa", &config);

    // answered, but the peer never sends a candidate
    hub.publish(&raw_offer("ghost", "aaa"));
    let event = next_event(&mut a.events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert_eq!(
        event,
        PeerEvent::Closed {
            peer: "ghost".into(),
            reason: CloseReason::TimedOut,
        }
    );
    eventually("registry cleared", || a.handle.sessions().is_empty()).await;
    assert!(a.engines.latest("ghost").unwrap().snapshot().closed);

    a.handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn connected_sessions_do_not_time_out() {
    let hub = Hub::new();
    let mut config = config();
    config.negotiation_timeout_secs = Some(2);
    let (a, b) = connected_pair(&hub, &config).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(a.handle.sessions()[0].state, SessionState::Connected);
    assert_eq!(b.handle.sessions()[0].state, SessionState::Connected);

    a.handle.close().await;
    b.handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn lost_connection_closes_after_grace_period() {
    let hub = Hub::new();
    let mut config = config();
    config.disconnect_grace_secs = 3;
    let (mut a, b) = connected_pair(&hub, &config).await;

    a.engines
        .latest("bbb")
        .unwrap()
        .emit(EngineEvent::StateChanged(ConnectivityState::Disconnected));

    let event = next_event(&mut a.events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert_eq!(
        event,
        PeerEvent::Closed {
            peer: "bbb".into(),
            reason: CloseReason::Failed("connection lost".into()),
        }
    );

    a.handle.close().await;
    b.handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn recovery_within_grace_keeps_session() {
    let hub = Hub::new();
    let mut config = config();
    config.disconnect_grace_secs = 3;
    let (mut a, b) = connected_pair(&hub, &config).await;

    let engine = a.engines.latest("bbb").unwrap();
    engine.emit(EngineEvent::StateChanged(ConnectivityState::Disconnected));
    tokio::time::sleep(Duration::from_secs(1)).await;
    engine.emit(EngineEvent::StateChanged(ConnectivityState::Connected));
    next_event(&mut a.events, |e| matches!(e, PeerEvent::Connected { .. })).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(a.handle.sessions()[0].state, SessionState::Connected);
    assert!(!engine.snapshot().closed);

    a.handle.close().await;
    b.handle.close().await;
}

#[tokio::test]
async fn failed_transport_closes_session() {
    let hub = Hub::new();
    let (mut a, b) = connected_pair(&hub, &config()).await;

    a.engines
        .latest("bbb")
        .unwrap()
        .emit(EngineEvent::StateChanged(ConnectivityState::Failed));
    let event = next_event(&mut a.events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert!(matches!(
        event,
        PeerEvent::Closed {
            reason: CloseReason::Failed(_),
            ..
        }
    ));
    eventually("registry cleared", || a.handle.sessions().is_empty()).await;

    a.handle.close().await;
    b.handle.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_releases_everything() {
    let hub = Hub::new();
    let (mut a, b) = connected_pair(&hub, &config()).await;

    a.handle.close().await;
    assert!(a.handle.is_closed());
    assert!(a.handle.sessions().is_empty());
    assert!(a.engines.latest("bbb").unwrap().snapshot().closed);
    assert_eq!(hub.closed_subscriptions(), vec!["aaa".to_string()]);

    let event = next_event(&mut a.events, |e| matches!(e, PeerEvent::Closed { .. })).await;
    assert_eq!(
        event,
        PeerEvent::Closed {
            peer: "bbb".into(),
            reason: CloseReason::Local,
        }
    );

    a.handle.close().await;
    assert_eq!(hub.closed_subscriptions(), vec!["aaa".to_string()]);
    assert!(matches!(a.handle.connect("bbb"), Err(Error::Closed)));

    b.handle.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_returns_when_requests_never_complete() {
    let hub = Hub::new();
    let mut config = config();
    config.request_timeout_secs = 1;
    let request = StallingRequest::stuck(&hub);
    let a = spawn_node_with(&hub, "aaa", &config, request.clone());

    eventually("announce attempted", || request.attempts() > 0).await;
    let closed = tokio::time::timeout(Duration::from_secs(3), a.handle.close()).await;
    assert!(closed.is_ok(), "close hung behind a stuck request");
    assert!(a.handle.is_closed());
    assert!(hub.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_drops_queued_messages_after_drain_bound() {
    let hub = Hub::new();
    hub.drop_announcements();
    let mut config = config();
    config.request_timeout_secs = 1;
    let request = StallingRequest::stuck(&hub);
    let a = spawn_node_with(&hub, "aaa", &config, request.clone());

    let peers = ["p1", "p2", "p3", "p4", "p5", "p6"];
    for peer in peers {
        a.handle.connect(peer).unwrap();
    }
    eventually("offers queued", || {
        let sessions = a.handle.sessions();
        sessions.len() == peers.len()
            && sessions
                .iter()
                .all(|s| s.state == SessionState::AwaitingAnswer)
    })
    .await;

    // six offers and their candidates at one second each outlast the drain bound
    let started = Instant::now();
    a.handle.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(request.attempts() < peers.len() + 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_request_does_not_block_later_messages() {
    let hub = Hub::new();
    let mut config = config();
    config.request_timeout_secs = 1;
    // the announce hangs, the answer goes through
    let a = spawn_node_with(&hub, "aaa", &config, StallingRequest::new(&hub, 1));

    hub.publish(&raw_offer("zzz", "aaa"));
    eventually("answer sent", || {
        hub.sent_by("aaa")
            .iter()
            .any(|m| m.kind() == MessageType::Answer)
    })
    .await;
    assert!(!hub
        .sent_by("aaa")
        .iter()
        .any(|m| m.kind() == MessageType::NewConnection));

    a.handle.close().await;
}
