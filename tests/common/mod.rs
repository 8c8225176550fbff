#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use ssc_negotiator::peer::engine::{
    ConnectivityState, EngineError, EngineEvent, EngineEvents, EngineFactory, TransportEngine,
};
use ssc_negotiator::signaling::{decode, SignalingError};
use ssc_negotiator::{
    start_with, Config, Handle, Identity, NetworkCandidate, PeerEvent, PushChannel,
    RequestChannel, SessionDescription, SignalingMessage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// In-memory relay: every published envelope is pushed to every subscriber.
#[derive(Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    subscribers: Vec<(String, mpsc::UnboundedSender<String>)>,
    published: Vec<String>,
    closed: Vec<String>,
    drop_announcements: bool,
}

impl Hub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(self: &Arc<Self>, id: &str) -> HubPush {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push((id.to_string(), tx));
        HubPush {
            id: id.to_string(),
            rx,
            hub: self.clone(),
        }
    }

    pub fn publish(&self, wire: &str) {
        let mut state = self.state.lock();
        state.published.push(wire.to_string());
        if state.drop_announcements && wire.contains(r#""type":"NEW_CONNECTION""#) {
            return;
        }
        state
            .subscribers
            .retain(|(_, tx)| tx.send(wire.to_string()).is_ok());
    }

    /// Announcements are still recorded but no longer delivered.
    pub fn drop_announcements(&self) {
        self.state.lock().drop_announcements = true;
    }

    /// Every decodable envelope published so far, in order.
    pub fn published(&self) -> Vec<SignalingMessage> {
        self.state
            .lock()
            .published
            .iter()
            .filter_map(|wire| decode(wire).ok())
            .collect()
    }

    pub fn raw_published(&self) -> Vec<String> {
        self.state.lock().published.clone()
    }

    pub fn sent_by(&self, id: &str) -> Vec<SignalingMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.sender() == id)
            .collect()
    }

    pub fn closed_subscriptions(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }
}

pub struct HubPush {
    id: String,
    rx: mpsc::UnboundedReceiver<String>,
    hub: Arc<Hub>,
}

#[async_trait]
impl PushChannel for HubPush {
    async fn recv(&mut self) -> Option<Result<String, SignalingError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
        self.hub.state.lock().closed.push(self.id.clone());
    }
}

pub struct HubRequest {
    hub: Arc<Hub>,
}

#[async_trait]
impl RequestChannel for HubRequest {
    async fn send(&self, encoded: String) -> Result<(), SignalingError> {
        self.hub.publish(&encoded);
        Ok(())
    }
}

/// Hangs on the first `stalls` sends, then behaves like [`HubRequest`].
pub struct StallingRequest {
    hub: Arc<Hub>,
    stalls: usize,
    attempts: AtomicUsize,
}

impl StallingRequest {
    pub fn new(hub: &Arc<Hub>, stalls: usize) -> Arc<Self> {
        Arc::new(Self {
            hub: hub.clone(),
            stalls,
            attempts: AtomicUsize::new(0),
        })
    }

    /// A channel on which no send ever completes.
    pub fn stuck(hub: &Arc<Hub>) -> Arc<Self> {
        Self::new(hub, usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestChannel for StallingRequest {
    async fn send(&self, encoded: String) -> Result<(), SignalingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.stalls {
            std::future::pending::<()>().await;
        }
        self.hub.publish(&encoded);
        Ok(())
    }
}

/// Engine that "connects" once both descriptions are set and at least one
/// remote candidate was added.
pub struct FakeEngine {
    pub peer_id: String,
    events: EngineEvents,
    state: Mutex<FakeState>,
}

#[derive(Default, Clone)]
pub struct FakeState {
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub candidates: Vec<NetworkCandidate>,
    pub connected: bool,
    pub closed: bool,
}

impl FakeEngine {
    pub fn snapshot(&self) -> FakeState {
        self.state.lock().clone()
    }

    fn check_connected(&self) {
        let mut state = self.state.lock();
        if state.connected || state.closed {
            return;
        }
        if state.local.is_some() && state.remote.is_some() && !state.candidates.is_empty() {
            state.connected = true;
            let _ = self
                .events
                .send(EngineEvent::StateChanged(ConnectivityState::Connected));
            let _ = self.events.send(EngineEvent::ChannelOpen("ssc-data".into()));
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl TransportEngine for FakeEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        Ok(SessionDescription::offer(format!(
            "v=0\r\na=ice-ufrag:{}\r\na=ice-pwd:pass word\r\n",
            self.peer_id
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        Ok(SessionDescription::answer(
            "v=0\r\na=ice-ufrag:ans\r\na=ice-pwd:answer\tpwd\r\n",
        ))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.state.lock().local = Some(desc);
        for port in [50000, 50001] {
            self.emit(EngineEvent::CandidateDiscovered(NetworkCandidate::new(
                format!("candidate:{port} 1 udp 2122260223 192.168.1.2 {port} typ host"),
            )));
        }
        self.emit(EngineEvent::GatheringComplete);
        self.check_connected();
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.state.lock().remote = Some(desc);
        self.check_connected();
        Ok(())
    }

    async fn add_candidate(&self, candidate: NetworkCandidate) -> Result<(), EngineError> {
        self.state.lock().candidates.push(candidate);
        self.check_connected();
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    engines: Mutex<Vec<Arc<FakeEngine>>>,
}

impl FakeFactory {
    pub fn engines_for(&self, peer_id: &str) -> Vec<Arc<FakeEngine>> {
        self.engines
            .lock()
            .iter()
            .filter(|e| e.peer_id == peer_id)
            .cloned()
            .collect()
    }

    pub fn latest(&self, peer_id: &str) -> Option<Arc<FakeEngine>> {
        self.engines_for(peer_id).pop()
    }
}

#[async_trait]
impl EngineFactory for FakeFactory {
    async fn create(
        &self,
        peer_id: &str,
        events: EngineEvents,
    ) -> Result<Arc<dyn TransportEngine>, EngineError> {
        let engine = Arc::new(FakeEngine {
            peer_id: peer_id.to_string(),
            events,
            state: Mutex::new(FakeState::default()),
        });
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}

pub struct TestNode {
    pub handle: Handle,
    pub engines: Arc<FakeFactory>,
    pub events: broadcast::Receiver<PeerEvent>,
}

pub fn config() -> Config {
    Config::parse("http://hub.test/").unwrap()
}

pub fn spawn_node(hub: &Arc<Hub>, id: &str, config: &Config) -> TestNode {
    spawn_node_with(hub, id, config, Arc::new(HubRequest { hub: hub.clone() }))
}

/// Like [`spawn_node`], with a caller-supplied outbound channel.
pub fn spawn_node_with(
    hub: &Arc<Hub>,
    id: &str,
    config: &Config,
    request: Arc<dyn RequestChannel>,
) -> TestNode {
    let engines = Arc::new(FakeFactory::default());
    let handle = start_with(
        config,
        Identity::from(id),
        Box::new(hub.subscribe(id)),
        request,
        engines.clone(),
    );
    let events = handle.subscribe();
    TestNode {
        handle,
        engines,
        events,
    }
}

/// Waits for the first event matching `pred`.
pub async fn next_event(
    events: &mut broadcast::Receiver<PeerEvent>,
    pred: impl Fn(&PeerEvent) -> bool,
) -> PeerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for peer event")
}

pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

pub fn raw_offer(from: &str, to: &str) -> String {
    format!(
        r#"{{"type":"OFFER","payload":{{"id":"{from}","target":"{to}","offer":{{"type":"offer","sdp":"v=0\r\na=ice-pwd:remote~pwd\r\n"}}}}}}"#
    )
}
