//! Node runtime: one push subscription, one outbound writer, and a session
//! task per counterpart.

use crate::config::Config;
use crate::error::Error;
use crate::identity::Identity;
use crate::logger;
use crate::peer::actor::{self, SessionContext, SessionExit, SessionHandle};
use crate::peer::connection::WebRtcEngineFactory;
use crate::peer::engine::EngineFactory;
use crate::peer::registry::SessionRegistry;
use crate::peer::session::SessionInput;
use crate::peer::types::{PeerEvent, SessionInfo};
use crate::signaling::codec;
use crate::signaling::message::{MessageType, SignalingMessage};
use crate::signaling::transport::{
    Endpoints, HttpRequestChannel, PushChannel, RequestChannel, SignalingError, WebSocketPush,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 64;
/// `close()` waits at most this many request timeouts for the outbound drain.
const DRAIN_BOUND_FACTOR: u32 = 3;

/// Connects to the configured signaling server and starts negotiating.
///
/// Installs the `tracing` subscriber, generates a fresh identity and
/// announces it with `NEW_CONNECTION`.
pub async fn start(config: Config) -> Result<Handle, Error> {
    config.validate()?;
    logger::init(&config.log);

    let identity = Identity::generate();
    let endpoints = Endpoints::derive(&config.signaling_url, &identity)?;
    tracing::info!(id = %identity, push = %endpoints.push, "starting node");

    let push = WebSocketPush::connect(&endpoints.push).await?;
    let request = HttpRequestChannel::new(endpoints.request, config.request_timeout())?;
    let engines = WebRtcEngineFactory::new(config.ice_servers.clone());

    Ok(start_with(
        &config,
        identity,
        Box::new(push),
        Arc::new(request),
        Arc::new(engines),
    ))
}

/// Starts a node over caller-supplied channels and transport engines.
///
/// Must be called from within a tokio runtime.
pub fn start_with(
    config: &Config,
    identity: Identity,
    push: Box<dyn PushChannel>,
    request: Arc<dyn RequestChannel>,
    engines: Arc<dyn EngineFactory>,
) -> Handle {
    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let (exits, exits_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let ctx = Arc::new(SessionContext {
        local_id: identity.clone(),
        engines,
        outbox: outbox.clone(),
        exits,
        events: events.clone(),
        negotiation_timeout: config.negotiation_timeout(),
        disconnect_grace: config.disconnect_grace(),
    });
    let router = Router {
        local_id: identity.clone(),
        registry: Arc::new(SessionRegistry::new()),
        ctx,
    };

    let announce = SignalingMessage::new_connection(identity.as_str(), config.known_peers.clone());
    if outbox.send(announce).is_err() {
        tracing::warn!("outbound queue closed before announce");
    }

    let request_timeout = config.request_timeout();
    let writer = tokio::spawn(write_loop(
        outbox_rx,
        request,
        request_timeout,
        shutdown_rx.clone(),
    ));
    let dispatcher = tokio::spawn(dispatch_loop(router.clone(), push, exits_rx, shutdown_rx));

    Handle {
        inner: Arc::new(Inner {
            id: identity,
            router,
            events,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
            writer: Mutex::new(Some(writer)),
            request_timeout,
            closed: AtomicBool::new(false),
        }),
    }
}

/// Application-facing handle to a running node. Cheap to clone.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

struct Inner {
    id: Identity,
    router: Router,
    events: broadcast::Sender<PeerEvent>,
    shutdown: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl Handle {
    pub fn id(&self) -> &Identity {
        &self.inner.id
    }

    /// Offers a connection to `peer_id`. A session that is already
    /// negotiating ignores the request.
    pub fn connect(&self, peer_id: &str) -> Result<(), Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if peer_id == self.inner.id.as_str() {
            return Err(Error::SelfConnect);
        }
        if self.inner.router.deliver(peer_id, SessionInput::Connect, true) {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    /// Snapshot of every registered session, ordered by peer id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .router
            .registry
            .all()
            .iter()
            .map(SessionHandle::info)
            .collect();
        sessions.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        sessions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes every session, the push subscription and the outbound writer.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(id = %self.inner.id, "closing node");
        let _ = self.inner.shutdown.send(true);

        let dispatcher = self.inner.dispatcher.lock().take();
        if let Some(task) = dispatcher {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "dispatcher task failed");
            }
        }

        let sessions = self.inner.router.registry.drain();
        futures_util::future::join_all(sessions.iter().map(SessionHandle::close)).await;

        // каждый send ограничен по времени, но длинная очередь нет
        let writer = self.inner.writer.lock().take();
        if let Some(mut task) = writer {
            let bound = self.inner.request_timeout * DRAIN_BOUND_FACTOR;
            match tokio::time::timeout(bound, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "writer task failed"),
                Err(_) => {
                    tracing::warn!(?bound, "outbound drain timed out; dropping queued messages");
                    task.abort();
                }
            }
        }
    }
}

/// Delivers signaling input to the right session task.
#[derive(Clone)]
struct Router {
    local_id: Identity,
    registry: Arc<SessionRegistry>,
    ctx: Arc<SessionContext>,
}

impl Router {
    fn route(&self, message: SignalingMessage) {
        if !message.is_for(self.local_id.as_str()) {
            tracing::trace!(
                kind = %message.kind(),
                from = %message.sender(),
                "ignoring message not addressed to us"
            );
            return;
        }
        let peer_id = message.sender().to_string();
        let creates = matches!(
            message.kind(),
            MessageType::NewConnection | MessageType::Offer | MessageType::IceCandidate
        );
        if !self.deliver(&peer_id, SessionInput::Signal(message), creates) {
            tracing::debug!(peer = %peer_id, "no live session; message dropped");
        }
    }

    /// Returns false when no session could take the input.
    fn deliver(&self, peer_id: &str, mut input: SessionInput, create: bool) -> bool {
        // задача уже завершилась: ввод возвращается, запись заменяем один раз
        for _ in 0..2 {
            let handle = if create {
                self.session(peer_id)
            } else {
                match self.registry.get(peer_id) {
                    Some(handle) => handle,
                    None => return false,
                }
            };
            match handle.send(input) {
                Ok(()) => return true,
                Err(returned) => {
                    self.registry
                        .remove_if(peer_id, |h| h.generation() == handle.generation());
                    if !create {
                        return false;
                    }
                    input = returned;
                }
            }
        }
        false
    }

    fn session(&self, peer_id: &str) -> SessionHandle {
        let (handle, created) = self.registry.get_or_create(peer_id, |generation| {
            actor::spawn(self.ctx.clone(), peer_id, generation)
        });
        if created {
            tracing::info!(peer = %peer_id, generation = handle.generation(), "session created");
        }
        handle
    }
}

async fn dispatch_loop(
    router: Router,
    mut push: Box<dyn PushChannel>,
    mut exits: mpsc::UnboundedReceiver<SessionExit>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut subscribed = true;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(exit) = exits.recv() => {
                let removed = router
                    .registry
                    .remove_if(&exit.peer_id, |h| h.generation() == exit.generation);
                tracing::debug!(
                    peer = %exit.peer_id,
                    reason = %exit.reason,
                    removed = removed.is_some(),
                    "session exited"
                );
            }
            incoming = push.recv(), if subscribed => match incoming {
                Some(Ok(wire)) => match codec::decode(&wire) {
                    Ok(message) => router.route(message),
                    Err(err) => tracing::warn!(error = %err, "dropping malformed signaling message"),
                },
                Some(Err(err)) => tracing::warn!(error = %err, "push channel error"),
                None => {
                    tracing::warn!("push channel ended; no further signaling will arrive");
                    subscribed = false;
                }
            },
        }
    }
    push.close().await;
    tracing::debug!("dispatcher stopped");
}

async fn write_loop(
    mut outbox: mpsc::UnboundedReceiver<SignalingMessage>,
    request: Arc<dyn RequestChannel>,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            message = outbox.recv() => match message {
                Some(message) => send_one(request.as_ref(), timeout, message).await,
                None => break,
            },
            _ = shutdown.changed() => {
                while let Ok(message) = outbox.try_recv() {
                    send_one(request.as_ref(), timeout, message).await;
                }
                break;
            }
        }
    }
    tracing::debug!("writer stopped");
}

/// One attempt per message, bounded by `timeout`; failures are logged,
/// never retried.
async fn send_one(request: &dyn RequestChannel, timeout: Duration, message: SignalingMessage) {
    let kind = message.kind();
    let encoded = match codec::encode(&message) {
        Ok(encoded) => encoded,
        Err(err) => {
            tracing::error!(%kind, error = %err, "failed to encode signaling message");
            return;
        }
    };
    let result = match tokio::time::timeout(timeout, request.send(encoded)).await {
        Ok(result) => result,
        Err(_) => Err(SignalingError::TimedOut(timeout)),
    };
    match result {
        Ok(()) => tracing::trace!(%kind, target = ?message.target(), "signaling message sent"),
        Err(err) => tracing::warn!(%kind, error = %err, "signaling send failed"),
    }
}
