//! One task per counterpart: serializes signaling input, engine events and
//! timers into the [`PeerSession`] so no two transitions ever overlap.

use crate::identity::Identity;
use crate::peer::engine::{EngineError, EngineFactory};
use crate::peer::session::{Outbox, Outcome, PeerSession, SessionInput};
use crate::peer::types::{CloseReason, PeerEvent, Role, SessionInfo, SessionState};
use crate::signaling::message::SignalingMessage;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

/// Everything a session task needs from its node.
pub struct SessionContext {
    pub local_id: Identity,
    pub engines: Arc<dyn EngineFactory>,
    pub outbox: Outbox,
    pub exits: mpsc::UnboundedSender<SessionExit>,
    pub events: broadcast::Sender<PeerEvent>,
    pub negotiation_timeout: Option<Duration>,
    pub disconnect_grace: Duration,
}

/// Sent to the node once a session task has finished tearing down.
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub peer_id: String,
    pub generation: u64,
    pub reason: CloseReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub role: Role,
    pub state: SessionState,
}

/// Registry entry for a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    peer_id: String,
    generation: u64,
    started_at: DateTime<Utc>,
    inbox: mpsc::UnboundedSender<SessionInput>,
    shutdown: Arc<Notify>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn info(&self) -> SessionInfo {
        let status = self.status();
        SessionInfo {
            peer_id: self.peer_id.clone(),
            role: status.role,
            state: status.state,
            started_at: self.started_at,
        }
    }

    /// Queues input; hands it back when the task has already exited.
    pub fn send(&self, input: SessionInput) -> Result<(), SessionInput> {
        self.inbox.send(input).map_err(|err| err.0)
    }

    /// Requests teardown and waits until the session reports `CLOSED`.
    pub async fn close(&self) {
        self.shutdown.notify_one();
        let mut status = self.status.clone();
        let _ = status
            .wait_for(|s| s.state == SessionState::Closed)
            .await;
    }
}

pub fn spawn(ctx: Arc<SessionContext>, peer_id: &str, generation: u64) -> SessionHandle {
    let (inbox, inbox_rx) = mpsc::unbounded_channel();
    let shutdown = Arc::new(Notify::new());
    let (status_tx, status) = watch::channel(SessionStatus {
        role: Role::Unresolved,
        state: SessionState::New,
    });
    let span = tracing::info_span!("session", peer = %peer_id, generation);
    tokio::spawn(
        run(
            ctx,
            peer_id.to_string(),
            generation,
            Mailbox {
                inbox: inbox_rx,
                shutdown: shutdown.clone(),
            },
            status_tx,
        )
        .instrument(span),
    );
    SessionHandle {
        peer_id: peer_id.to_string(),
        generation,
        started_at: Utc::now(),
        inbox,
        shutdown,
        status,
    }
}

struct Mailbox {
    inbox: mpsc::UnboundedReceiver<SessionInput>,
    shutdown: Arc<Notify>,
}

enum Timer {
    Negotiation,
    Grace,
}

enum Exit {
    Closed(CloseReason),
    Yielded(SignalingMessage),
}

async fn run(
    ctx: Arc<SessionContext>,
    peer_id: String,
    generation: u64,
    mut mailbox: Mailbox,
    status: watch::Sender<SessionStatus>,
) {
    let mut next_input: Option<SessionInput> = None;

    // проигранная коллизия offer заменяет сессию на месте,
    // inbox и запись в реестре переживают PeerSession
    let reason = loop {
        match run_session(&ctx, &peer_id, &mut mailbox, &status, next_input.take()).await {
            Exit::Closed(reason) => break reason,
            Exit::Yielded(offer) => {
                tracing::info!(reason = %CloseReason::Superseded, "replacing session to answer peer offer");
                next_input = Some(SessionInput::Signal(offer));
            }
        }
    };

    mailbox.inbox.close();
    status.send_modify(|current| current.state = SessionState::Closed);
    tracing::info!(reason = %reason, "session closed");
    let _ = ctx.events.send(PeerEvent::Closed {
        peer: peer_id.clone(),
        reason: reason.clone(),
    });
    let _ = ctx.exits.send(SessionExit {
        peer_id,
        generation,
        reason,
    });
}

async fn run_session(
    ctx: &SessionContext,
    peer_id: &str,
    mailbox: &mut Mailbox,
    status: &watch::Sender<SessionStatus>,
    first: Option<SessionInput>,
) -> Exit {
    let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();
    let engine = match ctx.engines.create(peer_id, engine_tx).await {
        Ok(engine) => engine,
        Err(err) => return Exit::Closed(engine_failure(err)),
    };
    let mut session = PeerSession::new(ctx.local_id.clone(), peer_id, engine, ctx.outbox.clone());
    publish(status, &session);

    let mut negotiation_deadline = ctx.negotiation_timeout.map(|t| Instant::now() + t);
    let mut grace_deadline: Option<Instant> = None;
    let mut pending = first;

    let exit = loop {
        let input = if let Some(input) = pending.take() {
            input
        } else {
            let timer = next_timer(negotiation_deadline, grace_deadline);
            tokio::select! {
                _ = mailbox.shutdown.notified() => break Exit::Closed(CloseReason::Local),
                input = mailbox.inbox.recv() => match input {
                    Some(input) => input,
                    None => break Exit::Closed(CloseReason::Local),
                },
                Some(event) = engine_rx.recv() => SessionInput::Engine(event),
                fired = wait_for(timer) => match fired {
                    Timer::Negotiation => {
                        tracing::warn!(state = %session.state(), "negotiation timed out");
                        break Exit::Closed(CloseReason::TimedOut);
                    }
                    Timer::Grace => {
                        tracing::warn!("peer did not reconnect within grace period");
                        break Exit::Closed(CloseReason::Failed("connection lost".into()));
                    }
                },
            }
        };

        let outcome = session.handle(input).await;
        publish(status, &session);
        match outcome {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Connected) => {
                negotiation_deadline = None;
                if grace_deadline.take().is_some() {
                    tracing::info!("connection recovered");
                }
                let _ = ctx.events.send(PeerEvent::Connected {
                    peer: peer_id.to_string(),
                });
            }
            Ok(Outcome::Disconnected) => {
                if grace_deadline.is_none() {
                    tracing::warn!(
                        grace_secs = ctx.disconnect_grace.as_secs(),
                        "connection interrupted; starting grace period"
                    );
                    grace_deadline = Some(Instant::now() + ctx.disconnect_grace);
                }
            }
            Ok(Outcome::ChannelOpen(label)) => {
                let _ = ctx.events.send(PeerEvent::ChannelOpen {
                    peer: peer_id.to_string(),
                    label,
                });
            }
            Ok(Outcome::Close(reason)) => break Exit::Closed(reason),
            Ok(Outcome::Yield(offer)) => break Exit::Yielded(offer),
            Err(err) => {
                tracing::warn!(error = %err, "session failed");
                break Exit::Closed(CloseReason::Failed(err.to_string()));
            }
        }
    };

    // CLOSED публикует вызывающий, если замены не будет
    session.close().await;
    exit
}

fn engine_failure(err: EngineError) -> CloseReason {
    tracing::warn!(error = %err, "transport engine unavailable");
    CloseReason::Failed(err.to_string())
}

fn publish(status: &watch::Sender<SessionStatus>, session: &PeerSession) {
    let next = SessionStatus {
        role: session.role(),
        state: session.state(),
    };
    status.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

fn next_timer(negotiation: Option<Instant>, grace: Option<Instant>) -> Option<(Instant, Timer)> {
    match (negotiation, grace) {
        (Some(n), Some(g)) if g < n => Some((g, Timer::Grace)),
        (Some(n), _) => Some((n, Timer::Negotiation)),
        (None, Some(g)) => Some((g, Timer::Grace)),
        (None, None) => None,
    }
}

async fn wait_for(timer: Option<(Instant, Timer)>) -> Timer {
    match timer {
        Some((at, kind)) => {
            sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}
