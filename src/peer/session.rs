use crate::identity::Identity;
use crate::logger::{analyze_candidates, log_candidate};
use crate::peer::candidates::CandidateBuffer;
use crate::peer::engine::{ConnectivityState, EngineError, EngineEvent, TransportEngine};
use crate::peer::types::{
    CloseReason, DescriptionSlot, NetworkCandidate, Role, SessionDescription,
    SessionState,
};
use crate::sdp;
use crate::signaling::message::SignalingMessage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Queue of messages waiting for the request channel.
pub type Outbox = mpsc::UnboundedSender<SignalingMessage>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport engine: {0}")]
    Engine(#[from] EngineError),
    #[error("{0} description already set")]
    DescriptionAlreadySet(DescriptionSlot),
    #[error("outbound signaling queue closed")]
    OutboxClosed,
}

#[derive(Debug)]
pub enum SessionInput {
    /// Local request to offer to the counterpart.
    Connect,
    Signal(SignalingMessage),
    Engine(EngineEvent),
}

/// What the session runner should do after an input was applied.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Continue,
    Connected,
    /// Connectivity dropped but may come back.
    Disconnected,
    ChannelOpen(String),
    Close(CloseReason),
    /// Lost offer arbitration: replace this session with an answering one
    /// and hand it the winning offer.
    Yield(SignalingMessage),
}

/// Negotiation state machine for exactly one counterpart.
pub struct PeerSession {
    local_id: Identity,
    peer_id: String,
    role: Role,
    state: SessionState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    /// Remote candidates received before the remote description.
    pending_candidates: CandidateBuffer,
    /// Local candidates the counterpart has not asked for yet.
    outgoing_candidates: CandidateBuffer,
    sharing_candidates: bool,
    gathered: Vec<NetworkCandidate>,
    engine: Arc<dyn TransportEngine>,
    outbox: Outbox,
}

impl PeerSession {
    pub fn new(
        local_id: Identity,
        peer_id: impl Into<String>,
        engine: Arc<dyn TransportEngine>,
        outbox: Outbox,
    ) -> Self {
        Self {
            local_id,
            peer_id: peer_id.into(),
            role: Role::Unresolved,
            state: SessionState::New,
            local_description: None,
            remote_description: None,
            pending_candidates: CandidateBuffer::new(),
            outgoing_candidates: CandidateBuffer::new(),
            sharing_candidates: false,
            gathered: Vec::new(),
            engine,
            outbox,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn pending_candidates(&self) -> &CandidateBuffer {
        &self.pending_candidates
    }

    pub async fn handle(&mut self, input: SessionInput) -> Result<Outcome, SessionError> {
        if self.state == SessionState::Closed {
            tracing::debug!(peer = %self.peer_id, ?input, "session closed; input ignored");
            return Ok(Outcome::Continue);
        }
        match input {
            SessionInput::Connect => self.start_offer().await,
            SessionInput::Signal(message) => self.on_signal(message).await,
            SessionInput::Engine(event) => self.on_engine(event).await,
        }
    }

    /// Moves to `CLOSED` and releases the transport engine. Repeated calls
    /// are no-ops; returns whether this call did the teardown.
    pub async fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.transition(SessionState::Closed);
        let dropped = self.pending_candidates.drain().len() + self.outgoing_candidates.drain().len();
        if dropped > 0 {
            tracing::debug!(peer = %self.peer_id, dropped, "discarding buffered candidates");
        }
        if let Err(err) = self.engine.close().await {
            tracing::warn!(peer = %self.peer_id, error = %err, "transport engine close failed");
        }
        true
    }

    async fn start_offer(&mut self) -> Result<Outcome, SessionError> {
        if self.state != SessionState::New {
            tracing::debug!(peer = %self.peer_id, state = %self.state, "connect ignored; negotiation already started");
            return Ok(Outcome::Continue);
        }
        self.role = Role::Offerer;
        self.transition(SessionState::OfferPending);

        let offer = self.engine.create_offer().await?;
        self.set_local(offer.clone()).await?;
        self.emit(SignalingMessage::offer(
            self.local_id.as_str(),
            &self.peer_id,
            offer,
        ))?;
        self.transition(SessionState::AwaitingAnswer);

        // offerer шлет кандидатов сразу после offer
        self.sharing_candidates = true;
        self.flush_outgoing()?;
        Ok(Outcome::Continue)
    }

    async fn on_signal(&mut self, message: SignalingMessage) -> Result<Outcome, SessionError> {
        tracing::debug!(
            peer = %self.peer_id,
            kind = %message.kind(),
            state = %self.state,
            "signal received"
        );
        match message {
            SignalingMessage::NewConnection(_) => {
                if self.state == SessionState::New {
                    self.start_offer().await
                } else {
                    self.reject_offer()?;
                    Ok(Outcome::Continue)
                }
            }
            SignalingMessage::Offer(payload) => match self.state {
                SessionState::New => self.accept_offer(payload.offer).await,
                state if state.is_offering() => {
                    if self.local_id.as_str() < self.peer_id.as_str() {
                        tracing::info!(peer = %self.peer_id, "offer collision; keeping offerer role");
                        self.reject_offer()?;
                        Ok(Outcome::Continue)
                    } else {
                        tracing::info!(peer = %self.peer_id, "offer collision; yielding offerer role");
                        Ok(Outcome::Yield(SignalingMessage::Offer(payload)))
                    }
                }
                _ => {
                    tracing::info!(peer = %self.peer_id, state = %self.state, "late offer rejected");
                    self.reject_offer()?;
                    Ok(Outcome::Continue)
                }
            },
            SignalingMessage::Answer(payload) => {
                if self.state != SessionState::AwaitingAnswer {
                    tracing::warn!(peer = %self.peer_id, state = %self.state, "unexpected answer ignored");
                    return Ok(Outcome::Continue);
                }
                self.set_remote(payload.answer).await?;
                self.transition(SessionState::NegotiatingIce);
                self.apply_pending().await?;
                self.emit(SignalingMessage::share_ice_candidate(
                    self.local_id.as_str(),
                    &self.peer_id,
                ))?;
                Ok(Outcome::Continue)
            }
            SignalingMessage::IceCandidate(payload) => {
                log_candidate("in", &self.peer_id, &payload.ice_candidate);
                if self.remote_description.is_some() {
                    self.engine.add_candidate(payload.ice_candidate).await?;
                } else {
                    self.pending_candidates.enqueue(payload.ice_candidate);
                    tracing::debug!(
                        peer = %self.peer_id,
                        buffered = self.pending_candidates.len(),
                        "remote description not set yet, queuing candidate"
                    );
                }
                Ok(Outcome::Continue)
            }
            SignalingMessage::NoOffer(_) => {
                if self.state.is_offering() {
                    Ok(Outcome::Close(CloseReason::Rejected))
                } else {
                    Ok(Outcome::Continue)
                }
            }
            SignalingMessage::ShareIceCandidate(_) => {
                self.sharing_candidates = true;
                self.flush_outgoing()?;
                Ok(Outcome::Continue)
            }
        }
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<Outcome, SessionError> {
        self.role = Role::Answerer;
        self.set_remote(offer).await?;
        self.transition(SessionState::NegotiatingIce);
        self.apply_pending().await?;

        let answer = self.engine.create_answer().await?;
        self.set_local(answer.clone()).await?;
        self.emit(SignalingMessage::answer(
            self.local_id.as_str(),
            &self.peer_id,
            answer,
        ))?;
        Ok(Outcome::Continue)
    }

    async fn on_engine(&mut self, event: EngineEvent) -> Result<Outcome, SessionError> {
        match event {
            EngineEvent::CandidateDiscovered(candidate) => {
                self.gathered.push(candidate.clone());
                if self.sharing_candidates {
                    self.send_candidate(candidate)?;
                } else {
                    self.outgoing_candidates.enqueue(candidate);
                }
                Ok(Outcome::Continue)
            }
            EngineEvent::GatheringComplete => {
                analyze_candidates(&self.peer_id, &self.gathered);
                Ok(Outcome::Continue)
            }
            EngineEvent::StateChanged(state) => Ok(self.on_connectivity(state)),
            EngineEvent::ChannelOpen(label) => Ok(Outcome::ChannelOpen(label)),
            EngineEvent::ChannelClosed(label) => {
                tracing::debug!(peer = %self.peer_id, label = %label, "data channel closed");
                Ok(Outcome::Continue)
            }
        }
    }

    fn on_connectivity(&mut self, state: ConnectivityState) -> Outcome {
        tracing::debug!(peer = %self.peer_id, ?state, session = %self.state, "connectivity changed");
        match (state, self.state) {
            (ConnectivityState::Connected, SessionState::NegotiatingIce) => {
                self.transition(SessionState::Connected);
                Outcome::Connected
            }
            // восстановились в пределах grace period
            (ConnectivityState::Connected, SessionState::Connected) => Outcome::Connected,
            (ConnectivityState::Disconnected, SessionState::Connected)
            | (ConnectivityState::Disconnected, SessionState::NegotiatingIce) => {
                Outcome::Disconnected
            }
            (ConnectivityState::Failed, _) => {
                Outcome::Close(CloseReason::Failed("connectivity failed".into()))
            }
            (ConnectivityState::Closed, _) => {
                Outcome::Close(CloseReason::Failed("transport closed".into()))
            }
            _ => Outcome::Continue,
        }
    }

    async fn set_local(&mut self, desc: SessionDescription) -> Result<(), SessionError> {
        if self.local_description.is_some() {
            return Err(SessionError::DescriptionAlreadySet(DescriptionSlot::Local));
        }
        self.engine.set_local_description(desc.clone()).await?;
        self.local_description = Some(desc);
        Ok(())
    }

    async fn set_remote(&mut self, desc: SessionDescription) -> Result<(), SessionError> {
        if self.remote_description.is_some() {
            return Err(SessionError::DescriptionAlreadySet(DescriptionSlot::Remote));
        }
        let desc = SessionDescription {
            kind: desc.kind,
            sdp: sdp::desanitize(&desc.sdp),
        };
        self.engine.set_remote_description(desc.clone()).await?;
        self.remote_description = Some(desc);
        Ok(())
    }

    async fn apply_pending(&mut self) -> Result<(), SessionError> {
        for candidate in self.pending_candidates.drain() {
            tracing::debug!(peer = %self.peer_id, candidate = %candidate.candidate, "applying pending candidate");
            self.engine.add_candidate(candidate).await?;
        }
        Ok(())
    }

    fn flush_outgoing(&mut self) -> Result<(), SessionError> {
        for candidate in self.outgoing_candidates.drain() {
            self.send_candidate(candidate)?;
        }
        Ok(())
    }

    fn send_candidate(&self, candidate: NetworkCandidate) -> Result<(), SessionError> {
        log_candidate("out", &self.peer_id, &candidate);
        self.emit(SignalingMessage::ice_candidate(
            self.local_id.as_str(),
            &self.peer_id,
            candidate,
        ))
    }

    fn reject_offer(&self) -> Result<(), SessionError> {
        self.emit(SignalingMessage::no_offer(self.local_id.as_str(), &self.peer_id))
    }

    fn emit(&self, message: SignalingMessage) -> Result<(), SessionError> {
        self.outbox
            .send(message)
            .map_err(|_| SessionError::OutboxClosed)
    }

    fn transition(&mut self, next: SessionState) {
        tracing::info!(peer = %self.peer_id, from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}
