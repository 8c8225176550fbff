use crate::config::IceServerConfig;
use crate::peer::data_channel::attach_dc;
use crate::peer::engine::{
    ConnectivityState, EngineError, EngineEvent, EngineEvents, EngineFactory, TransportEngine,
};
use crate::peer::types::{NetworkCandidate, SdpType, SessionDescription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::{
    api::APIBuilder,
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

pub const DATA_CHANNEL_LABEL: &str = "ssc-data";

/// Transport engine поверх `webrtc` peer connection.
pub struct WebRtcEngine {
    peer_id: String,
    pc: Arc<RTCPeerConnection>,
    channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    events: EngineEvents,
}

impl WebRtcEngine {
    pub async fn new(
        peer_id: &str,
        ice_servers: &[IceServerConfig],
        events: EngineEvents,
    ) -> Result<Self, EngineError> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);
        let channel = Arc::new(Mutex::new(None));

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let event = match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => Some(EngineEvent::CandidateDiscovered(from_init(init))),
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize local candidate");
                        None
                    }
                },
                // None означает конец сбора
                None => Some(EngineEvent::GatheringComplete),
            };
            if let Some(event) = event {
                let _ = candidate_tx.send(event);
            }
            Box::pin(async {})
        }));

        let gathering_peer = peer_id.to_string();
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            tracing::trace!(peer = %gathering_peer, ?state, "ice gathering state changed");
            Box::pin(async {})
        }));

        let state_tx = events.clone();
        let state_peer = peer_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::debug!(peer = %state_peer, state = ?st, "peer connection state changed");
            let mapped = match st {
                RTCPeerConnectionState::New | RTCPeerConnectionState::Connecting => {
                    Some(ConnectivityState::Connecting)
                }
                RTCPeerConnectionState::Connected => Some(ConnectivityState::Connected),
                RTCPeerConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
                RTCPeerConnectionState::Failed => Some(ConnectivityState::Failed),
                RTCPeerConnectionState::Closed => Some(ConnectivityState::Closed),
                _ => None,
            };
            if let Some(state) = mapped {
                let _ = state_tx.send(EngineEvent::StateChanged(state));
            }
            Box::pin(async {})
        }));

        // отвечающая сторона берет канал, открытый offerer'ом
        let remote_channel = channel.clone();
        let dc_tx = events.clone();
        let dc_peer = peer_id.to_string();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            attach_dc(&dc, &dc_peer, dc_tx.clone());
            *remote_channel.lock() = Some(dc);
            Box::pin(async {})
        }));

        Ok(Self {
            peer_id: peer_id.to_string(),
            pc,
            channel,
            events,
        })
    }

    async fn ensure_data_channel(&self) -> Result<(), EngineError> {
        if self.channel.lock().is_some() {
            return Ok(());
        }
        let dc = self
            .pc
            .create_data_channel(DATA_CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(&dc, &self.peer_id, self.events.clone());
        *self.channel.lock() = Some(dc);
        Ok(())
    }
}

#[async_trait]
impl TransportEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        // без data channel в offer не будет секции m=application
        self.ensure_data_channel().await?;
        let offer = self.pc.create_offer(None).await?;
        to_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self.pc.create_answer(None).await?;
        to_description(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_candidate(&self, candidate: NetworkCandidate) -> Result<(), EngineError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        let dc = self.channel.lock().take();
        if let Some(dc) = dc {
            let _ = dc.close().await;
        }
        self.pc.close().await?;
        Ok(())
    }
}

/// Создает по одному [`WebRtcEngine`] на сессию из настроенных ICE серверов.
pub struct WebRtcEngineFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl WebRtcEngineFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(
        &self,
        peer_id: &str,
        events: EngineEvents,
    ) -> Result<Arc<dyn TransportEngine>, EngineError> {
        let engine = WebRtcEngine::new(peer_id, &self.ice_servers, events).await?;
        Ok(Arc::new(engine))
    }
}

fn rtc_config(servers: &[IceServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: rtc_ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn rtc_ice_servers(servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![config.normalized_url()],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn from_init(init: RTCIceCandidateInit) -> NetworkCandidate {
    NetworkCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_description(desc: RTCSessionDescription) -> Result<SessionDescription, EngineError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        other => {
            return Err(EngineError::Unsupported(format!(
                "session description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let rtc = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}
