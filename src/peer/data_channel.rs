use crate::peer::engine::{EngineEvent, EngineEvents};
use std::sync::Arc;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// общий обработчик data-channel: события жизненного цикла идут в очередь сессии
pub fn attach_dc(dc: &Arc<RTCDataChannel>, peer_id: &str, events: EngineEvents) {
    let label = dc.label().to_string();
    tracing::debug!(peer = %peer_id, label = %label, "attaching data channel");

    dc.on_open(Box::new({
        let events = events.clone();
        let label = label.clone();
        move || {
            let _ = events.send(EngineEvent::ChannelOpen(label));
            Box::pin(async {})
        }
    }));

    let peer = peer_id.to_string();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        tracing::trace!(peer = %peer, len = msg.data.len(), "data channel message");
        Box::pin(async {})
    }));

    dc.on_close(Box::new(move || {
        let _ = events.send(EngineEvent::ChannelClosed(label.clone()));
        Box::pin(async {})
    }));
}
