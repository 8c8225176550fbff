use crate::config::LogConfig;
use crate::peer::types::NetworkCandidate;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured directive. Calling this again, or
/// after the host application installed its own subscriber, does nothing.
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive.as_str()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Логирует один кандидат.
pub fn log_candidate(direction: &str, peer: &str, candidate: &NetworkCandidate) {
    tracing::debug!(
        peer = %peer,
        direction,
        candidate = %candidate.candidate,
        sdp_mid = ?candidate.sdp_mid,
        sdp_mline_index = ?candidate.sdp_mline_index,
        "trickle candidate"
    );
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

/// Считает кандидаты по типам и предупреждает, если нет relay.
pub fn analyze_candidates<'a>(
    peer: &str,
    candidates: impl IntoIterator<Item = &'a NetworkCandidate>,
) -> CandidateSummary {
    let mut summary = CandidateSummary::default();
    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            summary.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            summary.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            summary.relay += 1;
        }
    }

    tracing::info!(
        peer = %peer,
        host = summary.host,
        srflx = summary.srflx,
        relay = summary.relay,
        "candidate gathering complete"
    );
    if summary.relay == 0 {
        tracing::warn!(peer = %peer, "no TURN relay candidates; connection through NAT may fail");
    }
    summary
}
