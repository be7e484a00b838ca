use std::fmt;

use tracing::{debug, info, warn};

use crate::peer::ice::CandidateBuffer;
use crate::peer::state::{NegotiationState, StateEvent};
use crate::peer::transport::PeerTransport;
use crate::peer::types::IceCandidate;
use crate::session::{Session, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Hang-up requested by the user.
    UserAction,
    /// Endpoint or process shutting down.
    Shutdown,
    TransportFailed,
    MediaDenied,
    NegotiationError,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeardownReason::UserAction => "user action",
            TeardownReason::Shutdown => "shutdown",
            TeardownReason::TransportFailed => "transport failed",
            TeardownReason::MediaDenied => "media denied",
            TeardownReason::NegotiationError => "negotiation error",
        };
        f.write_str(s)
    }
}

/// Resources whose lifetime is one session.
pub struct SessionResources<T> {
    pub transport: Option<T>,
    pub pending: CandidateBuffer,
    pub local_candidates: Vec<IceCandidate>,
}

impl<T> Default for SessionResources<T> {
    fn default() -> Self {
        Self {
            transport: None,
            pending: CandidateBuffer::new(),
            local_candidates: Vec::new(),
        }
    }
}

/// What a teardown released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub session: SessionId,
    pub reason: TeardownReason,
    /// State the session was in when torn down.
    pub last_state: NegotiationState,
    pub tracks_released: usize,
    pub transport_closed: bool,
    pub candidates_dropped: usize,
}

/// Release everything a session holds: stop tracks, close the transport,
/// drop stream references and buffered candidates. The session ends `Closed`.
pub async fn release<T: PeerTransport>(
    session: &mut Session,
    mut resources: SessionResources<T>,
    reason: TeardownReason,
) -> TeardownReport {
    let last_state = session.state;

    let tracks_released = session.outbound_tracks.len();
    for track in session.outbound_tracks.drain(..) {
        track.stop();
    }

    let transport_closed = match resources.transport.take() {
        Some(transport) => {
            if let Err(e) = transport.close().await {
                warn!(session = %session.id, error = %e, "closing transport failed");
            }
            true
        }
        None => false,
    };

    session.inbound = None;
    let candidates_dropped = resources.pending.len();
    resources.pending.clear();
    resources.local_candidates.clear();

    if let Some(next) = session.state.next(StateEvent::Closed) {
        session.state = next;
    }

    info!(
        session = %session.id,
        %reason,
        %last_state,
        tracks_released,
        transport_closed,
        "session torn down"
    );
    if candidates_dropped > 0 {
        debug!(candidates_dropped, "discarded buffered candidates");
    }

    TeardownReport {
        session: session.id.clone(),
        reason,
        last_state,
        tracks_released,
        transport_closed,
        candidates_dropped,
    }
}
