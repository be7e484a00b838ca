use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::peer::transport::PeerTransport;
use crate::peer::types::IceCandidate;

/// Remote candidates received before a remote description was accepted.
///
/// Scoped to one session; FIFO so candidates reach the transport in the order
/// the relay delivered them.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.pending.push_back(candidate);
        debug!(queued = self.pending.len(), "candidate buffered until remote description");
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.pending.drain(..).collect()
    }
}

/// Apply one remote candidate. Failures are logged: a candidate is a hint.
pub async fn apply_candidate<T: PeerTransport + ?Sized>(transport: &T, candidate: IceCandidate) -> bool {
    match transport.add_ice_candidate(candidate).await {
        Ok(()) => {
            debug!("ICE candidate added");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to add ICE candidate");
            false
        }
    }
}

/// Flush the buffer into the transport in arrival order.
pub async fn apply_pending_candidates<T: PeerTransport + ?Sized>(
    transport: &T,
    buffer: &mut CandidateBuffer,
) -> usize {
    let candidates = buffer.drain();
    let total = candidates.len();
    for candidate in candidates {
        debug!(candidate = %candidate.candidate, "applying pending candidate");
        apply_candidate(transport, candidate).await;
    }
    total
}

/// Host / srflx / relay counts of a candidate list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMix {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates<'a>(candidates: impl IntoIterator<Item = &'a IceCandidate>) -> CandidateMix {
    let mut mix = CandidateMix::default();
    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            mix.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            mix.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            mix.relay += 1;
        }
    }
    mix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(n: u32) -> IceCandidate {
        IceCandidate::new(format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"))
    }

    #[test]
    fn drain_preserves_arrival_order_and_empties() {
        let mut buffer = CandidateBuffer::new();
        for n in 1..=4 {
            buffer.push(c(n));
        }
        assert_eq!(buffer.len(), 4);
        let drained = buffer.drain();
        assert_eq!(drained, vec![c(1), c(2), c(3), c(4)]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let mut buffer = CandidateBuffer::new();
        buffer.push(c(1));
        buffer.push(c(1));
        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let mut buffer = CandidateBuffer::new();
        buffer.push(c(1));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn mix_counts_types() {
        let list = vec![
            c(1),
            IceCandidate::new("candidate:2 1 udp 1686052607 1.2.3.4 5000 typ srflx raddr 0.0.0.0 rport 0"),
            IceCandidate::new("candidate:3 1 udp 41885439 5.6.7.8 3478 typ relay raddr 1.2.3.4 rport 5000"),
            IceCandidate::new("garbage"),
        ];
        assert_eq!(
            analyze_candidates(&list),
            CandidateMix {
                host: 1,
                srflx: 1,
                relay: 1
            }
        );
    }
}
