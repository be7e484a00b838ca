//! Negotiation state machine as pure functions of (state, input).
//!
//! The [`Negotiator`](crate::peer::negotiator::Negotiator) performs the side
//! effects; everything here is deterministic and free of I/O.

use std::fmt;

use crate::error::Anomaly;
use crate::peer::types::{SdpKind, SignalPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    /// Initiator sent its offer and waits for the answer.
    HaveLocalOffer,
    /// Responder applied the offer and is producing its answer.
    HaveRemoteOffer,
    Stable,
    Closed,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed)
    }

    /// Transition for a completed step, `None` when the step is not legal here.
    pub fn next(self, event: StateEvent) -> Option<NegotiationState> {
        use NegotiationState::*;
        match (self, event) {
            (s, StateEvent::TransportFailed) if !s.is_terminal() => Some(Failed),
            (s, StateEvent::Closed) if s != Closed => Some(Closed),
            (Idle, StateEvent::LocalOfferSent) => Some(HaveLocalOffer),
            (Idle, StateEvent::RemoteOfferApplied) => Some(HaveRemoteOffer),
            (HaveRemoteOffer, StateEvent::LocalAnswerSent) => Some(Stable),
            (HaveLocalOffer, StateEvent::RemoteAnswerApplied) => Some(Stable),
            _ => None,
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Stable => "stable",
            NegotiationState::Closed => "closed",
            NegotiationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    LocalOfferSent,
    RemoteOfferApplied,
    LocalAnswerSent,
    RemoteAnswerApplied,
    TransportFailed,
    Closed,
}

/// What to do with an inbound signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Apply the offer, answer it, then flush buffered candidates.
    AnswerOffer,
    /// Apply the answer, then flush buffered candidates.
    AcceptAnswer,
    ApplyCandidate,
    BufferCandidate,
    Ignore(Anomaly),
}

/// Decide how an inbound signal is handled.
///
/// Answers are first-accepted-wins: only a session still waiting on its
/// offer takes one, anything later is a duplicate. An idle session has
/// nothing to answer, so an answer there is dropped the same way.
pub fn decide(state: NegotiationState, has_remote_description: bool, payload: &SignalPayload) -> Step {
    match payload {
        SignalPayload::Description(desc) => match (desc.kind, state) {
            (SdpKind::Offer, NegotiationState::Idle) => Step::AnswerOffer,
            (SdpKind::Offer, _) => Step::Ignore(Anomaly::UnexpectedOffer),
            (SdpKind::Answer, NegotiationState::HaveLocalOffer) => Step::AcceptAnswer,
            (SdpKind::Answer, _) => Step::Ignore(Anomaly::DuplicateAnswer),
        },
        SignalPayload::Candidate(_) if state.is_terminal() => Step::Ignore(Anomaly::NoActiveSession),
        SignalPayload::Candidate(_) if has_remote_description => Step::ApplyCandidate,
        SignalPayload::Candidate(_) => Step::BufferCandidate,
    }
}
