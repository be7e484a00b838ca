//! Drives one session's offer/answer exchange.
//!
//! Decisions come from [`state::decide`](crate::peer::state::decide); this
//! type performs them against the media source, the transport and the relay,
//! one event at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Anomaly, Error, Result};
use crate::lifecycle::{release, SessionResources, TeardownReason, TeardownReport};
use crate::monitor::StatusBus;
use crate::peer::ice::{analyze_candidates, apply_candidate, apply_pending_candidates};
use crate::peer::media::{LocalTrack, MediaSource};
use crate::peer::state::{decide, StateEvent, Step};
use crate::peer::transport::{PeerTransport, TransportEvent, TransportEventKind, TransportFactory};
use crate::peer::types::{
    ConnectionState, IceCandidate, RemoteStream, RemoteTrack, SessionDescription, SignalMessage,
    SignalPayload,
};
use crate::session::{Role, Session, SessionId};
use crate::signaling::{ClientMessage, SignalSink};

struct ActiveSession<T> {
    session: Session,
    resources: SessionResources<T>,
}

pub struct Negotiator<F: TransportFactory, M, S> {
    factory: F,
    media: M,
    sink: S,
    events: mpsc::UnboundedSender<TransportEvent>,
    status: StatusBus,
    active: Option<ActiveSession<F::Transport>>,
}

fn advance(session: &mut Session, event: StateEvent) {
    match session.state.next(event) {
        Some(next) => {
            debug!(session = %session.id, from = %session.state, to = %next, "negotiation state");
            session.state = next;
        }
        None => warn!(session = %session.id, state = %session.state, ?event, "illegal transition skipped"),
    }
}

impl<F, M, S> Negotiator<F, M, S>
where
    F: TransportFactory,
    M: MediaSource,
    S: SignalSink,
{
    pub fn new(
        factory: F,
        media: M,
        sink: S,
        events: mpsc::UnboundedSender<TransportEvent>,
        status: StatusBus,
    ) -> Self {
        Self {
            factory,
            media,
            sink,
            events,
            status,
            active: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn is_current(&self, id: &SessionId) -> bool {
        self.session().map(|s| &s.id == id).unwrap_or(false)
    }

    pub fn pending_candidates(&self) -> usize {
        self.active
            .as_ref()
            .map(|a| a.resources.pending.len())
            .unwrap_or(0)
    }

    /// Begin a session for an assigned role. Ignored while one is active.
    pub async fn start(&mut self, role: Role, peer: String) -> Result<()> {
        if let Some(active) = &self.active {
            warn!(
                current = %active.session.id,
                current_peer = %active.session.remote_peer,
                %peer,
                "role assigned while a session is active, ignoring"
            );
            return Ok(());
        }

        let session = Session::new(role, peer);
        info!(session = %session.id, %role, peer = %session.remote_peer, "session created");
        self.active = Some(ActiveSession {
            session,
            resources: SessionResources::default(),
        });

        if role == Role::Initiator {
            if let Err(e) = self.send_offer().await {
                return Err(self.abort(e).await);
            }
        }
        Ok(())
    }

    async fn send_offer(&mut self) -> Result<()> {
        self.prepare_media().await?;

        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let Some(transport) = active.resources.transport.as_ref() else {
            return Err(Error::Negotiation("no transport after media setup".into()));
        };

        self.status.info("Creating connection offer...");
        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        active.session.local_description = Some(offer.clone());

        self.sink.send(ClientMessage::signal(SignalMessage::description(
            active.session.remote_peer.clone(),
            offer,
        )))?;
        info!(session = %active.session.id, peer = %active.session.remote_peer, "offer sent");
        advance(&mut active.session, StateEvent::LocalOfferSent);
        Ok(())
    }

    /// Acquire tracks, create the session's transport and attach the tracks.
    /// A session that already has a transport keeps it, and tracks recorded
    /// by an earlier attempt are reused.
    async fn prepare_media(&mut self) -> Result<()> {
        let held = match self.active.as_ref() {
            Some(active) if active.resources.transport.is_some() => {
                debug!(session = %active.session.id, "transport already prepared");
                return Ok(());
            }
            Some(active) => active.session.outbound_tracks.clone(),
            None => return Ok(()),
        };

        let tracks = if held.is_empty() {
            let tracks = self.media.acquire().await?;
            self.status.info("Camera and microphone accessed");
            tracks
        } else {
            held
        };

        let Some(active) = self.active.as_mut() else {
            for track in &tracks {
                track.stop();
            }
            return Ok(());
        };
        // Recorded first so teardown releases them even if the transport fails.
        active.session.outbound_tracks = tracks.clone();

        let transport = self
            .factory
            .create(active.session.id.clone(), self.events.clone())
            .await?;
        for track in tracks {
            if let Err(e) = attach_track(&transport, track).await {
                if let Err(close_err) = transport.close().await {
                    warn!(error = %close_err, "closing half-built transport failed");
                }
                return Err(e);
            }
        }
        active.resources.transport = Some(transport);
        Ok(())
    }

    /// Handle a relayed description or candidate.
    pub async fn handle_signal(&mut self, msg: SignalMessage) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            warn!(anomaly = %Anomaly::NoActiveSession, peer = %msg.peer, "signal dropped");
            return Ok(());
        };
        if msg.peer != active.session.remote_peer {
            warn!(anomaly = %Anomaly::UnknownPeer(msg.peer.clone()), "signal dropped");
            return Ok(());
        }

        let step = decide(
            active.session.state,
            active.session.has_remote_description(),
            &msg.payload,
        );
        match (step, msg.payload) {
            (Step::Ignore(anomaly), _) => {
                warn!(session = %active.session.id, state = %active.session.state, %anomaly, "signal ignored");
                Ok(())
            }
            (Step::BufferCandidate, SignalPayload::Candidate(candidate)) => {
                debug!(session = %active.session.id, "candidate before remote description, storing");
                active.resources.pending.push(candidate);
                Ok(())
            }
            (Step::ApplyCandidate, SignalPayload::Candidate(candidate)) => {
                // A remote description is only ever set through the transport.
                if let Some(transport) = active.resources.transport.as_ref() {
                    apply_candidate(transport, candidate).await;
                }
                Ok(())
            }
            (Step::AnswerOffer, SignalPayload::Description(offer)) => {
                let result = self.answer_offer(offer).await;
                self.report_signal_error(result).await
            }
            (Step::AcceptAnswer, SignalPayload::Description(answer)) => {
                let result = self.accept_answer(answer).await;
                self.report_signal_error(result).await
            }
            (step, payload) => {
                warn!(?step, ?payload, "step does not match payload");
                Ok(())
            }
        }
    }

    async fn answer_offer(&mut self, offer: SessionDescription) -> Result<()> {
        self.prepare_media().await?;

        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let Some(transport) = active.resources.transport.as_ref() else {
            return Err(Error::Negotiation("no transport after media setup".into()));
        };

        transport.set_remote_description(offer.clone()).await?;
        active.session.remote_description = Some(offer);
        advance(&mut active.session, StateEvent::RemoteOfferApplied);
        debug!(session = %active.session.id, "remote description set (offer)");

        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        active.session.local_description = Some(answer.clone());
        self.sink.send(ClientMessage::signal(SignalMessage::description(
            active.session.remote_peer.clone(),
            answer,
        )))?;
        info!(session = %active.session.id, peer = %active.session.remote_peer, "answer sent");
        advance(&mut active.session, StateEvent::LocalAnswerSent);

        let flushed = apply_pending_candidates(transport, &mut active.resources.pending).await;
        if flushed > 0 {
            debug!(flushed, "pending candidates applied");
        }
        Ok(())
    }

    async fn accept_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let Some(transport) = active.resources.transport.as_ref() else {
            warn!(anomaly = %Anomaly::MissingTransport, "answer dropped");
            return Ok(());
        };

        transport.set_remote_description(answer.clone()).await?;
        active.session.remote_description = Some(answer);
        advance(&mut active.session, StateEvent::RemoteAnswerApplied);
        debug!(session = %active.session.id, "remote description set (answer)");

        let flushed = apply_pending_candidates(transport, &mut active.resources.pending).await;
        if flushed > 0 {
            debug!(flushed, "pending candidates applied");
        }
        Ok(())
    }

    /// Media refusal ends the session, as does any failure once a remote
    /// description is in place. Earlier failures are reported and the session
    /// waits for another offer or answer.
    async fn report_signal_error(&mut self, result: Result<()>) -> Result<()> {
        let committed = self
            .session()
            .map(Session::has_remote_description)
            .unwrap_or(false);
        match result {
            Ok(()) => Ok(()),
            Err(e @ Error::MediaAccess(_)) => Err(self.abort(e).await),
            Err(e) if committed => Err(self.abort(e).await),
            Err(e) => {
                warn!(error = %e, "error handling signaling data");
                self.status.error("Connection error occurred");
                Err(e)
            }
        }
    }

    /// Report a session-ending error, tear the session down, hand the error back.
    async fn abort(&mut self, e: Error) -> Error {
        let reason = match &e {
            Error::MediaAccess(_) => {
                self.status.error("Please allow camera and microphone access");
                TeardownReason::MediaDenied
            }
            _ => {
                self.status.error("Failed to start video call");
                TeardownReason::NegotiationError
            }
        };
        warn!(error = %e, %reason, "session aborted");
        self.cleanup(reason).await;
        e
    }

    /// Handle a callback from the session's transport.
    pub async fn on_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            debug!(anomaly = %Anomaly::StaleTransportEvent(event.session.clone()), "event dropped");
            return Ok(());
        };
        if active.session.id != event.session {
            debug!(anomaly = %Anomaly::StaleTransportEvent(event.session.clone()), "event dropped");
            return Ok(());
        }

        match event.kind {
            TransportEventKind::LocalCandidate(candidate) => {
                self.send_local_candidate(candidate)?;
            }
            TransportEventKind::GatheringComplete => {
                let mix = analyze_candidates(&active.resources.local_candidates);
                info!(host = mix.host, srflx = mix.srflx, relay = mix.relay, "ICE gathering complete");
                if mix.relay == 0 {
                    warn!("no relay candidates gathered, connection through NAT may fail");
                }
            }
            TransportEventKind::ConnectionState(ConnectionState::Failed) => {
                let id = active.session.id.clone();
                advance(&mut active.session, StateEvent::TransportFailed);
                self.cleanup(TeardownReason::TransportFailed).await;
                return Err(Error::TransportFailure(id));
            }
            TransportEventKind::ConnectionState(state) => {
                debug!(session = %active.session.id, %state, "transport state");
            }
            TransportEventKind::RemoteTrack(track) => {
                self.attach_remote_track(track);
            }
            TransportEventKind::IceState(_) | TransportEventKind::SignalingState(_) => {}
        }
        Ok(())
    }

    fn send_local_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        debug!(candidate = %candidate.candidate, "sending ICE candidate");
        active.resources.local_candidates.push(candidate.clone());
        self.sink.send(ClientMessage::signal(SignalMessage::candidate(
            active.session.remote_peer.clone(),
            candidate,
        )))
    }

    fn attach_remote_track(&mut self, track: RemoteTrack) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active.session.inbound.as_mut() {
            Some(stream) if stream.id == track.stream_id => {
                debug!(track = %track.track_id, "additional remote track");
                stream.tracks.push(track);
            }
            _ => {
                info!(stream = %track.stream_id, "received remote stream");
                active.session.inbound = Some(RemoteStream {
                    id: track.stream_id.clone(),
                    tracks: vec![track],
                });
                self.status.info("Connected to peer");
            }
        }
    }

    /// Tear down the active session, if any.
    pub async fn cleanup(&mut self, reason: TeardownReason) -> Option<TeardownReport> {
        let Some(mut active) = self.active.take() else {
            debug!(%reason, "cleanup with no active session");
            return None;
        };
        Some(release(&mut active.session, active.resources, reason).await)
    }
}

async fn attach_track<T: PeerTransport>(transport: &T, track: Arc<LocalTrack>) -> Result<()> {
    debug!(track = track.id(), kind = ?track.kind(), "adding local track");
    transport.add_track(track).await
}
