use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::peer::media::LocalTrack;
use crate::peer::types::{ConnectionState, IceCandidate, RemoteTrack, SessionDescription};
use crate::session::SessionId;

/// The media transport a session negotiates. One instance per session.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Creates a fresh transport for a session. Callbacks of the transport are
/// reported on `events`, tagged with `session`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    type Transport: PeerTransport + 'static;

    async fn create(
        &self,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self::Transport>;
}

#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub session: SessionId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone)]
pub enum TransportEventKind {
    LocalCandidate(IceCandidate),
    GatheringComplete,
    ConnectionState(ConnectionState),
    IceState(String),
    SignalingState(String),
    RemoteTrack(RemoteTrack),
}

impl TransportEvent {
    pub fn new(session: SessionId, kind: TransportEventKind) -> Self {
        Self { session, kind }
    }
}
