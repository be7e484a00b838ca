use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::peer::media::LocalTrack;
use crate::peer::state::NegotiationState;
use crate::peer::types::{RemoteStream, SessionDescription};
use crate::utils::random_id;

/// Identity of one pairing's negotiation; transport events carry it so that
/// callbacks from a torn-down peer connection can be recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(random_id())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Joined someone else's code; sends the offer.
    Initiator,
    /// Generated the code; answers.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// One successful pairing. Fields are only written by the negotiator.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) role: Role,
    pub(crate) remote_peer: String,
    pub(crate) state: NegotiationState,
    pub(crate) local_description: Option<SessionDescription>,
    pub(crate) remote_description: Option<SessionDescription>,
    pub(crate) outbound_tracks: Vec<Arc<LocalTrack>>,
    pub(crate) inbound: Option<RemoteStream>,
}

impl Session {
    pub(crate) fn new(role: Role, remote_peer: String) -> Self {
        Self {
            id: SessionId::generate(),
            role,
            remote_peer,
            state: NegotiationState::Idle,
            local_description: None,
            remote_description: None,
            outbound_tracks: Vec::new(),
            inbound: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn remote_peer(&self) -> &str {
        &self.remote_peer
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn outbound_tracks(&self) -> &[Arc<LocalTrack>] {
        &self.outbound_tracks
    }

    pub fn inbound(&self) -> Option<&RemoteStream> {
        self.inbound.as_ref()
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description.is_some()
    }
}
