//! Relay message contract.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::{Anomaly, Result};
use crate::peer::types::{IceCandidate, SessionDescription, SignalMessage, SignalPayload};

/// Client to relay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    GenerateCode,
    JoinCode { code: String },
    Signal(OutboundSignal),
}

/// Relay to client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayMessage {
    ConnectionSuccess { sid: String },
    CodeGenerated { code: String },
    /// We joined someone's code; we make the offer.
    CodeAccepted { peer_sid: String },
    /// Someone joined our code; we answer.
    PeerJoined { peer_sid: String },
    Signal(InboundSignal),
    ErrorMessage { message: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OutboundSignal {
    pub target_sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
}

/// A signal as forwarded by the relay, stamped with the sender.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InboundSignal {
    pub sender_sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<IceCandidate>,
}

impl ClientMessage {
    pub fn signal(msg: SignalMessage) -> Self {
        let (description, candidate) = match msg.payload {
            SignalPayload::Description(d) => (Some(d), None),
            SignalPayload::Candidate(c) => (None, Some(c)),
        };
        ClientMessage::Signal(OutboundSignal {
            target_sid: msg.peer,
            description,
            candidate,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl RelayMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl OutboundSignal {
    /// What the relay forwards to `target_sid` when `sender` sent this.
    pub fn forwarded_from(self, sender: &str) -> InboundSignal {
        InboundSignal {
            sender_sid: sender.to_string(),
            target_sid: Some(self.target_sid),
            description: self.description,
            candidate: self.candidate,
        }
    }
}

impl InboundSignal {
    /// A description wins over a candidate when both are present.
    pub fn into_message(self) -> std::result::Result<SignalMessage, Anomaly> {
        match (self.description, self.candidate) {
            (Some(desc), _) => Ok(SignalMessage::description(self.sender_sid, desc)),
            (None, Some(candidate)) => Ok(SignalMessage::candidate(self.sender_sid, candidate)),
            (None, None) => Err(Anomaly::EmptySignal),
        }
    }
}
