use tracing::{debug, info, warn};

use crate::error::{PairingError, Result};
use crate::session::Role;
use crate::signaling::{ClientMessage, RelayMessage, SignalSink};

/// Outcome of a relay response, as far as pairing is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// The relay told us our own participant id.
    Registered { sid: String },
    CodeAllocated(String),
    RoleAssigned { role: Role, peer: String },
    Failed(PairingError),
}

/// Requests and joins pairing codes, and turns relay answers into roles.
pub struct PairingClient<S> {
    sink: S,
    local_sid: Option<String>,
    code: Option<String>,
}

impl<S: SignalSink> PairingClient<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            local_sid: None,
            code: None,
        }
    }

    pub fn local_sid(&self) -> Option<&str> {
        self.local_sid.as_deref()
    }

    /// Code most recently allocated to us, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn request_code(&mut self) -> Result<()> {
        debug!("requesting new code from relay");
        self.sink.send(ClientMessage::GenerateCode)
    }

    /// Join someone else's code. Blank input never reaches the relay.
    pub fn join_code(&mut self, code: &str) -> Result<()> {
        let code = code.trim();
        if code.is_empty() {
            warn!("join attempted without a code");
            return Err(PairingError::EmptyCode.into());
        }
        info!(code, "joining code");
        self.sink.send(ClientMessage::JoinCode {
            code: code.to_string(),
        })
    }

    /// Map a relay message to a pairing event; `None` for messages pairing
    /// does not own.
    pub fn on_relay(&mut self, msg: &RelayMessage) -> Option<PairingEvent> {
        match msg {
            RelayMessage::ConnectionSuccess { sid } => {
                info!(%sid, "registered with relay");
                self.local_sid = Some(sid.clone());
                Some(PairingEvent::Registered { sid: sid.clone() })
            }
            RelayMessage::CodeGenerated { code } => {
                info!(%code, "code allocated");
                self.code = Some(code.clone());
                Some(PairingEvent::CodeAllocated(code.clone()))
            }
            RelayMessage::CodeAccepted { peer_sid } => {
                info!(peer = %peer_sid, "code accepted, acting as initiator");
                Some(PairingEvent::RoleAssigned {
                    role: Role::Initiator,
                    peer: peer_sid.clone(),
                })
            }
            RelayMessage::PeerJoined { peer_sid } => {
                info!(peer = %peer_sid, "peer joined our code, acting as responder");
                // Relay retires a code once used.
                self.code = None;
                Some(PairingEvent::RoleAssigned {
                    role: Role::Responder,
                    peer: peer_sid.clone(),
                })
            }
            RelayMessage::ErrorMessage { message } => {
                warn!(%message, "relay rejected request");
                Some(PairingEvent::Failed(PairingError::Rejected(message.clone())))
            }
            RelayMessage::Signal(_) => None,
        }
    }
}
