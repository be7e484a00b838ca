use std::fmt;

use thiserror::Error;

use crate::session::SessionId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that reach the user through the status stream or an API return.
#[derive(Debug, Error)]
pub enum Error {
    #[error("signaling channel unavailable: {0}")]
    Connectivity(String),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),

    #[error("transport failed for session {0}")]
    TransportFailure(SessionId),

    #[error("negotiation step failed: {0}")]
    Negotiation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("malformed relay message: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("webrtc: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("channel closed")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("Please enter a code first")]
    EmptyCode,
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAccessError {
    #[error("media access denied: {0}")]
    Denied(String),
    #[error("no media device available: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid relay url {url:?}: {reason}")]
    RelayUrl { url: String, reason: String },
    #[error("ICE server {0:?} has an empty url")]
    EmptyIceUrl(String),
    #[error("TURN server {0:?} requires username and credential")]
    TurnCredentials(String),
    #[error("reconnection_attempts must be at least 1 when reconnection is enabled")]
    NoAttempts,
    #[error("cannot read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Protocol irregularities that are absorbed where they are detected.
///
/// These are only ever logged; they never reach the status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    DuplicateAnswer,
    UnexpectedOffer,
    NoActiveSession,
    UnknownPeer(String),
    EmptySignal,
    StaleTransportEvent(SessionId),
    MissingTransport,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::DuplicateAnswer => write!(f, "ignoring duplicate answer"),
            Anomaly::UnexpectedOffer => write!(f, "ignoring offer outside of idle state"),
            Anomaly::NoActiveSession => write!(f, "signal received but no session exists"),
            Anomaly::UnknownPeer(peer) => write!(f, "signal from unknown peer {peer}"),
            Anomaly::EmptySignal => write!(f, "signal carries neither description nor candidate"),
            Anomaly::StaleTransportEvent(id) => {
                write!(f, "transport event for closed session {id}")
            }
            Anomaly::MissingTransport => write!(f, "session has no peer connection"),
        }
    }
}
