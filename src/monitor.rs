//! Normalised status stream for whatever presents the call to the user.
//!
//! Relay-link events and transport state changes both end up here as
//! [`Status`] values. The monitor only reads; it never touches a session.

use std::fmt;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::peer::transport::TransportEventKind;
use crate::peer::types::ConnectionState;
use crate::signaling::ChannelEvent;

const STATUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            StatusLevel::Info => write!(f, "[info] {}", self.message),
            StatusLevel::Error => write!(f, "[error] {}", self.message),
        }
    }
}

/// Broadcast of status updates. Publishing with no subscriber is fine.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<Status>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.tx.subscribe()
    }

    pub fn publish(&self, status: Status) {
        match status.level {
            StatusLevel::Info => info!(status = %status.message, "status"),
            StatusLevel::Error => warn!(status = %status.message, "status"),
        }
        let _ = self.tx.send(status);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(Status::info(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(Status::error(message));
    }
}

/// Status for a relay-link event; `None` for relay payloads.
pub fn channel_status(event: &ChannelEvent) -> Option<Status> {
    match event {
        ChannelEvent::Connected => Some(Status::info("Connected to server")),
        ChannelEvent::ConnectError(_) => Some(Status::error(
            "Connection error! Please check your internet connection.",
        )),
        ChannelEvent::Disconnected(_) => Some(Status::error("Disconnected from server")),
        ChannelEvent::Reconnecting { attempt, max } => Some(Status::info(format!(
            "Reconnecting to server (attempt {attempt}/{max})..."
        ))),
        ChannelEvent::GaveUp { attempts } => Some(Status::error(format!(
            "Unable to reach server after {attempts} attempts"
        ))),
        ChannelEvent::Message(_) => None,
    }
}

pub fn connection_status(state: ConnectionState) -> Vec<Status> {
    let mut out = vec![Status::info(format!("Connection state: {state}"))];
    if state == ConnectionState::Failed {
        out.push(Status::error("Connection failed. Please try again."));
    }
    out
}

/// Observes the relay link and the transport and republishes both.
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    bus: StatusBus,
    last_state: Option<ConnectionState>,
}

impl ConnectionMonitor {
    pub fn new(bus: StatusBus) -> Self {
        Self {
            bus,
            last_state: None,
        }
    }

    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }

    pub fn last_connection_state(&self) -> Option<ConnectionState> {
        self.last_state
    }

    pub fn observe_channel(&mut self, event: &ChannelEvent) {
        if let Some(status) = channel_status(event) {
            self.bus.publish(status);
        }
    }

    pub fn observe_transport(&mut self, kind: &TransportEventKind) {
        match kind {
            TransportEventKind::ConnectionState(state) => {
                if self.last_state == Some(*state) {
                    return;
                }
                self.last_state = Some(*state);
                for status in connection_status(*state) {
                    self.bus.publish(status);
                }
            }
            TransportEventKind::IceState(state) => {
                self.bus.info(format!("ICE state: {state}"));
            }
            TransportEventKind::SignalingState(state) => {
                info!(%state, "signaling state");
            }
            _ => {}
        }
    }

    /// Forget the previous session's connection state.
    pub fn reset(&mut self) {
        self.last_state = None;
    }
}
