//! The single event loop of a local endpoint.
//!
//! User actions, relay-link events and transport callbacks are processed one
//! at a time; nothing here runs concurrently with the negotiator.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::TeardownReason;
use crate::monitor::{ConnectionMonitor, Status, StatusBus};
use crate::pairing::{PairingClient, PairingEvent};
use crate::peer::connection::RtcTransportFactory;
use crate::peer::media::MediaSource;
use crate::peer::negotiator::Negotiator;
use crate::peer::state::NegotiationState;
use crate::peer::transport::{TransportEvent, TransportFactory};
use crate::session::{Role, SessionId};
use crate::signaling::{ChannelEvent, RelayMessage, SignalSink, SignalingChannel, SignalingHandle};

#[derive(Debug)]
enum Command {
    GenerateCode,
    JoinCode(String),
    HangUp,
    Inspect(oneshot::Sender<Option<SessionSnapshot>>),
    Shutdown,
}

/// Read-only view of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub role: Role,
    pub remote_peer: String,
    pub state: NegotiationState,
    pub has_local_description: bool,
    pub has_remote_description: bool,
    pub outbound_tracks: usize,
    pub inbound_stream: Option<String>,
    pub pending_candidates: usize,
}

/// User-facing actions on a running endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    tx: mpsc::UnboundedSender<Command>,
    status: StatusBus,
}

impl EndpointHandle {
    fn submit(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| Error::ChannelClosed)
    }

    pub fn generate_code(&self) -> Result<()> {
        self.submit(Command::GenerateCode)
    }

    pub fn join_code(&self, code: impl Into<String>) -> Result<()> {
        self.submit(Command::JoinCode(code.into()))
    }

    pub fn hang_up(&self) -> Result<()> {
        self.submit(Command::HangUp)
    }

    /// Tear down any session and stop the event loop.
    pub fn shutdown(&self) -> Result<()> {
        self.submit(Command::Shutdown)
    }

    pub async fn session(&self) -> Result<Option<SessionSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Inspect(tx))?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<Status> {
        self.status.subscribe()
    }
}

pub struct Endpoint<F: TransportFactory, M, S> {
    pairing: PairingClient<S>,
    negotiator: Negotiator<F, M, S>,
    monitor: ConnectionMonitor,
    commands: mpsc::UnboundedReceiver<Command>,
    channel: mpsc::UnboundedReceiver<ChannelEvent>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<M: MediaSource> Endpoint<RtcTransportFactory, M, SignalingHandle> {
    /// Endpoint on a webrtc-rs transport, talking to the configured relay.
    pub fn connect(config: &Config, media: M) -> (Self, EndpointHandle, JoinHandle<()>) {
        let (sink, channel, task) =
            SignalingChannel::spawn(config.relay_url.clone(), config.signaling.clone());
        let (endpoint, handle) =
            Endpoint::new(RtcTransportFactory::new(config), media, sink, channel);
        (endpoint, handle, task)
    }
}

impl<F, M, S> Endpoint<F, M, S>
where
    F: TransportFactory,
    M: MediaSource,
    S: SignalSink + Clone,
{
    pub fn new(
        factory: F,
        media: M,
        sink: S,
        channel: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> (Self, EndpointHandle) {
        let status = StatusBus::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();

        let endpoint = Self {
            pairing: PairingClient::new(sink.clone()),
            negotiator: Negotiator::new(factory, media, sink, ev_tx, status.clone()),
            monitor: ConnectionMonitor::new(status.clone()),
            commands: cmd_rx,
            channel,
            transport_events: ev_rx,
        };
        let handle = EndpointHandle { tx: cmd_tx, status };
        (endpoint, handle)
    }

    pub async fn run(mut self) {
        info!("endpoint running");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => {
                        self.negotiator.cleanup(TeardownReason::Shutdown).await;
                        break;
                    }
                    Some(cmd) => self.on_command(cmd).await,
                },
                Some(event) = self.channel.recv() => self.on_channel_event(event).await,
                Some(event) = self.transport_events.recv() => self.on_transport_event(event).await,
            }
        }
        info!("endpoint stopped");
    }

    async fn on_command(&mut self, cmd: Command) {
        let status = self.monitor.bus().clone();
        match cmd {
            Command::GenerateCode => {
                status.info("Generating code...");
                if let Err(e) = self.pairing.request_code() {
                    status.error(e.to_string());
                }
            }
            Command::JoinCode(code) => {
                if !code.trim().is_empty() {
                    status.info("Joining code...");
                }
                if let Err(e) = self.pairing.join_code(&code) {
                    status.error(e.to_string());
                }
            }
            Command::HangUp => {
                if self.negotiator.cleanup(TeardownReason::UserAction).await.is_some() {
                    self.monitor.reset();
                    status.info("Call ended");
                }
            }
            Command::Inspect(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        self.negotiator.session().map(|s| SessionSnapshot {
            id: s.id().clone(),
            role: s.role(),
            remote_peer: s.remote_peer().to_string(),
            state: s.state(),
            has_local_description: s.local_description().is_some(),
            has_remote_description: s.has_remote_description(),
            outbound_tracks: s.outbound_tracks().len(),
            inbound_stream: s.inbound().map(|i| i.id.clone()),
            pending_candidates: self.negotiator.pending_candidates(),
        })
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        self.monitor.observe_channel(&event);
        let ChannelEvent::Message(msg) = event else {
            return;
        };

        if let RelayMessage::Signal(inbound) = msg {
            match inbound.into_message() {
                Ok(signal) => {
                    if let Err(e) = self.negotiator.handle_signal(signal).await {
                        debug!(error = %e, "signal handling failed");
                    }
                }
                Err(anomaly) => warn!(%anomaly, "signal dropped"),
            }
            return;
        }

        let status = self.monitor.bus().clone();
        match self.pairing.on_relay(&msg) {
            Some(PairingEvent::Registered { sid }) => debug!(%sid, "relay assigned our id"),
            Some(PairingEvent::CodeAllocated(code)) => {
                status.info(format!("Your code is: {code}"));
            }
            Some(PairingEvent::RoleAssigned { role, peer }) => {
                match role {
                    Role::Initiator => status.info("Code accepted! Starting connection..."),
                    Role::Responder => status.info("Peer joined! Starting connection..."),
                }
                if let Err(e) = self.negotiator.start(role, peer).await {
                    debug!(error = %e, "session did not start");
                }
            }
            Some(PairingEvent::Failed(e)) => status.error(e.to_string()),
            None => {}
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        if self.negotiator.is_current(&event.session) {
            self.monitor.observe_transport(&event.kind);
        }
        if let Err(e) = self.negotiator.on_transport_event(event).await {
            warn!(error = %e, "session ended by transport");
            self.monitor.reset();
        }
    }
}
