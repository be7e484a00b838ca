use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::SignalingConfig;
use crate::error::{Error, Result};
use crate::signaling::protocol::{ClientMessage, RelayMessage};
use crate::signaling::SignalSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the relay link reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected(String),
    ConnectError(String),
    Reconnecting { attempt: u32, max: u32 },
    /// Retry budget exhausted; the channel task has stopped.
    GaveUp { attempts: u32 },
    Message(RelayMessage),
}

/// Sending half of the relay link. Dropping every handle closes the link.
#[derive(Debug, Clone)]
pub struct SignalingHandle {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl SignalSink for SignalingHandle {
    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::Connectivity("relay link is no longer running".into()))
    }
}

/// Reconnecting WebSocket link to the relay.
pub struct SignalingChannel;

enum LinkEnd {
    Dropped(String),
    Shutdown,
}

impl SignalingChannel {
    /// Start the link task. Outbound messages queue until a connection exists
    /// and are written in submission order.
    pub fn spawn(
        url: String,
        config: SignalingConfig,
    ) -> (
        SignalingHandle,
        mpsc::UnboundedReceiver<ChannelEvent>,
        JoinHandle<()>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, config, out_rx, ev_tx));
        (SignalingHandle { tx: out_tx }, ev_rx, task)
    }
}

async fn run(
    url: String,
    config: SignalingConfig,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let max = config.reconnection_attempts;
    // 0 is the initial connect, n > 0 the n-th consecutive reconnect.
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            if !config.reconnection || attempt > max {
                let attempts = if config.reconnection { max } else { 0 };
                error!(%url, attempts, "giving up on relay");
                let _ = events.send(ChannelEvent::GaveUp { attempts });
                return;
            }
            let delay = config.jittered_delay(attempt, rand::rng().random::<f64>());
            info!(attempt, max, delay_ms = delay.as_millis() as u64, "reconnecting to relay");
            let _ = events.send(ChannelEvent::Reconnecting { attempt, max });
            sleep(delay).await;
        }

        debug!(%url, "connecting to relay");
        match timeout(config.timeout(), connect_async(url.as_str())).await {
            Ok(Ok((ws, _))) => {
                info!(%url, "connected to relay");
                attempt = 0;
                if events.send(ChannelEvent::Connected).is_err() {
                    return;
                }
                match pump(ws, &mut outbound, &events).await {
                    LinkEnd::Shutdown => {
                        debug!("relay link shut down");
                        return;
                    }
                    LinkEnd::Dropped(reason) => {
                        warn!(%reason, "relay link dropped");
                        let _ = events.send(ChannelEvent::Disconnected(reason));
                        attempt = 1;
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "relay connect failed");
                let _ = events.send(ChannelEvent::ConnectError(e.to_string()));
                attempt += 1;
            }
            Err(_) => {
                warn!(timeout_ms = config.timeout_ms, "relay connect timed out");
                let _ = events.send(ChannelEvent::ConnectError("timeout".into()));
                attempt += 1;
            }
        }

        if events.is_closed() {
            return;
        }
    }
}

async fn pump(
    ws: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) -> LinkEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    let text = match msg.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "dropping unencodable message");
                            continue;
                        }
                    };
                    debug!(%text, "-> relay");
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return LinkEnd::Dropped(e.to_string());
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return LinkEnd::Shutdown;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    debug!(%text, "<- relay");
                    match RelayMessage::from_json(&text) {
                        Ok(msg) => {
                            if events.send(ChannelEvent::Message(msg)).is_err() {
                                return LinkEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!(error = %e, "malformed relay frame dropped"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return LinkEnd::Dropped("closed by relay".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
            },
        }
    }
}
