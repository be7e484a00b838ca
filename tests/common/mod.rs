#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pairtalk_lib::error::{Error, MediaAccessError, Result};
use pairtalk_lib::peer::media::{LocalTrack, MediaSource};
use pairtalk_lib::peer::transport::{
    PeerTransport, TransportEvent, TransportEventKind, TransportFactory,
};
use pairtalk_lib::peer::types::{IceCandidate, SdpKind, SessionDescription};
use pairtalk_lib::session::SessionId;
use pairtalk_lib::signaling::{
    ChannelEvent, ClientMessage, OutboundSignal, RelayMessage, SignalSink,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind, String),
    AddCandidate(String),
    Close,
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

pub struct FakeTransport {
    session: SessionId,
    log: CallLog,
    fail_remote: bool,
    fail_answer: bool,
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        self.log.push(Call::AddTrack(track.id().to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.log.push(Call::CreateOffer);
        Ok(SessionDescription::offer(format!("offer-{}", self.session)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.log.push(Call::CreateAnswer);
        if self.fail_answer {
            return Err(Error::Negotiation("answer could not be created".into()));
        }
        Ok(SessionDescription::answer(format!("answer-{}", self.session)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.log.push(Call::SetLocal(desc.kind));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if self.fail_remote {
            return Err(Error::Negotiation("remote description rejected".into()));
        }
        self.log.push(Call::SetRemote(desc.kind, desc.sdp));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.log.push(Call::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.push(Call::Close);
        Ok(())
    }
}

struct Created {
    session: SessionId,
    log: CallLog,
    events: mpsc::UnboundedSender<TransportEvent>,
}

/// Hands out [`FakeTransport`]s and remembers them for inspection.
#[derive(Clone, Default)]
pub struct FakeFactory {
    created: Arc<Mutex<Vec<Created>>>,
    pub fail_remote: bool,
    pub fail_answer: bool,
}

impl FakeFactory {
    /// Every transport it creates rejects remote descriptions.
    pub fn rejecting_remote() -> Self {
        Self {
            fail_remote: true,
            ..Self::default()
        }
    }

    /// Every transport it creates fails to produce an answer.
    pub fn failing_answer() -> Self {
        Self {
            fail_answer: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn log(&self, index: usize) -> CallLog {
        self.created.lock().unwrap()[index].log.clone()
    }

    pub fn session(&self, index: usize) -> SessionId {
        self.created.lock().unwrap()[index].session.clone()
    }

    /// Fire a callback as transport `index` would.
    pub fn emit(&self, index: usize, kind: TransportEventKind) {
        let created = self.created.lock().unwrap();
        let c = &created[index];
        c.events
            .send(TransportEvent::new(c.session.clone(), kind))
            .unwrap();
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    async fn create(
        &self,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<FakeTransport> {
        let log = CallLog::default();
        self.created.lock().unwrap().push(Created {
            session: session.clone(),
            log: log.clone(),
            events,
        });
        Ok(FakeTransport {
            session,
            log,
            fail_remote: self.fail_remote,
            fail_answer: self.fail_answer,
        })
    }
}

/// Audio + video tracks, or a refusal.
#[derive(Clone, Default)]
pub struct FakeMedia {
    pub deny: bool,
    issued: Arc<Mutex<Vec<Arc<LocalTrack>>>>,
}

impl FakeMedia {
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn issued(&self) -> Vec<Arc<LocalTrack>> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire(&self) -> std::result::Result<Vec<Arc<LocalTrack>>, MediaAccessError> {
        if self.deny {
            return Err(MediaAccessError::Denied("permission dismissed".into()));
        }
        let tracks = vec![
            Arc::new(LocalTrack::audio("mic", "local")),
            Arc::new(LocalTrack::video("cam", "local")),
        ];
        self.issued.lock().unwrap().extend(tracks.iter().cloned());
        Ok(tracks)
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<ClientMessage>>>);

impl RecordingSink {
    pub fn messages(&self) -> Vec<ClientMessage> {
        self.0.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<OutboundSignal> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::Signal(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl SignalSink for RecordingSink {
    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.0.lock().unwrap().push(msg);
        Ok(())
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate::new(format!(
        "candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"
    ))
}

#[derive(Default)]
struct RelayState {
    clients: HashMap<String, mpsc::UnboundedSender<ChannelEvent>>,
    codes: HashMap<String, String>,
    next_code: u32,
}

/// In-process pairing relay with the hosted relay's rules: six-digit
/// single-use codes, no self-joins, signals forwarded with the sender stamped.
#[derive(Clone, Default)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
}

#[derive(Clone)]
pub struct RelaySink {
    sid: String,
    relay: Relay,
}

impl SignalSink for RelaySink {
    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.relay.handle(&self.sid, msg);
        Ok(())
    }
}

impl Relay {
    pub fn connect(&self, sid: &str) -> (RelaySink, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChannelEvent::Connected).unwrap();
        tx.send(ChannelEvent::Message(RelayMessage::ConnectionSuccess {
            sid: sid.to_string(),
        }))
        .unwrap();
        self.state
            .lock()
            .unwrap()
            .clients
            .insert(sid.to_string(), tx);
        (
            RelaySink {
                sid: sid.to_string(),
                relay: self.clone(),
            },
            rx,
        )
    }

    pub fn active_codes(&self) -> usize {
        self.state.lock().unwrap().codes.len()
    }

    pub fn disconnect(&self, sid: &str) {
        let mut state = self.state.lock().unwrap();
        state.codes.retain(|_, owner| owner != sid);
        if let Some(tx) = state.clients.remove(sid) {
            let _ = tx.send(ChannelEvent::Disconnected("relay dropped client".into()));
        }
    }

    fn deliver(state: &RelayState, to: &str, msg: RelayMessage) {
        if let Some(tx) = state.clients.get(to) {
            let _ = tx.send(ChannelEvent::Message(msg));
        }
    }

    fn handle(&self, from: &str, msg: ClientMessage) {
        let mut state = self.state.lock().unwrap();
        match msg {
            ClientMessage::GenerateCode => {
                state.next_code += 1;
                let code = format!("{:06}", 100_000 + state.next_code);
                state.codes.insert(code.clone(), from.to_string());
                Self::deliver(&state, from, RelayMessage::CodeGenerated { code });
            }
            ClientMessage::JoinCode { code } => {
                let reply = match state.codes.get(&code).cloned() {
                    None if code.is_empty() => Err("No code provided"),
                    None => Err("Invalid or expired code"),
                    Some(owner) if owner == from => Err("Cannot join your own code"),
                    Some(owner) => {
                        state.codes.remove(&code);
                        Self::deliver(
                            &state,
                            &owner,
                            RelayMessage::PeerJoined {
                                peer_sid: from.to_string(),
                            },
                        );
                        Ok(RelayMessage::CodeAccepted { peer_sid: owner })
                    }
                };
                let reply = reply.unwrap_or_else(|message| RelayMessage::ErrorMessage {
                    message: message.to_string(),
                });
                Self::deliver(&state, from, reply);
            }
            ClientMessage::Signal(signal) => {
                let target = signal.target_sid.clone();
                Self::deliver(&state, &target, RelayMessage::Signal(signal.forwarded_from(from)));
            }
        }
    }
}

/// Poll `check` until it yields `Some`, failing after two seconds.
pub async fn eventually<T, Fut>(mut check: impl FnMut() -> Fut) -> T
where
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
