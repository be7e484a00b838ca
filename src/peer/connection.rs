use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

use crate::config::Config;
use crate::error::Result;
use crate::peer::media::LocalTrack;
use crate::peer::transport::{PeerTransport, TransportEvent, TransportEventKind, TransportFactory};
use crate::peer::types::{IceCandidate, RemoteTrack, SessionDescription};
use crate::session::SessionId;

/// Builds one `RTCPeerConnection` per session from the static ICE config.
#[derive(Debug, Clone)]
pub struct RtcTransportFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl RtcTransportFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            ice_servers: config.rtc_ice_servers(),
        }
    }
}

fn rtc_config(ice_servers: Vec<RTCIceServer>) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    type Transport = RtcTransport;

    async fn create(
        &self,
        session: SessionId,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<RtcTransport> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(rtc_config(self.ice_servers.clone()))
                .await?,
        );
        info!(%session, ice_servers = self.ice_servers.len(), "peer connection created");

        attach_handlers(&pc, session.clone(), events);

        Ok(RtcTransport {
            pc,
            session,
            has_senders: AtomicBool::new(false),
        })
    }
}

/// Forward peer connection callbacks to the session's event loop.
fn attach_handlers(
    pc: &Arc<RTCPeerConnection>,
    session: SessionId,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let emit = move |kind: TransportEventKind| {
        if events.send(TransportEvent::new(session.clone(), kind)).is_err() {
            debug!("event loop gone, dropping transport event");
        }
    };

    let on_candidate = emit.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => on_candidate(TransportEventKind::LocalCandidate(init.into())),
                Err(e) => warn!(error = %e, "cannot serialise local candidate"),
            },
            None => on_candidate(TransportEventKind::GatheringComplete),
        }
        Box::pin(async {})
    }));

    let on_state = emit.clone();
    let weak: Weak<RTCPeerConnection> = Arc::downgrade(pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        debug!(state = %st, "peer connection state changed");
        if st == RTCPeerConnectionState::Failed {
            if let Some(pc) = weak.upgrade() {
                tokio::spawn(async move { dump_selected_pair(&pc, "BEFORE-FAIL").await });
            }
        }
        on_state(TransportEventKind::ConnectionState(st.into()));
        Box::pin(async {})
    }));

    let on_ice = emit.clone();
    pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
        on_ice(TransportEventKind::IceState(st.to_string()));
        Box::pin(async {})
    }));

    let on_signaling = emit.clone();
    pc.on_signaling_state_change(Box::new(move |st: RTCSignalingState| {
        on_signaling(TransportEventKind::SignalingState(st.to_string()));
        Box::pin(async {})
    }));

    let on_track = emit;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            on_track(TransportEventKind::RemoteTrack(RemoteTrack {
                stream_id: track.stream_id(),
                track_id: track.id(),
                handle: Some(track),
            }));
            Box::pin(async {})
        },
    ));
}

/// Log the nominated candidate pair.
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, report) in stats.reports {
        if let StatsReportType::CandidatePair(pair) = report {
            if pair.nominated {
                info!(
                    moment,
                    local = %pair.local_candidate_id,
                    remote = %pair.remote_candidate_id,
                    bytes_sent = pair.bytes_sent,
                    bytes_received = pair.bytes_received,
                    state = ?pair.state,
                    "selected candidate pair"
                );
            }
        }
    }
}

/// webrtc-rs backed media transport.
pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
    session: SessionId,
    has_senders: AtomicBool,
}

impl RtcTransport {
    /// Without outbound tracks an offer has no media sections; ask to receive.
    async fn ensure_receiving(&self) -> Result<()> {
        if self.has_senders.load(Ordering::SeqCst) {
            return Ok(());
        }
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            self.pc
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }
        self.has_senders.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        let sender = self.pc.add_track(track.rtc_track()).await?;
        self.has_senders.store(true, Ordering::SeqCst);
        debug!(session = %self.session, track = track.id(), "local track attached");

        // RTCP must be drained for interceptors (NACK, reports) to work.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_receiving().await?;
        let offer = self.pc.create_offer(None).await?;
        SessionDescription::try_from(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        SessionDescription::try_from(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(desc.to_rtc()?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(desc.to_rtc()?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        info!(session = %self.session, "peer connection closed");
        Ok(())
    }
}
