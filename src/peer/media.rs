use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::MediaAccessError;

/// Outbound media track owned by a session.
pub struct LocalTrack {
    inner: Arc<dyn TrackLocal + Send + Sync>,
    stopped: AtomicBool,
}

impl LocalTrack {
    pub fn new(inner: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        Self {
            inner,
            stopped: AtomicBool::new(false),
        }
    }

    /// Opus track fed by the application through [`LocalTrack::rtc_track`].
    pub fn audio(id: &str, stream_id: &str) -> Self {
        let codec = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        };
        Self::new(Arc::new(TrackLocalStaticSample::new(
            codec,
            id.to_owned(),
            stream_id.to_owned(),
        )))
    }

    pub fn video(id: &str, stream_id: &str) -> Self {
        let codec = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        };
        Self::new(Arc::new(TrackLocalStaticSample::new(
            codec,
            id.to_owned(),
            stream_id.to_owned(),
        )))
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn stream_id(&self) -> &str {
        self.inner.stream_id()
    }

    pub fn kind(&self) -> RTPCodecType {
        self.inner.kind()
    }

    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.clone()
    }

    /// Release the track. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!(track = self.id(), "local track stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Supplies outbound tracks when a session needs them. May wait on user consent.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<Vec<Arc<LocalTrack>>, MediaAccessError>;
}

/// No outbound media; the call still receives the remote stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMedia;

#[async_trait]
impl MediaSource for NoMedia {
    async fn acquire(&self) -> Result<Vec<Arc<LocalTrack>>, MediaAccessError> {
        info!("no local media configured, receiving only");
        Ok(Vec::new())
    }
}

/// Builds a fresh set of tracks from a factory on every acquisition.
pub struct StaticMedia {
    make: Box<dyn Fn() -> Result<Vec<LocalTrack>, MediaAccessError> + Send + Sync>,
}

impl StaticMedia {
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> Result<Vec<LocalTrack>, MediaAccessError> + Send + Sync + 'static,
    {
        Self {
            make: Box::new(make),
        }
    }

    /// One Opus and one VP8 track in a shared stream.
    pub fn audio_video() -> Self {
        Self::new(|| {
            Ok(vec![
                LocalTrack::audio("audio", "local"),
                LocalTrack::video("video", "local"),
            ])
        })
    }
}

#[async_trait]
impl MediaSource for StaticMedia {
    async fn acquire(&self) -> Result<Vec<Arc<LocalTrack>>, MediaAccessError> {
        let tracks = (self.make)()?;
        debug!(count = tracks.len(), "media tracks acquired");
        Ok(tracks.into_iter().map(Arc::new).collect())
    }
}
