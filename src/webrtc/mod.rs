//! Media engine backend on webrtc-rs.
//!
//! Sessions are unified-plan peer connections with the default codec set and
//! interceptors. Local video is H.264-encoded into sample senders when the
//! `h264` feature is enabled. Remote RTP is counted rather than decoded.

#[cfg(feature = "h264")]
pub mod encoder;
pub mod peer;
pub mod track;

pub use peer::WebRtcSession;
pub use track::RemoteTrack;

use crate::capture::{CaptureDeviceInfo, CaptureRegistry, CapturedVideoTrack, TestPatternBackend};
use crate::config::EngineConfig;
use crate::errors::RtcError;
use crate::media::engine::{CaptureParams, MediaEngine, MediaSession, SessionEventSink};
use crate::media::track::{AudioTrack, MediaTrack};
use crate::types::{ChannelRole, StreamKind};
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as CodecRegistry;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;

pub struct WebRtcEngine {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    capture: CaptureRegistry,
}

impl WebRtcEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, RtcError> {
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs().map_err(|e| {
            RtcError::Initialization(format!("Failed to register codecs: {}", e))
        })?;

        let registry = register_default_interceptors(Registry::new(), &mut codecs).map_err(|e| {
            RtcError::Initialization(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        let mut capture = CaptureRegistry::new();
        #[cfg(feature = "camera")]
        {
            capture = capture.with_backend(Arc::new(crate::capture::CameraBackend::new()));
        }
        if config.capture.test_pattern {
            capture = capture.with_backend(Arc::new(TestPatternBackend::new()));
        }
        if capture.is_empty() {
            log::warn!("No capture backend available; video streams will fail to start");
        }

        log::info!(
            "WebRTC media engine ready with {} ICE server(s)",
            config.ice.servers.len()
        );

        Ok(Self {
            api,
            ice_servers: config.ice.servers.iter().map(Into::into).collect(),
            capture,
        })
    }

    /// Replace the capture backends.
    pub fn with_capture(mut self, capture: CaptureRegistry) -> Self {
        self.capture = capture;
        self
    }

    /// Factory suitable for `EngineBuilder::media_engine`.
    pub fn factory(config: &EngineConfig) -> Result<Arc<dyn MediaEngine>, RtcError> {
        Ok(Arc::new(Self::new(config)?))
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_session(
        &self,
        role: ChannelRole,
        events: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn MediaSession>, RtcError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        };

        let peer_connection = self
            .api
            .new_peer_connection(config)
            .await
            .map_err(|e| RtcError::Media(format!("Failed to create peer connection: {}", e)))?;
        log::debug!("Created {} peer connection", role);

        Ok(Arc::new(WebRtcSession::new(Arc::new(peer_connection), events)))
    }

    fn create_audio_track(&self, label: &str) -> Result<Arc<dyn MediaTrack>, RtcError> {
        Ok(Arc::new(AudioTrack::new(label)))
    }

    fn capture_devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError> {
        Ok(self.capture.devices(kind))
    }

    fn create_video_track(
        &self,
        label: &str,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Arc<dyn MediaTrack>, RtcError> {
        let capturer = self.capture.open(device, params)?;
        Ok(Arc::new(CapturedVideoTrack::start(label, capturer)?))
    }
}
