use super::track::{MediaKind, MediaTrack};
use crate::capture::CaptureDeviceInfo;
use crate::errors::RtcError;
use crate::types::{ChannelRole, SessionDescription, StreamKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Connection state reported by a session's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Capture parameters requested for the local video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Receives asynchronous notifications from one session. Called from the
/// media engine's own threads.
pub trait SessionEventSink: Send + Sync {
    fn on_state_change(&self, state: TransportState);
    fn on_remote_track(&self, track: Arc<dyn MediaTrack>);
}

/// Factory side of the media engine: sessions, local tracks, devices.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a session for `role`. Events from the session go to `events`.
    async fn create_session(
        &self,
        role: ChannelRole,
        events: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn MediaSession>, RtcError>;

    /// Audio track fed by the default audio source.
    fn create_audio_track(&self, label: &str) -> Result<Arc<dyn MediaTrack>, RtcError>;

    /// Capture devices for `kind`, in enumeration order.
    fn capture_devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError>;

    /// Open `device` at `params` and wrap it in a video track.
    fn create_video_track(
        &self,
        label: &str,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Arc<dyn MediaTrack>, RtcError>;
}

/// One negotiated media session (a peer connection).
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Add a local track as a sender.
    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), RtcError>;

    /// Remove every sender added with `add_track`.
    async fn remove_tracks(&self) -> Result<(), RtcError>;

    /// Add a receive-only transceiver of `kind`.
    async fn add_recv_only(&self, kind: MediaKind) -> Result<(), RtcError>;

    /// Build an offer that asks to receive audio and video.
    async fn create_offer(&self) -> Result<SessionDescription, RtcError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError>;

    /// Remote video tracks currently known to the session.
    fn remote_video_tracks(&self) -> Vec<Arc<dyn MediaTrack>>;

    async fn close(&self) -> Result<(), RtcError>;
}
