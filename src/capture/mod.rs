//! Capture devices and the video tracks they feed.
//!
//! A [`CaptureBackend`] enumerates devices and opens them as
//! [`VideoCapturer`]s. [`CapturedVideoTrack`] wraps a running capturer and
//! fans its frames out to the track's sinks.

#[cfg(feature = "camera")]
pub mod camera;
pub mod pattern;

#[cfg(feature = "camera")]
pub use camera::CameraBackend;
pub use pattern::{test_pattern_frame, TestPatternBackend};

use crate::errors::RtcError;
use crate::media::engine::CaptureParams;
use crate::media::frame::VideoFrame;
use crate::media::track::{MediaKind, MediaTrack, SinkId, SinkSet, VideoSink};
use crate::types::StreamKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A capture device as reported by its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: StreamKind,
    /// Name of the backend that reported the device.
    pub backend: String,
}

impl CaptureDeviceInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: StreamKind,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            backend: backend.into(),
        }
    }
}

/// Callback receiving every captured frame on the capture thread.
pub type FrameCallback = Box<dyn FnMut(VideoFrame) + Send>;

/// An opened capture device.
pub trait VideoCapturer: Send {
    /// Begin delivering frames to `on_frame`.
    fn start(&mut self, on_frame: FrameCallback) -> Result<(), RtcError>;
    fn stop(&mut self) -> Result<(), RtcError>;
}

/// Source of capture devices.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;
    fn devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError>;
    fn open(
        &self,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Box<dyn VideoCapturer>, RtcError>;
}

/// Ordered set of backends. Devices are listed backend by backend, and each
/// device is opened by the backend that reported it.
#[derive(Clone, Default)]
pub struct CaptureRegistry {
    backends: Vec<Arc<dyn CaptureBackend>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Devices of every backend, in registration order. A backend that fails
    /// to enumerate is skipped.
    pub fn devices(&self, kind: StreamKind) -> Vec<CaptureDeviceInfo> {
        let mut devices = Vec::new();
        for backend in &self.backends {
            match backend.devices(kind) {
                Ok(found) => devices.extend(found),
                Err(e) => log::warn!("Capture backend {} failed to list devices: {}", backend.name(), e),
            }
        }
        devices
    }

    pub fn open(
        &self,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Box<dyn VideoCapturer>, RtcError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.name() == device.backend)
            .ok_or_else(|| {
                RtcError::Capture(format!("No capture backend named {:?}", device.backend))
            })?;
        backend.open(device, params)
    }
}

/// Video track fed by a running capturer.
pub struct CapturedVideoTrack {
    id: String,
    enabled: Arc<AtomicBool>,
    sinks: Arc<SinkSet>,
    frames: Arc<AtomicU64>,
    capturer: Mutex<Option<Box<dyn VideoCapturer>>>,
}

impl CapturedVideoTrack {
    /// Start `capturer` and route its frames to this track's sinks. Frames
    /// captured while the track is disabled are dropped.
    pub fn start(id: impl Into<String>, mut capturer: Box<dyn VideoCapturer>) -> Result<Self, RtcError> {
        let enabled = Arc::new(AtomicBool::new(true));
        let sinks = Arc::new(SinkSet::new());
        let frames = Arc::new(AtomicU64::new(0));

        let (cb_enabled, cb_sinks, cb_frames) = (enabled.clone(), sinks.clone(), frames.clone());
        capturer.start(Box::new(move |frame: VideoFrame| {
            cb_frames.fetch_add(1, Ordering::Relaxed);
            if cb_enabled.load(Ordering::Relaxed) {
                cb_sinks.deliver(&frame);
            }
        }))?;

        Ok(Self {
            id: id.into(),
            enabled,
            sinks,
            frames,
            capturer: Mutex::new(Some(capturer)),
        })
    }

    /// Frames produced by the capturer so far.
    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl MediaTrack for CapturedVideoTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn add_or_update_sink(&self, sink: Arc<dyn VideoSink>) {
        self.sinks.add_or_update(sink);
    }

    fn remove_sink(&self, id: SinkId) {
        self.sinks.remove(id);
    }

    fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    fn stop(&self) {
        let capturer = self
            .capturer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut capturer) = capturer {
            if let Err(e) = capturer.stop() {
                log::warn!("Failed to stop capture for track {}: {}", self.id, e);
            }
        }
        self.sinks.clear();
    }
}

impl Drop for CapturedVideoTrack {
    fn drop(&mut self) {
        MediaTrack::stop(self);
    }
}
