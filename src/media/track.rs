use super::frame::VideoFrame;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Media type of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Identity of a registered sink, used to detach it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SinkId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Consumer of decoded frames. `on_frame` is called on the producer's
/// delivery thread, never by the application.
pub trait VideoSink: Send + Sync {
    fn id(&self) -> SinkId;
    fn on_frame(&self, frame: &VideoFrame);
}

/// A local or remote media track as exposed by the media engine.
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);

    /// Register `sink`, replacing a sink with the same id. Audio tracks ignore sinks.
    fn add_or_update_sink(&self, _sink: Arc<dyn VideoSink>) {}
    fn remove_sink(&self, _id: SinkId) {}
    fn sink_count(&self) -> usize {
        0
    }

    /// Release the underlying source (capture device, receiver).
    fn stop(&self) {}
}

/// Sink registry shared by track implementations.
#[derive(Default)]
pub struct SinkSet {
    sinks: RwLock<Vec<Arc<dyn VideoSink>>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update(&self, sink: Arc<dyn VideoSink>) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        let id = sink.id();
        if let Some(slot) = sinks.iter_mut().find(|s| s.id() == id) {
            *slot = sink;
        } else {
            sinks.push(sink);
        }
    }

    pub fn remove(&self, id: SinkId) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.id() != id);
    }

    pub fn clear(&self) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `frame` to every registered sink in registration order.
    pub fn deliver(&self, frame: &VideoFrame) {
        // Snapshot so a sink may detach itself without deadlocking.
        let sinks: Vec<Arc<dyn VideoSink>> = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in sinks {
            sink.on_frame(frame);
        }
    }
}

/// Audio track fed by the engine's default audio source.
pub struct AudioTrack {
    id: String,
    enabled: AtomicBool,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for AudioTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// The tracks a local stream contributes to a publish channel.
#[derive(Clone, Default)]
pub struct TrackSet {
    pub audio: Option<Arc<dyn MediaTrack>>,
    pub video: Option<Arc<dyn MediaTrack>>,
}

impl TrackSet {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    /// Audio first, then video.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.audio.iter().chain(self.video.iter())
    }
}
