//! In-process media engine with scriptable failures.

use crate::capture::CaptureDeviceInfo;
use crate::errors::RtcError;
use crate::media::engine::{
    CaptureParams, MediaEngine, MediaSession, SessionEventSink, TransportState,
};
use crate::media::frame::{I420Buffer, VideoFrame};
use crate::media::track::{MediaKind, MediaTrack, SinkId, SinkSet, VideoSink};
use crate::types::{ChannelRole, SessionDescription, StreamKind};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frame whose luma is a gradient offset by `frame_number`.
pub fn synthetic_i420_frame(
    frame_number: u64,
    width: u32,
    height: u32,
) -> Result<VideoFrame, RtcError> {
    let base = (frame_number % 256) as u8;
    let mut y = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height {
        for col in 0..width {
            y.push(base.wrapping_add(((row + col) % 256) as u8));
        }
    }
    let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
    let buffer = I420Buffer::new(
        width,
        height,
        Bytes::from(y),
        Bytes::from(vec![128u8; chroma]),
        Bytes::from(vec![128u8; chroma]),
    )?;
    Ok(VideoFrame::new(buffer))
}

/// Session event sink that ignores everything.
#[derive(Debug, Default)]
pub struct NullEvents;

impl SessionEventSink for NullEvents {
    fn on_state_change(&self, _state: TransportState) {}
    fn on_remote_track(&self, _track: Arc<dyn MediaTrack>) {}
}

/// Track whose frames are pushed by the test.
pub struct SyntheticTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    delivered: AtomicU64,
    sinks: SinkSet,
}

impl SyntheticTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            sinks: SinkSet::new(),
        }
    }

    /// Deliver `frame` to the sinks, as a capture or decode thread would.
    /// Disabled or stopped tracks drop it.
    pub fn push_frame(&self, frame: &VideoFrame) {
        if self.is_stopped() || !self.enabled() {
            return;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        self.sinks.deliver(frame);
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn add_or_update_sink(&self, sink: Arc<dyn VideoSink>) {
        if self.kind == MediaKind::Video {
            self.sinks.add_or_update(sink);
        }
    }

    fn remove_sink(&self, id: SinkId) {
        self.sinks.remove(id);
    }

    fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.sinks.clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Script {
    fail_create_session: bool,
    fail_create_offer: bool,
    fail_set_local: bool,
    fail_set_remote: bool,
    fail_audio: bool,
}

#[derive(Debug, Clone)]
struct SyntheticDevice {
    info: CaptureDeviceInfo,
    openable: bool,
}

/// Media engine double: records every session and track it creates and fails
/// on request.
pub struct SyntheticMediaEngine {
    script: Mutex<Script>,
    devices: Mutex<HashMap<StreamKind, Vec<SyntheticDevice>>>,
    sessions: Mutex<Vec<Arc<SyntheticSession>>>,
    video_tracks: Mutex<Vec<Arc<SyntheticTrack>>>,
    audio_tracks: Mutex<Vec<Arc<SyntheticTrack>>>,
    open_attempts: Mutex<Vec<String>>,
}

impl Default for SyntheticMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticMediaEngine {
    /// One openable camera, no screen devices.
    pub fn new() -> Self {
        let engine = Self {
            script: Mutex::new(Script::default()),
            devices: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            video_tracks: Mutex::new(Vec::new()),
            audio_tracks: Mutex::new(Vec::new()),
            open_attempts: Mutex::new(Vec::new()),
        };
        engine.set_devices(StreamKind::Camera, &[("Synthetic Camera", true)]);
        engine
    }

    /// Replace the devices of `kind` with `(name, openable)` entries, in order.
    pub fn set_devices(&self, kind: StreamKind, devices: &[(&str, bool)]) {
        let list = devices
            .iter()
            .enumerate()
            .map(|(i, (name, openable))| SyntheticDevice {
                info: CaptureDeviceInfo::new(
                    format!("synthetic-{:?}-{}", kind, i).to_lowercase(),
                    *name,
                    kind,
                    "synthetic",
                ),
                openable: *openable,
            })
            .collect();
        lock(&self.devices).insert(kind, list);
    }

    pub fn fail_create_session(&self, fail: bool) {
        lock(&self.script).fail_create_session = fail;
    }

    pub fn fail_create_offer(&self, fail: bool) {
        lock(&self.script).fail_create_offer = fail;
    }

    pub fn fail_set_local(&self, fail: bool) {
        lock(&self.script).fail_set_local = fail;
    }

    pub fn fail_set_remote(&self, fail: bool) {
        lock(&self.script).fail_set_remote = fail;
    }

    pub fn fail_audio(&self, fail: bool) {
        lock(&self.script).fail_audio = fail;
    }

    pub fn sessions(&self) -> Vec<Arc<SyntheticSession>> {
        lock(&self.sessions).clone()
    }

    pub fn last_session(&self) -> Option<Arc<SyntheticSession>> {
        lock(&self.sessions).last().cloned()
    }

    /// Video tracks created so far, oldest first.
    pub fn video_tracks(&self) -> Vec<Arc<SyntheticTrack>> {
        lock(&self.video_tracks).clone()
    }

    pub fn audio_tracks(&self) -> Vec<Arc<SyntheticTrack>> {
        lock(&self.audio_tracks).clone()
    }

    /// Names of the devices `create_video_track` was asked to open.
    pub fn open_attempts(&self) -> Vec<String> {
        lock(&self.open_attempts).clone()
    }
}

#[async_trait]
impl MediaEngine for SyntheticMediaEngine {
    async fn create_session(
        &self,
        role: ChannelRole,
        events: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn MediaSession>, RtcError> {
        let script = *lock(&self.script);
        if script.fail_create_session {
            return Err(RtcError::Media("scripted session failure".to_string()));
        }
        let session = Arc::new(SyntheticSession::new(role, events, script));
        lock(&self.sessions).push(session.clone());
        Ok(session)
    }

    fn create_audio_track(&self, label: &str) -> Result<Arc<dyn MediaTrack>, RtcError> {
        if lock(&self.script).fail_audio {
            return Err(RtcError::Media("scripted audio failure".to_string()));
        }
        let track = Arc::new(SyntheticTrack::new(label, MediaKind::Audio));
        lock(&self.audio_tracks).push(track.clone());
        Ok(track)
    }

    fn capture_devices(&self, kind: StreamKind) -> Result<Vec<CaptureDeviceInfo>, RtcError> {
        Ok(lock(&self.devices)
            .get(&kind)
            .map(|list| list.iter().map(|d| d.info.clone()).collect())
            .unwrap_or_default())
    }

    fn create_video_track(
        &self,
        label: &str,
        device: &CaptureDeviceInfo,
        params: CaptureParams,
    ) -> Result<Arc<dyn MediaTrack>, RtcError> {
        lock(&self.open_attempts).push(device.name.clone());
        let openable = lock(&self.devices)
            .get(&device.kind)
            .and_then(|list| list.iter().find(|d| d.info.id == device.id))
            .map(|d| d.openable)
            .unwrap_or(false);
        if !openable {
            return Err(RtcError::Capture(format!(
                "{} cannot capture {}x{} @ {}fps",
                device.name, params.width, params.height, params.fps
            )));
        }
        let track = Arc::new(SyntheticTrack::new(label, MediaKind::Video));
        lock(&self.video_tracks).push(track.clone());
        Ok(track)
    }
}

#[derive(Debug, Default)]
struct SessionRecord {
    sending: Vec<(String, MediaKind)>,
    recv_only: Vec<MediaKind>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    senders_removed: bool,
    closed: bool,
}

/// Session created by [`SyntheticMediaEngine`].
pub struct SyntheticSession {
    role: ChannelRole,
    events: Arc<dyn SessionEventSink>,
    script: Script,
    record: Mutex<SessionRecord>,
    remote_tracks: Mutex<Vec<Arc<SyntheticTrack>>>,
}

impl SyntheticSession {
    fn new(role: ChannelRole, events: Arc<dyn SessionEventSink>, script: Script) -> Self {
        Self {
            role,
            events,
            script,
            record: Mutex::new(SessionRecord::default()),
            remote_tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    /// Ids of the local tracks added as senders.
    pub fn sending_track_ids(&self) -> Vec<String> {
        lock(&self.record)
            .sending
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn recv_only_kinds(&self) -> Vec<MediaKind> {
        lock(&self.record).recv_only.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.record).local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        lock(&self.record).remote.clone()
    }

    pub fn senders_removed(&self) -> bool {
        lock(&self.record).senders_removed
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.record).closed
    }

    /// Report a transport state change, as the transport thread would.
    pub fn emit_state(&self, state: TransportState) {
        self.events.on_state_change(state);
    }

    /// Announce a new remote track of `kind` and return it.
    pub fn emit_remote_track(&self, kind: MediaKind) -> Arc<SyntheticTrack> {
        let id = format!("remote-{:?}-{}", kind, lock(&self.remote_tracks).len()).to_lowercase();
        let track = Arc::new(SyntheticTrack::new(id, kind));
        lock(&self.remote_tracks).push(track.clone());
        self.events.on_remote_track(track.clone());
        track
    }

    fn offer_sdp(&self) -> String {
        let record = lock(&self.record);
        let mut sdp = String::from("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=strtc\r\nt=0 0\r\n");
        for (_, kind) in &record.sending {
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 96\r\na=sendonly\r\n", kind_name(*kind)));
        }
        for kind in &record.recv_only {
            sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\n", kind_name(*kind)));
        }
        sdp
    }
}

fn kind_name(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
    }
}

#[async_trait]
impl MediaSession for SyntheticSession {
    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), RtcError> {
        lock(&self.record)
            .sending
            .push((track.id().to_string(), track.kind()));
        Ok(())
    }

    async fn remove_tracks(&self) -> Result<(), RtcError> {
        let mut record = lock(&self.record);
        record.sending.clear();
        record.senders_removed = true;
        Ok(())
    }

    async fn add_recv_only(&self, kind: MediaKind) -> Result<(), RtcError> {
        lock(&self.record).recv_only.push(kind);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        if self.script.fail_create_offer {
            return Err(RtcError::Media("scripted offer failure".to_string()));
        }
        Ok(SessionDescription::offer(self.offer_sdp()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        if self.script.fail_set_local {
            return Err(RtcError::Media("scripted local description failure".to_string()));
        }
        lock(&self.record).local = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        if self.script.fail_set_remote {
            return Err(RtcError::Media("scripted remote description failure".to_string()));
        }
        lock(&self.record).remote = Some(desc);
        Ok(())
    }

    fn remote_video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        lock(&self.remote_tracks)
            .iter()
            .filter(|t| t.kind() == MediaKind::Video)
            .map(|t| t.clone() as Arc<dyn MediaTrack>)
            .collect()
    }

    async fn close(&self) -> Result<(), RtcError> {
        lock(&self.record).closed = true;
        for track in lock(&self.remote_tracks).iter() {
            track.stop();
        }
        Ok(())
    }
}
