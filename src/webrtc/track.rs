use crate::media::track::{MediaKind, MediaTrack, SinkId, SinkSet, VideoSink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Remote track received on a peer connection.
///
/// RTP is read and counted; payloads are not depacketized or decoded, so the
/// sinks registered here only receive frames from a decoder layered on top.
pub struct RemoteTrack {
    id: String,
    kind: MediaKind,
    enabled: AtomicBool,
    stopped: Arc<AtomicBool>,
    packets: Arc<AtomicU64>,
    sinks: SinkSet,
}

impl RemoteTrack {
    /// Wrap `track` and start draining its RTP on the current runtime.
    pub(crate) fn spawn(track: Arc<TrackRemote>) -> Arc<Self> {
        let kind = match track.kind() {
            RTPCodecType::Audio => MediaKind::Audio,
            _ => MediaKind::Video,
        };
        let remote = Arc::new(Self {
            id: track.id(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: Arc::new(AtomicBool::new(false)),
            packets: Arc::new(AtomicU64::new(0)),
            sinks: SinkSet::new(),
        });

        log::info!(
            "Remote {:?} track {} ({})",
            kind,
            remote.id,
            track.codec().capability.mime_type
        );

        let (stopped, packets, id) = (
            remote.stopped.clone(),
            remote.packets.clone(),
            remote.id.clone(),
        );
        tokio::spawn(async move {
            while !stopped.load(Ordering::Relaxed) {
                match track.read_rtp().await {
                    Ok((packet, _)) => {
                        packets.fetch_add(1, Ordering::Relaxed);
                        log::trace!(
                            "Track {}: {} byte RTP payload, seq {}",
                            id,
                            packet.payload.len(),
                            packet.header.sequence_number
                        );
                    }
                    Err(e) => {
                        log::debug!("Track {} finished: {}", id, e);
                        break;
                    }
                }
            }
        });

        remote
    }

    pub fn packets_received(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }
}

impl MediaTrack for RemoteTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
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
        self.stopped.store(true, Ordering::Relaxed);
        self.sinks.clear();
    }
}
