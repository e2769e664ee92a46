use super::track::RemoteTrack;
use crate::config::IceServer;
use crate::errors::RtcError;
use crate::media::engine::{MediaSession, SessionEventSink, TransportState};
use crate::media::track::{MediaKind, MediaTrack, SinkId};
use crate::types::{SdpType, SessionDescription};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

impl From<&IceServer> for RTCIceServer {
    fn from(server: &IceServer) -> Self {
        RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                TransportState::New
            }
            RTCPeerConnectionState::Connecting => TransportState::Connecting,
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            RTCPeerConnectionState::Closed => TransportState::Closed,
        }
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = RtcError;

    fn try_from(desc: SessionDescription) -> Result<Self, Self::Error> {
        match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)
                .map_err(|e| RtcError::Media(format!("Invalid SDP offer: {}", e))),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)
                .map_err(|e| RtcError::Media(format!("Invalid SDP answer: {}", e))),
        }
    }
}

impl TryFrom<RTCSessionDescription> for SessionDescription {
    type Error = RtcError;

    fn try_from(desc: RTCSessionDescription) -> Result<Self, Self::Error> {
        match desc.sdp_type {
            RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
            RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
            other => Err(RtcError::Media(format!("Unsupported SDP type {:?}", other))),
        }
    }
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn local_track_for(track: &dyn MediaTrack) -> Arc<TrackLocalStaticSample> {
    let capability = match track.kind() {
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line:
                "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f".to_owned(),
            rtcp_feedback: vec![],
        },
    };
    Arc::new(TrackLocalStaticSample::new(
        capability,
        track.id().to_owned(),
        "strtc".to_owned(),
    ))
}

/// `MediaSession` on one webrtc-rs peer connection.
pub struct WebRtcSession {
    peer_connection: Arc<RTCPeerConnection>,
    remote_tracks: Arc<Mutex<Vec<Arc<RemoteTrack>>>>,
    /// Local tracks feeding a sender, with the sink that encodes for it.
    video_sources: Mutex<Vec<(Arc<dyn MediaTrack>, SinkId)>>,
}

impl WebRtcSession {
    /// Wire the connection's callbacks to `events`.
    pub(crate) fn new(
        peer_connection: Arc<RTCPeerConnection>,
        events: Arc<dyn SessionEventSink>,
    ) -> Self {
        let remote_tracks: Arc<Mutex<Vec<Arc<RemoteTrack>>>> = Arc::new(Mutex::new(Vec::new()));

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                log::info!("Peer connection state: {}", state);
                state_events.on_state_change(state.into());
                Box::pin(async {})
            },
        ));

        let tracks = remote_tracks.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let remote = RemoteTrack::spawn(track);
            tracks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(remote.clone());
            events.on_remote_track(remote);
            Box::pin(async {})
        }));

        Self {
            peer_connection,
            remote_tracks,
            video_sources: Mutex::new(Vec::new()),
        }
    }

    /// Encode the frames of `track` into `local`.
    #[cfg(feature = "h264")]
    fn feed_sender(
        &self,
        track: Arc<dyn MediaTrack>,
        local: Arc<TrackLocalStaticSample>,
    ) -> Result<(), RtcError> {
        use crate::media::track::VideoSink;

        if track.kind() != MediaKind::Video {
            log::debug!("Audio track {} has no capture source to send", track.id());
            return Ok(());
        }
        let sink = super::encoder::VideoSampleSink::spawn(local)?;
        let id = sink.id();
        track.add_or_update_sink(sink);
        self.video_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((track, id));
        Ok(())
    }

    #[cfg(not(feature = "h264"))]
    fn feed_sender(
        &self,
        track: Arc<dyn MediaTrack>,
        _local: Arc<TrackLocalStaticSample>,
    ) -> Result<(), RtcError> {
        log::warn!(
            "Built without the h264 feature, {:?} track {} is negotiated but sends no media",
            track.kind(),
            track.id()
        );
        Ok(())
    }

    fn detach_senders(&self) {
        let sources: Vec<(Arc<dyn MediaTrack>, SinkId)> = self
            .video_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (track, id) in sources {
            track.remove_sink(id);
        }
    }
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn add_track(&self, track: Arc<dyn MediaTrack>) -> Result<(), RtcError> {
        let local = local_track_for(track.as_ref());
        self.peer_connection
            .add_track(local.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| RtcError::Media(format!("Failed to add {:?} track: {}", track.kind(), e)))?;
        log::debug!("Added local {:?} track {}", track.kind(), track.id());
        self.feed_sender(track, local)
    }

    async fn remove_tracks(&self) -> Result<(), RtcError> {
        self.detach_senders();
        for sender in self.peer_connection.get_senders().await {
            self.peer_connection
                .remove_track(&sender)
                .await
                .map_err(|e| RtcError::Media(format!("Failed to remove sender: {}", e)))?;
        }
        Ok(())
    }

    async fn add_recv_only(&self, kind: MediaKind) -> Result<(), RtcError> {
        self.peer_connection
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| RtcError::Media(format!("Failed to add {:?} transceiver: {}", kind, e)))?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| RtcError::Media(format!("Failed to create offer: {}", e)))?;
        offer.try_into()
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        let desc: RTCSessionDescription = desc.try_into()?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|e| RtcError::Media(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), RtcError> {
        let desc: RTCSessionDescription = desc.try_into()?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| RtcError::Media(format!("Failed to set remote description: {}", e)))
    }

    fn remote_video_tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.remote_tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.kind() == MediaKind::Video)
            .map(|t| t.clone() as Arc<dyn MediaTrack>)
            .collect()
    }

    async fn close(&self) -> Result<(), RtcError> {
        let tracks: Vec<Arc<RemoteTrack>> = self
            .remote_tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for track in tracks {
            track.stop();
        }
        self.detach_senders();
        self.peer_connection
            .close()
            .await
            .map_err(|e| RtcError::Media(format!("Failed to close peer connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_server_conversion() {
        let server = IceServer {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            username: Some("user".to_string()),
            credential: None,
        };
        let rtc: RTCIceServer = (&server).into();
        assert_eq!(rtc.urls, server.urls);
        assert_eq!(rtc.username, "user");
        assert_eq!(rtc.credential, "");
    }

    #[test]
    fn test_state_conversion() {
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Failed),
            TransportState::Failed
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Unspecified),
            TransportState::New
        );
    }
}
