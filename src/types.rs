use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a channel within one engine. Issued monotonically starting at 1
/// and never reused for the lifetime of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    /// Send the local stream to the relay.
    Publish,
    /// Receive a remote stream from the relay.
    Subscribe,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Publish => "publish",
            ChannelRole::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiation state of a channel.
///
/// `Idle -> NegotiatingLocal -> AwaitingSignaling -> ApplyingRemote -> Connected`,
/// with `Failed` and `Closed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Idle,
    NegotiatingLocal,
    AwaitingSignaling,
    ApplyingRemote,
    Connected,
    Failed,
    Closed,
}

impl ChannelState {
    /// True while a `start()` is in progress and its outcome is not known yet.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            ChannelState::NegotiatingLocal
                | ChannelState::AwaitingSignaling
                | ChannelState::ApplyingRemote
        )
    }
}

/// Source of the local video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Camera,
    Screen,
}

/// Parameters for building the local media stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub kind: StreamKind,
    pub has_audio: bool,
    pub has_video: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            kind: StreamKind::Camera,
            has_audio: true,
            has_video: true,
            width: 640,
            height: 480,
            fps: 25,
        }
    }
}

impl StreamConfig {
    pub fn audio_only() -> Self {
        Self {
            has_video: false,
            ..Self::default()
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

/// SDP type of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description exchanged through signaling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.kind, StreamKind::Camera);
        assert!(config.has_audio);
        assert!(config.has_video);
        assert_eq!((config.width, config.height, config.fps), (640, 480, 25));
    }

    #[test]
    fn test_negotiating_states() {
        assert!(ChannelState::AwaitingSignaling.is_negotiating());
        assert!(!ChannelState::Idle.is_negotiating());
        assert!(!ChannelState::Connected.is_negotiating());
        assert!(!ChannelState::Closed.is_negotiating());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChannelRole::Subscribe).unwrap();
        assert_eq!(json, "\"subscribe\"");
    }
}
