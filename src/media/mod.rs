//! Capability interface to the media engine and the local media stream.

pub mod engine;
pub mod frame;
pub mod stream;
pub mod track;

pub use engine::{CaptureParams, MediaEngine, MediaSession, SessionEventSink, TransportState};
pub use frame::{I420Buffer, VideoFrame, VideoRotation};
pub use stream::MediaStream;
pub use track::{AudioTrack, MediaKind, MediaTrack, SinkId, SinkSet, TrackSet, VideoSink};
