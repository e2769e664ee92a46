//! Testing utilities for strtc
//!
//! Offline stand-ins for the media engine and the signaling server, plus
//! synthetic frames, so the session layer can be exercised without devices
//! or network.

pub mod synthetic;
pub mod transport;

pub use synthetic::{
    synthetic_i420_frame, NullEvents, SyntheticMediaEngine, SyntheticSession, SyntheticTrack,
};
pub use transport::{RecordedRequest, ScriptedTransport};
