//! strtc: publish and play real-time audio/video against an SRS-style relay
//!
//! The crate drives WebRTC sessions whose offer/answer exchange goes over a
//! single HTTP POST to the relay's RTC API (`/rtc/v1/publish/` or
//! `/rtc/v1/play/`). One local media stream feeds any number of publish
//! channels; subscribe channels receive remote media and can render it.
//!
//! # Features
//! - Publish and subscribe channels addressed by `webrtc://host[:port]/app/stream`
//! - One shared local stream (camera or screen, optional audio)
//! - Local and remote video rendering with letterboxing
//! - A dedicated worker thread owning all session state
//! - Offline test doubles for the media engine and signaling server
//!
//! # Usage
//! ```rust,no_run
//! use strtc::{ChannelRole, Engine, EngineConfig, StreamConfig};
//!
//! let engine = Engine::new(EngineConfig::default());
//! engine.init()?;
//! engine.start_stream(StreamConfig::default())?;
//! let id = engine.create_channel(ChannelRole::Publish)?;
//! engine.start(
//!     id,
//!     "webrtc://relay.example.com/live/cam",
//!     || println!("publishing"),
//!     |reason| eprintln!("publish failed: {}", reason),
//! );
//! # Ok::<(), strtc::RtcError>(())
//! ```
pub mod capture;
pub mod channel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod media;
pub mod render;
pub mod signaling;
pub mod types;
pub mod webrtc;

// Testing utilities - synthetic media engine and scripted signaling
pub mod testing;

// Re-exports for convenience
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder, EngineObserver, PEER_CONNECTION_FAILED};
pub use errors::{NegotiationError, RtcError, SignalingError};
pub use render::{FrameRenderer, ImageSurface, RenderSurface};
pub use types::{ChannelId, ChannelRole, ChannelState, SessionDescription, StreamConfig, StreamKind};

/// Initialize logging for the engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "strtc=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        camera_support: cfg!(feature = "camera"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub camera_support: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "strtc");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
