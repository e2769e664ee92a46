use thiserror::Error;

/// Top-level error for engine, stream and channel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RtcError {
    #[error("Engine initialization error: {0}")]
    Initialization(String),
    #[error("Engine is not initialized")]
    NotInitialized,
    #[error("Engine is already initialized")]
    AlreadyInitialized,
    #[error("No local stream: start a stream before creating a publish channel")]
    NoLocalStream,
    #[error("Capture error: {0}")]
    Capture(String),
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("Media engine error: {0}")]
    Media(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Failure of one HTTP signaling exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("url has no host: {0}")]
    InvalidUrl(String),
    #[error("request signaling server failed: {0}")]
    Transport(String),
    #[error("signaling server answered with HTTP status {0}")]
    HttpStatus(u16),
    #[error("malformed signaling response: {0}")]
    MalformedResponse(String),
    #[error("signaling server rejected the offer with code {code}")]
    Rejected { code: i64 },
    #[error("signaling response carries no sdp")]
    MissingSdp,
}

impl SignalingError {
    /// Result code of the exchange: the server's own code when it rejected the
    /// offer, `-1` for everything that failed before a code was read.
    pub fn code(&self) -> i64 {
        match self {
            SignalingError::Rejected { code } => *code,
            _ => -1,
        }
    }
}

/// Failure while driving the media-engine session through an offer/answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("create peer connection failed: {0}")]
    CreateSession(String),
    #[error("create session failed: {0}")]
    CreateOffer(String),
    #[error("set local session failed: {0}")]
    LocalDescription(String),
    #[error("set remote session failed: {0}")]
    RemoteDescription(String),
    #[error("negotiation superseded by a newer start")]
    Superseded,
    #[error("peer connection failed")]
    TransportFailed,
    #[error("channel is closed")]
    ChannelClosed,
}
