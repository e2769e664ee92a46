//! Per-session negotiation state machine.
//!
//! A [`Channel`] owns one media-engine session and drives it through
//! `Idle -> NegotiatingLocal -> AwaitingSignaling -> ApplyingRemote -> Connected`.
//! Each `start()` stores one [`Completion`]; exactly one of its two halves runs
//! per attempt unless the channel is stopped first, in which case neither does.
//! Results and session events carry the attempt number they belong to, and
//! anything from an older attempt or a closed channel is dropped. At most one
//! signaling exchange runs per channel.

use crate::errors::{NegotiationError, RtcError, SignalingError};
use crate::media::engine::{MediaEngine, MediaSession, SessionEventSink, TransportState};
use crate::media::track::{MediaKind, MediaTrack, TrackSet, VideoSink};
use crate::render::FrameRenderer;
use crate::types::{ChannelId, ChannelRole, ChannelState, SessionDescription};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Runs a continuation somewhere other than the caller's stack.
pub type CallbackRunner = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// Runner that invokes continuations inline.
pub fn inline_runner() -> CallbackRunner {
    Arc::new(|callback: Box<dyn FnOnce() + Send>| callback())
}

/// Success/failure continuation pair for one `start()`.
pub struct Completion {
    on_success: Box<dyn FnOnce() + Send>,
    on_failure: Box<dyn FnOnce(RtcError) + Send>,
}

impl Completion {
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce(RtcError) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }

    pub fn succeed(self) {
        (self.on_success)()
    }

    pub fn fail(self, error: RtcError) {
        (self.on_failure)(error)
    }
}

/// Offer waiting to be posted to the signaling server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    pub attempt: u64,
    pub url: String,
    pub role: ChannelRole,
    pub offer: SessionDescription,
}

pub struct Channel {
    id: ChannelId,
    role: ChannelRole,
    state: ChannelState,
    local_tracks: TrackSet,
    session: Option<Arc<dyn MediaSession>>,
    remote_renderer: Option<Arc<FrameRenderer>>,
    pending: Option<Completion>,
    attempt: u64,
    url: Option<String>,
    local_apply_error: Option<NegotiationError>,
    exchange: Option<AbortHandle>,
    runner: CallbackRunner,
}

impl Channel {
    /// `local_tracks` is empty for subscribe channels.
    pub fn new(
        id: ChannelId,
        role: ChannelRole,
        local_tracks: TrackSet,
        runner: CallbackRunner,
    ) -> Self {
        log::debug!("Channel {} created ({})", id, role);
        Self {
            id,
            role,
            state: ChannelState::Idle,
            local_tracks,
            session: None,
            remote_renderer: None,
            pending: None,
            attempt: 0,
            url: None,
            local_apply_error: None,
            exchange: None,
            runner,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Number of the current negotiation attempt (0 before the first start).
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Failure to apply the local description during the current attempt.
    /// Negotiation continues past it.
    pub fn local_apply_error(&self) -> Option<&NegotiationError> {
        self.local_apply_error.as_ref()
    }

    pub fn session(&self) -> Option<&Arc<dyn MediaSession>> {
        self.session.as_ref()
    }

    /// Remember the task posting the current offer. It is aborted when the
    /// attempt is superseded, fails on the transport, or the channel stops.
    pub fn track_exchange(&mut self, handle: AbortHandle) {
        self.cancel_exchange();
        self.exchange = Some(handle);
    }

    fn cancel_exchange(&mut self) {
        if let Some(handle) = self.exchange.take() {
            if !handle.is_finished() {
                log::debug!(
                    "Channel {} cancelling signaling for attempt {}",
                    self.id,
                    self.attempt
                );
            }
            handle.abort();
        }
    }

    /// Build the session and local offer for a new attempt.
    ///
    /// Returns the offer to post when the local steps succeed. Otherwise the
    /// completion has already been failed and `None` is returned. Any exchange
    /// still running for the previous attempt is cancelled first.
    pub async fn start<E>(
        &mut self,
        url: &str,
        completion: Completion,
        media: &dyn MediaEngine,
        make_events: E,
    ) -> Option<PendingSignal>
    where
        E: FnOnce(u64) -> Arc<dyn SessionEventSink>,
    {
        self.cancel_exchange();
        if let Some(previous) = self.pending.take() {
            log::warn!(
                "Channel {} restarted while attempt {} was pending",
                self.id,
                self.attempt
            );
            (self.runner)(Box::new(move || {
                previous.fail(NegotiationError::Superseded.into())
            }));
        }
        self.release_session().await;

        self.attempt += 1;
        self.url = Some(url.to_string());
        self.local_apply_error = None;
        self.pending = Some(completion);
        self.state = ChannelState::NegotiatingLocal;
        log::info!(
            "Channel {} starting {} of {} (attempt {})",
            self.id,
            self.role,
            url,
            self.attempt
        );

        let session = match media.create_session(self.role, make_events(self.attempt)).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("create peer connection failed: {}", e);
                self.fail(NegotiationError::CreateSession(e.to_string()).into());
                return None;
            }
        };
        self.session = Some(session.clone());

        if let Err(e) = self.add_media(session.as_ref()).await {
            log::error!("Channel {} failed to add media: {}", self.id, e);
            self.fail(NegotiationError::CreateSession(e.to_string()).into());
            return None;
        }

        let offer = match session.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                log::error!("create session failed: {}", e);
                self.fail(NegotiationError::CreateOffer(e.to_string()).into());
                return None;
            }
        };

        self.state = ChannelState::AwaitingSignaling;
        if let Err(e) = session.set_local_description(offer.clone()).await {
            log::warn!("set local session failed: {}", e);
            self.local_apply_error = Some(NegotiationError::LocalDescription(e.to_string()));
        }

        Some(PendingSignal {
            attempt: self.attempt,
            url: url.to_string(),
            role: self.role,
            offer,
        })
    }

    async fn add_media(&self, session: &dyn MediaSession) -> Result<(), RtcError> {
        match self.role {
            ChannelRole::Publish => {
                for track in self.local_tracks.iter() {
                    session.add_track(track.clone()).await?;
                }
            }
            ChannelRole::Subscribe => {
                session.add_recv_only(MediaKind::Audio).await?;
                session.add_recv_only(MediaKind::Video).await?;
            }
        }
        Ok(())
    }

    /// Feed back the signaling result for `attempt`. Stale results are dropped.
    pub async fn on_signaling_result(
        &mut self,
        attempt: u64,
        result: Result<SessionDescription, SignalingError>,
    ) {
        if attempt != self.attempt || self.state != ChannelState::AwaitingSignaling {
            log::debug!(
                "Channel {} discarding signaling result for attempt {} (current {}, {:?})",
                self.id,
                attempt,
                self.attempt,
                self.state
            );
            return;
        }
        self.exchange = None;

        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };

        let Some(session) = self.session.clone() else {
            self.fail(NegotiationError::ChannelClosed.into());
            return;
        };

        self.state = ChannelState::ApplyingRemote;
        match session.set_remote_description(answer).await {
            Ok(()) => {
                log::info!("Channel {} connected ({})", self.id, self.role);
                self.state = ChannelState::Connected;
                self.attach_remote_renderer();
                if let Some(completion) = self.pending.take() {
                    (self.runner)(Box::new(move || completion.succeed()));
                }
            }
            Err(e) => {
                log::error!("set remote session failed: {}", e);
                self.fail(NegotiationError::RemoteDescription(e.to_string()).into());
            }
        }
    }

    /// Apply a transport state change. Returns true when the change must be
    /// reported to the engine observer as a stream error.
    pub fn on_transport_state(&mut self, attempt: u64, state: TransportState) -> bool {
        if attempt != self.attempt || self.state == ChannelState::Closed {
            return false;
        }

        match state {
            TransportState::Connected => {
                log::info!("Channel {} transport connected", self.id);
                false
            }
            TransportState::Failed => {
                log::error!("Channel {}: peer connection failed", self.id);
                self.cancel_exchange();
                self.fail(NegotiationError::TransportFailed.into());
                true
            }
            other => {
                log::debug!("Channel {} transport {:?}", self.id, other);
                false
            }
        }
    }

    /// A remote track appeared on the session of `attempt`.
    pub fn on_remote_track(&mut self, attempt: u64, track: Arc<dyn MediaTrack>) {
        if attempt != self.attempt || self.state == ChannelState::Closed {
            return;
        }
        log::info!(
            "Channel {} received remote {:?} track {}",
            self.id,
            track.kind(),
            track.id()
        );
        if let (MediaKind::Video, Some(renderer)) = (track.kind(), &self.remote_renderer) {
            track.add_or_update_sink(renderer.clone());
        }
    }

    /// Bind `renderer` to the remote video tracks, replacing any previous one.
    pub fn set_remote_renderer(&mut self, renderer: Arc<FrameRenderer>) {
        self.detach_remote_renderer();
        self.remote_renderer = Some(renderer);
        self.attach_remote_renderer();
    }

    pub fn remote_renderer(&self) -> Option<&Arc<FrameRenderer>> {
        self.remote_renderer.as_ref()
    }

    /// Close the channel from any state. A pending completion is dropped
    /// without running. The engine forgets a channel once it is stopped.
    pub async fn stop(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        self.cancel_exchange();
        if self.pending.take().is_some() {
            log::info!(
                "Channel {} stopped with attempt {} unresolved",
                self.id,
                self.attempt
            );
        }
        self.state = ChannelState::Closed;
        self.release_session().await;
        self.remote_renderer = None;
        log::info!("Channel {} closed", self.id);
    }

    async fn release_session(&mut self) {
        self.detach_remote_renderer();
        if let Some(session) = self.session.take() {
            if let Err(e) = session.remove_tracks().await {
                log::warn!("Channel {} failed to remove senders: {}", self.id, e);
            }
            if let Err(e) = session.close().await {
                log::warn!("Channel {} failed to close session: {}", self.id, e);
            }
        }
    }

    fn attach_remote_renderer(&self) {
        if let (Some(session), Some(renderer)) = (&self.session, &self.remote_renderer) {
            for track in session.remote_video_tracks() {
                track.add_or_update_sink(renderer.clone());
            }
        }
    }

    fn detach_remote_renderer(&self) {
        if let (Some(session), Some(renderer)) = (&self.session, &self.remote_renderer) {
            for track in session.remote_video_tracks() {
                track.remove_sink(renderer.id());
            }
        }
    }

    fn fail(&mut self, error: RtcError) {
        self.state = ChannelState::Failed;
        if let Some(completion) = self.pending.take() {
            log::warn!("Channel {} attempt {} failed: {}", self.id, self.attempt, error);
            (self.runner)(Box::new(move || completion.fail(error)));
        }
    }
}
