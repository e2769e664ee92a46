//! The serialized worker: one OS thread running a command loop that owns
//! every channel, the local stream and the media engine.

use super::EngineObserver;
use crate::channel::{CallbackRunner, Channel, Completion, PendingSignal};
use crate::config::EngineConfig;
use crate::errors::{RtcError, SignalingError};
use crate::media::engine::{MediaEngine, SessionEventSink, TransportState};
use crate::media::stream::MediaStream;
use crate::media::track::{MediaKind, MediaTrack, TrackSet};
use crate::render::{FrameRenderer, RenderSurface};
use crate::signaling::SignalingClient;
use crate::types::{ChannelId, ChannelRole, ChannelState, SessionDescription, StreamConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;

/// Code reported to the observer when a session's transport fails.
pub const PEER_CONNECTION_FAILED: i32 = 0;

pub(crate) type Reply<T> = crossbeam_channel::Sender<T>;

/// Asynchronous notification from a session, tagged by the worker.
pub(crate) enum SessionEvent {
    State(TransportState),
    RemoteTrack(Arc<dyn MediaTrack>),
}

pub(crate) enum Command {
    StartStream {
        config: StreamConfig,
        reply: Reply<Result<(), RtcError>>,
    },
    StopStream {
        reply: Reply<()>,
    },
    CreateChannel {
        role: ChannelRole,
        reply: Reply<Result<ChannelId, RtcError>>,
    },
    Start {
        id: ChannelId,
        url: String,
        completion: Completion,
    },
    Stop {
        id: ChannelId,
    },
    SetLocalVideoRender {
        surface: Arc<dyn RenderSurface>,
    },
    SetRemoteVideoRender {
        id: ChannelId,
        surface: Arc<dyn RenderSurface>,
    },
    MuteLocal {
        kind: MediaKind,
        mute: bool,
    },
    ChannelState {
        id: ChannelId,
        reply: Reply<Option<ChannelState>>,
    },
    ChannelIds {
        reply: Reply<Vec<ChannelId>>,
    },
    SignalingComplete {
        id: ChannelId,
        attempt: u64,
        result: Result<SessionDescription, SignalingError>,
    },
    Session {
        id: ChannelId,
        attempt: u64,
        event: SessionEvent,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Running worker thread and the queue feeding it.
pub(crate) struct WorkerHandle {
    pub(crate) commands: UnboundedSender<Command>,
    pub(crate) thread_id: ThreadId,
    pub(crate) thread: Option<JoinHandle<()>>,
}

/// Forwards one session's events into the command queue.
struct ChannelEvents {
    id: ChannelId,
    attempt: u64,
    commands: UnboundedSender<Command>,
}

impl ChannelEvents {
    fn post(&self, event: SessionEvent) {
        let command = Command::Session {
            id: self.id,
            attempt: self.attempt,
            event,
        };
        if self.commands.send(command).is_err() {
            log::debug!("Worker gone, dropping event for channel {}", self.id);
        }
    }
}

impl SessionEventSink for ChannelEvents {
    fn on_state_change(&self, state: TransportState) {
        self.post(SessionEvent::State(state));
    }

    fn on_remote_track(&self, track: Arc<dyn MediaTrack>) {
        self.post(SessionEvent::RemoteTrack(track));
    }
}

/// State owned by the command loop.
pub(crate) struct EngineCore {
    config: EngineConfig,
    media: Arc<dyn MediaEngine>,
    signaling: SignalingClient,
    observer: Option<Arc<dyn EngineObserver>>,
    commands: UnboundedSender<Command>,
    runner: CallbackRunner,
    stream: Option<MediaStream>,
    local_surface: Option<Arc<dyn RenderSurface>>,
    channels: BTreeMap<ChannelId, Channel>,
    next_id: u32,
}

impl EngineCore {
    pub(crate) fn new(
        config: EngineConfig,
        media: Arc<dyn MediaEngine>,
        signaling: SignalingClient,
        observer: Option<Arc<dyn EngineObserver>>,
        commands: UnboundedSender<Command>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        // continuations and observer calls leave the loop so they can call
        // back into the engine
        let runner: CallbackRunner = Arc::new(move |callback: Box<dyn FnOnce() + Send>| {
            runtime.spawn_blocking(callback);
        });

        Self {
            config,
            media,
            signaling,
            observer,
            commands,
            runner,
            stream: None,
            local_surface: None,
            channels: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        log::debug!("Worker loop started");
        while let Some(command) = commands.recv().await {
            if let Command::Shutdown { reply } = command {
                self.teardown().await;
                let _ = reply.send(());
                log::debug!("Worker loop shut down");
                return;
            }
            self.handle(command).await;
        }
        // every sender dropped without a shutdown
        self.teardown().await;
        log::debug!("Worker loop finished");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::StartStream { config, reply } => {
                let _ = reply.send(self.start_stream(config));
            }
            Command::StopStream { reply } => {
                self.stop_stream().await;
                let _ = reply.send(());
            }
            Command::CreateChannel { role, reply } => {
                let _ = reply.send(self.create_channel(role));
            }
            Command::Start {
                id,
                url,
                completion,
            } => self.start(id, url, completion).await,
            Command::Stop { id } => self.stop(id).await,
            Command::SetLocalVideoRender { surface } => self.set_local_video_render(surface),
            Command::SetRemoteVideoRender { id, surface } => {
                match self.channels.get_mut(&id) {
                    Some(channel) => channel.set_remote_renderer(Arc::new(FrameRenderer::new(
                        surface,
                        self.config.render.fill_color,
                    ))),
                    None => log::warn!("set_remote_video_render: no channel {}", id),
                }
            }
            Command::MuteLocal { kind, mute } => self.mute_local(kind, mute),
            Command::ChannelState { id, reply } => {
                let _ = reply.send(self.channels.get(&id).map(Channel::state));
            }
            Command::ChannelIds { reply } => {
                let _ = reply.send(self.channels.keys().copied().collect());
            }
            Command::SignalingComplete {
                id,
                attempt,
                result,
            } => match self.channels.get_mut(&id) {
                Some(channel) => channel.on_signaling_result(attempt, result).await,
                None => log::debug!("Discarding signaling result for removed channel {}", id),
            },
            Command::Session { id, attempt, event } => self.session_event(id, attempt, event),
            // handled by the loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn start_stream(&mut self, config: StreamConfig) -> Result<(), RtcError> {
        if let Some(mut previous) = self.stream.take() {
            log::info!("Replacing the local stream");
            previous.stop();
        }

        let mut stream = MediaStream::new(config);
        stream.start(self.media.as_ref()).map_err(|e| {
            log::error!("Failed to start local stream: {}", e);
            e
        })?;

        if let Some(surface) = &self.local_surface {
            stream.set_video_render(surface.clone(), self.config.render.fill_color);
        }
        self.stream = Some(stream);
        log::info!("Local stream started");
        Ok(())
    }

    async fn stop_stream(&mut self) {
        let publish: Vec<ChannelId> = self
            .channels
            .values()
            .filter(|c| c.role() == ChannelRole::Publish)
            .map(Channel::id)
            .collect();
        for id in publish {
            self.stop(id).await;
        }

        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::info!("Local stream stopped");
        }
    }

    fn create_channel(&mut self, role: ChannelRole) -> Result<ChannelId, RtcError> {
        let tracks = match role {
            ChannelRole::Publish => match &self.stream {
                Some(stream) => stream.tracks(),
                None => {
                    log::error!("Cannot create a publish channel without a local stream");
                    return Err(RtcError::NoLocalStream);
                }
            },
            ChannelRole::Subscribe => TrackSet::default(),
        };

        let id = ChannelId(self.next_id);
        self.next_id += 1;
        self.channels
            .insert(id, Channel::new(id, role, tracks, self.runner.clone()));
        log::info!("Created {} channel {}", role, id);
        Ok(id)
    }

    async fn start(&mut self, id: ChannelId, url: String, completion: Completion) {
        let Some(channel) = self.channels.get_mut(&id) else {
            log::error!("start: no channel {}", id);
            return;
        };

        let commands = self.commands.clone();
        let signal = channel
            .start(&url, completion, self.media.as_ref(), |attempt| {
                Arc::new(ChannelEvents {
                    id,
                    attempt,
                    commands,
                }) as Arc<dyn SessionEventSink>
            })
            .await;

        if let Some(signal) = signal {
            let exchange =
                Self::spawn_signaling(self.signaling.clone(), self.commands.clone(), id, signal);
            channel.track_exchange(exchange);
        }
    }

    /// Post the offer off the loop. The returned handle cancels the request.
    fn spawn_signaling(
        client: SignalingClient,
        commands: UnboundedSender<Command>,
        id: ChannelId,
        signal: PendingSignal,
    ) -> AbortHandle {
        let task = tokio::spawn(async move {
            let result = client.post(&signal.url, &signal.offer, signal.role).await;
            let complete = Command::SignalingComplete {
                id,
                attempt: signal.attempt,
                result,
            };
            if commands.send(complete).is_err() {
                log::debug!("Worker gone before signaling for channel {} finished", id);
            }
        });
        task.abort_handle()
    }

    async fn stop(&mut self, id: ChannelId) {
        match self.channels.remove(&id) {
            Some(mut channel) => channel.stop().await,
            None => log::warn!("stop: no channel {}", id),
        }
    }

    fn set_local_video_render(&mut self, surface: Arc<dyn RenderSurface>) {
        if let Some(stream) = self.stream.as_mut() {
            stream.set_video_render(surface.clone(), self.config.render.fill_color);
        }
        self.local_surface = Some(surface);
    }

    fn mute_local(&mut self, kind: MediaKind, mute: bool) {
        let Some(stream) = &self.stream else {
            log::debug!("mute {:?}: no local stream", kind);
            return;
        };
        match kind {
            MediaKind::Audio => stream.set_audio_enabled(!mute),
            MediaKind::Video => stream.set_video_enabled(!mute),
        }
        log::info!("Local {:?} {}", kind, if mute { "muted" } else { "unmuted" });
    }

    fn session_event(&mut self, id: ChannelId, attempt: u64, event: SessionEvent) {
        let Some(channel) = self.channels.get_mut(&id) else {
            return;
        };
        match event {
            SessionEvent::State(state) => {
                if channel.on_transport_state(attempt, state) {
                    if let Some(observer) = self.observer.clone() {
                        (self.runner)(Box::new(move || {
                            observer.on_stream_error(
                                id,
                                PEER_CONNECTION_FAILED,
                                "peer connection failed",
                            )
                        }));
                    }
                }
            }
            SessionEvent::RemoteTrack(track) => channel.on_remote_track(attempt, track),
        }
    }

    async fn teardown(&mut self) {
        let ids: Vec<ChannelId> = self.channels.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.local_surface = None;
    }
}
