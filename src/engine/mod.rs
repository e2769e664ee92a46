//! Process-wide session API.
//!
//! Every operation that touches channels or the local stream is executed by
//! the engine's worker. Calls returning a value block the caller until the
//! worker has run them; the rest are queued and return immediately.

pub mod worker;

pub use worker::PEER_CONNECTION_FAILED;

use crate::channel::Completion;
use crate::config::EngineConfig;
use crate::errors::RtcError;
use crate::media::engine::MediaEngine;
use crate::media::track::MediaKind;
use crate::render::RenderSurface;
use crate::signaling::{HttpTransport, ReqwestTransport, SignalingClient};
use crate::types::{ChannelId, ChannelRole, ChannelState, StreamConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use worker::{Command, EngineCore, WorkerHandle};

/// Receives asynchronous failures not tied to a pending `start()`.
pub trait EngineObserver: Send + Sync {
    fn on_stream_error(&self, channel_id: ChannelId, code: i32, message: &str);
}

/// Builds the media engine on the worker thread during `init()`.
pub type MediaEngineFactory =
    Arc<dyn Fn(&EngineConfig) -> Result<Arc<dyn MediaEngine>, RtcError> + Send + Sync>;

pub struct EngineBuilder {
    config: EngineConfig,
    observer: Option<Arc<dyn EngineObserver>>,
    factory: Option<MediaEngineFactory>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl EngineBuilder {
    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Media engine used by `init()`. Defaults to the webrtc backend.
    pub fn media_engine<F>(mut self, factory: F) -> Self
    where
        F: Fn(&EngineConfig) -> Result<Arc<dyn MediaEngine>, RtcError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// HTTP transport for signaling. Defaults to reqwest.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            config: self.config,
            observer: self.observer,
            factory: self.factory.unwrap_or_else(|| {
                Arc::new(crate::webrtc::WebRtcEngine::factory) as MediaEngineFactory
            }),
            transport: self.transport,
            worker: Mutex::new(None),
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    observer: Option<Arc<dyn EngineObserver>>,
    factory: MediaEngineFactory,
    transport: Option<Arc<dyn HttpTransport>>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            observer: None,
            factory: None,
            transport: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// Start the worker, the signaling transport and the media engine. On
    /// failure nothing is left running.
    pub fn init(&self) -> Result<(), RtcError> {
        let mut slot = self.lock_worker();
        if slot.is_some() {
            return Err(RtcError::AlreadyInitialized);
        }

        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(&self.config.signaling)?),
        };
        let signaling = SignalingClient::new(transport, self.config.signaling.clone());

        let (commands, receiver) = tokio::sync::mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), RtcError>>(1);

        let config = self.config.clone();
        let factory = self.factory.clone();
        let observer = self.observer.clone();
        let loop_commands = commands.clone();

        let thread = std::thread::Builder::new()
            .name("strtc-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("strtc-media")
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(RtcError::Initialization(format!(
                            "Failed to build runtime: {}",
                            e
                        ))));
                        return;
                    }
                };

                let media = {
                    let _guard = runtime.enter();
                    match factory(&config) {
                        Ok(media) => media,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    }
                };

                let core = EngineCore::new(
                    config,
                    media,
                    signaling,
                    observer,
                    loop_commands,
                    runtime.handle().clone(),
                );
                let _ = ready_tx.send(Ok(()));
                runtime.block_on(core.run(receiver));
                runtime.shutdown_timeout(Duration::from_secs(1));
            })
            .map_err(|e| RtcError::Initialization(format!("Failed to spawn worker: {}", e)))?;

        let thread_id = thread.thread().id();
        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(RtcError::Initialization(
                "Worker exited during startup".to_string(),
            ))
        });

        if let Err(e) = ready {
            let _ = thread.join();
            log::error!("Engine initialization failed: {}", e);
            return Err(e);
        }

        *slot = Some(WorkerHandle {
            commands,
            thread_id,
            thread: Some(thread),
        });
        log::info!("Engine initialized");
        Ok(())
    }

    /// Build the local stream, replacing any previous one.
    pub fn start_stream(&self, config: StreamConfig) -> Result<(), RtcError> {
        self.call(|reply| Command::StartStream { config, reply })?
    }

    /// Stop every publish channel, then release the local stream.
    pub fn stop_stream(&self) -> Result<(), RtcError> {
        self.call(|reply| Command::StopStream { reply })
    }

    /// Allocate a channel. Publish channels need a local stream.
    pub fn create_channel(&self, role: ChannelRole) -> Result<ChannelId, RtcError> {
        self.call(|reply| Command::CreateChannel { role, reply })?
    }

    /// Negotiate channel `id` against `url`. Exactly one of the callbacks runs
    /// unless the channel is stopped first. Callbacks run on a worker pool
    /// thread and may call back into the engine. An unknown id is logged and
    /// neither callback runs.
    pub fn start<S, F>(&self, id: ChannelId, url: &str, on_success: S, on_failure: F)
    where
        S: FnOnce() + Send + 'static,
        F: FnOnce(RtcError) + Send + 'static,
    {
        self.post(Command::Start {
            id,
            url: url.to_string(),
            completion: Completion::new(on_success, on_failure),
        });
    }

    /// Close channel `id`, discarding any outcome still pending.
    pub fn stop(&self, id: ChannelId) {
        self.post(Command::Stop { id });
    }

    pub fn set_local_video_render(&self, surface: Arc<dyn RenderSurface>) {
        self.post(Command::SetLocalVideoRender { surface });
    }

    pub fn set_remote_video_render(&self, id: ChannelId, surface: Arc<dyn RenderSurface>) {
        self.post(Command::SetRemoteVideoRender { id, surface });
    }

    pub fn mute_local_audio(&self, mute: bool) {
        self.post(Command::MuteLocal {
            kind: MediaKind::Audio,
            mute,
        });
    }

    pub fn mute_local_video(&self, mute: bool) {
        self.post(Command::MuteLocal {
            kind: MediaKind::Video,
            mute,
        });
    }

    /// State of channel `id`, or `None` once it has been stopped.
    pub fn channel_state(&self, id: ChannelId) -> Result<Option<ChannelState>, RtcError> {
        self.call(|reply| Command::ChannelState { id, reply })
    }

    /// Live channel ids in ascending order.
    pub fn channel_ids(&self) -> Result<Vec<ChannelId>, RtcError> {
        self.call(|reply| Command::ChannelIds { reply })
    }

    /// Stop every channel and the local stream, then join the worker.
    pub fn shutdown(&self) {
        let Some(mut handle) = self.lock_worker().take() else {
            return;
        };

        let on_worker = std::thread::current().id() == handle.thread_id;
        let (reply, done) = crossbeam_channel::bounded(1);
        if handle.commands.send(Command::Shutdown { reply }).is_ok() && !on_worker {
            let _ = done.recv();
        }
        if let Some(thread) = handle.thread.take() {
            if !on_worker && thread.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
        log::info!("Engine shut down");
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, command: Command) {
        let sent = match self.lock_worker().as_ref() {
            Some(handle) => handle.commands.send(command).is_ok(),
            None => false,
        };
        if !sent {
            log::error!("Engine is not running, dropping request");
        }
    }

    fn call<T, M>(&self, make: M) -> Result<T, RtcError>
    where
        M: FnOnce(crossbeam_channel::Sender<T>) -> Command,
    {
        let (reply, response) = crossbeam_channel::bounded(1);
        {
            let guard = self.lock_worker();
            let handle = guard.as_ref().ok_or(RtcError::NotInitialized)?;
            if std::thread::current().id() == handle.thread_id {
                return Err(RtcError::Worker(
                    "blocking engine call from the worker thread".to_string(),
                ));
            }
            handle
                .commands
                .send(make(reply))
                .map_err(|_| RtcError::Worker("worker stopped".to_string()))?;
        }
        response
            .recv()
            .map_err(|_| RtcError::Worker("worker dropped the request".to_string()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
