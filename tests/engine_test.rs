//! Engine API tests on the synthetic media engine and a scripted relay.
//!
//! Every test runs a real worker thread; only the media backend and the HTTP
//! transport are replaced.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strtc::media::{MediaEngine, MediaKind, MediaTrack, TransportState};
use strtc::testing::{synthetic_i420_frame, ScriptedTransport, SyntheticMediaEngine};
use strtc::{
    ChannelId, ChannelRole, ChannelState, Engine, EngineConfig, EngineObserver, ImageSurface,
    RtcError, StreamConfig, PEER_CONNECTION_FAILED,
};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Success,
    Failure(String),
}

#[derive(Default)]
struct RecordingObserver {
    errors: Mutex<Vec<(ChannelId, i32, String)>>,
}

impl EngineObserver for RecordingObserver {
    fn on_stream_error(&self, channel_id: ChannelId, code: i32, message: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((channel_id, code, message.to_string()));
    }
}

struct Harness {
    engine: Engine,
    media: Arc<SyntheticMediaEngine>,
    transport: Arc<ScriptedTransport>,
    observer: Arc<RecordingObserver>,
}

fn harness(transport: ScriptedTransport) -> Harness {
    let media = Arc::new(SyntheticMediaEngine::new());
    let transport = Arc::new(transport);
    let observer = Arc::new(RecordingObserver::default());

    let factory_media = media.clone();
    let engine = Engine::builder(EngineConfig::default())
        .media_engine(move |_| Ok(factory_media.clone() as Arc<dyn MediaEngine>))
        .transport(transport.clone())
        .observer(observer.clone())
        .build();
    engine.init().unwrap();

    Harness {
        engine,
        media,
        transport,
        observer,
    }
}

fn start(engine: &Engine, id: ChannelId, url: &str) -> Receiver<Outcome> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let failure_tx = tx.clone();
    engine.start(
        id,
        url,
        move || {
            let _ = tx.send(Outcome::Success);
        },
        move |e| {
            let _ = failure_tx.send(Outcome::Failure(e.to_string()));
        },
    );
    rx
}

fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_calls_before_init_fail() {
    let engine = Engine::new(EngineConfig::default());
    assert!(!engine.is_initialized());
    assert_eq!(
        engine.create_channel(ChannelRole::Subscribe),
        Err(RtcError::NotInitialized)
    );
    assert_eq!(
        engine.start_stream(StreamConfig::default()),
        Err(RtcError::NotInitialized)
    );
}

#[test]
fn test_double_init_is_rejected() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    assert_eq!(h.engine.init(), Err(RtcError::AlreadyInitialized));
}

#[test]
fn test_failing_media_engine_leaves_engine_uninitialized() {
    let engine = Engine::builder(EngineConfig::default())
        .media_engine(|_| Err(RtcError::Initialization("no backend".to_string())))
        .transport(Arc::new(ScriptedTransport::answering(0, "v=0")))
        .build();
    assert!(engine.init().is_err());
    assert!(!engine.is_initialized());
}

#[test]
fn test_publish_requires_local_stream() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));

    assert_eq!(
        h.engine.create_channel(ChannelRole::Publish),
        Err(RtcError::NoLocalStream)
    );
    assert!(h.engine.channel_ids().unwrap().is_empty());

    h.engine.start_stream(StreamConfig::default()).unwrap();
    assert_eq!(h.engine.create_channel(ChannelRole::Publish), Ok(ChannelId(1)));
}

#[test]
fn test_channel_ids_are_monotonic_and_never_reused() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));

    let first = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    let second = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    assert_eq!((first, second), (ChannelId(1), ChannelId(2)));

    h.engine.stop(first);
    h.engine.stop(second);
    let third = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    assert_eq!(third, ChannelId(3));
    assert_eq!(h.engine.channel_ids().unwrap(), vec![ChannelId(3)]);
    assert_eq!(h.engine.channel_state(first).unwrap(), None);
}

#[test]
fn test_accepted_offer_connects() {
    let h = harness(ScriptedTransport::answering(0, "v=0\r\ns=answer\r\n"));
    h.engine.start_stream(StreamConfig::default()).unwrap();
    let id = h.engine.create_channel(ChannelRole::Publish).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay.example.com/live/cam");
    assert_eq!(outcomes.recv_timeout(WAIT), Ok(Outcome::Success));
    assert_eq!(h.engine.channel_state(id).unwrap(), Some(ChannelState::Connected));

    let session = h.media.last_session().unwrap();
    assert_eq!(session.sending_track_ids().len(), 2);
    assert_eq!(
        session.remote_description().unwrap().sdp,
        "v=0\r\ns=answer\r\n"
    );
    let requests = h.transport.requests();
    assert_eq!(requests[0].url, "http://relay.example.com/rtc/v1/publish/");
    assert!(requests[0].json()["sdp"]
        .as_str()
        .unwrap()
        .starts_with("v=0"));
}

#[test]
fn test_rejected_offer_fails_with_reason() {
    let h = harness(ScriptedTransport::answering(1, ""));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay/live/missing");
    match outcomes.recv_timeout(WAIT) {
        Ok(Outcome::Failure(reason)) => assert!(!reason.is_empty()),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.engine.channel_state(id).unwrap(), Some(ChannelState::Failed));
}

#[test]
fn test_exactly_one_outcome_per_start() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert_eq!(outcomes.recv_timeout(WAIT), Ok(Outcome::Success));
    assert_eq!(
        outcomes.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn test_stop_before_response_suppresses_callbacks() {
    let h = harness(ScriptedTransport::answering(0, "v=0").gated());
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert!(h.transport.wait_for_requests(1, WAIT));

    h.engine.stop(id);
    assert_eq!(h.engine.channel_state(id).unwrap(), None);
    h.transport.release();

    assert_eq!(
        outcomes.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
    assert!(h.media.last_session().unwrap().is_closed());
}

#[test]
fn test_restart_cancels_in_flight_exchange() {
    let h = harness(ScriptedTransport::answering(0, "v=0").gated());
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let first = start(&h.engine, id, "webrtc://relay/live/cam");
    assert!(h.transport.wait_for_requests(1, WAIT));
    let second = start(&h.engine, id, "webrtc://relay/live/cam");
    assert!(h.transport.wait_for_requests(2, WAIT));

    match first.recv_timeout(WAIT) {
        Ok(Outcome::Failure(reason)) => assert!(reason.contains("superseded")),
        other => panic!("expected superseded failure, got {:?}", other),
    }
    assert!(wait_until(|| h.transport.in_flight() == 1));

    h.engine.stop(id);
    assert!(wait_until(|| h.transport.in_flight() == 0));
    assert_eq!(
        second.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn test_transport_failure_while_awaiting_answer() {
    let h = harness(ScriptedTransport::answering(0, "v=0").gated());
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert!(h.transport.wait_for_requests(1, WAIT));
    h.media
        .last_session()
        .unwrap()
        .emit_state(TransportState::Failed);

    match outcomes.recv_timeout(WAIT) {
        Ok(Outcome::Failure(reason)) => assert!(reason.contains("peer connection failed")),
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert!(wait_until(|| !h.observer.errors.lock().unwrap().is_empty()));
    assert_eq!(
        h.observer.errors.lock().unwrap().clone(),
        vec![(id, PEER_CONNECTION_FAILED, "peer connection failed".to_string())]
    );

    // the exchange is cancelled and nothing else fires
    assert!(wait_until(|| h.transport.in_flight() == 0));
    h.transport.release();
    assert_eq!(
        outcomes.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
    assert_eq!(h.engine.channel_state(id).unwrap(), Some(ChannelState::Failed));
}

#[test]
fn test_stopped_channel_cannot_be_restarted() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    h.engine.stop(id);

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert_eq!(
        outcomes.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.engine.channel_state(id).unwrap(), None);
}

#[test]
fn test_unreachable_relay_fails() {
    let h = harness(ScriptedTransport::unreachable());
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert!(matches!(
        outcomes.recv_timeout(WAIT),
        Ok(Outcome::Failure(_))
    ));
}

#[test]
fn test_unknown_channel_never_calls_back() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));

    let outcomes = start(&h.engine, ChannelId(42), "webrtc://relay/live/cam");
    assert_eq!(
        outcomes.recv_timeout(QUIET),
        Err(RecvTimeoutError::Disconnected)
    );
    assert_eq!(h.transport.request_count(), 0);
}

#[test]
fn test_stop_stream_only_removes_publish_channels() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    h.engine.start_stream(StreamConfig::default()).unwrap();

    let publish = h.engine.create_channel(ChannelRole::Publish).unwrap();
    let subscribe = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    h.engine.stop_stream().unwrap();
    assert_eq!(h.engine.channel_ids().unwrap(), vec![subscribe]);
    assert_eq!(h.engine.channel_state(publish).unwrap(), None);
    assert!(h.media.video_tracks()[0].is_stopped());
    assert_eq!(
        h.engine.create_channel(ChannelRole::Publish),
        Err(RtcError::NoLocalStream)
    );
}

#[test]
fn test_transport_failure_reaches_observer() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert_eq!(outcomes.recv_timeout(WAIT), Ok(Outcome::Success));

    let session = h.media.last_session().unwrap();
    session.emit_state(TransportState::Connected);
    session.emit_state(TransportState::Failed);

    assert!(wait_until(|| !h.observer.errors.lock().unwrap().is_empty()));
    let errors = h.observer.errors.lock().unwrap().clone();
    assert_eq!(
        errors,
        vec![(id, PEER_CONNECTION_FAILED, "peer connection failed".to_string())]
    );
    assert_eq!(h.engine.channel_state(id).unwrap(), Some(ChannelState::Failed));
}

#[test]
fn test_continuation_can_call_back_into_engine() {
    let h = Arc::new(harness(ScriptedTransport::answering(0, "v=0")));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();

    let (tx, rx) = crossbeam_channel::bounded(1);
    let inner = h.clone();
    h.engine.start(
        id,
        "webrtc://relay/live/cam",
        move || {
            let _ = tx.send(inner.engine.channel_state(id));
        },
        |e| panic!("unexpected failure: {}", e),
    );

    assert_eq!(rx.recv_timeout(WAIT), Ok(Ok(Some(ChannelState::Connected))));
}

#[test]
fn test_mute_local_video_stops_frames() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    h.engine.start_stream(StreamConfig::default()).unwrap();
    let surface = Arc::new(ImageSurface::new(64, 48));
    h.engine.set_local_video_render(surface.clone());
    // a blocking call orders the render request before the frames
    h.engine.channel_ids().unwrap();

    let track = h.media.video_tracks()[0].clone();
    let frame = synthetic_i420_frame(0, 32, 24).unwrap();
    track.push_frame(&frame);
    assert_eq!(surface.frames_presented(), 1);

    h.engine.mute_local_video(true);
    h.engine.channel_ids().unwrap();
    track.push_frame(&frame);
    assert_eq!(surface.frames_presented(), 1);

    h.engine.mute_local_video(false);
    h.engine.mute_local_audio(true);
    h.engine.channel_ids().unwrap();
    track.push_frame(&frame);
    assert_eq!(surface.frames_presented(), 2);
    assert!(!h.media.audio_tracks()[0].enabled());
}

#[test]
fn test_remote_video_is_rendered() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    let id = h.engine.create_channel(ChannelRole::Subscribe).unwrap();
    let surface = Arc::new(ImageSurface::new(80, 60));
    h.engine.set_remote_video_render(id, surface.clone());

    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert_eq!(outcomes.recv_timeout(WAIT), Ok(Outcome::Success));

    let session = h.media.last_session().unwrap();
    let remote = session.emit_remote_track(MediaKind::Video);
    assert!(wait_until(|| remote.sink_count() == 1));

    remote.push_frame(&synthetic_i420_frame(1, 40, 30).unwrap());
    assert_eq!(surface.frames_presented(), 1);
}

#[test]
fn test_shutdown_closes_everything() {
    let h = harness(ScriptedTransport::answering(0, "v=0"));
    h.engine.start_stream(StreamConfig::default()).unwrap();
    let id = h.engine.create_channel(ChannelRole::Publish).unwrap();
    let outcomes = start(&h.engine, id, "webrtc://relay/live/cam");
    assert_eq!(outcomes.recv_timeout(WAIT), Ok(Outcome::Success));

    h.engine.shutdown();
    assert!(!h.engine.is_initialized());
    assert!(h.media.last_session().unwrap().is_closed());
    assert!(h.media.video_tracks()[0].is_stopped());
    assert_eq!(
        h.engine.create_channel(ChannelRole::Subscribe),
        Err(RtcError::NotInitialized)
    );
}
