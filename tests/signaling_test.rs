//! Signaling exchange tests against an in-process relay.
//!
//! The relay is a small axum app bound to 127.0.0.1:0 that mimics the
//! publish/play RTC API: it answers `{"code": 0, "sdp": ...}` for offers on
//! stream names it knows and a non-zero code otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use strtc::config::EngineConfig;
use strtc::signaling::{derive_api_url, ReqwestTransport, SignalingClient, SignalingRequest};
use strtc::testing::ScriptedTransport;
use strtc::{ChannelRole, SessionDescription, SignalingError};

#[derive(Clone, Default)]
struct Relay {
    seen: Arc<Mutex<Vec<(String, SignalingRequest)>>>,
}

async fn answer(relay: Relay, kind: &str, request: SignalingRequest) -> Json<Value> {
    let known = request.streamurl.ends_with("/live/known");
    relay
        .seen
        .lock()
        .unwrap()
        .push((kind.to_string(), request));
    if known {
        Json(json!({ "code": 0, "server": "relay", "sdp": "v=0\r\ns=answer\r\n", "sessionid": "abc:def" }))
    } else {
        Json(json!({ "code": 400, "server": "relay" }))
    }
}

async fn serve_relay() -> (String, Relay) {
    let relay = Relay::default();
    let app = Router::new()
        .route(
            "/rtc/v1/publish/",
            post(|State(relay): State<Relay>, Json(req): Json<SignalingRequest>| async move {
                answer(relay, "publish", req).await
            }),
        )
        .route(
            "/rtc/v1/play/",
            post(|State(relay): State<Relay>, Json(req): Json<SignalingRequest>| async move {
                answer(relay, "play", req).await
            }),
        )
        .route("/broken/", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .with_state(relay.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.to_string(), relay)
}

fn http_client() -> SignalingClient {
    let config = EngineConfig::default().signaling;
    let transport = ReqwestTransport::new(&config).unwrap();
    SignalingClient::new(Arc::new(transport), config)
}

#[test]
fn test_api_url_derivation() {
    let config = EngineConfig::default().signaling;

    assert_eq!(
        derive_api_url("webrtc://relay.example.com/live/cam", ChannelRole::Publish, &config)
            .unwrap(),
        "http://relay.example.com/rtc/v1/publish/"
    );
    assert_eq!(
        derive_api_url("webrtc://127.0.0.1:1985/live/cam", ChannelRole::Subscribe, &config)
            .unwrap(),
        "http://127.0.0.1:1985/rtc/v1/play/"
    );
    assert!(matches!(
        derive_api_url("not a url", ChannelRole::Publish, &config),
        Err(SignalingError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_publish_roundtrip_against_relay() {
    let (addr, relay) = serve_relay().await;
    let url = format!("webrtc://{}/live/known", addr);

    let answer = http_client()
        .post(&url, &SessionDescription::offer("v=0\r\ns=offer\r\n"), ChannelRole::Publish)
        .await
        .unwrap();
    assert_eq!(answer, SessionDescription::answer("v=0\r\ns=answer\r\n"));

    let seen = relay.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (kind, request) = &seen[0];
    assert_eq!(kind, "publish");
    assert_eq!(request.api, format!("http://{}/rtc/v1/publish/", addr));
    assert_eq!(request.streamurl, url);
    assert_eq!(request.sdp, "v=0\r\ns=offer\r\n");
}

#[tokio::test]
async fn test_play_rejected_by_relay() {
    let (addr, relay) = serve_relay().await;
    let url = format!("webrtc://{}/live/unknown", addr);

    let result = http_client()
        .post(&url, &SessionDescription::offer("v=0"), ChannelRole::Subscribe)
        .await;
    assert_eq!(result, Err(SignalingError::Rejected { code: 400 }));
    assert_eq!(relay.seen.lock().unwrap()[0].0, "play");
}

#[tokio::test]
async fn test_http_error_status() {
    let (addr, _relay) = serve_relay().await;
    let mut config = EngineConfig::default().signaling;
    config.publish_path = "/broken/".to_string();
    let client = SignalingClient::new(Arc::new(ReqwestTransport::new(&config).unwrap()), config);

    let result = client
        .post(
            &format!("webrtc://{}/live/known", addr),
            &SessionDescription::offer("v=0"),
            ChannelRole::Publish,
        )
        .await;
    assert_eq!(result, Err(SignalingError::HttpStatus(500)));
}

#[tokio::test]
async fn test_unreachable_relay_is_transport_error() {
    // bind and drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = http_client()
        .post(
            &format!("webrtc://{}/live/known", addr),
            &SessionDescription::offer("v=0"),
            ChannelRole::Publish,
        )
        .await;
    assert!(matches!(result, Err(SignalingError::Transport(_))));
}

#[tokio::test]
async fn test_concurrent_exchanges_are_independent() {
    let (addr, relay) = serve_relay().await;
    let client = http_client();
    let known = format!("webrtc://{}/live/known", addr);
    let unknown = format!("webrtc://{}/live/unknown", addr);
    let offer = SessionDescription::offer("v=0");

    let results = futures::future::join_all([
        client.post(&known, &offer, ChannelRole::Publish),
        client.post(&unknown, &offer, ChannelRole::Subscribe),
        client.post(&known, &offer, ChannelRole::Subscribe),
    ])
    .await;

    assert!(results[0].is_ok());
    assert_eq!(results[1], Err(SignalingError::Rejected { code: 400 }));
    assert!(results[2].is_ok());
    assert_eq!(relay.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_request_body_fields() {
    let transport = Arc::new(ScriptedTransport::answering(0, "v=0 answer"));
    let client = SignalingClient::new(transport.clone(), EngineConfig::default().signaling);

    client
        .post(
            "webrtc://relay:8080/live/cam?vhost=demo",
            &SessionDescription::offer("v=0 offer"),
            ChannelRole::Publish,
        )
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://relay:8080/rtc/v1/publish/?vhost=demo");
    let body = requests[0].json();
    assert_eq!(body["api"], "http://relay:8080/rtc/v1/publish/?vhost=demo");
    assert_eq!(body["sdp"], "v=0 offer");
    assert_eq!(body["streamurl"], "webrtc://relay:8080/live/cam?vhost=demo");
}

#[tokio::test]
async fn test_missing_code_and_missing_sdp() {
    let transport = Arc::new(ScriptedTransport::responding(200, r#"{"sdp":"v=0"}"#));
    let client = SignalingClient::new(transport, EngineConfig::default().signaling);
    let result = client
        .post("webrtc://relay/live/cam", &SessionDescription::offer("v=0"), ChannelRole::Publish)
        .await;
    assert!(matches!(result, Err(SignalingError::MalformedResponse(_))));

    let transport = Arc::new(ScriptedTransport::responding(200, r#"{"code":0}"#));
    let client = SignalingClient::new(transport, EngineConfig::default().signaling);
    let result = client
        .post("webrtc://relay/live/cam", &SessionDescription::offer("v=0"), ChannelRole::Publish)
        .await;
    assert_eq!(result, Err(SignalingError::MissingSdp));
}
