//! HTTP signaling: one JSON POST per negotiation carrying the local offer,
//! answered by the relay with its own session description.

use crate::config::SignalingConfig;
use crate::errors::{RtcError, SignalingError};
use crate::types::{ChannelRole, SessionDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Request envelope posted to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingRequest {
    /// The derived API url the request is posted to.
    pub api: String,
    /// Local session description text.
    pub sdp: String,
    /// The stream url the caller asked for.
    pub streamurl: String,
}

/// Response envelope returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingResponse {
    pub code: Option<i64>,
    #[serde(default)]
    pub sdp: Option<String>,
    #[serde(default)]
    pub sessionid: Option<String>,
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal HTTP primitive used by the signaling client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, SignalingError>;
}

/// `HttpTransport` on a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &SignalingConfig) -> Result<Self, RtcError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| RtcError::Initialization(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, SignalingError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SignalingError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SignalingError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Derive the relay API url for `stream_url`: `http://<host[:port]>` plus the
/// role's path, with the stream url's query string carried over.
pub fn derive_api_url(
    stream_url: &str,
    role: ChannelRole,
    config: &SignalingConfig,
) -> Result<String, SignalingError> {
    let parsed = Url::parse(stream_url)
        .map_err(|e| SignalingError::InvalidUrl(format!("{}: {}", stream_url, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SignalingError::InvalidUrl(stream_url.to_string()))?;

    let path = match role {
        ChannelRole::Publish => &config.publish_path,
        ChannelRole::Subscribe => &config.play_path,
    };

    let mut api = match parsed.port() {
        Some(port) => format!("http://{}:{}{}", host, port, path),
        None => format!("http://{}{}", host, path),
    };
    if let Some(query) = parsed.query() {
        api.push('?');
        api.push_str(query);
    }
    Ok(api)
}

/// Interpret a relay response body. Success requires a JSON object with
/// `code == 0` and an `sdp` string.
pub fn parse_response(body: &str) -> Result<SessionDescription, SignalingError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SignalingError::MalformedResponse(format!("invalid json: {}", e)))?;
    if !value.is_object() {
        return Err(SignalingError::MalformedResponse(
            "response is not a json object".to_string(),
        ));
    }

    let response: SignalingResponse = serde_json::from_value(value)
        .map_err(|e| SignalingError::MalformedResponse(e.to_string()))?;

    match response.code {
        None => Err(SignalingError::MalformedResponse(
            "response has no code".to_string(),
        )),
        Some(0) => response
            .sdp
            .map(SessionDescription::answer)
            .ok_or(SignalingError::MissingSdp),
        Some(code) => Err(SignalingError::Rejected { code }),
    }
}

/// Performs signaling exchanges over an [`HttpTransport`].
#[derive(Clone)]
pub struct SignalingClient {
    transport: Arc<dyn HttpTransport>,
    config: SignalingConfig,
}

impl SignalingClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: SignalingConfig) -> Self {
        Self { transport, config }
    }

    /// Post `offer` for `stream_url` and return the relay's answer. No retry.
    pub async fn post(
        &self,
        stream_url: &str,
        offer: &SessionDescription,
        role: ChannelRole,
    ) -> Result<SessionDescription, SignalingError> {
        let api = derive_api_url(stream_url, role, &self.config)?;
        let request = SignalingRequest {
            api: api.clone(),
            sdp: offer.sdp.clone(),
            streamurl: stream_url.to_string(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| SignalingError::Transport(format!("failed to encode request: {}", e)))?;

        log::info!("Signaling {} request to {}", role, api);
        let response = self.transport.post_json(&api, body).await.map_err(|e| {
            log::error!("Request to signaling server failed: {}", e);
            e
        })?;

        if !(200..300).contains(&response.status) {
            log::error!("Signaling server {} answered HTTP {}", api, response.status);
            return Err(SignalingError::HttpStatus(response.status));
        }

        match parse_response(&response.body) {
            Ok(answer) => {
                log::info!("Signaling {} for {} succeeded", role, stream_url);
                Ok(answer)
            }
            Err(e) => {
                log::error!("Signaling {} for {} failed, code {}: {}", role, stream_url, e.code(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn config() -> SignalingConfig {
        EngineConfig::default().signaling
    }

    #[test]
    fn test_derive_publish_url_keeps_port_and_query() {
        let api = derive_api_url(
            "webrtc://relay.example.com:1985/live/cam?token=abc",
            ChannelRole::Publish,
            &config(),
        )
        .unwrap();
        assert_eq!(api, "http://relay.example.com:1985/rtc/v1/publish/?token=abc");
    }

    #[test]
    fn test_derive_play_url_without_query() {
        let api = derive_api_url("webrtc://10.0.0.5/live/cam", ChannelRole::Subscribe, &config())
            .unwrap();
        assert_eq!(api, "http://10.0.0.5/rtc/v1/play/");
    }

    #[test]
    fn test_derive_rejects_hostless_url() {
        assert!(matches!(
            derive_api_url("live/cam", ChannelRole::Publish, &config()),
            Err(SignalingError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_response_outcomes() {
        assert_eq!(
            parse_response(r#"{"code":0,"sdp":"v=0"}"#).unwrap(),
            SessionDescription::answer("v=0")
        );
        assert_eq!(
            parse_response(r#"{"code":400}"#),
            Err(SignalingError::Rejected { code: 400 })
        );
        assert_eq!(parse_response(r#"{"code":0}"#), Err(SignalingError::MissingSdp));
        assert!(matches!(
            parse_response("[1,2]"),
            Err(SignalingError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_response(r#"{"sdp":"v=0"}"#),
            Err(SignalingError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_response("not json"),
            Err(SignalingError::MalformedResponse(_))
        ));
    }
}
