//! Scripted signaling transport.

use crate::errors::SignalingError;
use crate::signaling::{HttpResponse, HttpTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// One request seen by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// `HttpTransport` answering from a script. Queued responses are used first,
/// then the fallback. A gated transport holds every request until
/// [`release`](ScriptedTransport::release) is called.
pub struct ScriptedTransport {
    queued: Mutex<VecDeque<Result<HttpResponse, SignalingError>>>,
    fallback: Result<HttpResponse, SignalingError>,
    gate: Option<Semaphore>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
}

/// Counts a request as in flight until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedTransport {
    pub fn new(fallback: Result<HttpResponse, SignalingError>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            gate: None,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Relay answering `{"code": code, "sdp": sdp}` with HTTP 200.
    pub fn answering(code: i64, sdp: &str) -> Self {
        let body = serde_json::json!({ "code": code, "sdp": sdp }).to_string();
        Self::new(Ok(HttpResponse { status: 200, body }))
    }

    pub fn responding(status: u16, body: &str) -> Self {
        Self::new(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }))
    }

    /// Relay that cannot be reached.
    pub fn unreachable() -> Self {
        Self::new(Err(SignalingError::Transport(
            "connection refused".to_string(),
        )))
    }

    /// Hold requests until released.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let one held request through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn push_response(&self, response: Result<HttpResponse, SignalingError>) {
        lock(&self.queued).push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Requests that started and have neither answered nor been cancelled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Block the calling thread until `count` requests arrived or `timeout`
    /// passed. Returns whether the count was reached.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.request_count() < count {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, SignalingError> {
        let _in_flight = InFlight::enter(&self.in_flight);
        lock(&self.requests).push(RecordedRequest {
            url: url.to_string(),
            body,
        });

        if let Some(gate) = &self.gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(SignalingError::Transport("gate closed".to_string())),
            }
        }

        let queued = lock(&self.queued).pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}
