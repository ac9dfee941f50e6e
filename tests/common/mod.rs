//! Instrumented stub transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;
use url_probe_rs::error::TransportError;
use url_probe_rs::transport::{Transport, TransportResponse};

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Vec<(&'static str, &'static str)>),
    ConnectFailure,
    Timeout,
    Weird,
    Panic,
    Hang,
}

/// Answers from a per-URL table, sleeping `latency` first and tracking in-flight calls.
pub struct StubTransport {
    latency: Duration,
    default: Reply,
    replies: HashMap<String, Reply>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new(default: Reply) -> Self {
        Self {
            latency: Duration::ZERO,
            default,
            replies: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn ok() -> Self {
        Self::new(Reply::Status(200, vec![("server", "stub")]))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .replies
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        match reply {
            Reply::Status(status, headers) => {
                let mut map = HeaderMap::new();
                for (k, v) in headers {
                    map.append(HeaderName::from_static(k), HeaderValue::from_static(v));
                }
                Ok(TransportResponse {
                    status,
                    reason: reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or_default()
                        .to_string(),
                    headers: map,
                    final_url: url.to_string(),
                })
            }
            Reply::ConnectFailure => Err(TransportError::Request(
                "error sending request: dns error: failed to lookup address".into(),
            )),
            Reply::Timeout => Err(TransportError::Timeout),
            Reply::Weird => Err(TransportError::Other("stub exploded".into())),
            Reply::Panic => panic!("stub transport panic for {url}"),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://host{i}.test/")).collect()
}
