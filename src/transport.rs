use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client};
use url::Url;

use crate::error::TransportError;
use crate::types::ScanConfig;

const POOL_MAX_IDLE_PER_HOST: usize = 10;
const KEEPALIVE: Duration = Duration::from_secs(30);

/// The final response of one GET, after any redirects were followed.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub final_url: String,
}

/// One outbound GET. Shared by all probes of a scan, so it must be safe for concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport owning the connection pool for one scan.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ScanConfig) -> Result<Self, TransportError> {
        let policy = if config.max_redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(config.max_redirects)
        };

        let client = Client::builder()
            .timeout(config.timeout_duration())
            .redirect(policy)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .default_headers(default_headers(&config.user_agent)?)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(KEEPALIVE)
            .tcp_keepalive(KEEPALIVE)
            .build()
            .map_err(|e| TransportError::Build(error_chain(&e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response.headers().clone(),
            final_url: response.url().to_string(),
        })
    }
}

/// Browser-like request headers sent with every probe.
pub fn default_headers(user_agent: &str) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    let ua = HeaderValue::from_str(user_agent)
        .map_err(|_| TransportError::Build(format!("invalid user agent: {user_agent:?}")))?;
    headers.insert(header::USER_AGENT, ua);
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    Ok(headers)
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(error_chain(&err))
    }
}

/// Flatten an error and its sources into one line; reqwest hides the useful cause in `source()`.
fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
