//! Single-URL probe: validate, optionally throttle, GET, and normalize the outcome.
use std::collections::BTreeMap;

use reqwest::header::{self, HeaderMap};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::ProbeError;
use crate::transport::{Transport, TransportResponse};
use crate::types::{now_rfc3339, ProbeResult, ScanConfig, SslInfo};

/// Headers kept when `detailed_headers` is off.
pub const IMPORTANT_HEADERS: &[&str] = &[
    "server",
    "content-type",
    "content-length",
    "cache-control",
    "set-cookie",
    "x-powered-by",
];

const REDIRECT_STATUSES: &[u16] = &[301, 302, 303, 307, 308];

/// Probe one URL. Every failure is folded into the returned record; this never errors.
pub async fn probe(transport: &dyn Transport, url: &str, config: &ScanConfig) -> ProbeResult {
    let start = Instant::now();
    match try_probe(transport, url, config).await {
        Ok((parsed, response)) => {
            if response.final_url != parsed.as_str() {
                debug!("{url} redirected to {}", response.final_url);
            }
            let result = success_result(url, &parsed, response, config, elapsed_ms(start));
            info!(
                "{} -> {} ({:.2}ms)",
                url,
                result.status_code.unwrap_or_default(),
                result.response_time_ms
            );
            result
        }
        Err(err) => {
            match &err {
                ProbeError::Timeout => warn!("{url} -> timeout"),
                ProbeError::InvalidUrl(_) | ProbeError::Transport(_) | ProbeError::Cancelled => {
                    warn!("{url} -> {err}")
                }
                ProbeError::Unexpected(_) => error!("{url} -> {err}"),
            }
            failure_result(url, &err, elapsed_ms(start))
        }
    }
}

async fn try_probe(
    transport: &dyn Transport,
    url: &str,
    config: &ScanConfig,
) -> Result<(Url, TransportResponse), ProbeError> {
    let parsed = parse_target(url)?;

    if config.stealth_mode {
        time::sleep(config.stealth_delay()).await;
    }

    let response = time::timeout(config.timeout_duration(), transport.get(&parsed))
        .await
        .map_err(|_| ProbeError::Timeout)??;
    Ok((parsed, response))
}

/// A probe target needs a scheme and a non-empty host.
pub fn parse_target(url: &str) -> Result<Url, ProbeError> {
    let parsed = Url::parse(url.trim()).map_err(|_| ProbeError::InvalidUrl(url.to_string()))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(ProbeError::InvalidUrl(url.to_string())),
    }
}

fn success_result(
    url: &str,
    parsed: &Url,
    response: TransportResponse,
    config: &ScanConfig,
    response_time_ms: f64,
) -> ProbeResult {
    let headers = &response.headers;
    let redirect_url = if REDIRECT_STATUSES.contains(&response.status) {
        header_value(headers, header::LOCATION.as_str())
    } else {
        None
    };

    ProbeResult {
        url: url.to_string(),
        status_code: Some(response.status),
        status_text: response.reason.clone(),
        response_time_ms,
        headers: extract_headers(headers, config.detailed_headers),
        content_length: content_length(headers),
        server: header_value(headers, header::SERVER.as_str()).unwrap_or_else(|| "Unknown".to_string()),
        timestamp: now_rfc3339(),
        error: None,
        redirect_url,
        ssl_info: (parsed.scheme() == "https").then(SslInfo::https),
    }
}

/// Record for a probe that produced no HTTP status.
pub fn failure_result(url: &str, err: &ProbeError, response_time_ms: f64) -> ProbeResult {
    ProbeResult {
        url: url.to_string(),
        status_code: None,
        status_text: err.status_text().to_string(),
        response_time_ms,
        headers: BTreeMap::new(),
        content_length: 0,
        server: "Unknown".to_string(),
        timestamp: now_rfc3339(),
        error: Some(err.to_string()),
        redirect_url: None,
        ssl_info: None,
    }
}

/// Either every header, or the non-empty members of [`IMPORTANT_HEADERS`].
pub fn extract_headers(headers: &HeaderMap, detailed: bool) -> BTreeMap<String, String> {
    if detailed {
        headers
            .keys()
            .filter_map(|name| header_value(headers, name.as_str()).map(|v| (name.to_string(), v)))
            .collect()
    } else {
        IMPORTANT_HEADERS
            .iter()
            .filter_map(|&name| {
                header_value(headers, name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.to_string(), v))
            })
            .collect()
    }
}

pub fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// All values of `name` joined with ", "; `None` when absent.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let values: Vec<String> = headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn sample_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::SERVER, HeaderValue::from_static("nginx"));
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1234"));
        h.insert(header::CACHE_CONTROL, HeaderValue::from_static(""));
        h.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        h.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        h.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        h
    }

    #[test]
    fn allow_list_drops_empty_and_unlisted() {
        let out = extract_headers(&sample_headers(), false);
        assert_eq!(out.get("server").map(String::as_str), Some("nginx"));
        assert_eq!(out.get("content-length").map(String::as_str), Some("1234"));
        assert_eq!(out.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert!(!out.contains_key("cache-control"));
        assert!(!out.contains_key("etag"));
    }

    #[test]
    fn detailed_keeps_everything() {
        let out = extract_headers(&sample_headers(), true);
        assert!(out.contains_key("etag"));
        assert!(out.contains_key("cache-control"));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn content_length_defaults_to_zero() {
        assert_eq!(content_length(&sample_headers()), 1234);
        let mut h = HeaderMap::new();
        assert_eq!(content_length(&h), 0);
        h.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&h), 0);
    }

    #[test]
    fn parse_target_requires_scheme_and_host() {
        assert!(parse_target("https://example.com/path").is_ok());
        assert!(parse_target("http://127.0.0.1:8080").is_ok());
        assert_eq!(
            parse_target("not-a-url"),
            Err(ProbeError::InvalidUrl("not-a-url".into()))
        );
        assert!(parse_target("example.com").is_err());
        assert!(parse_target("mailto:someone@example.com").is_err());
        assert!(parse_target("").is_err());
    }

    #[test]
    fn failure_result_sets_error_not_status() {
        let r = failure_result("http://x.invalid", &ProbeError::Timeout, 12.5);
        assert_eq!(r.status_code, None);
        assert_eq!(r.error.as_deref(), Some("Request timeout"));
        assert_eq!(r.status_text, "Timeout");
        assert_eq!(r.server, "Unknown");
        assert!(r.headers.is_empty());
        assert_eq!(r.response_time_ms, 12.5);
    }
}
