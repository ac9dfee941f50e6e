use std::collections::BTreeMap;
use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_USER_AGENT: &str = "URL-Scanner/1.0";
pub const DEFAULT_STEALTH_DELAY_MS: u64 = 500;

/// Per-scan probe settings. Built once per scan and shared read-only by every probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Total request deadline in seconds (connect + transfer).
    pub timeout: f64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub verify_ssl: bool,
    /// Sleep `stealth_delay_ms` before every request.
    pub stealth_mode: bool,
    /// Capture every response header instead of the short allow-list.
    pub detailed_headers: bool,
    pub stealth_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            verify_ssl: true,
            stealth_mode: false,
            detailed_headers: false,
            stealth_delay_ms: DEFAULT_STEALTH_DELAY_MS,
        }
    }
}

impl ScanConfig {
    /// Reject settings no probe could honor.
    pub fn validate(&self) -> Result<(), String> {
        match Duration::try_from_secs_f64(self.timeout) {
            Ok(d) if !d.is_zero() => Ok(()),
            _ => Err(format!(
                "timeout must be a positive number of seconds within range, got {}",
                self.timeout
            )),
        }
    }

    /// Only meaningful for a config that passed [`ScanConfig::validate`].
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }

    pub fn stealth_delay(&self) -> Duration {
        Duration::from_millis(self.stealth_delay_ms)
    }
}

/// Placeholder TLS marker attached to https probes. No certificate inspection is done.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SslInfo {
    pub secure: bool,
    pub version: String,
}

impl SslInfo {
    pub fn https() -> Self {
        Self {
            secure: true,
            version: "TLS".to_string(),
        }
    }
}

/// Outcome of probing one URL. Exactly one of `status_code` and `error` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub url: String,
    pub status_code: Option<u16>,
    pub status_text: String,
    pub response_time_ms: f64,
    pub headers: BTreeMap<String, String>,
    pub content_length: u64,
    pub server: String,
    pub timestamp: String,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
    pub ssl_info: Option<SslInfo>,
}

impl ProbeResult {
    pub fn category(&self) -> Category {
        Category::from_status(self.status_code)
    }
}

/// Outcome bucket shared by stats counting and result categorization.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    #[serde(rename = "2xx")]
    Success,
    #[serde(rename = "3xx")]
    Redirect,
    #[serde(rename = "4xx")]
    ClientError,
    #[serde(rename = "5xx")]
    ServerError,
    #[serde(rename = "network")]
    Network,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Success,
        Category::Redirect,
        Category::ClientError,
        Category::ServerError,
        Category::Network,
    ];

    /// Codes outside 200..=599 land in `Network` along with failed probes.
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(200..=299) => Category::Success,
            Some(300..=399) => Category::Redirect,
            Some(400..=499) => Category::ClientError,
            Some(500..=599) => Category::ServerError,
            _ => Category::Network,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Success => "2xx",
            Category::Redirect => "3xx",
            Category::ClientError => "4xx",
            Category::ServerError => "5xx",
            Category::Network => "network",
        }
    }
}

/// Running outcome counters for one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total: u64,
    pub completed: u64,
    pub success: u64,
    pub redirects: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub network_errors: u64,
}

impl ScanStats {
    pub fn new(total: usize) -> Self {
        Self {
            total: total as u64,
            ..Self::default()
        }
    }

    /// Count one finished probe under exactly one outcome bucket.
    pub fn record(&mut self, status: Option<u16>) {
        self.completed += 1;
        match Category::from_status(status) {
            Category::Success => self.success += 1,
            Category::Redirect => self.redirects += 1,
            Category::ClientError => self.client_errors += 1,
            Category::ServerError => self.server_errors += 1,
            Category::Network => self.network_errors += 1,
        }
    }

    pub fn count(&self, category: Category) -> u64 {
        match category {
            Category::Success => self.success,
            Category::Redirect => self.redirects,
            Category::ClientError => self.client_errors,
            Category::ServerError => self.server_errors,
            Category::Network => self.network_errors,
        }
    }

    pub fn outcome_sum(&self) -> u64 {
        self.success + self.redirects + self.client_errors + self.server_errors + self.network_errors
    }

    pub fn progress_percent(&self) -> f64 {
        self.completed as f64 / self.total.max(1) as f64 * 100.0
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }
}

/// Results grouped by [`Category`], serialized with the `2xx`..`network` keys.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CategorizedResults {
    #[serde(rename = "2xx")]
    pub success: Vec<ProbeResult>,
    #[serde(rename = "3xx")]
    pub redirect: Vec<ProbeResult>,
    #[serde(rename = "4xx")]
    pub client_error: Vec<ProbeResult>,
    #[serde(rename = "5xx")]
    pub server_error: Vec<ProbeResult>,
    pub network: Vec<ProbeResult>,
}

impl CategorizedResults {
    pub fn get(&self, category: Category) -> &[ProbeResult] {
        match category {
            Category::Success => &self.success,
            Category::Redirect => &self.redirect,
            Category::ClientError => &self.client_error,
            Category::ServerError => &self.server_error,
            Category::Network => &self.network,
        }
    }

    pub(crate) fn bucket_mut(&mut self, category: Category) -> &mut Vec<ProbeResult> {
        match category {
            Category::Success => &mut self.success,
            Category::Redirect => &mut self.redirect,
            Category::ClientError => &mut self.client_error,
            Category::ServerError => &mut self.server_error,
            Category::Network => &mut self.network,
        }
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.get(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a finished (or cancelled) scan hands back.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanOutcome {
    pub results: Vec<ProbeResult>,
    pub stats: ScanStats,
    /// Set when cancellation stopped admission before every URL was probed.
    pub incomplete: bool,
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
