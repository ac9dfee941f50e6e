use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::categorize::categorize;
use crate::types::{now_rfc3339, CategorizedResults, ProbeResult, ScanConfig, ScanOutcome, ScanStats};

pub const CSV_HEADER: [&str; 8] = [
    "URL",
    "Status Code",
    "Status Text",
    "Response Time (ms)",
    "Server",
    "Content Length",
    "Error",
    "Timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unsupported export format: {other} (expected json or csv)"),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Serialize)]
pub struct ScanInfo<'a> {
    pub timestamp: String,
    pub total_urls: usize,
    pub config: &'a ScanConfig,
    pub incomplete: bool,
}

/// Top-level JSON export document.
#[derive(Debug, Serialize)]
pub struct ExportDocument<'a> {
    pub scan_info: ScanInfo<'a>,
    pub statistics: &'a ScanStats,
    pub categories: CategorizedResults,
}

impl<'a> ExportDocument<'a> {
    pub fn new(outcome: &'a ScanOutcome, config: &'a ScanConfig) -> Self {
        Self {
            scan_info: ScanInfo {
                timestamp: now_rfc3339(),
                total_urls: outcome.results.len(),
                config,
                incomplete: outcome.incomplete,
            },
            statistics: &outcome.stats,
            categories: categorize(&outcome.results),
        }
    }
}

/// `scan_results_YYYYMMDD_HHMMSS.<ext>`, UTC.
pub fn timestamped_filename(format: ExportFormat) -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "scan_results_{:04}{:02}{:02}_{:02}{:02}{:02}.{}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        format.extension()
    )
}

pub fn write_json<W: Write>(writer: W, outcome: &ScanOutcome, config: &ScanConfig) -> Result<()> {
    serde_json::to_writer_pretty(writer, &ExportDocument::new(outcome, config))?;
    Ok(())
}

/// One flat row per result, in result order.
pub fn write_csv<W: Write>(writer: W, results: &[ProbeResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for r in results {
        wtr.write_record([
            r.url.clone(),
            r.status_code.map(|c| c.to_string()).unwrap_or_default(),
            r.status_text.clone(),
            r.response_time_ms.to_string(),
            r.server.clone(),
            r.content_length.to_string(),
            r.error.clone().unwrap_or_default(),
            r.timestamp.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `outcome` to `path` in `format`.
pub fn export_to_path(
    path: &Path,
    format: ExportFormat,
    outcome: &ScanOutcome,
    config: &ScanConfig,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        ExportFormat::Json => write_json(&mut writer, outcome, config)?,
        ExportFormat::Csv => write_csv(&mut writer, &outcome.results)?,
    }
    writer
        .flush()
        .with_context(|| format!("failed to write export file: {}", path.display()))?;
    info!("results exported to {}", path.display());
    Ok(())
}
