use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use url_probe_rs::categorize::categorize;
use url_probe_rs::export::{self, ExportFormat};
use url_probe_rs::scanner::{ScanContext, DEFAULT_CONCURRENCY};
use url_probe_rs::types::{Category, ProbeResult, ScanConfig, ScanOutcome, ScanStats};
use url_probe_rs::{server, targets};

/// Rows shown per category in the summary.
const SUMMARY_ROWS: usize = 5;

/// url-probe-rs: bulk HTTP reachability and metadata prober.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "url-probe-rs",
    version,
    about = "Bulk HTTP reachability and metadata prober with an optional JSON API server.",
    long_about = None
)]
struct Cli {
    /// File containing URLs to scan, one per line.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Single URL to scan.
    #[arg(short, long)]
    url: Option<String>,

    /// Output file for results. Defaults to a timestamped name in the working directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, default_value = "json", value_parser = ["json", "csv"])]
    format: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Max concurrent requests.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Max redirects followed per request (0 disables following).
    #[arg(long = "max-redirects", default_value_t = 5)]
    max_redirects: usize,

    /// User-Agent header sent with every request.
    #[arg(long = "user-agent")]
    user_agent: Option<String>,

    /// Pause before every request.
    #[arg(long, default_value_t = false)]
    stealth: bool,

    /// Disable TLS certificate verification.
    #[arg(long = "no-ssl-verify", default_value_t = false)]
    no_ssl_verify: bool,

    /// Capture every response header.
    #[arg(long, default_value_t = false)]
    detailed: bool,

    /// Start the JSON API server instead of scanning.
    #[arg(long, default_value_t = false)]
    server: bool,

    /// API server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// API server port.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Directory the API server writes exports to.
    #[arg(long = "export-dir", default_value = ".")]
    export_dir: PathBuf,

    /// Debug-level logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "url_probe_rs=debug" } else { "url_probe_rs=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if cli.server {
        let bind = format!("{}:{}", cli.host, cli.port);
        info!("starting URL scanner API server on {bind}");
        return server::spawn_server(&bind, cli.export_dir.clone()).await;
    }

    let mut urls = Vec::new();
    if let Some(path) = cli.file.as_deref() {
        urls.extend(targets::load_urls_from_path(path)?);
    }
    if let Some(url) = cli.url.as_deref() {
        urls.push(url.to_string());
    }
    if urls.is_empty() {
        bail!("no URLs to scan; use --file or --url");
    }

    let mut config = ScanConfig {
        timeout: cli.timeout,
        max_redirects: cli.max_redirects,
        verify_ssl: !cli.no_ssl_verify,
        stealth_mode: cli.stealth,
        detailed_headers: cli.detailed,
        ..ScanConfig::default()
    };
    if let Some(ua) = cli.user_agent.clone() {
        config.user_agent = ua;
    }
    if let Err(e) = config.validate() {
        bail!("invalid configuration: {e}");
    }
    let format: ExportFormat = cli.format.parse()?;

    println!("url-probe-rs configuration:");
    println!("  urls         : {}", urls.len());
    println!("  concurrency  : {}", cli.concurrency);
    println!("  timeout      : {}s", config.timeout);
    println!("  stealth      : {}", config.stealth_mode);
    println!("  verify_ssl   : {}", config.verify_ssl);
    println!("  detailed     : {}", config.detailed_headers);

    // Ctrl+C stops admitting new probes; whatever finished still gets reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let ctx = ScanContext::new(config.clone())
        .with_concurrency(cli.concurrency)
        .with_cancel(cancel)
        .with_observer(Arc::new(|_: &ProbeResult, stats: &ScanStats| {
            print!(
                "\rProgress: {:.1}% ({}/{})",
                stats.progress_percent(),
                stats.completed,
                stats.total
            );
            let _ = std::io::stdout().flush();
        }));

    info!("starting scan of {} URLs", urls.len());
    let outcome = ctx.run(&urls).await?;
    println!();
    if outcome.incomplete {
        warn!(
            "scan interrupted: {} of {} URLs probed",
            outcome.stats.completed, outcome.stats.total
        );
    }

    print_summary(&outcome);

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(export::timestamped_filename(format)));
    export::export_to_path(&path, format, &outcome, &config)
        .with_context(|| format!("failed to write results to {}", path.display()))?;
    println!("Wrote {} results to {}", format, path.display());

    Ok(())
}

fn print_summary(outcome: &ScanOutcome) {
    let categories = categorize(&outcome.results);
    let rule = "=".repeat(60);

    println!("\n{rule}");
    println!("SCAN RESULTS SUMMARY");
    println!("{rule}");
    println!("Total URLs scanned   : {}", outcome.results.len());
    println!("Success (2xx)        : {}", categories.success.len());
    println!("Redirects (3xx)      : {}", categories.redirect.len());
    println!("Client errors (4xx)  : {}", categories.client_error.len());
    println!("Server errors (5xx)  : {}", categories.server_error.len());
    println!("Network errors       : {}", categories.network.len());
    println!("{rule}");

    for category in Category::ALL {
        let bucket = categories.get(category);
        if bucket.is_empty() {
            continue;
        }
        println!("\n{} results:", category.as_str().to_uppercase());
        for r in bucket.iter().take(SUMMARY_ROWS) {
            let status = r
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "ERROR".to_string());
            println!("  {:>5} | {:>9.2}ms | {}", status, r.response_time_ms, r.url);
        }
        if bucket.len() > SUMMARY_ROWS {
            println!("  ... and {} more", bucket.len() - SUMMARY_ROWS);
        }
    }
}
