use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Parse URL list content, one URL per line.
///
/// - leading/trailing whitespace is trimmed
/// - blank lines and lines starting with `#` are ignored
/// - lines not starting with `http://` or `https://` are skipped with a warning
pub fn parse_urls_str(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("http://") || line.starts_with("https://") {
            out.push(line.to_string());
        } else {
            warn!("invalid URL at line {line_no}: {line}");
        }
    }
    out
}

/// Load a URL list from a file path. Errors if the file cannot be read.
pub fn load_urls_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read URL file: {}", path.display()))?;
    let urls = parse_urls_str(&content);
    info!("loaded {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}
