use crate::types::{CategorizedResults, ProbeResult};

/// Group results by outcome bucket, keeping their relative order.
///
/// Uses the same rule as [`crate::types::ScanStats::record`], so bucket sizes always match the stats.
pub fn categorize(results: &[ProbeResult]) -> CategorizedResults {
    let mut out = CategorizedResults::default();
    for result in results {
        out.bucket_mut(result.category()).push(result.clone());
    }
    out
}
