//! Bulk import of code texts from a line-oriented tabular file

use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::error::Result;
use crate::registry::{IssueReport, Registry};

/// Extract code texts from tabular content: one record per non-empty
/// line, first comma-separated column.
pub fn parse_texts(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read a code list file and submit every text individually via the
/// registry. Failures are collected per text, never collapsed into one
/// aggregate error.
pub async fn import_file(path: impl AsRef<Path>, registry: &dyn Registry) -> Result<IssueReport> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).await?;
    let texts = parse_texts(&content);

    info!(
        file = %path.display(),
        texts = texts.len(),
        "importing code texts"
    );

    let report = registry.add_batch(&texts).await;
    if !report.is_clean() {
        warn!(
            issued = report.issued.len(),
            failed = report.failures.len(),
            "import finished with failures"
        );
    }

    Ok(report)
}
