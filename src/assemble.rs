//! Dataset Assembler.
//!
//! Computes aggregate statistics over the final items, wraps them with run
//! metadata, and writes the document as pretty-printed JSON. A compact
//! run summary is printed to stdout for CI logs and scripts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{HostKind, Item, Metadata, OutputData, PackageKind, Performance, Stats};
use crate::normalize::to_rfc3339;

/// Wall-clock time spent per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub flatpak: Duration,
    pub homebrew: Duration,
    pub os: Duration,
    pub enrichment: Duration,
    pub total: Duration,
}

impl Timings {
    fn performance(&self) -> Performance {
        Performance {
            flatpak_fetch_duration: format_duration(self.flatpak),
            homebrew_fetch_duration: format_duration(self.homebrew),
            os_fetch_duration: format_duration(self.os),
            enrichment_duration: format_duration(self.enrichment),
        }
    }
}

/// `1.23s`, `450.00ms`, ...
pub fn format_duration(d: Duration) -> String {
    format!("{:.2?}", d)
}

pub fn compute_stats(items: &[Item]) -> Stats {
    let mut stats = Stats {
        items_total: items.len(),
        ..Stats::default()
    };
    for item in items {
        match item.host_kind() {
            Some(HostKind::Github) => stats.items_with_github_repo += 1,
            Some(HostKind::Gitlab) => stats.items_with_gitlab_repo += 1,
            _ => {}
        }
        if !item.releases.is_empty() {
            stats.items_with_changelogs += 1;
        }
        stats.total_releases += item.releases.len();
        match item.package_kind {
            PackageKind::Flatpak => stats.flatpak_count += 1,
            PackageKind::Homebrew => stats.homebrew_count += 1,
            PackageKind::OsRelease => stats.os_count += 1,
        }
    }
    stats
}

/// Drop items whose id was already seen, keeping the first.
fn dedup_by_id(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.id.clone());
            if !fresh {
                warn!(item = %item.id, "duplicate item id dropped");
            }
            fresh
        })
        .collect()
}

/// Build the output document.
pub fn assemble(
    items: Vec<Item>,
    schema_version: &str,
    timings: &Timings,
    generated_at: DateTime<Utc>,
) -> OutputData {
    let items = dedup_by_id(items);
    let stats = compute_stats(&items);

    OutputData {
        metadata: Metadata {
            schema_version: schema_version.to_string(),
            generated_at: to_rfc3339(generated_at),
            generated_by: format!("release-harness v{}", env!("CARGO_PKG_VERSION")),
            build_duration: format_duration(timings.total),
            stats,
            performance: timings.performance(),
        },
        items,
    }
}

/// Write `data` as pretty JSON to `path`, creating parent directories.
pub fn write_output(data: &OutputData, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize output")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;

    info!(
        path = %path.display(),
        items = data.items.len(),
        bytes = json.len(),
        "wrote dataset"
    );
    Ok(())
}

/// One-line machine-readable summary of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: &'static str,
    pub mode: String,
    pub output: String,
    pub build_duration: String,
    pub stats: Stats,
}

impl RunSummary {
    pub fn new(data: &OutputData, mode: &str, output: &Path) -> Self {
        Self {
            status: "ok",
            mode: mode.to_string(),
            output: output.display().to_string(),
            build_duration: data.metadata.build_duration.clone(),
            stats: data.metadata.stats.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize run summary")
    }
}
