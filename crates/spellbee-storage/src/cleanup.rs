//! Stale audio cleanup.
//!
//! Audio lives under `audio/{weekId}/{group}/`. Any week folder other than
//! the current one is removed blob by blob.

use tracing::{info, warn};

use spellbee_core::error::Result;
use spellbee_core::week::WeekId;

use crate::blob::BlobStore;

/// Root prefix for all generated audio.
pub const AUDIO_ROOT: &str = "audio";

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Week folders that were visited and emptied.
    pub weeks_removed: Vec<String>,
    pub blobs_deleted: usize,
    /// Blobs or folders that could not be listed or deleted.
    pub failures: usize,
}

/// Delete every audio blob that does not belong to `current_week`.
///
/// Only a failure to list the audio root is returned as an error.
/// Individual listing and delete failures are logged and counted.
pub async fn cleanup_stale_audio(
    blobs: &dyn BlobStore,
    current_week: WeekId,
) -> Result<CleanupReport> {
    let current = current_week.to_string();
    let root = blobs.list(AUDIO_ROOT).await?;
    let mut report = CleanupReport::default();

    for week in root.folders.iter().filter(|w| **w != current) {
        let week_prefix = format!("{}/{}", AUDIO_ROOT, week);
        let groups = match blobs.list(&week_prefix).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(week = %week, error = %e, "Failed to list week folder");
                report.failures += 1;
                continue;
            }
        };

        let mut paths: Vec<String> = groups
            .items
            .iter()
            .map(|item| format!("{}/{}", week_prefix, item))
            .collect();

        for group in &groups.folders {
            let group_prefix = format!("{}/{}", week_prefix, group);
            match blobs.list(&group_prefix).await {
                Ok(listing) => paths.extend(
                    listing
                        .items
                        .iter()
                        .map(|item| format!("{}/{}", group_prefix, item)),
                ),
                Err(e) => {
                    warn!(week = %week, group = %group, error = %e, "Failed to list group folder");
                    report.failures += 1;
                }
            }
        }

        for path in paths {
            match blobs.delete(&path).await {
                Ok(()) => report.blobs_deleted += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to delete stale audio");
                    report.failures += 1;
                }
            }
        }
        report.weeks_removed.push(week.clone());
    }

    info!(
        current_week = %current_week,
        weeks = report.weeks_removed.len(),
        deleted = report.blobs_deleted,
        failures = report.failures,
        "Stale audio cleanup complete"
    );
    Ok(report)
}
