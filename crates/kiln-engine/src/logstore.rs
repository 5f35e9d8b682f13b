//! Persistence of finished build results.
//!
//! One JSON file per run, named `<build>_<Y>-<M>-<D>_<H>-<Min>-<Sec>.json`
//! with the UTC components of the result's `last_updated` timestamp. The
//! filename carries build identity and ordering, so recovering the most
//! recent result after a restart needs no index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use kiln_core::BuildResult;
use tracing::{error, warn};

/// Reads and writes per-run result files in the logs directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the logs directory if it does not exist. Idempotent.
    pub async fn ensure_directory(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Filename for a result, e.g. `web-app_2026-8-7_14-3-5.json`.
    pub fn file_name(result: &BuildResult) -> String {
        let stamp = result.last_updated;
        format!(
            "{}_{}-{}-{}_{}-{}-{}.json",
            result.name,
            stamp.year(),
            stamp.month(),
            stamp.day(),
            stamp.hour(),
            stamp.minute(),
            stamp.second()
        )
    }

    /// Persist a finished result. Failures are logged, never propagated:
    /// a result that cannot be written stays valid in memory.
    pub async fn write(&self, result: &BuildResult) {
        let path = self.dir.join(Self::file_name(result));
        let contents = match serde_json::to_vec_pretty(result) {
            Ok(contents) => contents,
            Err(err) => {
                error!(build = %result.name, error = %err, "failed to serialize build result");
                return;
            }
        };
        if let Err(err) = tokio::fs::write(&path, contents).await {
            error!(build = %result.name, path = %path.display(), error = %err, "error saving log file");
        }
    }

    /// The most recently written result for a build, ordered by the
    /// timestamp embedded in the filename. Malformed filenames are
    /// excluded; an unreadable newest file yields `None`.
    pub async fn most_recent(&self, build_name: &str) -> Option<BuildResult> {
        let mut newest: Option<(DateTime<Utc>, PathBuf)> = None;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "error listing log files");
                return None;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(stamp) = parse_file_stamp(file_name, build_name) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(best, _)| stamp > *best) {
                newest = Some((stamp, entry.path()));
            }
        }

        let (_, path) = newest?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "error reading most recent build result");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "error parsing most recent build result");
                None
            }
        }
    }
}

/// Parse the timestamp out of a result filename belonging to the given
/// build. Filenames that do not split into exactly name, date, and time
/// parts are rejected.
fn parse_file_stamp(file_name: &str, build_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name.strip_suffix(".json")?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 3 || parts[0] != build_name {
        return None;
    }

    let date: Vec<u32> = parts[1].split('-').filter_map(|p| p.parse().ok()).collect();
    let time: Vec<u32> = parts[2].split('-').filter_map(|p| p.parse().ok()).collect();
    if date.len() != 3 || time.len() != 3 {
        return None;
    }

    NaiveDate::from_ymd_opt(date[0] as i32, date[1], date[2])?
        .and_hms_opt(time[0], time[1], time[2])
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kiln_core::{BuildDefinition, BuildStatus, BuildStep, LogMessage};

    fn make_result(name: &str, stamp: DateTime<Utc>) -> BuildResult {
        let definition = BuildDefinition {
            name: name.to_string(),
            directory: "/tmp".to_string(),
            schedule: None,
            email_from: None,
            email_to: None,
            only_run_for_changes: false,
            steps: vec![BuildStep {
                command: "true".to_string(),
                args: vec![],
                directory: None,
                fail_text: None,
                unstable_text: None,
            }],
        };
        let mut result = BuildResult::started(&definition);
        result.push(LogMessage::new("line one"));
        result.push(LogMessage::new("line two"));
        result.result = BuildStatus::Success;
        result.last_updated = stamp;
        result
    }

    #[test]
    fn test_file_name_embeds_unpadded_utc_stamp() {
        let stamp = Utc.with_ymd_and_hms(2026, 8, 7, 4, 3, 5).unwrap();
        let result = make_result("web-app", stamp);
        assert_eq!(LogStore::file_name(&result), "web-app_2026-8-7_4-3-5.json");
    }

    #[test]
    fn test_parse_file_stamp_round_trips() {
        let stamp = Utc.with_ymd_and_hms(2026, 8, 7, 14, 30, 5).unwrap();
        let result = make_result("web-app", stamp);
        let name = LogStore::file_name(&result);
        assert_eq!(parse_file_stamp(&name, "web-app"), Some(stamp));
    }

    #[test]
    fn test_parse_file_stamp_rejects_malformed_names() {
        assert!(parse_file_stamp("web-app_2026-8-7_4-3-5.json", "other").is_none());
        assert!(parse_file_stamp("web-app_2026-8-7.json", "web-app").is_none());
        assert!(parse_file_stamp("web-app_2026-8_4-3-5.json", "web-app").is_none());
        assert!(parse_file_stamp("web-app_2026-8-7_4-3-5.txt", "web-app").is_none());
        assert!(parse_file_stamp("notes.json", "web-app").is_none());
    }

    #[tokio::test]
    async fn test_write_then_most_recent_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store.ensure_directory().await.unwrap();

        let stamp = Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap();
        let written = make_result("web-app", stamp);
        store.write(&written).await;

        let read = store.most_recent("web-app").await.unwrap();
        assert_eq!(read.name, written.name);
        assert_eq!(read.result, written.result);
        assert_eq!(read.log.len(), written.log.len());
    }

    #[tokio::test]
    async fn test_most_recent_picks_newest_by_filename_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store.ensure_directory().await.unwrap();

        let mut old = make_result("web-app", Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap());
        old.result = BuildStatus::Failed;
        let new = make_result("web-app", Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap());
        store.write(&old).await;
        store.write(&new).await;

        let read = store.most_recent("web-app").await.unwrap();
        assert_eq!(read.result, BuildStatus::Success);
    }

    #[tokio::test]
    async fn test_most_recent_ignores_other_builds_and_junk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path());
        store.ensure_directory().await.unwrap();

        let other = make_result("other", Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap());
        store.write(&other).await;
        tokio::fs::write(dir.path().join("junk.json"), b"{}")
            .await
            .unwrap();

        assert!(store.most_recent("web-app").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_directory_yields_none() {
        let store = LogStore::new("/nonexistent/kiln-logs");
        assert!(store.most_recent("web-app").await.is_none());
    }

    #[tokio::test]
    async fn test_ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("logs"));
        store.ensure_directory().await.unwrap();
        store.ensure_directory().await.unwrap();
    }
}
