// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persisted session reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::categorize::Category;
use crate::fs::FileSystem;
use crate::{PictorError, Result};

/// Outcome of one organize session, as written to `logs/<session id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub errors: u64,
    pub categories: BTreeMap<Category, u64>,
    pub processing_time_ms: u64,
    pub session_id: String,
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,
}

/// Reads and writes session reports in the library's log folder
#[derive(Clone)]
pub struct ReportStore {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(fs: Arc<dyn FileSystem>, dir: PathBuf) -> Self {
        Self { fs, dir }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Write a report, keyed by its session id
    pub async fn save(&self, report: &SessionReport) -> Result<PathBuf> {
        let path = self.path_for(&report.session_id);
        let json = serde_json::to_vec_pretty(report)?;
        self.fs
            .create_dir_all(&self.dir)
            .await
            .map_err(|e| PictorError::file_op(&self.dir, e))?;
        self.fs
            .write(&path, &json)
            .await
            .map_err(|e| PictorError::file_op(&path, e))?;
        Ok(path)
    }

    pub async fn load(&self, session_id: &str) -> Result<SessionReport> {
        let path = self.path_for(session_id);
        self.read(&path).await
    }

    async fn read(&self, path: &Path) -> Result<SessionReport> {
        let bytes = self
            .fs
            .read(path)
            .await
            .map_err(|e| PictorError::file_op(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All readable reports, newest first
    pub async fn list(&self) -> Result<Vec<SessionReport>> {
        let entries = match self.fs.list_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PictorError::file_op(&self.dir, e)),
        };

        let mut reports = Vec::new();
        for path in entries {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!("Failed to parse session report {:?}: {}", path, e);
                }
            }
        }

        reports.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(reports)
    }

    /// The most recent N reports (newest first)
    pub async fn recent(&self, count: usize) -> Result<Vec<SessionReport>> {
        let mut reports = self.list().await?;
        reports.truncate(count);
        Ok(reports)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use chrono::TimeZone;

    fn report(id: &str, hour: u32) -> SessionReport {
        let mut categories: BTreeMap<Category, u64> =
            Category::ALL.into_iter().map(|c| (c, 0)).collect();
        categories.insert(Category::Food, 2);
        SessionReport {
            total: 3,
            processed: 3,
            successful: 2,
            errors: 1,
            categories,
            processing_time_ms: 1500,
            session_id: id.to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_report_json_shape() {
        let value = serde_json::to_value(report("session-1", 9)).unwrap();
        assert_eq!(value["sessionId"], "session-1");
        assert_eq!(value["processingTimeMs"], 1500);
        assert_eq!(value["categories"]["food"], 2);
        assert_eq!(value["categories"]["nsfw"], 0);
        assert_eq!(value["errors"], 1);
    }

    #[tokio::test]
    async fn test_save_load_and_list_newest_first() {
        let fs = Arc::new(MemoryFs::new());
        let store = ReportStore::new(fs.clone(), PathBuf::from("/lib/logs"));

        store.save(&report("session-a", 8)).await.unwrap();
        store.save(&report("session-b", 11)).await.unwrap();
        fs.insert("/lib/logs/garbage.json", b"{not json".to_vec());
        fs.insert("/lib/logs/app.log", b"text".to_vec());

        assert_eq!(store.load("session-a").await.unwrap(), report("session-a", 8));

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["session-b", "session-a"]);
        assert_eq!(store.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_without_log_dir_is_empty() {
        let store = ReportStore::new(Arc::new(MemoryFs::new()), PathBuf::from("/nowhere"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
