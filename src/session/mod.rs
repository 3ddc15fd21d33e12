// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Organize sessions: discover, analyze, categorize, rename, move
//!
//! Files are processed strictly one after another. A failure on one file is
//! logged and counted; the batch always runs to the end.

pub mod layout;
pub mod lock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::analyzer::{ImageAnalyzer, ImageFileRef};
use crate::capabilities::Registry;
use crate::categorize::{Categorizer, Category};
use crate::config::AppConfig;
use crate::fs::FileSystem;
use crate::naming::{Clock, FilenameSynthesizer, SystemClock};
use crate::report::{ReportStore, SessionReport};
use crate::watcher::should_process;
use crate::{PictorError, Result};

pub use layout::{is_image, LibraryLayout, IMAGE_EXTENSIONS};
pub use lock::{SessionGuard, SessionLock, SessionState};

/// Live counters of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizeSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub categories: BTreeMap<Category, u64>,
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

impl OrganizeSession {
    pub fn new(total: usize) -> Self {
        let started_at = Utc::now();
        Self {
            id: format!(
                "session-{}-{}",
                started_at.timestamp_millis(),
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            ),
            started_at,
            categories: Category::ALL.into_iter().map(|c| (c, 0)).collect(),
            total: total as u64,
            processed: 0,
            successful: 0,
            errors: 0,
            duration_ms: 0,
        }
    }

    pub fn record_success(&mut self, category: Category) {
        *self.categories.entry(category).or_insert(0) += 1;
        self.successful += 1;
        self.processed += 1;
    }

    pub fn record_failure(&mut self) {
        self.errors += 1;
        self.processed += 1;
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            total: self.total,
            processed: self.processed,
            successful: self.successful,
            errors: self.errors,
            categories: self.categories.clone(),
            processing_time_ms: self.duration_ms,
            session_id: self.id.clone(),
            started_at: self.started_at,
        }
    }
}

/// Emitted once per file, before it is processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// 1-based position in the batch
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(SessionReport),
    /// The intake held no images; no session was started
    NoInput { intake: PathBuf },
}

/// Image counts across the library folders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub raw_images: usize,
    pub categorized: BTreeMap<Category, usize>,
    pub base_path: PathBuf,
}

/// Where one file ended up
struct Placement {
    category: Category,
    name: OsString,
}

const PROGRESS_CAPACITY: usize = 256;

/// Drives organize sessions over one library
pub struct Organizer {
    fs: Arc<dyn FileSystem>,
    analyzer: ImageAnalyzer,
    categorizer: Categorizer,
    synthesizer: FilenameSynthesizer,
    clock: Arc<dyn Clock>,
    layout: LibraryLayout,
    reports: ReportStore,
    lock: SessionLock,
    progress: broadcast::Sender<ProgressEvent>,
}

impl Organizer {
    pub fn new(config: &AppConfig, registry: Arc<Registry>, fs: Arc<dyn FileSystem>) -> Self {
        let layout = LibraryLayout::new(&config.library.base_path);
        let thresholds = &config.thresholds;
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            analyzer: ImageAnalyzer::new(registry, Arc::clone(&fs), thresholds.nsfw),
            categorizer: Categorizer::new(thresholds.substantial_text_chars),
            synthesizer: FilenameSynthesizer::new(thresholds.max_filename_length),
            clock: Arc::new(SystemClock),
            reports: ReportStore::new(Arc::clone(&fs), layout.logs()),
            layout,
            lock: SessionLock::new(),
            progress,
            fs,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a session lock with other organizers
    pub fn with_lock(mut self, lock: SessionLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn lock(&self) -> &SessionLock {
        &self.lock
    }

    pub fn layout(&self) -> &LibraryLayout {
        &self.layout
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    pub fn registry(&self) -> &Registry {
        self.analyzer.registry()
    }

    /// Create every library folder
    pub async fn prepare_layout(&self) -> Result<()> {
        for folder in self.layout.folders() {
            self.fs
                .create_dir_all(&folder)
                .await
                .map_err(|e| PictorError::file_op(&folder, e))?;
            debug!("Created/verified folder: {:?}", folder);
        }
        Ok(())
    }

    /// Image files in `dir`, sorted by path
    async fn images_in(&self, dir: &Path) -> std::io::Result<Vec<ImageFileRef>> {
        let mut images = Vec::new();
        for path in self.fs.list_dir(dir).await? {
            if !is_image(&path) || !should_process(&path) {
                continue;
            }
            match self.fs.stat(&path).await {
                Ok(stat) if stat.is_file => images.push(ImageFileRef::new(path, stat.size)),
                Ok(_) => {}
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }
        images.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(images)
    }

    /// List the images waiting in the intake folder
    pub async fn discover(&self) -> Result<Vec<ImageFileRef>> {
        let intake = self.layout.intake();
        self.images_in(&intake).await.map_err(|e| {
            PictorError::SessionFatal(format!("cannot read intake {:?}: {}", intake, e))
        })
    }

    /// Run one organize session over everything in the intake
    pub async fn start(&self) -> Result<SessionOutcome> {
        if self.lock.is_running() {
            return Err(PictorError::SessionAlreadyActive);
        }

        let files = self.discover().await?;
        if files.is_empty() {
            info!("No images found in {:?}", self.layout.intake());
            return Ok(SessionOutcome::NoInput {
                intake: self.layout.intake(),
            });
        }

        let guard = self.lock.acquire(OrganizeSession::new(files.len()))?;
        let started = Instant::now();
        let session_id = guard.current().map(|s| s.id).unwrap_or_default();
        info!(session_id = %session_id, "Starting organize session: {} images", files.len());

        let total = files.len();
        for (index, file) in files.iter().enumerate() {
            // No subscribers is fine
            let _ = self.progress.send(ProgressEvent {
                current: index + 1,
                total,
                current_file: file.file_name(),
            });

            match self.process_file(file).await {
                Ok(placement) => {
                    info!(
                        "Processed: {} -> {}/{}",
                        file.file_name(),
                        placement.category,
                        placement.name.to_string_lossy()
                    );
                    guard.update(|s| s.record_success(placement.category));
                }
                Err(e) => {
                    error!("Failed to process {:?}: {}", file.path, e);
                    guard.update(|s| s.record_failure());
                }
            }
        }

        guard.update(|s| s.duration_ms = started.elapsed().as_millis() as u64);
        let report = guard
            .current()
            .map(|s| s.report())
            .ok_or_else(|| PictorError::SessionFatal("session state lost".to_string()))?;

        let path = self.reports.save(&report).await?;
        info!(
            session_id = %report.session_id,
            successful = report.successful,
            errors = report.errors,
            "Session completed in {} ms, report at {:?}",
            report.processing_time_ms,
            path
        );

        guard.complete(report.clone());
        Ok(SessionOutcome::Completed(report))
    }

    async fn process_file(&self, file: &ImageFileRef) -> Result<Placement> {
        let record = self.analyzer.analyze(file).await;
        let category = self.categorizer.categorize(&record);
        let name = self
            .synthesizer
            .synthesize(&record, &file.path, self.clock.as_ref());

        let folder = self.layout.classified(category);
        self.fs
            .create_dir_all(&folder)
            .await
            .map_err(|e| PictorError::file_op(&folder, e))?;
        let destination = folder.join(&name);
        self.fs
            .move_file(&file.path, &destination)
            .await
            .map_err(|e| PictorError::file_op(&file.path, e))?;

        let renamed = self.layout.renamed().join(&name);
        self.fs
            .copy_file(&destination, &renamed)
            .await
            .map_err(|e| PictorError::file_op(&renamed, e))?;

        Ok(Placement { category, name })
    }

    /// Copy every image from `source` into the intake, replacing same-named files
    pub async fn import(&self, source: &Path) -> Result<usize> {
        let images = self
            .images_in(source)
            .await
            .map_err(|e| PictorError::file_op(source, e))?;

        let intake = self.layout.intake();
        self.fs
            .create_dir_all(&intake)
            .await
            .map_err(|e| PictorError::file_op(&intake, e))?;

        for image in &images {
            let target = intake.join(image.file_name());
            self.fs
                .copy_file(&image.path, &target)
                .await
                .map_err(|e| PictorError::file_op(&image.path, e))?;
        }

        info!("Imported {} images from {:?}", images.len(), source);
        Ok(images.len())
    }

    /// Count images waiting in the intake and filed under each category
    pub async fn stats(&self) -> Result<LibraryStats> {
        let raw_images = self
            .images_in(&self.layout.intake())
            .await
            .map_err(|e| PictorError::file_op(self.layout.intake(), e))?
            .len();

        let mut categorized = BTreeMap::new();
        for category in Category::ALL {
            let count = self
                .images_in(&self.layout.classified(category))
                .await
                .map(|images| images.len())
                .unwrap_or(0);
            categorized.insert(category, count);
        }

        Ok(LibraryStats {
            raw_images,
            categorized,
            base_path: self.layout.base().to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let mut session = OrganizeSession::new(3);
        session.record_success(Category::Food);
        session.record_success(Category::Food);
        session.record_failure();

        let report = session.report();
        assert_eq!(report.total, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.categories[&Category::Food], 2);
        assert_eq!(report.categories[&Category::General], 0);
        assert_eq!(report.categories.len(), Category::ALL.len());
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(OrganizeSession::new(1).id, OrganizeSession::new(1).id);
    }

    #[test]
    fn test_progress_event_shape() {
        let event = ProgressEvent {
            current: 2,
            total: 5,
            current_file: "a.jpg".to_string(),
        };
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["currentFile"], "a.jpg");
        assert_eq!(value["current"], 2);
    }
}
