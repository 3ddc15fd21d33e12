// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Intake folder watcher

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::session::is_image;
use crate::Result;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// An image appeared in the intake
    ImageArrived(PathBuf),
    /// Watcher error
    Error(String),
}

/// Watches the intake folder for new images
pub struct IntakeWatcher {
    _watcher: RecommendedWatcher,
    intake: PathBuf,
    event_rx: Receiver<notify::Result<Event>>,
}

impl IntakeWatcher {
    /// Start watching `intake`, creating it if needed
    pub fn new(intake: &Path) -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default().with_poll_interval(Duration::from_secs(2));

        let mut watcher = RecommendedWatcher::new(tx, config)?;

        if !intake.exists() {
            std::fs::create_dir_all(intake)?;
            info!("Created intake directory: {:?}", intake);
        }
        watcher.watch(intake, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", intake);

        Ok(Self {
            _watcher: watcher,
            intake: intake.to_path_buf(),
            event_rx: rx,
        })
    }

    pub fn intake(&self) -> &Path {
        &self.intake
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(WatchEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }
}

/// Keep only events that bring a processable image into the folder
fn convert_event(event: Event) -> Option<WatchEvent> {
    let arrived = match event.kind {
        EventKind::Create(_) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.last(),
        _ => None,
    }?;

    (is_image(arrived) && should_process(arrived))
        .then(|| WatchEvent::ImageArrived(arrived.clone()))
}

/// Check if a file should be processed
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip partial downloads
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}

/// Wait for file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let check_interval = Duration::from_millis(500);
    let start = std::time::Instant::now();

    let mut last_size = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(check_interval).await;

        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true; // Proceed anyway
        }

        let current_size = match tokio::fs::metadata(path).await {
            Ok(m) => m.len(),
            Err(_) => return false, // File was deleted
        };

        if current_size == last_size {
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::CreateKind;

    #[test]
    fn test_should_process_skips_hidden_and_partial() {
        assert!(should_process(Path::new("/raw/beach.jpg")));
        assert!(!should_process(Path::new("/raw/.beach.jpg")));
        assert!(!should_process(Path::new("/raw/beach.jpg.crdownload")));
        assert!(!should_process(Path::new("/raw/Thumbs.db")));
    }

    #[test]
    fn test_convert_event_only_reports_images() {
        let created =
            |p: &str| Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from(p));

        assert_eq!(
            convert_event(created("/raw/a.png")),
            Some(WatchEvent::ImageArrived(PathBuf::from("/raw/a.png")))
        );
        assert_eq!(convert_event(created("/raw/notes.txt")), None);
        assert_eq!(convert_event(created("/raw/a.png.part")), None);

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(PathBuf::from("/raw/a.png"));
        assert_eq!(convert_event(removed), None);
    }

    #[tokio::test]
    async fn test_wait_for_stable_on_finished_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("done.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        assert!(wait_for_stable(&path, Duration::from_secs(5)).await);
        assert!(!wait_for_stable(&dir.path().join("gone.jpg"), Duration::from_secs(5)).await);
    }
}
