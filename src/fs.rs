// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filesystem collaborator used by the analyzer and the session orchestrator

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub is_file: bool,
}

/// Directory listing, stat, read, move and copy
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Direct children of a directory
    async fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    async fn stat(&self, path: &Path) -> io::Result<FileStat>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Move a file, replacing any file already at `to`
    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copy a file, replacing any file already at `to`
    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// The real disk, through tokio::fs
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl FileSystem for LocalFs {
    async fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        Ok(paths)
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(FileStat {
            size: meta.len(),
            is_file: meta.is_file(),
        })
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        // rename replaces `to` in place, so a failed move leaves it untouched
        let Err(e) = tokio::fs::rename(from, to).await else {
            return Ok(());
        };
        if !tokio::fs::try_exists(from).await.unwrap_or(false) {
            return Err(e);
        }
        // Rename cannot cross filesystems; copy and delete instead
        debug!("rename {:?} -> {:?} failed ({}), copying", from, to, e);
        tokio::fs::copy(from, to).await?;
        tokio::fs::remove_file(from).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::copy(from, to).await.map(|_| ())
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(dir).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FsOp {
    List,
    Read,
    Move,
    Copy,
    Write,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    failures: BTreeSet<(FsOp, PathBuf)>,
}

/// In-memory filesystem with failure injection
#[derive(Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a file, creating its parent directories
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            add_dirs(&mut state.dirs, parent);
        }
        state.files.insert(path, contents.into());
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn exists(&self, path: &Path) -> bool {
        let state = self.state();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    /// Files directly inside `dir`
    pub fn files_in(&self, dir: &Path) -> Vec<PathBuf> {
        self.state()
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect()
    }

    /// Make every later `op` on `path`, or on anything under it, fail
    pub fn fail_on(&self, op: FsOp, path: impl Into<PathBuf>) {
        self.state().failures.insert((op, path.into()));
    }

    fn check(state: &MemoryState, op: FsOp, path: &Path) -> io::Result<()> {
        if path
            .ancestors()
            .any(|p| state.failures.contains(&(op, p.to_path_buf())))
        {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("injected {:?} failure on {}", op, path.display()),
            ));
        }
        Ok(())
    }

    fn parent_exists(state: &MemoryState, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !state.dirs.contains(parent) => {
                Err(not_found(parent))
            }
            _ => Ok(()),
        }
    }
}

fn add_dirs(dirs: &mut BTreeSet<PathBuf>, dir: &Path) {
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(ErrorKind::NotFound, format!("{} not found", path.display()))
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn list_dir(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state();
        Self::check(&state, FsOp::List, dir)?;
        if !state.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        let files = state.files.keys().filter(|p| p.parent() == Some(dir));
        let dirs = state.dirs.iter().filter(|p| p.parent() == Some(dir));
        Ok(files.chain(dirs).cloned().collect())
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let state = self.state();
        if let Some(contents) = state.files.get(path) {
            Ok(FileStat {
                size: contents.len() as u64,
                is_file: true,
            })
        } else if state.dirs.contains(path) {
            Ok(FileStat {
                size: 0,
                is_file: false,
            })
        } else {
            Err(not_found(path))
        }
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.state();
        Self::check(&state, FsOp::Read, path)?;
        state.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        Self::check(&state, FsOp::Move, from)?;
        Self::parent_exists(&state, to)?;
        let contents = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state();
        Self::check(&state, FsOp::Copy, from)?;
        Self::parent_exists(&state, to)?;
        let contents = state.files.get(from).cloned().ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), contents);
        Ok(())
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        add_dirs(&mut self.state().dirs, dir);
        Ok(())
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        Self::check(&state, FsOp::Write, path)?;
        Self::parent_exists(&state, path)?;
        state.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }
}
