// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Pictor

use std::path::PathBuf;
use thiserror::Error;

use crate::capabilities::Capability;

/// Result type alias for Pictor operations
pub type Result<T> = std::result::Result<T, PictorError>;

/// Pictor error types
#[derive(Error, Debug)]
pub enum PictorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A model-backed capability could not be brought up; the registry falls
    /// back to the heuristic variant.
    #[error("{capability} provider unavailable: {reason}")]
    ProviderUnavailable {
        capability: Capability,
        reason: String,
    },

    /// One capability failed while analyzing one image.
    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("File operation failed on {path:?}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("An organize session is already running")]
    SessionAlreadyActive,

    #[error("Session aborted: {0}")]
    SessionFatal(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PictorError {
    pub(crate) fn file_op(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOperation {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unavailable(capability: Capability, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            capability,
            reason: reason.into(),
        }
    }
}
