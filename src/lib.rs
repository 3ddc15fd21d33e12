// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Pictor: Local AI-assisted Image Organizer
//!
//! Analyzes a batch of images with a set of independent capabilities
//! (scene classifier, face detector, sensitive-content scorer, text
//! extractor, perceptual hasher), then files each one under a category
//! folder with a descriptive name and writes a session report.

pub mod analyzer;
pub mod capabilities;
pub mod categorize;
pub mod config;
pub mod error;
pub mod fs;
pub mod naming;
pub mod ollama;
pub mod report;
pub mod session;
pub mod watcher;

pub use analyzer::{AnalysisRecord, ImageAnalyzer, ImageFileRef};
pub use capabilities::{Capability, Registry};
pub use categorize::{categorize, Category};
pub use config::AppConfig;
pub use error::{PictorError, Result};
pub use naming::synthesize;
pub use session::{Organizer, SessionOutcome};
