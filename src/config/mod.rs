// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Pictor

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Library layout root
    #[serde(default)]
    pub library: LibraryConfig,

    /// AI engine configuration
    pub ai_engine: EngineConfig,

    /// Which capabilities take part in analysis
    #[serde(default)]
    pub capabilities: CapabilityToggles,

    /// Decision thresholds
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Intake watcher settings
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub models: ModelConfig,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Vision model used by each model-backed capability
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub classifier: String,
    #[serde(default = "default_vision_model")]
    pub faces: String,
    #[serde(default = "default_vision_model")]
    pub sensitive: String,
    #[serde(default = "default_vision_model")]
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CapabilityToggles {
    #[serde(default = "default_true")]
    pub classifier: bool,
    #[serde(default = "default_true")]
    pub faces: bool,
    #[serde(default = "default_true")]
    pub sensitive: bool,
    #[serde(default = "default_true")]
    pub text: bool,
    #[serde(default = "default_true")]
    pub hash: bool,
}

/// Overridable decision constants
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Thresholds {
    /// `is_nsfw` is set when the sensitive score exceeds this
    #[serde(default = "default_nsfw_threshold")]
    pub nsfw: f32,
    /// Skin-pixel fraction above which the face heuristic reports a face
    #[serde(default = "default_skin_ratio")]
    pub skin_ratio: f32,
    /// Text longer than this (in chars) routes to documents
    #[serde(default = "default_substantial_text")]
    pub substantial_text_chars: usize,
    /// Maximum basename length of synthesized filenames
    #[serde(default = "default_max_filename_length")]
    pub max_filename_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Seconds to wait for a new file to stop growing
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

// Default value functions
fn default_base_path() -> PathBuf { PathBuf::from("./pictor-library") }
fn default_timeout() -> u64 { 120 }
fn default_vision_model() -> String { "moondream".to_string() }
fn default_true() -> bool { true }
fn default_nsfw_threshold() -> f32 { 0.6 }
fn default_skin_ratio() -> f32 { 0.15 }
fn default_substantial_text() -> usize { 50 }
fn default_max_filename_length() -> usize { 50 }
fn default_settle_secs() -> u64 { 10 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library: LibraryConfig::default(),
            ai_engine: EngineConfig {
                url: "http://localhost:11434".to_string(),
                models: ModelConfig {
                    classifier: default_vision_model(),
                    faces: default_vision_model(),
                    sensitive: default_vision_model(),
                    text: default_vision_model(),
                },
                timeout_secs: default_timeout(),
            },
            capabilities: CapabilityToggles::default(),
            thresholds: Thresholds::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            classifier: true,
            faces: true,
            sensitive: true,
            text: true,
            hash: true,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            nsfw: default_nsfw_threshold(),
            skin_ratio: default_skin_ratio(),
            substantial_text_chars: default_substantial_text(),
            max_filename_length: default_max_filename_length(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            settle_secs: default_settle_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::PictorError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject threshold values that would make the rule chain meaningless
    pub fn validate(&self) -> crate::Result<()> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.nsfw) {
            return Err(crate::PictorError::Config(format!(
                "thresholds.nsfw must be within 0..1, got {}",
                t.nsfw
            )));
        }
        if !(0.0..=1.0).contains(&t.skin_ratio) {
            return Err(crate::PictorError::Config(format!(
                "thresholds.skin_ratio must be within 0..1, got {}",
                t.skin_ratio
            )));
        }
        if t.max_filename_length < 12 {
            return Err(crate::PictorError::Config(
                "thresholds.max_filename_length must leave room for the date suffix".to_string(),
            ));
        }
        Ok(())
    }
}
