// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Destination categories and the rule chain that picks one

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analyzer::AnalysisRecord;
use crate::capabilities::SceneLabel;

/// Destination category; folder names match the serialized form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Nsfw,
    Selfies,
    Documents,
    Nature,
    Food,
    Screenshots,
    General,
    /// Reserved for duplicate grouping; the rule chain never picks it
    Duplicates,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Nsfw,
        Category::Selfies,
        Category::Documents,
        Category::Nature,
        Category::Food,
        Category::Screenshots,
        Category::General,
        Category::Duplicates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Nsfw => "nsfw",
            Category::Selfies => "selfies",
            Category::Documents => "documents",
            Category::Nature => "nature",
            Category::Food => "food",
            Category::Screenshots => "screenshots",
            Category::General => "general",
            Category::Duplicates => "duplicates",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered priority rules; the first match wins
#[derive(Debug, Clone, Copy)]
pub struct Categorizer {
    /// Text longer than this many chars makes an image a document
    pub substantial_text_chars: usize,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self {
            substantial_text_chars: 50,
        }
    }
}

impl Categorizer {
    pub fn new(substantial_text_chars: usize) -> Self {
        Self {
            substantial_text_chars,
        }
    }

    pub fn categorize(&self, record: &AnalysisRecord) -> Category {
        if record.is_nsfw {
            return Category::Nsfw;
        }
        if !record.faces.is_empty() {
            return Category::Selfies;
        }
        if record.text.chars().count() > self.substantial_text_chars {
            return Category::Documents;
        }
        match record.label {
            SceneLabel::Screenshot => Category::Screenshots,
            SceneLabel::Nature => Category::Nature,
            SceneLabel::Food => Category::Food,
            _ => Category::General,
        }
    }
}

/// Categorize with the default thresholds
pub fn categorize(record: &AnalysisRecord) -> Category {
    Categorizer::default().categorize(record)
}
