// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Folder layout of an image library

use std::path::{Path, PathBuf};

use crate::categorize::Category;

/// Extensions accepted from the intake folder (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// ```text
/// <base>/images/raw                     intake
/// <base>/images/classified/<category>   moved originals
/// <base>/images/renamed                 flat renamed copies
/// <base>/logs                           session reports
/// ```
#[derive(Debug, Clone)]
pub struct LibraryLayout {
    base: PathBuf,
}

impl LibraryLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn intake(&self) -> PathBuf {
        self.base.join("images").join("raw")
    }

    pub fn renamed(&self) -> PathBuf {
        self.base.join("images").join("renamed")
    }

    pub fn classified_root(&self) -> PathBuf {
        self.base.join("images").join("classified")
    }

    pub fn classified(&self, category: Category) -> PathBuf {
        self.classified_root().join(category.as_str())
    }

    pub fn logs(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Every folder the organizer writes to
    pub fn folders(&self) -> Vec<PathBuf> {
        let mut folders = vec![self.intake(), self.renamed()];
        folders.extend(Category::ALL.into_iter().map(|c| self.classified(c)));
        folders.push(self.logs());
        folders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_allow_list_is_case_insensitive() {
        assert!(is_image(Path::new("a.JPG")));
        assert!(is_image(Path::new("a.Tiff")));
        assert!(is_image(Path::new("/x/y.webp")));
        assert!(!is_image(Path::new("a.heic")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("jpg")));
    }

    #[test]
    fn test_layout_has_folder_per_category() {
        let layout = LibraryLayout::new("/lib");
        let folders = layout.folders();
        assert_eq!(folders.len(), 2 + Category::ALL.len() + 1);
        assert!(folders.contains(&PathBuf::from("/lib/images/classified/duplicates")));
        assert_eq!(layout.intake(), PathBuf::from("/lib/images/raw"));
    }
}
