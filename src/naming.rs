// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Destination filename synthesis

use chrono::{NaiveDate, Utc};
use std::ffi::OsString;
use std::path::Path;

use crate::analyzer::AnalysisRecord;

/// Source of "today" for filename suffixes
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Current UTC date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always the same date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed into one hyphen
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// First two whitespace-delimited words, restricted to `[a-z0-9-]`
fn leading_words(text: &str) -> String {
    text.split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct FilenameSynthesizer {
    /// Basename limit, extension excluded
    pub max_length: usize,
}

impl Default for FilenameSynthesizer {
    fn default() -> Self {
        Self { max_length: 50 }
    }
}

impl FilenameSynthesizer {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// The extension is copied byte for byte, so the result may not be UTF-8
    pub fn synthesize(
        &self,
        record: &AnalysisRecord,
        original: &Path,
        clock: &dyn Clock,
    ) -> OsString {
        let mut parts = Vec::with_capacity(4);

        if !record.text.is_empty() {
            parts.push(leading_words(&record.text));
        }
        if !record.faces.is_empty() {
            parts.push("portrait".to_string());
        }
        parts.push(slugify(&record.description));
        parts.push(clock.today().format("%Y-%m-%d").to_string());

        parts.retain(|p| !p.is_empty());
        let mut name = parts.join("-");

        // Only ASCII remains, so byte truncation is char-safe
        if name.len() > self.max_length {
            name.truncate(self.max_length);
        }
        let mut name = OsString::from(name.trim_end_matches('-'));
        if let Some(ext) = original.extension() {
            name.push(".");
            name.push(ext);
        }
        name
    }
}

/// Synthesize with the default length limit
pub fn synthesize(record: &AnalysisRecord, original: &Path, clock: &dyn Clock) -> OsString {
    FilenameSynthesizer::default().synthesize(record, original, clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ImageFileRef;
    use crate::capabilities::FaceDetection;

    fn clock() -> FixedClock {
        FixedClock(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    }

    fn record(description: &str) -> AnalysisRecord {
        let mut r = AnalysisRecord::defaults(&ImageFileRef::new("/raw/x.jpg", 1));
        r.description = description.to_string();
        r
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Food"), "food");
        assert_eq!(slugify("  Sunset -- over  the Bay!! "), "sunset-over-the-bay");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_plain_description() {
        let name = synthesize(&record("food"), Path::new("/raw/IMG_1.jpg"), &clock());
        assert_eq!(name, "food-2024-03-09.jpg");
    }

    #[test]
    fn test_portrait_prefix() {
        let mut r = record("person");
        r.faces.push(FaceDetection {
            confidence: 0.7,
            age: None,
            gender: None,
            expressions: None,
            confirmed: false,
        });
        let name = synthesize(&r, Path::new("/raw/a.png"), &clock());
        assert_eq!(name, "portrait-person-2024-03-09.png");
    }

    #[test]
    fn test_text_prefix_is_sanitized() {
        let mut r = record("document");
        r.text = "Invoice #42\nACME Corp".to_string();
        let name = synthesize(&r, Path::new("/raw/scan.PNG"), &clock());
        assert_eq!(name, "invoice-42-document-2024-03-09.PNG");
    }

    #[test]
    fn test_text_without_usable_chars_is_ignored() {
        let mut r = record("art");
        r.text = "★★ ☆".to_string();
        let name = synthesize(&r, Path::new("/raw/a.gif"), &clock());
        assert_eq!(name, "art-2024-03-09.gif");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let mut r = record("screenshot");
        r.text = "Supercalifragilisticexpialidocious Pneumonoultramicroscopicsilicovolcanoconiosis"
            .to_string();
        let name = synthesize(&r, Path::new("/raw/shot.webp"), &clock())
            .into_string()
            .unwrap();
        let stem = name.strip_suffix(".webp").unwrap();
        assert!(stem.len() <= 50);
        assert!(!stem.ends_with('-'));
        assert!(stem.starts_with("supercalifragilisticexpialidocious-pneumono"));
    }

    #[test]
    fn test_extension_kept_and_basename_bounded() {
        let descriptions = ["nature", "", "a b c d e f g h i j k l m n o p q r s t u v w x y z"];
        let paths = ["/raw/a.jpeg", "/raw/b.TIFF", "/raw/noext", "/raw/c.tar.bmp"];
        for description in descriptions {
            for path in paths {
                let mut r = record(description);
                r.text = "Lorem ipsum dolor sit amet".to_string();
                let path = Path::new(path);
                let name = synthesize(&r, path, &clock()).into_string().unwrap();
                let stem = match path.extension() {
                    Some(ext) => {
                        let suffix = format!(".{}", ext.to_string_lossy());
                        assert!(name.ends_with(&suffix), "{} lost {}", name, suffix);
                        name.strip_suffix(&suffix).unwrap().to_string()
                    }
                    None => name.clone(),
                };
                assert!(stem.len() <= 50, "{} too long", stem);
            }
        }
    }

    #[test]
    fn test_custom_length_limit() {
        let name = FilenameSynthesizer::new(12).synthesize(
            &record("nature"),
            Path::new("/raw/a.jpg"),
            &clock(),
        );
        assert_eq!(name, "nature-2024.jpg");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_extension_is_kept_verbatim() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let original = Path::new(std::ffi::OsStr::from_bytes(b"/raw/a.jp\xffg"));
        let name = synthesize(&record("food"), original, &clock());
        assert_eq!(name.into_vec(), b"food-2024-03-09.jp\xffg".to_vec());
    }

    #[test]
    fn test_system_clock_is_utc() {
        let before = Utc::now().date_naive();
        let today = SystemClock.today();
        let after = Utc::now().date_naive();
        assert!(today == before || today == after);
    }
}
