// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use std::path::Path;

use pictor::analyzer::{AnalysisRecord, ImageFileRef};
use pictor::naming::{FilenameSynthesizer, FixedClock};

#[derive(Arbitrary, Debug)]
struct Input {
    description: String,
    text: String,
    original: String,
    faces: bool,
    max_length: u8,
}

fuzz_target!(|input: Input| {
    let Some(date) = NaiveDate::from_ymd_opt(2024, 3, 9) else {
        return;
    };
    let file = ImageFileRef::new(&input.original, 0);
    let mut record = AnalysisRecord::defaults(&file);
    record.description = input.description;
    record.text = input.text;
    if input.faces {
        record.faces.push(pictor::capabilities::FaceDetection {
            confidence: 0.7,
            age: None,
            gender: None,
            expressions: None,
            confirmed: false,
        });
    }

    let max_length = usize::from(input.max_length).max(12);
    let name = FilenameSynthesizer::new(max_length).synthesize(
        &record,
        Path::new(&input.original),
        &FixedClock(date),
    );

    let name = name.to_string_lossy();
    let stem = name.split('.').next().unwrap_or_default();
    assert!(stem.len() <= max_length);
    assert!(!stem.ends_with('-'));
    assert!(!name.contains('/'));
});
