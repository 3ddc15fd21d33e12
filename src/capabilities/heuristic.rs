// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Always-available heuristic providers

use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

use super::hash::AverageHasher;
use super::{
    Capability, Classification, Classifier, FaceDetection, FaceDetector, LabelScore, Provider,
    SensitiveLabel, SensitiveScorer, SourceImage, TextExtractor,
};
use crate::config::Thresholds;
use crate::Result;

/// Heuristic provider for a capability
pub fn fallback(capability: Capability, thresholds: &Thresholds) -> Provider {
    match capability {
        Capability::Classifier => Provider::Classifier(Arc::new(ColorClassifier)),
        Capability::FaceDetector => {
            Provider::FaceDetector(Arc::new(SkinToneDetector::new(thresholds.skin_ratio)))
        }
        Capability::SensitiveScorer => Provider::SensitiveScorer(Arc::new(NeutralScorer)),
        Capability::TextExtractor => Provider::TextExtractor(Arc::new(NoTextExtractor)),
        Capability::Hasher => Provider::Hasher(Arc::new(AverageHasher)),
    }
}

/// Mean RGB over the frame
fn mean_color(frame: &RgbImage) -> [f64; 3] {
    let mut sums = [0u64; 3];
    for pixel in frame.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
    }
    let count = (frame.width() as u64 * frame.height() as u64).max(1) as f64;
    sums.map(|s| s as f64 / count)
}

/// Picks a scene from the dominant colour balance
pub struct ColorClassifier;

impl ColorClassifier {
    pub fn label_for(frame: &RgbImage) -> super::SceneLabel {
        use super::SceneLabel;

        let [r, g, b] = mean_color(frame);
        if g > r && g > b && g > 100.0 {
            SceneLabel::Nature
        } else if r > 150.0 && g > 100.0 && b < 100.0 {
            SceneLabel::Food
        } else if b > r && b > g {
            SceneLabel::Screenshot
        } else {
            SceneLabel::General
        }
    }
}

#[async_trait]
impl Classifier for ColorClassifier {
    fn name(&self) -> &'static str {
        "color-heuristic"
    }

    async fn classify(&self, frame: &RgbImage) -> Result<Classification> {
        Ok(Classification {
            label: Self::label_for(frame),
            confidence: 0.3,
        })
    }
}

/// Reports one unconfirmed face when enough pixels look like skin
pub struct SkinToneDetector {
    threshold: f32,
}

impl SkinToneDetector {
    pub const CONFIDENCE: f32 = 0.7;

    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn is_skin(r: u8, g: u8, b: u8) -> bool {
        r > 80 && g > 50 && b > 40 && r > b && r > g
    }

    pub fn skin_ratio(frame: &RgbImage) -> f32 {
        let total = (frame.width() as usize * frame.height() as usize).max(1);
        let skin = frame
            .pixels()
            .filter(|p| Self::is_skin(p[0], p[1], p[2]))
            .count();
        skin as f32 / total as f32
    }
}

#[async_trait]
impl FaceDetector for SkinToneDetector {
    fn name(&self) -> &'static str {
        "skin-tone-heuristic"
    }

    async fn detect(&self, frame: &RgbImage) -> Result<Vec<FaceDetection>> {
        if Self::skin_ratio(frame) > self.threshold {
            Ok(vec![FaceDetection {
                confidence: Self::CONFIDENCE,
                age: None,
                gender: None,
                expressions: None,
                confirmed: false,
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Without a model nothing is flagged
pub struct NeutralScorer;

#[async_trait]
impl SensitiveScorer for NeutralScorer {
    fn name(&self) -> &'static str {
        "neutral-heuristic"
    }

    async fn score(&self, _frame: &RgbImage) -> Result<Vec<LabelScore>> {
        Ok(vec![LabelScore {
            label: SensitiveLabel::Neutral,
            probability: 1.0,
        }])
    }
}

pub struct NoTextExtractor;

#[async_trait]
impl TextExtractor for NoTextExtractor {
    fn name(&self) -> &'static str {
        "no-text-heuristic"
    }

    async fn extract(&self, _source: &SourceImage) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::SceneLabel;
    use image::Rgb;

    fn solid(r: u8, g: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(224, 224, Rgb([r, g, b]))
    }

    #[test]
    fn test_color_rules() {
        assert_eq!(ColorClassifier::label_for(&solid(40, 160, 60)), SceneLabel::Nature);
        assert_eq!(ColorClassifier::label_for(&solid(200, 140, 40)), SceneLabel::Food);
        assert_eq!(ColorClassifier::label_for(&solid(30, 60, 200)), SceneLabel::Screenshot);
        assert_eq!(ColorClassifier::label_for(&solid(128, 128, 128)), SceneLabel::General);
    }

    #[tokio::test]
    async fn test_skin_detector_reports_single_unconfirmed_face() {
        let detector = SkinToneDetector::new(0.15);
        let faces = detector.detect(&solid(210, 150, 120)).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert!(!faces[0].confirmed);
        assert_eq!(faces[0].confidence, SkinToneDetector::CONFIDENCE);
        assert!(faces[0].age.is_none());
    }

    #[tokio::test]
    async fn test_skin_detector_threshold() {
        // 10% skin: below the default threshold
        let mut frame = solid(20, 20, 20);
        for y in 0..22 {
            for x in 0..224 {
                frame.put_pixel(x, y, Rgb([210, 150, 120]));
            }
        }
        let ratio = SkinToneDetector::skin_ratio(&frame);
        assert!(ratio > 0.09 && ratio < 0.11);
        assert!(SkinToneDetector::new(0.15).detect(&frame).await.unwrap().is_empty());
        assert_eq!(SkinToneDetector::new(0.05).detect(&frame).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_neutral_scorer_flags_nothing() {
        let scores = NeutralScorer.score(&solid(0, 0, 0)).await.unwrap();
        assert!(scores.iter().all(|s| !s.label.is_sensitive()));
    }

    #[test]
    fn test_fallback_matches_capability() {
        let thresholds = Thresholds::default();
        for capability in Capability::ALL {
            assert_eq!(fallback(capability, &thresholds).capability(), capability);
        }
    }
}
