// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-image analysis: concurrent fan-out over every capability

use image::imageops::FilterType;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capabilities::{
    Capability, Classification, FaceDetection, LabelScore, Registry, SceneLabel, SourceImage,
};
use crate::fs::FileSystem;
use crate::Result;

/// Side of the normalized frame shared by the frame-based capabilities
pub const NORMALIZED_SIZE: u32 = 224;

/// One discovered input file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFileRef {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lower-cased extension
    pub format: String,
}

impl ImageFileRef {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            path,
            size_bytes,
            format,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
}

/// Everything learned about one image; every field always holds a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub description: String,
    pub label: SceneLabel,
    pub faces: Vec<FaceDetection>,
    pub is_nsfw: bool,
    pub nsfw_score: f32,
    pub text: String,
    /// 64-character aHash bit string, empty when hashing failed
    pub fingerprint: String,
    pub metadata: ImageMetadata,
}

impl AnalysisRecord {
    /// The record produced when every capability fails
    pub fn defaults(file: &ImageFileRef) -> Self {
        Self {
            description: SceneLabel::General.to_string(),
            label: SceneLabel::General,
            faces: Vec::new(),
            is_nsfw: false,
            nsfw_score: 0.0,
            text: String::new(),
            fingerprint: String::new(),
            metadata: ImageMetadata {
                width: 0,
                height: 0,
                format: file.format.clone(),
                size_bytes: file.size_bytes,
            },
        }
    }

    fn apply_classification(&mut self, classification: Classification) {
        self.label = classification.label;
        self.description = classification.label.to_string();
    }
}

/// Sum of the probabilities of the sensitive labels, capped at 1
pub fn sensitive_score(scores: &[LabelScore]) -> f32 {
    scores
        .iter()
        .filter(|s| s.label.is_sensitive())
        .map(|s| s.probability)
        .sum::<f32>()
        .clamp(0.0, 1.0)
}

/// Image analyzer over the registry's providers
pub struct ImageAnalyzer {
    registry: Arc<Registry>,
    fs: Arc<dyn FileSystem>,
    nsfw_threshold: f32,
}

impl ImageAnalyzer {
    pub fn new(registry: Arc<Registry>, fs: Arc<dyn FileSystem>, nsfw_threshold: f32) -> Self {
        Self {
            registry,
            fs,
            nsfw_threshold,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn load(&self, file: &ImageFileRef) -> Result<SourceImage> {
        let bytes = self.fs.read(&file.path).await?;
        let image = image::load_from_memory(&bytes)?;
        Ok(SourceImage {
            path: file.path.clone(),
            bytes,
            image,
        })
    }

    /// Analyze one image.
    ///
    /// Never fails: any capability that errors, panics or is disabled
    /// contributes its default instead.
    pub async fn analyze(&self, file: &ImageFileRef) -> AnalysisRecord {
        info!("Analyzing image: {:?}", file.path);

        let mut record = AnalysisRecord::defaults(file);

        let source = match self.load(file).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Could not decode {:?}, using defaults: {}", file.path, e);
                return record;
            }
        };

        let (width, height) = source.image.dimensions();
        record.metadata.width = width;
        record.metadata.height = height;
        if let Ok(format) = image::guess_format(&source.bytes) {
            record.metadata.format = format!("{:?}", format).to_lowercase();
        }

        let frame = Arc::new(
            source
                .image
                .resize_exact(NORMALIZED_SIZE, NORMALIZED_SIZE, FilterType::Triangle)
                .to_rgb8(),
        );
        let source = Arc::new(source);

        let classify = self.registry.classifier().map(|p| {
            let frame = Arc::clone(&frame);
            tokio::spawn(async move { p.classify(&frame).await })
        });
        let faces = self.registry.face_detector().map(|p| {
            let frame = Arc::clone(&frame);
            tokio::spawn(async move { p.detect(&frame).await })
        });
        let sensitive = self.registry.sensitive_scorer().map(|p| {
            let frame = Arc::clone(&frame);
            tokio::spawn(async move { p.score(&frame).await })
        });
        let text = self.registry.text_extractor().map(|p| {
            let source = Arc::clone(&source);
            tokio::spawn(async move { p.extract(&source).await })
        });
        let fingerprint = self.registry.hasher().map(|p| {
            let source = Arc::clone(&source);
            tokio::spawn(async move { p.fingerprint(&source.image).await })
        });

        let (classification, faces, scores, text, fingerprint) = tokio::join!(
            settle(Capability::Classifier, &file.path, classify),
            settle(Capability::FaceDetector, &file.path, faces),
            settle(Capability::SensitiveScorer, &file.path, sensitive),
            settle(Capability::TextExtractor, &file.path, text),
            settle(Capability::Hasher, &file.path, fingerprint),
        );

        if let Some(classification) = classification {
            record.apply_classification(classification);
        }
        if let Some(faces) = faces {
            record.faces = faces;
        }
        if let Some(scores) = scores {
            record.nsfw_score = sensitive_score(&scores);
            record.is_nsfw = record.nsfw_score > self.nsfw_threshold;
        }
        if let Some(text) = text {
            record.text = text.trim().to_string();
        }
        if let Some(fingerprint) = fingerprint {
            record.fingerprint = fingerprint;
        }

        debug!(
            description = %record.description,
            faces = record.faces.len(),
            nsfw_score = record.nsfw_score,
            text_chars = record.text.chars().count(),
            "Analysis complete for {:?}",
            file.path
        );

        record
    }
}

/// Await one capability task, turning every failure into `None`
fn settle<'a, T: Send + 'static>(
    capability: Capability,
    path: &'a Path,
    task: Option<JoinHandle<Result<T>>>,
) -> impl Future<Output = Option<T>> + 'a {
    async move {
        let task = match task {
            Some(task) => task,
            None => {
                debug!(capability = %capability, "Capability disabled, using default");
                return None;
            }
        };
        match task.await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(capability = %capability, error = %e, "Capability failed for {:?}", path);
                None
            }
            Err(e) => {
                warn!(
                    capability = %capability,
                    error = %e,
                    "Capability task aborted for {:?}",
                    path
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{
        Classifier, FaceDetector, PerceptualHasher, Provider, SensitiveLabel, SensitiveScorer,
        TextExtractor,
    };
    use crate::config::{CapabilityToggles, Thresholds};
    use crate::fs::MemoryFs;
    use crate::PictorError;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn png(r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(48, 32, Rgb([r, g, b]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn memory_with(path: &str, bytes: Vec<u8>) -> (Arc<MemoryFs>, ImageFileRef) {
        let fs = Arc::new(MemoryFs::new());
        let size = bytes.len() as u64;
        fs.insert(path, bytes);
        (fs, ImageFileRef::new(path, size))
    }

    struct Broken;

    #[async_trait]
    impl Classifier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn classify(&self, _frame: &RgbImage) -> Result<Classification> {
            Err(PictorError::Analysis("inference crashed".to_string()))
        }
    }

    #[async_trait]
    impl FaceDetector for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn detect(&self, _frame: &RgbImage) -> Result<Vec<FaceDetection>> {
            panic!("detector segfault");
        }
    }

    #[async_trait]
    impl SensitiveScorer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn score(&self, _frame: &RgbImage) -> Result<Vec<LabelScore>> {
            Err(PictorError::Analysis("no tensor".to_string()))
        }
    }

    #[async_trait]
    impl TextExtractor for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn extract(&self, _source: &SourceImage) -> Result<String> {
            Err(PictorError::Analysis("ocr worker died".to_string()))
        }
    }

    #[async_trait]
    impl PerceptualHasher for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn fingerprint(&self, _image: &DynamicImage) -> Result<String> {
            Err(PictorError::Analysis("hash failed".to_string()))
        }
    }

    fn broken_registry() -> Registry {
        Registry::heuristic(&CapabilityToggles::default(), &Thresholds::default())
            .with_provider(Provider::Classifier(Arc::new(Broken)))
            .with_provider(Provider::FaceDetector(Arc::new(Broken)))
            .with_provider(Provider::SensitiveScorer(Arc::new(Broken)))
            .with_provider(Provider::TextExtractor(Arc::new(Broken)))
            .with_provider(Provider::Hasher(Arc::new(Broken)))
    }

    #[tokio::test]
    async fn test_every_capability_failing_yields_defaults() {
        let (fs, file) = memory_with("/raw/a.png", png(210, 150, 120));
        let analyzer = ImageAnalyzer::new(Arc::new(broken_registry()), fs, 0.6);

        let record = analyzer.analyze(&file).await;

        assert_eq!(record.description, "general");
        assert_eq!(record.label, SceneLabel::General);
        assert!(record.faces.is_empty());
        assert!(!record.is_nsfw);
        assert_eq!(record.nsfw_score, 0.0);
        assert_eq!(record.text, "");
        assert_eq!(record.fingerprint, "");
        assert_eq!(record.metadata.width, 48);
        assert_eq!(record.metadata.height, 32);
        assert_eq!(record.metadata.format, "png");
    }

    #[tokio::test]
    async fn test_undecodable_file_yields_defaults() {
        let (fs, file) = memory_with("/raw/corrupt.jpg", b"not an image".to_vec());
        let registry = Registry::heuristic(&CapabilityToggles::default(), &Thresholds::default());
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);

        let record = analyzer.analyze(&file).await;

        assert_eq!(record, AnalysisRecord::defaults(&file));
        assert_eq!(record.metadata.size_bytes, 12);
        assert_eq!(record.metadata.format, "jpg");
    }

    #[tokio::test]
    async fn test_heuristics_fill_record() {
        let (fs, file) = memory_with("/raw/forest.png", png(40, 160, 60));
        let registry = Registry::heuristic(&CapabilityToggles::default(), &Thresholds::default());
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);

        let record = analyzer.analyze(&file).await;

        assert_eq!(record.label, SceneLabel::Nature);
        assert_eq!(record.description, "nature");
        assert!(record.faces.is_empty());
        assert_eq!(record.fingerprint.len(), 64);
    }

    #[tokio::test]
    async fn test_disabled_capabilities_use_defaults() {
        let toggles = CapabilityToggles {
            classifier: false,
            hash: false,
            ..CapabilityToggles::default()
        };
        let (fs, file) = memory_with("/raw/forest.png", png(40, 160, 60));
        let registry = Registry::heuristic(&toggles, &Thresholds::default());
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);

        let record = analyzer.analyze(&file).await;

        assert_eq!(record.description, "general");
        assert_eq!(record.fingerprint, "");
    }

    struct Scores(Vec<LabelScore>);

    #[async_trait]
    impl SensitiveScorer for Scores {
        fn name(&self) -> &'static str {
            "scores"
        }
        async fn score(&self, _frame: &RgbImage) -> Result<Vec<LabelScore>> {
            Ok(self.0.clone())
        }
    }

    fn scorer(porn: f32, hentai: f32, sexy: f32) -> Provider {
        Provider::SensitiveScorer(Arc::new(Scores(vec![
            LabelScore {
                label: SensitiveLabel::Porn,
                probability: porn,
            },
            LabelScore {
                label: SensitiveLabel::Hentai,
                probability: hentai,
            },
            LabelScore {
                label: SensitiveLabel::Sexy,
                probability: sexy,
            },
        ])))
    }

    #[tokio::test]
    async fn test_nsfw_threshold_is_strict() {
        let heuristic =
            || Registry::heuristic(&CapabilityToggles::default(), &Thresholds::default());

        let (fs, file) = memory_with("/raw/a.png", png(10, 10, 10));
        let registry = heuristic().with_provider(scorer(0.4, 0.25, 0.3));
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);
        let record = analyzer.analyze(&file).await;
        assert!((record.nsfw_score - 0.65).abs() < 1e-6);
        assert!(record.is_nsfw);

        // "sexy" is not part of the sensitive subset
        let (fs, file) = memory_with("/raw/a.png", png(10, 10, 10));
        let registry = heuristic().with_provider(scorer(0.3, 0.0, 0.7));
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);
        let record = analyzer.analyze(&file).await;
        assert!(!record.is_nsfw);

        // Raising the threshold keeps the score but clears the flag
        let (fs, file) = memory_with("/raw/a.png", png(10, 10, 10));
        let registry = heuristic().with_provider(scorer(0.4, 0.25, 0.0));
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.9);
        let record = analyzer.analyze(&file).await;
        assert!(!record.is_nsfw);
    }

    struct SlowText(Duration);

    #[async_trait]
    impl TextExtractor for SlowText {
        fn name(&self) -> &'static str {
            "slow"
        }
        async fn extract(&self, source: &SourceImage) -> Result<String> {
            tokio::time::sleep(self.0).await;
            Ok(format!("  {} px wide  ", source.image.width()))
        }
    }

    struct SlowClassifier(Duration);

    #[async_trait]
    impl Classifier for SlowClassifier {
        fn name(&self) -> &'static str {
            "slow"
        }
        async fn classify(&self, _frame: &RgbImage) -> Result<Classification> {
            tokio::time::sleep(self.0).await;
            Ok(Classification {
                label: SceneLabel::Food,
                confidence: 0.9,
            })
        }
    }

    #[tokio::test]
    async fn test_capabilities_run_concurrently_and_settle() {
        let delay = Duration::from_millis(300);
        let registry = Registry::heuristic(&CapabilityToggles::default(), &Thresholds::default())
            .with_provider(Provider::TextExtractor(Arc::new(SlowText(delay))))
            .with_provider(Provider::Classifier(Arc::new(SlowClassifier(delay))));
        let (fs, file) = memory_with("/raw/a.png", png(10, 10, 10));
        let analyzer = ImageAnalyzer::new(Arc::new(registry), fs, 0.6);

        let started = Instant::now();
        let record = analyzer.analyze(&file).await;

        assert!(started.elapsed() < delay * 2);
        // Text extraction sees the original resolution, trimmed
        assert_eq!(record.text, "48 px wide");
        assert_eq!(record.description, "food");
    }

    #[test]
    fn test_sensitive_score_is_capped() {
        let scores = [
            LabelScore {
                label: SensitiveLabel::Porn,
                probability: 0.9,
            },
            LabelScore {
                label: SensitiveLabel::Hentai,
                probability: 0.8,
            },
        ];
        assert_eq!(sensitive_score(&scores), 1.0);
        assert_eq!(sensitive_score(&[]), 0.0);
    }

    #[test]
    fn test_file_ref_format_is_lowercased() {
        let file = ImageFileRef::new("/raw/IMG_001.JPG", 10);
        assert_eq!(file.format, "jpg");
        assert_eq!(file.file_name(), "IMG_001.JPG");
    }
}
