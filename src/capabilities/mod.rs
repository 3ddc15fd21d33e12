// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Analysis capabilities and the registry that loads them
//!
//! Every capability is a trait with two kinds of implementation: a
//! model-backed provider talking to the local vision backend, and a pure
//! heuristic that is always available. The [`Registry`] decides once, at load
//! time, which one serves each capability.

pub mod hash;
pub mod heuristic;
pub mod vision;

use async_trait::async_trait;
use futures_util::future::join_all;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{CapabilityToggles, Thresholds};
use crate::{PictorError, Result};

/// The five independent analysis capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Classifier,
    FaceDetector,
    SensitiveScorer,
    TextExtractor,
    Hasher,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Classifier,
        Capability::FaceDetector,
        Capability::SensitiveScorer,
        Capability::TextExtractor,
        Capability::Hasher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Classifier => "classifier",
            Capability::FaceDetector => "face_detector",
            Capability::SensitiveScorer => "sensitive_scorer",
            Capability::TextExtractor => "text_extractor",
            Capability::Hasher => "hasher",
        }
    }

    fn enabled_in(&self, toggles: &CapabilityToggles) -> bool {
        match self {
            Capability::Classifier => toggles.classifier,
            Capability::FaceDetector => toggles.faces,
            Capability::SensitiveScorer => toggles.sensitive,
            Capability::TextExtractor => toggles.text,
            Capability::Hasher => toggles.hash,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scene label produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SceneLabel {
    Nature,
    Food,
    Vehicle,
    Person,
    Animal,
    Building,
    Object,
    Document,
    Art,
    Screenshot,
    #[default]
    General,
}

impl SceneLabel {
    pub const ALL: [SceneLabel; 11] = [
        SceneLabel::Nature,
        SceneLabel::Food,
        SceneLabel::Vehicle,
        SceneLabel::Person,
        SceneLabel::Animal,
        SceneLabel::Building,
        SceneLabel::Object,
        SceneLabel::Document,
        SceneLabel::Art,
        SceneLabel::Screenshot,
        SceneLabel::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneLabel::Nature => "nature",
            SceneLabel::Food => "food",
            SceneLabel::Vehicle => "vehicle",
            SceneLabel::Person => "person",
            SceneLabel::Animal => "animal",
            SceneLabel::Building => "building",
            SceneLabel::Object => "object",
            SceneLabel::Document => "document",
            SceneLabel::Art => "art",
            SceneLabel::Screenshot => "screenshot",
            SceneLabel::General => "general",
        }
    }

    /// Find the first known label word in free-form model output
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        lower
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .find_map(|word| {
                let singular = word.strip_suffix('s').unwrap_or(word);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|l| l.as_str() == word || l.as_str() == singular)
            })
    }
}

impl fmt::Display for SceneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SceneLabel,
    pub confidence: f32,
}

/// One detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub confidence: f32,
    pub age: Option<f32>,
    pub gender: Option<String>,
    pub expressions: Option<BTreeMap<String, f32>>,
    /// False for heuristic guesses
    pub confirmed: bool,
}

/// Labels reported by the sensitive-content scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitiveLabel {
    Drawing,
    Hentai,
    Neutral,
    Porn,
    Sexy,
}

impl SensitiveLabel {
    pub const ALL: [SensitiveLabel; 5] = [
        SensitiveLabel::Drawing,
        SensitiveLabel::Hentai,
        SensitiveLabel::Neutral,
        SensitiveLabel::Porn,
        SensitiveLabel::Sexy,
    ];

    /// Labels whose probabilities add up to the sensitive score
    pub const SENSITIVE: [SensitiveLabel; 2] = [SensitiveLabel::Porn, SensitiveLabel::Hentai];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveLabel::Drawing => "drawing",
            SensitiveLabel::Hentai => "hentai",
            SensitiveLabel::Neutral => "neutral",
            SensitiveLabel::Porn => "porn",
            SensitiveLabel::Sexy => "sexy",
        }
    }

    pub fn is_sensitive(&self) -> bool {
        Self::SENSITIVE.contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: SensitiveLabel,
    pub probability: f32,
}

/// Original-resolution source handed to the text extractor
pub struct SourceImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, frame: &RgbImage) -> Result<Classification>;
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Detections in the order the detector reports them
    async fn detect(&self, frame: &RgbImage) -> Result<Vec<FaceDetection>>;
}

#[async_trait]
pub trait SensitiveScorer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score(&self, frame: &RgbImage) -> Result<Vec<LabelScore>>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, source: &SourceImage) -> Result<String>;
}

#[async_trait]
pub trait PerceptualHasher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fingerprint(&self, image: &DynamicImage) -> Result<String>;
}

/// A loaded implementation of one capability
#[derive(Clone)]
pub enum Provider {
    Classifier(Arc<dyn Classifier>),
    FaceDetector(Arc<dyn FaceDetector>),
    SensitiveScorer(Arc<dyn SensitiveScorer>),
    TextExtractor(Arc<dyn TextExtractor>),
    Hasher(Arc<dyn PerceptualHasher>),
}

impl Provider {
    pub fn capability(&self) -> Capability {
        match self {
            Provider::Classifier(_) => Capability::Classifier,
            Provider::FaceDetector(_) => Capability::FaceDetector,
            Provider::SensitiveScorer(_) => Capability::SensitiveScorer,
            Provider::TextExtractor(_) => Capability::TextExtractor,
            Provider::Hasher(_) => Capability::Hasher,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Classifier(p) => p.name(),
            Provider::FaceDetector(p) => p.name(),
            Provider::SensitiveScorer(p) => p.name(),
            Provider::TextExtractor(p) => p.name(),
            Provider::Hasher(p) => p.name(),
        }
    }
}

/// Brings up the model-backed variant of a capability
#[async_trait]
pub trait CapabilityLoader: Send + Sync {
    async fn load(&self, capability: Capability) -> Result<Provider>;
}

/// Which variant serves a capability
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapabilityStatus {
    Model { provider: &'static str },
    Heuristic {
        provider: &'static str,
        reason: String,
    },
    Disabled,
}

static DISABLED: CapabilityStatus = CapabilityStatus::Disabled;

#[derive(Default)]
struct ProviderSet {
    classifier: Option<Arc<dyn Classifier>>,
    faces: Option<Arc<dyn FaceDetector>>,
    sensitive: Option<Arc<dyn SensitiveScorer>>,
    text: Option<Arc<dyn TextExtractor>>,
    hasher: Option<Arc<dyn PerceptualHasher>>,
}

impl ProviderSet {
    fn install(&mut self, provider: Provider) {
        match provider {
            Provider::Classifier(p) => self.classifier = Some(p),
            Provider::FaceDetector(p) => self.faces = Some(p),
            Provider::SensitiveScorer(p) => self.sensitive = Some(p),
            Provider::TextExtractor(p) => self.text = Some(p),
            Provider::Hasher(p) => self.hasher = Some(p),
        }
    }
}

/// Registry of capability providers
pub struct Registry {
    providers: ProviderSet,
    statuses: BTreeMap<Capability, CapabilityStatus>,
}

impl Registry {
    /// Load every enabled capability concurrently.
    ///
    /// One task per capability; all of them settle before this returns. A
    /// failed or panicking load is recorded and replaced by the heuristic.
    pub async fn initialize(
        loader: Arc<dyn CapabilityLoader>,
        toggles: &CapabilityToggles,
        thresholds: &Thresholds,
    ) -> Self {
        let mut registry = Self::empty();

        let wanted: Vec<Capability> = Capability::ALL
            .into_iter()
            .filter(|c| c.enabled_in(toggles))
            .collect();

        let handles = wanted.iter().map(|&capability| {
            let loader = Arc::clone(&loader);
            tokio::spawn(async move { loader.load(capability).await })
        });
        let outcomes = join_all(handles).await;

        for (capability, outcome) in wanted.into_iter().zip(outcomes) {
            let loaded = match outcome {
                Ok(Ok(provider)) if provider.capability() == capability => Ok(provider),
                Ok(Ok(provider)) => Err(PictorError::unavailable(
                    capability,
                    format!("loader returned a {} provider", provider.capability()),
                )),
                Ok(Err(e)) => Err(e),
                Err(join) => Err(PictorError::unavailable(
                    capability,
                    format!("loader task failed: {}", join),
                )),
            };

            match loaded {
                Ok(provider) => {
                    info!(capability = %capability, provider = provider.name(), "Capability ready");
                    registry.set(provider, true, String::new());
                }
                Err(e) => {
                    warn!(capability = %capability, error = %e, "Falling back to heuristic");
                    registry.set(heuristic::fallback(capability, thresholds), false, e.to_string());
                }
            }
        }

        registry
    }

    /// Registry that serves every enabled capability with its heuristic
    pub fn heuristic(toggles: &CapabilityToggles, thresholds: &Thresholds) -> Self {
        let mut registry = Self::empty();
        for capability in Capability::ALL.into_iter().filter(|c| c.enabled_in(toggles)) {
            registry.set(
                heuristic::fallback(capability, thresholds),
                false,
                "model loading skipped".to_string(),
            );
        }
        registry
    }

    fn empty() -> Self {
        Self {
            providers: ProviderSet::default(),
            statuses: Capability::ALL
                .into_iter()
                .map(|c| (c, CapabilityStatus::Disabled))
                .collect(),
        }
    }

    fn set(&mut self, provider: Provider, model: bool, reason: String) {
        let status = if model {
            CapabilityStatus::Model {
                provider: provider.name(),
            }
        } else {
            CapabilityStatus::Heuristic {
                provider: provider.name(),
                reason,
            }
        };
        self.statuses.insert(provider.capability(), status);
        self.providers.install(provider);
    }

    /// Replace the provider for one capability, treating it as model-backed
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.set(provider, true, String::new());
        self
    }

    /// True when the model-backed variant serves this capability
    pub fn is_ready(&self, capability: Capability) -> bool {
        matches!(self.status(capability), CapabilityStatus::Model { .. })
    }

    pub fn status(&self, capability: Capability) -> &CapabilityStatus {
        self.statuses.get(&capability).unwrap_or(&DISABLED)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (Capability, &CapabilityStatus)> {
        self.statuses.iter().map(|(c, s)| (*c, s))
    }

    pub fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        self.providers.classifier.clone()
    }

    pub fn face_detector(&self) -> Option<Arc<dyn FaceDetector>> {
        self.providers.faces.clone()
    }

    pub fn sensitive_scorer(&self) -> Option<Arc<dyn SensitiveScorer>> {
        self.providers.sensitive.clone()
    }

    pub fn text_extractor(&self) -> Option<Arc<dyn TextExtractor>> {
        self.providers.text.clone()
    }

    pub fn hasher(&self) -> Option<Arc<dyn PerceptualHasher>> {
        self.providers.hasher.clone()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Loader that fails or panics on chosen capabilities
    pub struct MockLoader {
        pub failing: Vec<Capability>,
        pub panicking: Vec<Capability>,
        pub delay: Duration,
        pub attempts: AtomicUsize,
    }

    impl MockLoader {
        pub fn new() -> Self {
            Self {
                failing: Vec::new(),
                panicking: Vec::new(),
                delay: Duration::ZERO,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    pub struct FixedClassifier(pub SceneLabel);

    #[async_trait]
    impl Classifier for FixedClassifier {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn classify(&self, _frame: &RgbImage) -> Result<Classification> {
            Ok(Classification {
                label: self.0,
                confidence: 0.99,
            })
        }
    }

    #[async_trait]
    impl CapabilityLoader for MockLoader {
        async fn load(&self, capability: Capability) -> Result<Provider> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.panicking.contains(&capability) {
                panic!("model weights corrupt");
            }
            if self.failing.contains(&capability) {
                return Err(PictorError::unavailable(capability, "not installed"));
            }
            Ok(match capability {
                Capability::Classifier => {
                    Provider::Classifier(Arc::new(FixedClassifier(SceneLabel::Art)))
                }
                other => heuristic::fallback(other, &Thresholds::default()),
            })
        }
    }
}
