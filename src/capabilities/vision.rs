// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Model-backed providers served by a local Ollama vision model

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use super::hash::AverageHasher;
use super::{
    Capability, CapabilityLoader, Classification, Classifier, FaceDetection, FaceDetector,
    LabelScore, Provider, SceneLabel, SensitiveLabel, SensitiveScorer, SourceImage,
    TextExtractor,
};
use crate::config::ModelConfig;
use crate::ollama::OllamaClient;
use crate::{PictorError, Result};

const CLASSIFY_PROMPT: &str = "Classify this image. Answer with exactly one word from: \
    nature, food, vehicle, person, animal, building, object, document, art, screenshot.";

const FACES_PROMPT: &str = "Detect every human face in this image. Respond with JSON: \
    {\"faces\": [{\"confidence\": 0.0-1.0, \"age\": number, \"gender\": \"male\"|\"female\", \
    \"expressions\": {\"happy\": 0.0-1.0, ...}}]}. Use an empty list when there are no faces.";

const SENSITIVE_PROMPT: &str = "Rate this image for explicit content. Respond with JSON mapping \
    each of drawing, hentai, neutral, porn, sexy to a probability between 0 and 1.";

const TEXT_PROMPT: &str = "Transcribe all legible text in this image exactly as written. \
    If there is no text, answer NONE.";

/// Encode a normalized frame as base64 PNG for the API
fn encode_frame(frame: &RgbImage) -> Result<String> {
    let mut buffer = Vec::new();
    frame.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(&buffer))
}

/// Strip code fences some models wrap JSON in
fn json_body(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix("```").unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

pub struct VisionClassifier {
    client: OllamaClient,
    model: String,
}

#[async_trait]
impl Classifier for VisionClassifier {
    fn name(&self) -> &'static str {
        "ollama-classifier"
    }

    async fn classify(&self, frame: &RgbImage) -> Result<Classification> {
        let image = encode_frame(frame)?;
        let answer = self
            .client
            .generate_with_image(
                Capability::Classifier,
                &self.model,
                CLASSIFY_PROMPT,
                &image,
                false,
            )
            .await?;

        debug!("Classifier answered: {}", answer.trim());
        let label = SceneLabel::parse(&answer).ok_or_else(|| {
            PictorError::Analysis(format!("unrecognized scene label: {:?}", answer.trim()))
        })?;

        Ok(Classification {
            label,
            confidence: 0.85,
        })
    }
}

#[derive(Deserialize)]
struct FacesResponse {
    #[serde(default)]
    faces: Vec<RawFace>,
}

#[derive(Deserialize)]
struct RawFace {
    #[serde(default = "default_face_confidence")]
    confidence: f32,
    age: Option<f32>,
    gender: Option<String>,
    expressions: Option<BTreeMap<String, f32>>,
}

fn default_face_confidence() -> f32 {
    0.5
}

pub(crate) fn parse_faces(raw: &str) -> Result<Vec<FaceDetection>> {
    let response: FacesResponse = serde_json::from_str(json_body(raw))?;
    Ok(response
        .faces
        .into_iter()
        .map(|f| FaceDetection {
            confidence: f.confidence.clamp(0.0, 1.0),
            age: f.age,
            gender: f.gender,
            expressions: f.expressions,
            confirmed: true,
        })
        .collect())
}

pub struct VisionFaceDetector {
    client: OllamaClient,
    model: String,
}

#[async_trait]
impl FaceDetector for VisionFaceDetector {
    fn name(&self) -> &'static str {
        "ollama-faces"
    }

    async fn detect(&self, frame: &RgbImage) -> Result<Vec<FaceDetection>> {
        let image = encode_frame(frame)?;
        let answer = self
            .client
            .generate_with_image(Capability::FaceDetector, &self.model, FACES_PROMPT, &image, true)
            .await?;
        parse_faces(&answer)
    }
}

pub(crate) fn parse_label_scores(raw: &str) -> Result<Vec<LabelScore>> {
    let map: HashMap<String, f32> = serde_json::from_str(json_body(raw))?;
    let scores: Vec<LabelScore> = SensitiveLabel::ALL
        .into_iter()
        .filter_map(|label| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(label.as_str()))
                .map(|(_, p)| LabelScore {
                    label,
                    probability: p.clamp(0.0, 1.0),
                })
        })
        .collect();

    if scores.is_empty() {
        return Err(PictorError::Analysis("no known sensitive labels in response".to_string()));
    }
    Ok(scores)
}

pub struct VisionSensitiveScorer {
    client: OllamaClient,
    model: String,
}

#[async_trait]
impl SensitiveScorer for VisionSensitiveScorer {
    fn name(&self) -> &'static str {
        "ollama-sensitive"
    }

    async fn score(&self, frame: &RgbImage) -> Result<Vec<LabelScore>> {
        let image = encode_frame(frame)?;
        let answer = self
            .client
            .generate_with_image(
                Capability::SensitiveScorer,
                &self.model,
                SENSITIVE_PROMPT,
                &image,
                true,
            )
            .await?;
        parse_label_scores(&answer)
    }
}

pub(crate) fn clean_transcript(raw: &str) -> String {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("none") || text.eq_ignore_ascii_case("none.") {
        String::new()
    } else {
        text.to_string()
    }
}

/// Reads text from the original-resolution file
pub struct VisionTextExtractor {
    client: OllamaClient,
    model: String,
}

#[async_trait]
impl TextExtractor for VisionTextExtractor {
    fn name(&self) -> &'static str {
        "ollama-text"
    }

    async fn extract(&self, source: &SourceImage) -> Result<String> {
        let image = general_purpose::STANDARD.encode(&source.bytes);
        let answer = self
            .client
            .generate_with_image(Capability::TextExtractor, &self.model, TEXT_PROMPT, &image, false)
            .await?;
        Ok(clean_transcript(&answer))
    }
}

/// Loads model-backed providers after checking the model is pulled
pub struct OllamaLoader {
    client: OllamaClient,
    models: ModelConfig,
}

impl OllamaLoader {
    pub fn new(client: OllamaClient, models: ModelConfig) -> Self {
        Self { client, models }
    }

    async fn require(&self, capability: Capability, model: &str) -> Result<()> {
        let available = self
            .client
            .model_available(model)
            .await
            .map_err(|e| PictorError::unavailable(capability, e.to_string()))?;
        if available {
            Ok(())
        } else {
            Err(PictorError::unavailable(
                capability,
                format!("model '{}' is not pulled", model),
            ))
        }
    }
}

#[async_trait]
impl CapabilityLoader for OllamaLoader {
    async fn load(&self, capability: Capability) -> Result<Provider> {
        let client = self.client.clone();
        let provider = match capability {
            Capability::Classifier => {
                let model = self.models.classifier.clone();
                self.require(capability, &model).await?;
                Provider::Classifier(Arc::new(VisionClassifier { client, model }))
            }
            Capability::FaceDetector => {
                let model = self.models.faces.clone();
                self.require(capability, &model).await?;
                Provider::FaceDetector(Arc::new(VisionFaceDetector { client, model }))
            }
            Capability::SensitiveScorer => {
                let model = self.models.sensitive.clone();
                self.require(capability, &model).await?;
                Provider::SensitiveScorer(Arc::new(VisionSensitiveScorer { client, model }))
            }
            Capability::TextExtractor => {
                let model = self.models.text.clone();
                self.require(capability, &model).await?;
                Provider::TextExtractor(Arc::new(VisionTextExtractor { client, model }))
            }
            // Hashing needs no model
            Capability::Hasher => Provider::Hasher(Arc::new(AverageHasher)),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_faces_keeps_order() {
        let raw = r#"```json
        {"faces": [
            {"confidence": 0.92, "age": 31, "gender": "female", "expressions": {"happy": 0.8}},
            {"confidence": 0.61}
        ]}
        ```"#;
        let faces = parse_faces(raw).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].confidence, 0.92);
        assert_eq!(faces[0].gender.as_deref(), Some("female"));
        assert_eq!(faces[1].confidence, 0.61);
        assert!(faces.iter().all(|f| f.confirmed));
    }

    #[test]
    fn test_parse_faces_empty() {
        assert!(parse_faces(r#"{"faces": []}"#).unwrap().is_empty());
        assert!(parse_faces("no faces here").is_err());
    }

    #[test]
    fn test_parse_label_scores() {
        let scores =
            parse_label_scores(r#"{"Porn": 0.5, "hentai": 0.2, "neutral": 0.3, "extra": 1}"#)
                .unwrap();
        let sensitive: f32 = scores
            .iter()
            .filter(|s| s.label.is_sensitive())
            .map(|s| s.probability)
            .sum();
        assert!((sensitive - 0.7).abs() < 1e-6);
        assert!(parse_label_scores(r#"{"unknown": 1.0}"#).is_err());
    }

    #[test]
    fn test_clean_transcript() {
        assert_eq!(clean_transcript("  NONE \n"), "");
        assert_eq!(clean_transcript("  Invoice 42\nTotal  "), "Invoice 42\nTotal");
    }

    #[test]
    fn test_encode_frame_is_png() {
        let frame = RgbImage::new(4, 4);
        let encoded = encode_frame(&frame).unwrap();
        let bytes = general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
