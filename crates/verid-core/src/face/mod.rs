//! Face location and encoding backends.

pub mod alignment;
pub mod detector;
pub mod encoder;

use crate::preprocess::PreparedImage;
use crate::types::FaceEncoding;
use thiserror::Error;

pub use detector::{DetectorConfig, ScrfdDetector};
pub use encoder::ArcFaceEncoder;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detected face carries no landmarks; alignment requires five points")]
    MissingLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability interface for face detection and encoding backends.
///
/// Implementations return encodings ordered by detector confidence
/// descending, ties broken by bounding-box area descending, and must be
/// deterministic for identical prepared input. An empty vec means no face
/// was found and is not an error; callers apply their own policy.
pub trait FaceEngine: Send {
    fn detect_and_encode(&mut self, image: &PreparedImage) -> Result<Vec<FaceEncoding>, FaceError>;
}

/// Order encodings by detector confidence, then box area, both descending.
pub fn order_encodings(encodings: &mut [FaceEncoding]) {
    encodings.sort_by(|a, b| {
        b.face
            .confidence
            .partial_cmp(&a.face.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.face
                    .area()
                    .partial_cmp(&a.face.area())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
}

/// SCRFD + ArcFace backend. Models are loaded once and reused for every
/// request handled by the owning worker.
pub struct OrtFaceEngine {
    detector: ScrfdDetector,
    encoder: ArcFaceEncoder,
}

impl OrtFaceEngine {
    pub fn load(
        detector_path: &str,
        encoder_path: &str,
        config: DetectorConfig,
    ) -> Result<Self, FaceError> {
        Ok(Self {
            detector: ScrfdDetector::load(detector_path, config)?,
            encoder: ArcFaceEncoder::load(encoder_path)?,
        })
    }
}

impl FaceEngine for OrtFaceEngine {
    fn detect_and_encode(&mut self, image: &PreparedImage) -> Result<Vec<FaceEncoding>, FaceError> {
        let faces = self.detector.detect(image)?;

        let mut encodings = Vec::with_capacity(faces.len());
        for face in faces {
            if face.landmarks.is_none() {
                // Cannot align without landmarks; skip rather than fail the
                // whole request over one degenerate detection.
                tracing::warn!(
                    confidence = face.confidence,
                    "skipping detection without landmarks"
                );
                continue;
            }
            let values = self.encoder.encode(image, &face)?;
            encodings.push(FaceEncoding {
                values,
                face,
                model_version: Some(self.encoder.model_version().to_string()),
            });
        }

        order_encodings(&mut encodings);
        tracing::debug!(faces = encodings.len(), "face detection and encoding done");
        Ok(encodings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceBox;

    fn encoding(confidence: f32, side: f32) -> FaceEncoding {
        FaceEncoding {
            values: vec![0.0; 4],
            face: FaceBox {
                x: 0.0,
                y: 0.0,
                width: side,
                height: side,
                confidence,
                landmarks: None,
            },
            model_version: None,
        }
    }

    #[test]
    fn test_order_by_confidence() {
        let mut encodings = vec![encoding(0.5, 100.0), encoding(0.9, 10.0)];
        order_encodings(&mut encodings);
        assert!((encodings[0].face.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_tie_broken_by_area() {
        let mut encodings = vec![encoding(0.8, 20.0), encoding(0.8, 80.0)];
        order_encodings(&mut encodings);
        assert!((encodings[0].face.width - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_order_empty() {
        let mut encodings: Vec<FaceEncoding> = vec![];
        order_encodings(&mut encodings);
        assert!(encodings.is_empty());
    }
}
