//! Request orchestration: the two public verification operations.
//!
//! Composes preprocessing, field extraction, face location, and scoring.
//! Business outcomes (no face, several faces, failed checksum) are result
//! data; only corrupt input and backend failures surface as errors, so a
//! request always yields exactly one of (result, error).

use crate::face::{FaceEngine, FaceError};
use crate::fields::FieldExtractor;
use crate::ocr::{OcrError, TextRecognizer};
use crate::preprocess::{ImagePreprocessor, PreprocessConfig, PreprocessError, Purpose};
use crate::scoring::{CalibrationCurve, ScoreError, SimilarityScorer};
use crate::types::{DocumentType, ExtractionResult, MatchResult, MatchStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("preprocess: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("ocr: {0}")]
    Ocr(#[from] OcrError),
    #[error("face backend: {0}")]
    Face(#[from] FaceError),
    #[error("scoring: {0}")]
    Score(#[from] ScoreError),
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Confidence at or above which a scored pair counts as matched.
    pub acceptance_threshold: u8,
    pub curve: CalibrationCurve,
    pub preprocess: PreprocessConfig,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 80,
            curve: CalibrationCurve::linear(1.2),
            preprocess: PreprocessConfig::default(),
        }
    }
}

/// One verification pipeline: owns its backends, processes one request at
/// a time. Independent requests run on independent `Verifier` instances.
pub struct Verifier {
    preprocessor: ImagePreprocessor,
    extractor: FieldExtractor,
    faces: Box<dyn FaceEngine>,
    scorer: SimilarityScorer,
    acceptance_threshold: u8,
}

impl Verifier {
    pub fn new(
        config: VerifierConfig,
        recognizer: Box<dyn TextRecognizer>,
        faces: Box<dyn FaceEngine>,
    ) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config.preprocess),
            extractor: FieldExtractor::new(recognizer),
            faces,
            scorer: SimilarityScorer::new(config.curve),
            acceptance_threshold: config.acceptance_threshold,
        }
    }

    /// Extract structured identity fields from a document image.
    pub fn extract_document_fields(
        &mut self,
        image_bytes: &[u8],
        document_type: DocumentType,
    ) -> Result<ExtractionResult, VerifyError> {
        let prepared = self.preprocessor.prepare(image_bytes, Purpose::Document)?;
        let result = self.extractor.extract(&prepared, document_type)?;
        Ok(result)
    }

    /// Compare the face in a selfie against the face in a document photo.
    ///
    /// Zero or multiple faces on either side terminate with the matching
    /// status; the orchestrator never guesses which face is the subject.
    pub fn match_faces(
        &mut self,
        selfie_bytes: &[u8],
        document_bytes: &[u8],
    ) -> Result<MatchResult, VerifyError> {
        let selfie = self.preprocessor.prepare(selfie_bytes, Purpose::Face)?;
        let document = self.preprocessor.prepare(document_bytes, Purpose::Face)?;

        let selfie_faces = self.faces.detect_and_encode(&selfie)?;
        let document_faces = self.faces.detect_and_encode(&document)?;

        tracing::debug!(
            selfie_faces = selfie_faces.len(),
            document_faces = document_faces.len(),
            "face location finished"
        );

        let status = match (selfie_faces.len(), document_faces.len()) {
            (0, _) => Some(MatchStatus::NoFaceSelfie),
            (_, 0) => Some(MatchStatus::NoFaceDocument),
            (n, _) if n > 1 => Some(MatchStatus::MultipleFacesSelfie),
            (_, n) if n > 1 => Some(MatchStatus::MultipleFacesDocument),
            _ => None,
        };
        if let Some(status) = status {
            tracing::info!(?status, "match terminated before scoring");
            return Ok(MatchResult::without_score(status));
        }

        let (distance, confidence) = self.scorer.score(&selfie_faces[0], &document_faces[0])?;
        let status = if confidence >= self.acceptance_threshold {
            MatchStatus::Matched
        } else {
            MatchStatus::Inconclusive
        };

        tracing::info!(?status, confidence, distance, "faces scored");
        Ok(MatchResult {
            status,
            confidence: Some(confidence),
            distance: Some(distance),
        })
    }
}
