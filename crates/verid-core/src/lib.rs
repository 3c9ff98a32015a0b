//! verid-core — Document identity verification engine.
//!
//! Extracts structured identity fields from document images (OCR plus
//! per-scheme checksum validation) and scores face similarity between a
//! selfie and a document photo. Neural backends run via ONNX Runtime for
//! CPU inference; all heuristics are deterministic.

pub mod checksum;
pub mod face;
pub mod fields;
pub mod ocr;
pub mod preprocess;
pub mod scoring;
pub mod types;
pub mod verify;

pub use face::{FaceEngine, FaceError, OrtFaceEngine};
pub use fields::FieldExtractor;
pub use ocr::{OcrError, OrtTextRecognizer, TextRecognizer};
pub use preprocess::{ImagePreprocessor, PreprocessConfig, PreprocessError, Purpose};
pub use scoring::{CalibrationCurve, ScoreError, SimilarityScorer};
pub use types::{
    DocumentFields, DocumentType, ExtractionResult, ExtractionStatus, FaceBox, FaceEncoding,
    FieldValue, MatchResult, MatchStatus, Region, TextToken,
};
pub use verify::{Verifier, VerifierConfig, VerifyError};
