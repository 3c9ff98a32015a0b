//! Text recognition backends and the token stream they produce.

pub mod recognizer;
pub mod segment;

use crate::preprocess::PreparedImage;
use crate::types::TextToken;
use thiserror::Error;

pub use recognizer::OrtTextRecognizer;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("character dictionary unreadable: {0}")]
    Dictionary(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability interface for OCR inference backends.
///
/// Implementations return recognized tokens in reading order (top to
/// bottom, then left to right) and must be deterministic for identical
/// prepared input. Empty output is a valid answer for a blank page.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &PreparedImage) -> Result<Vec<TextToken>, OcrError>;
}
