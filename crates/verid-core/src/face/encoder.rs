//! ArcFace face encoder via ONNX Runtime.
//!
//! Produces L2-normalized 512-dimensional descriptors from aligned
//! 112x112 face crops.

use crate::face::{alignment, FaceError};
use crate::preprocess::PreparedImage;
use crate::types::FaceBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ARCFACE_INPUT_SIZE: usize = alignment::ALIGNED_SIZE;
const ARCFACE_MEAN: f32 = 127.5;
// Symmetric normalization; this differs from the detector's std.
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_ENCODING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// ArcFace-based face encoder.
pub struct ArcFaceEncoder {
    session: Session,
}

impl ArcFaceEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, FaceError> {
        if !Path::new(model_path).exists() {
            return Err(FaceError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    pub fn model_version(&self) -> &'static str {
        ARCFACE_MODEL_VERSION
    }

    /// Extract an encoding for one detected face. The face must carry
    /// landmarks; alignment to the canonical crop happens here.
    pub fn encode(&mut self, image: &PreparedImage, face: &FaceBox) -> Result<Vec<f32>, FaceError> {
        let landmarks = face.landmarks.as_ref().ok_or(FaceError::MissingLandmarks)?;
        let aligned = alignment::align_face(image, landmarks);
        let input = Self::build_input(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| FaceError::InferenceFailed(format!("encoding extraction: {e}")))?;

        if raw.len() != ARCFACE_ENCODING_DIM {
            return Err(FaceError::InferenceFailed(format!(
                "expected {ARCFACE_ENCODING_DIM}-dim encoding, got {}",
                raw.len()
            )));
        }

        Ok(l2_normalize(raw))
    }

    /// Normalize an aligned grayscale crop into the NCHW model input,
    /// single channel replicated across three.
    fn build_input(aligned: &[u8]) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let pixel = aligned.get(y * size + x).copied().unwrap_or(0) as f32;
                let normalized = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }
        tensor
    }
}

/// L2-normalize; the zero vector comes back unchanged.
fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| v / norm).collect()
    } else {
        values.to_vec()
    }
}
