//! CRNN/CTC text-line recognizer via ONNX Runtime.
//!
//! Runs a PP-OCR style recognition model over each segmented line band:
//! crop, resize to the model's input height, greedy CTC decode against a
//! character dictionary, then split the line into whitespace-separated
//! tokens with approximate source boxes.

use crate::ocr::segment::{ink_extent, segment_lines, LineBand};
use crate::ocr::{OcrError, TextRecognizer};
use crate::preprocess::{resize_bilinear, PreparedImage};
use crate::types::{Region, TextToken};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const REC_INPUT_HEIGHT: usize = 48;
const REC_MAX_WIDTH: usize = 640;
const REC_MIN_WIDTH: usize = 16;
const REC_MEAN: f32 = 127.5;
const REC_STD: f32 = 127.5;
/// CTC blank class; dictionary entries start at class 1.
const CTC_BLANK: usize = 0;

/// ONNX-backed implementation of [`TextRecognizer`].
pub struct OrtTextRecognizer {
    session: Session,
    dict: Vec<String>,
}

impl OrtTextRecognizer {
    /// Load the recognition model and its character dictionary (one
    /// entry per line, class order).
    pub fn load(model_path: &str, dict_path: &str) -> Result<Self, OcrError> {
        if !Path::new(model_path).exists() {
            return Err(OcrError::ModelNotFound(model_path.to_string()));
        }

        let dict: Vec<String> = std::fs::read_to_string(dict_path)
            .map_err(|e| OcrError::Dictionary(format!("{dict_path}: {e}")))?
            .lines()
            .map(str::to_string)
            .collect();
        if dict.is_empty() {
            return Err(OcrError::Dictionary(format!("{dict_path}: empty dictionary")));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            classes = dict.len() + 1,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded text recognition model"
        );

        Ok(Self { session, dict })
    }

    /// Resize a line crop to the model input and normalize into a NCHW
    /// tensor, grayscale replicated across three channels. Returns the
    /// tensor and the resized width.
    fn preprocess_line(crop: &[u8], crop_w: usize, crop_h: usize) -> (Array4<f32>, usize) {
        let scale = REC_INPUT_HEIGHT as f32 / crop_h.max(1) as f32;
        let new_w = ((crop_w as f32 * scale).round() as usize).clamp(REC_MIN_WIDTH, REC_MAX_WIDTH);
        let resized = resize_bilinear(crop, crop_w, crop_h, new_w, REC_INPUT_HEIGHT);

        let mut tensor = Array4::<f32>::zeros((1, 3, REC_INPUT_HEIGHT, new_w));
        for y in 0..REC_INPUT_HEIGHT {
            for x in 0..new_w {
                let normalized = (resized[y * new_w + x] as f32 - REC_MEAN) / REC_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }
        (tensor, new_w)
    }

    fn recognize_band(
        &mut self,
        image: &PreparedImage,
        band: LineBand,
        left: u32,
        right: u32,
    ) -> Result<Vec<TextToken>, OcrError> {
        let crop_w = (right - left) as usize;
        let crop_h = band.height() as usize;
        let mut crop = vec![0u8; crop_w * crop_h];
        for (row, y) in (band.top..band.bottom).enumerate() {
            for (col, x) in (left..right).enumerate() {
                crop[row * crop_w + col] = image.pixel(x, y);
            }
        }

        let (input, _input_w) = Self::preprocess_line(&crop, crop_w, crop_h);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (shape, probs) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OcrError::InferenceFailed(format!("line at y={}: {e}", band.top)))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 || dims[2] != self.dict.len() + 1 {
            return Err(OcrError::InferenceFailed(format!(
                "unexpected recognition output shape {dims:?} for {} classes",
                self.dict.len() + 1
            )));
        }
        let (steps, classes) = (dims[1], dims[2]);

        let chars = ctc_greedy_decode(probs, steps, classes, &self.dict);
        Ok(tokens_from_chars(&chars, steps, band, left, right))
    }
}

impl TextRecognizer for OrtTextRecognizer {
    fn recognize(&mut self, image: &PreparedImage) -> Result<Vec<TextToken>, OcrError> {
        let mut tokens = Vec::new();
        for band in segment_lines(image) {
            let Some((left, right)) = ink_extent(image, band) else {
                continue;
            };
            tokens.extend(self.recognize_band(image, band, left, right)?);
        }
        tracing::debug!(tokens = tokens.len(), "text recognition finished");
        Ok(tokens)
    }
}

/// One decoded character with its CTC timestep and probability.
#[derive(Debug, Clone, PartialEq)]
struct DecodedChar {
    text: String,
    step: usize,
    prob: f32,
}

/// Greedy CTC collapse: argmax per timestep, drop blanks and repeats.
fn ctc_greedy_decode(
    probs: &[f32],
    steps: usize,
    classes: usize,
    dict: &[String],
) -> Vec<DecodedChar> {
    let mut out = Vec::new();
    let mut prev = CTC_BLANK;

    for t in 0..steps {
        let row = &probs[t * classes..(t + 1) * classes];
        let (best, prob) = row
            .iter()
            .enumerate()
            .fold((CTC_BLANK, f32::NEG_INFINITY), |acc, (i, &p)| {
                if p > acc.1 {
                    (i, p)
                } else {
                    acc
                }
            });

        if best != CTC_BLANK && best != prev {
            if let Some(entry) = dict.get(best - 1) {
                out.push(DecodedChar {
                    text: entry.clone(),
                    step: t,
                    prob,
                });
            }
        }
        prev = best;
    }
    out
}

/// Group decoded characters into whitespace-separated tokens, mapping CTC
/// timesteps back to source-pixel columns within the band's ink extent.
fn tokens_from_chars(
    chars: &[DecodedChar],
    steps: usize,
    band: LineBand,
    left: u32,
    right: u32,
) -> Vec<TextToken> {
    let span = (right - left) as f32;
    let step_to_x = |step: usize| left as f32 + (step as f32 + 0.5) / steps.max(1) as f32 * span;

    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut probs: Vec<f32> = Vec::new();
    let mut first_step = 0usize;
    let mut last_step = 0usize;

    let mut flush = |text: &mut String,
                     probs: &mut Vec<f32>,
                     first_step: usize,
                     last_step: usize| {
        if text.is_empty() {
            return;
        }
        let x0 = step_to_x(first_step).floor().max(0.0) as u32;
        let x1 = (step_to_x(last_step).ceil() as u32).max(x0 + 1).min(right);
        let confidence = probs.iter().sum::<f32>() / probs.len() as f32;
        tokens.push(TextToken {
            text: std::mem::take(text),
            region: Region {
                x: x0,
                y: band.top,
                width: x1 - x0,
                height: band.height(),
            },
            confidence,
        });
        probs.clear();
    };

    for ch in chars {
        if ch.text.trim().is_empty() {
            flush(&mut text, &mut probs, first_step, last_step);
            continue;
        }
        if text.is_empty() {
            first_step = ch.step;
        }
        last_step = ch.step;
        text.push_str(&ch.text);
        probs.push(ch.prob);
    }
    flush(&mut text, &mut probs, first_step, last_step);

    tokens
}
