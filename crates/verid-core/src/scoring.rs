//! Distance scoring and confidence calibration between face encodings.
//!
//! The distance-to-confidence mapping is data, not code: a piecewise-linear
//! curve supplied at construction, so thresholds can be re-tuned against a
//! labeled validation set without a redeploy.

use crate::types::FaceEncoding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("encoding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("calibration curve invalid: {0}")]
    InvalidCurve(String),
}

/// Piecewise-linear map from raw encoding distance to a confidence
/// percentage. Knots are `(distance, confidence)` pairs; the first is
/// pinned at `(0, 100)` and the last at `(rejection_distance, 0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct CalibrationCurve {
    knots: Vec<(f32, f32)>,
}

impl CalibrationCurve {
    /// Validate and build a curve from `(distance, confidence)` knots.
    pub fn new(knots: Vec<(f32, f32)>) -> Result<Self, ScoreError> {
        if knots.len() < 2 {
            return Err(ScoreError::InvalidCurve(
                "at least two knots required".to_string(),
            ));
        }
        if knots[0] != (0.0, 100.0) {
            return Err(ScoreError::InvalidCurve(
                "first knot must be (0, 100)".to_string(),
            ));
        }
        let last = knots[knots.len() - 1];
        if last.1 != 0.0 {
            return Err(ScoreError::InvalidCurve(
                "last knot must have confidence 0".to_string(),
            ));
        }
        for pair in knots.windows(2) {
            let (d0, c0) = pair[0];
            let (d1, c1) = pair[1];
            if d1 <= d0 {
                return Err(ScoreError::InvalidCurve(format!(
                    "distances must increase strictly, got {d0} then {d1}"
                )));
            }
            if c1 > c0 {
                return Err(ScoreError::InvalidCurve(format!(
                    "confidence must not increase, got {c0} then {c1}"
                )));
            }
        }
        if knots.iter().any(|&(_, c)| !(0.0..=100.0).contains(&c)) {
            return Err(ScoreError::InvalidCurve(
                "confidence values must lie in [0, 100]".to_string(),
            ));
        }
        Ok(Self { knots })
    }

    /// Straight line from (0, 100) down to (rejection_distance, 0).
    /// Non-positive inputs are clamped to a minimal positive distance.
    pub fn linear(rejection_distance: f32) -> Self {
        let distance = rejection_distance.max(f32::EPSILON);
        Self {
            knots: vec![(0.0, 100.0), (distance, 0.0)],
        }
    }

    /// Distance at and beyond which confidence is zero.
    pub fn rejection_distance(&self) -> f32 {
        self.knots[self.knots.len() - 1].0
    }

    /// Map a distance to a confidence percentage. Monotonically
    /// non-increasing in distance; 0 at the rejection distance and beyond.
    pub fn confidence_for(&self, distance: f32) -> u8 {
        if distance <= 0.0 {
            return 100;
        }
        if distance >= self.rejection_distance() {
            return 0;
        }
        for pair in self.knots.windows(2) {
            let (d0, c0) = pair[0];
            let (d1, c1) = pair[1];
            if distance <= d1 {
                let t = (distance - d0) / (d1 - d0);
                let confidence = c0 + (c1 - c0) * t;
                return confidence.round().clamp(0.0, 100.0) as u8;
            }
        }
        0
    }
}

impl TryFrom<Vec<(f32, f32)>> for CalibrationCurve {
    type Error = ScoreError;

    fn try_from(knots: Vec<(f32, f32)>) -> Result<Self, Self::Error> {
        Self::new(knots)
    }
}

impl From<CalibrationCurve> for Vec<(f32, f32)> {
    fn from(curve: CalibrationCurve) -> Self {
        curve.knots
    }
}

/// Computes the metric distance between two encodings and calibrates it
/// into a confidence score.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    curve: CalibrationCurve,
}

impl SimilarityScorer {
    pub fn new(curve: CalibrationCurve) -> Self {
        Self { curve }
    }

    /// Euclidean distance plus calibrated confidence in [0, 100].
    pub fn score(&self, a: &FaceEncoding, b: &FaceEncoding) -> Result<(f32, u8), ScoreError> {
        if a.dim() != b.dim() {
            return Err(ScoreError::DimensionMismatch {
                left: a.dim(),
                right: b.dim(),
            });
        }
        let distance = a.euclidean_distance(b);
        Ok((distance, self.curve.confidence_for(distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FaceBox;

    fn encoding(values: Vec<f32>) -> FaceEncoding {
        FaceEncoding {
            values,
            face: FaceBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 1.0,
                landmarks: None,
            },
            model_version: None,
        }
    }

    #[test]
    fn test_identical_encoding_full_confidence() {
        let scorer = SimilarityScorer::new(CalibrationCurve::linear(1.2));
        let a = encoding(vec![0.3, -0.4, 0.5, 0.1]);
        let (distance, confidence) = scorer.score(&a, &a).unwrap();
        assert_eq!(distance, 0.0);
        assert_eq!(confidence, 100);
    }

    #[test]
    fn test_beyond_rejection_distance_zero() {
        let curve = CalibrationCurve::linear(1.0);
        assert_eq!(curve.confidence_for(1.0), 0);
        assert_eq!(curve.confidence_for(5.0), 0);
    }

    #[test]
    fn test_linear_midpoint() {
        let curve = CalibrationCurve::linear(1.0);
        assert_eq!(curve.confidence_for(0.5), 50);
    }

    #[test]
    fn test_piecewise_interpolation() {
        let curve =
            CalibrationCurve::new(vec![(0.0, 100.0), (0.6, 80.0), (1.2, 0.0)]).unwrap();
        assert_eq!(curve.confidence_for(0.3), 90);
        assert_eq!(curve.confidence_for(0.6), 80);
        assert_eq!(curve.confidence_for(0.9), 40);
    }

    #[test]
    fn test_monotonic_over_samples() {
        let curve =
            CalibrationCurve::new(vec![(0.0, 100.0), (0.4, 70.0), (0.8, 20.0), (1.5, 0.0)])
                .unwrap();
        let mut previous = 100u8;
        for i in 0..=300 {
            let distance = i as f32 * 0.006;
            let confidence = curve.confidence_for(distance);
            assert!(
                confidence <= previous,
                "confidence rose from {previous} to {confidence} at distance {distance}"
            );
            previous = confidence;
        }
    }

    #[test]
    fn test_closer_pair_scores_no_lower() {
        let scorer = SimilarityScorer::new(CalibrationCurve::linear(2.0));
        let a = encoding(vec![0.0, 0.0]);
        let b = encoding(vec![0.3, 0.0]);
        let c = encoding(vec![1.1, 0.0]);
        let (d_ab, conf_ab) = scorer.score(&a, &b).unwrap();
        let (d_ac, conf_ac) = scorer.score(&a, &c).unwrap();
        assert!(d_ab < d_ac);
        assert!(conf_ab >= conf_ac);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scorer = SimilarityScorer::new(CalibrationCurve::linear(1.2));
        let a = encoding(vec![0.0; 128]);
        let b = encoding(vec![0.0; 512]);
        let err = scorer.score(&a, &b).unwrap_err();
        assert!(matches!(
            err,
            ScoreError::DimensionMismatch {
                left: 128,
                right: 512
            }
        ));
    }

    #[test]
    fn test_invalid_curves_rejected() {
        assert!(CalibrationCurve::new(vec![(0.0, 100.0)]).is_err());
        assert!(CalibrationCurve::new(vec![(0.1, 100.0), (1.0, 0.0)]).is_err());
        assert!(CalibrationCurve::new(vec![(0.0, 100.0), (1.0, 10.0)]).is_err());
        assert!(CalibrationCurve::new(vec![(0.0, 100.0), (0.5, 60.0), (0.4, 0.0)]).is_err());
        assert!(CalibrationCurve::new(vec![(0.0, 100.0), (0.5, 110.0), (1.0, 0.0)]).is_err());
    }

    #[test]
    fn test_curve_serde_roundtrip() {
        let curve =
            CalibrationCurve::new(vec![(0.0, 100.0), (0.6, 75.0), (1.2, 0.0)]).unwrap();
        let json = serde_json::to_string(&curve).unwrap();
        let back: CalibrationCurve = serde_json::from_str(&json).unwrap();
        assert_eq!(back, curve);
    }

    #[test]
    fn test_curve_serde_rejects_invalid() {
        let result: Result<CalibrationCurve, _> =
            serde_json::from_str("[[0.0, 100.0], [0.5, 120.0], [1.0, 0.0]]");
        assert!(result.is_err());
    }
}
