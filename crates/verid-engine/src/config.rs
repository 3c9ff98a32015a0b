use std::path::PathBuf;
use verid_core::{CalibrationCurve, PreprocessConfig, VerifierConfig};

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files and the OCR dictionary.
    pub model_dir: PathBuf,
    /// Number of worker pipelines to spawn.
    pub pool_size: usize,
    /// Confidence at or above which a scored face pair counts as matched.
    pub acceptance_threshold: u8,
    /// Distance at which calibrated confidence reaches zero. Ignored when
    /// an explicit calibration curve is configured.
    pub rejection_distance: f32,
    /// Optional piecewise-linear calibration curve, as JSON knot pairs.
    pub calibration_curve: Option<CalibrationCurve>,
    /// Minimum side length accepted for document images.
    pub min_document_side: u32,
    /// Minimum side length accepted for face images.
    pub min_face_side: u32,
    /// Face images larger than this on their longest side are downscaled.
    pub max_face_side: u32,
}

impl Config {
    /// Load configuration from `VERID_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("VERID_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/verid/models"));

        let defaults = PreprocessConfig::default();
        let calibration_curve = std::env::var("VERID_CALIBRATION_CURVE")
            .ok()
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(curve) => Some(curve),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "VERID_CALIBRATION_CURVE is not a valid curve; using the linear default"
                    );
                    None
                }
            });

        Self {
            model_dir,
            pool_size: env_usize("VERID_POOL_SIZE", 2).max(1),
            acceptance_threshold: env_u8("VERID_ACCEPTANCE_THRESHOLD", 80),
            rejection_distance: env_f32("VERID_REJECTION_DISTANCE", 1.2),
            calibration_curve,
            min_document_side: env_u32("VERID_MIN_DOCUMENT_SIDE", defaults.min_document_side),
            min_face_side: env_u32("VERID_MIN_FACE_SIDE", defaults.min_face_side),
            max_face_side: env_u32("VERID_MAX_FACE_SIDE", defaults.max_face_side),
        }
    }

    /// Path to the SCRFD face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the ArcFace face encoding model.
    pub fn encoder_model_path(&self) -> String {
        self.model_path("w600k_r50.onnx")
    }

    /// Path to the CRNN text recognition model.
    pub fn recognition_model_path(&self) -> String {
        self.model_path("recognition.onnx")
    }

    /// Path to the recognition character dictionary.
    pub fn dictionary_path(&self) -> String {
        self.model_path("dict.txt")
    }

    /// Pipeline configuration derived from this service configuration.
    pub fn verifier_config(&self) -> VerifierConfig {
        let curve = self
            .calibration_curve
            .clone()
            .unwrap_or_else(|| CalibrationCurve::linear(self.rejection_distance));
        VerifierConfig {
            acceptance_threshold: self.acceptance_threshold,
            curve,
            preprocess: PreprocessConfig {
                min_document_side: self.min_document_side,
                min_face_side: self.min_face_side,
                max_face_side: self.max_face_side,
                ..PreprocessConfig::default()
            },
        }
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_helpers_fall_back_on_missing() {
        assert_eq!(env_usize("VERID_TEST_UNSET_USIZE", 2), 2);
        assert_eq!(env_u8("VERID_TEST_UNSET_U8", 80), 80);
        assert!((env_f32("VERID_TEST_UNSET_F32", 1.2) - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_env_helpers_fall_back_on_garbage() {
        std::env::set_var("VERID_TEST_GARBAGE_U32", "not-a-number");
        assert_eq!(env_u32("VERID_TEST_GARBAGE_U32", 200), 200);
        std::env::remove_var("VERID_TEST_GARBAGE_U32");
    }

    #[test]
    fn test_model_paths_join_model_dir() {
        let config = Config {
            model_dir: PathBuf::from("/opt/models"),
            pool_size: 1,
            acceptance_threshold: 80,
            rejection_distance: 1.2,
            calibration_curve: None,
            min_document_side: 200,
            min_face_side: 64,
            max_face_side: 1280,
        };
        assert_eq!(config.detector_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(config.dictionary_path(), "/opt/models/dict.txt");
    }

    #[test]
    fn test_verifier_config_uses_linear_curve_by_default() {
        let config = Config {
            model_dir: PathBuf::from("/opt/models"),
            pool_size: 1,
            acceptance_threshold: 90,
            rejection_distance: 1.5,
            calibration_curve: None,
            min_document_side: 250,
            min_face_side: 64,
            max_face_side: 1280,
        };
        let verifier = config.verifier_config();
        assert_eq!(verifier.acceptance_threshold, 90);
        assert!((verifier.curve.rejection_distance() - 1.5).abs() < 1e-6);
        assert_eq!(verifier.preprocess.min_document_side, 250);
    }

    #[test]
    fn test_explicit_curve_overrides_rejection_distance() {
        let curve = CalibrationCurve::new(vec![(0.0, 100.0), (0.6, 70.0), (1.0, 0.0)]).unwrap();
        let config = Config {
            model_dir: PathBuf::from("/opt/models"),
            pool_size: 1,
            acceptance_threshold: 80,
            rejection_distance: 2.0,
            calibration_curve: Some(curve.clone()),
            min_document_side: 200,
            min_face_side: 64,
            max_face_side: 1280,
        };
        assert_eq!(config.verifier_config().curve, curve);
    }
}
