use serde::{Deserialize, Serialize};

/// Kind of identity document being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pan,
    Aadhaar,
    Generic,
}

/// Axis-aligned pixel region in a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn center_y(&self) -> f32 {
        self.y as f32 + self.height as f32 / 2.0
    }
}

/// One recognized text token: the text, where it sits, and how confident
/// the recognizer was about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub region: Region,
    pub confidence: f32,
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Fixed-length face descriptor, tied to the box it was extracted from.
/// Immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub values: Vec<f32>,
    pub face: FaceBox,
    /// Model version that produced this encoding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceEncoding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another encoding. Dimensions are compared
    /// up to the shorter length; callers that care must check `dim()`
    /// first (the scorer does).
    pub fn euclidean_distance(&self, other: &FaceEncoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One extracted identity field, present only when its pattern matched
/// and passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub confidence: f32,
}

/// Structured fields pulled from a document image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<FieldValue>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub address_lines: Vec<FieldValue>,
}

/// Overall outcome of a field-extraction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Primary ID validated and auxiliary fields found.
    Ok,
    /// Primary ID validated but one or more auxiliary fields missing.
    Partial,
    /// Primary ID could not be validated.
    Failed,
}

/// Result of `extract_document_fields`. Malformed content never raises;
/// it lands in `status` and `reasons`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub fields: DocumentFields,
    pub reasons: Vec<String>,
}

/// Outcome category of a face-match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    NoFaceSelfie,
    NoFaceDocument,
    MultipleFacesSelfie,
    MultipleFacesDocument,
    Inconclusive,
}

/// Result of `match_faces`. Confidence and distance are present only when
/// a face pair was actually scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl MatchResult {
    /// A terminal result where no scoring was performed.
    pub fn without_score(status: MatchStatus) -> Self {
        Self {
            status,
            confidence: None,
            distance: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_euclidean_distance_identical() {
        let a = encoding(vec![0.5, -0.5, 0.25]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_axis() {
        let a = encoding(vec![0.0, 0.0]);
        let b = encoding(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_match_result_without_score_serializes_without_numbers() {
        let result = MatchResult::without_score(MatchStatus::NoFaceSelfie);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "no_face_selfie");
        assert!(json.get("confidence").is_none());
        assert!(json.get("distance").is_none());
    }

    #[test]
    fn test_extraction_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ExtractionStatus::Partial).unwrap(),
            "partial"
        );
        assert_eq!(
            serde_json::to_value(DocumentType::Aadhaar).unwrap(),
            "aadhaar"
        );
    }

    #[test]
    fn test_absent_fields_not_serialized() {
        let fields = DocumentFields::default();
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
