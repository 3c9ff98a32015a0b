//! Structured identity-field extraction from a recognized token stream.
//!
//! The primary ID number (PAN or Aadhaar) is pattern-matched and checksum
//! validated; auxiliary fields (name, date of birth, address lines) come
//! from positional heuristics around the ID line and are always reported
//! with lower confidence than the validated number. Malformed content is
//! never an error here; it lands in the result status and reasons.

use crate::checksum;
use crate::ocr::{OcrError, TextRecognizer};
use crate::preprocess::PreparedImage;
use crate::types::{
    DocumentFields, DocumentType, ExtractionResult, ExtractionStatus, FieldValue, TextToken,
};

/// Scale applied to auxiliary-field confidence, keeping it strictly below
/// the validated ID number's confidence.
const AUX_CONFIDENCE_SCALE: f32 = 0.8;
const MAX_ADDRESS_LINES: usize = 3;

/// Header and label words that disqualify a line from being a name.
const NAME_STOP_WORDS: &[&str] = &[
    "INCOME",
    "TAX",
    "DEPARTMENT",
    "GOVT",
    "GOVERNMENT",
    "INDIA",
    "PERMANENT",
    "ACCOUNT",
    "NUMBER",
    "CARD",
    "UNIQUE",
    "IDENTIFICATION",
    "AUTHORITY",
    "AADHAAR",
    "NAME",
    "FATHER",
    "DOB",
    "BIRTH",
    "SIGNATURE",
];

/// Runs a text-recognition backend over a prepared document image and
/// parses the token stream into structured fields.
pub struct FieldExtractor {
    recognizer: Box<dyn TextRecognizer>,
}

impl FieldExtractor {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    pub fn extract(
        &mut self,
        image: &PreparedImage,
        document_type: DocumentType,
    ) -> Result<ExtractionResult, OcrError> {
        let tokens = self.recognizer.recognize(image)?;
        let result = extract_from_tokens(&tokens, document_type);
        tracing::info!(
            ?document_type,
            tokens = tokens.len(),
            status = ?result.status,
            "field extraction finished"
        );
        Ok(result)
    }
}

/// Checksum scheme a candidate ID number was matched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Pan,
    Aadhaar,
}

impl Scheme {
    fn rule_name(self) -> &'static str {
        match self {
            Scheme::Pan => "PAN check-character rule",
            Scheme::Aadhaar => "Verhoeff checksum",
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    value: String,
    confidence: f32,
    line_idx: usize,
    x: u32,
    scheme: Scheme,
    valid: bool,
}

/// A reading-order text line: indices into the token slice, left to right.
struct Line {
    tokens: Vec<usize>,
}

/// Pure extraction over an already-recognized token stream.
pub fn extract_from_tokens(tokens: &[TextToken], document_type: DocumentType) -> ExtractionResult {
    let mut reasons = Vec::new();

    if tokens.is_empty() {
        return ExtractionResult {
            status: ExtractionStatus::Failed,
            fields: DocumentFields::default(),
            reasons: vec!["no text recognized in document image".to_string()],
        };
    }

    let lines = group_lines(tokens);
    let candidates = collect_candidates(tokens, &lines, document_type);

    for candidate in candidates.iter().filter(|c| !c.valid) {
        reasons.push(format!(
            "candidate {} failed the {}",
            candidate.value,
            candidate.scheme.rule_name()
        ));
    }

    let Some(best) = pick_best(&candidates) else {
        if candidates.is_empty() {
            reasons.push(match document_type {
                DocumentType::Pan => "no PAN-format token found".to_string(),
                DocumentType::Aadhaar => "no Aadhaar-format number found".to_string(),
                DocumentType::Generic => "no identity-number pattern found".to_string(),
            });
        }
        return ExtractionResult {
            status: ExtractionStatus::Failed,
            fields: DocumentFields::default(),
            reasons,
        };
    };

    let id_confidence = best.confidence;
    let aux_confidence = |raw: f32| (raw.min(id_confidence) * AUX_CONFIDENCE_SCALE).max(0.0);

    let mut fields = DocumentFields {
        document_number: Some(FieldValue {
            value: best.value.clone(),
            confidence: id_confidence,
        }),
        ..DocumentFields::default()
    };

    if let Some((value, raw_conf)) = find_name(tokens, &lines, best.line_idx) {
        fields.full_name = Some(FieldValue {
            value,
            confidence: aux_confidence(raw_conf),
        });
    } else {
        reasons.push("no name line found near the ID number".to_string());
    }

    if let Some((value, raw_conf)) = find_date_of_birth(tokens) {
        fields.date_of_birth = Some(FieldValue {
            value,
            confidence: aux_confidence(raw_conf),
        });
    } else {
        reasons.push("no date-of-birth token found".to_string());
    }

    fields.address_lines = find_address_lines(tokens, &lines, best.line_idx)
        .into_iter()
        .map(|(value, raw_conf)| FieldValue {
            value,
            confidence: aux_confidence(raw_conf),
        })
        .collect();
    if fields.address_lines.is_empty() {
        reasons.push("no address lines found below the ID number".to_string());
    }

    let status = if expected_fields_present(&fields, best.scheme) {
        ExtractionStatus::Ok
    } else {
        ExtractionStatus::Partial
    };

    ExtractionResult {
        status,
        fields,
        reasons,
    }
}

/// Whether the auxiliary fields a document of this scheme is expected to
/// carry were all found. PAN cards have no address block; Aadhaar does.
fn expected_fields_present(fields: &DocumentFields, scheme: Scheme) -> bool {
    let base = fields.full_name.is_some() && fields.date_of_birth.is_some();
    match scheme {
        Scheme::Pan => base,
        Scheme::Aadhaar => base && !fields.address_lines.is_empty(),
    }
}

/// Group tokens into reading-order lines by vertical proximity of their
/// region centers.
fn group_lines(tokens: &[TextToken]) -> Vec<Line> {
    let mut order: Vec<usize> = (0..tokens.len()).collect();
    order.sort_by(|&a, &b| {
        let ca = tokens[a].region.center_y();
        let cb = tokens[b].region.center_y();
        ca.partial_cmp(&cb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(tokens[a].region.x.cmp(&tokens[b].region.x))
    });

    let mut lines: Vec<Line> = Vec::new();
    let mut current_center = f32::NEG_INFINITY;

    for idx in order {
        let token = &tokens[idx];
        let center = token.region.center_y();
        let tolerance = (token.region.height as f32 * 0.6).max(1.0);

        if (center - current_center).abs() <= tolerance {
            if let Some(line) = lines.last_mut() {
                line.tokens.push(idx);
            }
        } else {
            lines.push(Line { tokens: vec![idx] });
        }
        current_center = center;
    }

    for line in &mut lines {
        line.tokens
            .sort_by_key(|&i| tokens[i].region.x);
    }
    lines
}

/// Uppercase alphanumeric normalization of a token's text.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn collect_candidates(
    tokens: &[TextToken],
    lines: &[Line],
    document_type: DocumentType,
) -> Vec<Candidate> {
    let want_pan = matches!(document_type, DocumentType::Pan | DocumentType::Generic);
    let want_aadhaar = matches!(document_type, DocumentType::Aadhaar | DocumentType::Generic);
    let mut candidates = Vec::new();

    for (line_idx, line) in lines.iter().enumerate() {
        for &i in &line.tokens {
            let token = &tokens[i];
            let normalized = normalize(&token.text);

            if want_pan && checksum::pan_shape(&normalized) {
                candidates.push(Candidate {
                    valid: checksum::pan_valid(&normalized),
                    value: normalized.clone(),
                    confidence: token.confidence,
                    line_idx,
                    x: token.region.x,
                    scheme: Scheme::Pan,
                });
            }

            if want_aadhaar
                && normalized.len() == 12
                && normalized.bytes().all(|b| b.is_ascii_digit())
            {
                candidates.push(Candidate {
                    valid: checksum::verhoeff_valid(&normalized),
                    value: normalized.clone(),
                    confidence: token.confidence,
                    line_idx,
                    x: token.region.x,
                    scheme: Scheme::Aadhaar,
                });
            }
        }

        // Aadhaar printed as 4-4-4 groups across three tokens.
        if want_aadhaar {
            for window in line.tokens.windows(3) {
                let groups: Vec<String> =
                    window.iter().map(|&i| normalize(&tokens[i].text)).collect();
                if groups
                    .iter()
                    .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_digit()))
                {
                    let value = groups.concat();
                    let confidence = window
                        .iter()
                        .map(|&i| tokens[i].confidence)
                        .sum::<f32>()
                        / 3.0;
                    candidates.push(Candidate {
                        valid: checksum::verhoeff_valid(&value),
                        value,
                        confidence,
                        line_idx,
                        x: tokens[window[0]].region.x,
                        scheme: Scheme::Aadhaar,
                    });
                }
            }
        }
    }

    candidates
}

/// Highest-confidence valid candidate; ties go to the earliest position
/// in reading order (topmost line, then leftmost).
fn pick_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.valid)
        .min_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.line_idx.cmp(&b.line_idx))
                .then(a.x.cmp(&b.x))
        })
}

/// Nearest plausible name line above the ID line: short, purely
/// alphabetic, free of header/label words.
fn find_name(tokens: &[TextToken], lines: &[Line], id_line: usize) -> Option<(String, f32)> {
    for line in lines[..id_line].iter().rev() {
        let words: Vec<&TextToken> = line.tokens.iter().map(|&i| &tokens[i]).collect();
        if words.is_empty() || words.len() > 5 {
            continue;
        }

        let alphabetic = words.iter().all(|t| {
            let n = normalize(&t.text);
            !n.is_empty() && n.bytes().all(|b| b.is_ascii_uppercase())
        });
        if !alphabetic {
            continue;
        }

        let total_alpha: usize = words.iter().map(|t| normalize(&t.text).len()).sum();
        if total_alpha < 4 {
            continue;
        }

        let stopped = words
            .iter()
            .any(|t| NAME_STOP_WORDS.contains(&normalize(&t.text).as_str()));
        if stopped {
            continue;
        }

        let value = words
            .iter()
            .map(|t| t.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence =
            words.iter().map(|t| t.confidence).sum::<f32>() / words.len() as f32;
        return Some((value, confidence));
    }
    None
}

/// First token anywhere in the document parsing as a plausible date,
/// normalized to dd/mm/yyyy.
fn find_date_of_birth(tokens: &[TextToken]) -> Option<(String, f32)> {
    tokens
        .iter()
        .find_map(|t| parse_date(&t.text).map(|d| (d, t.confidence)))
}

/// Parse dd/mm/yyyy or dd-mm-yyyy with plausible ranges.
fn parse_date(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '/' || *c == '-')
        .collect();
    let parts: Vec<&str> = cleaned.split(['/', '-']).collect();
    if parts.len() != 3 {
        return None;
    }

    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let year: u32 = parts[2].parse().ok()?;
    if parts[2].len() != 4 {
        return None;
    }
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || !(1900..=2099).contains(&year) {
        return None;
    }
    Some(format!("{day:02}/{month:02}/{year:04}"))
}

/// Up to [`MAX_ADDRESS_LINES`] content lines strictly below the ID line.
fn find_address_lines(
    tokens: &[TextToken],
    lines: &[Line],
    id_line: usize,
) -> Vec<(String, f32)> {
    let mut out = Vec::new();
    for line in lines.iter().skip(id_line + 1) {
        if out.len() == MAX_ADDRESS_LINES {
            break;
        }
        let words: Vec<&TextToken> = line.tokens.iter().map(|&i| &tokens[i]).collect();
        let content: usize = words.iter().map(|t| normalize(&t.text).len()).sum();
        if content < 4 {
            continue;
        }
        // Date-of-birth lines are not address content.
        if words.iter().all(|t| parse_date(&t.text).is_some()) {
            continue;
        }
        let value = words
            .iter()
            .map(|t| t.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence =
            words.iter().map(|t| t.confidence).sum::<f32>() / words.len() as f32;
        out.push((value, confidence));
    }
    out
}
