//! Check-character validation for identity numbers.
//!
//! Aadhaar numbers carry a Verhoeff check digit in the final position.
//! PAN check validation uses a weighted mod-26 check character over the
//! first nine characters; the officially issued algorithm is unpublished,
//! so this deterministic rule stands in for it and is applied uniformly
//! on both generation (tests) and validation.

/// Verhoeff multiplication table (dihedral group D5).
const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Verhoeff permutation table, applied cyclically by digit position.
const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 6, 8, 7, 0],
    [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

/// Validate a digit string whose last digit is a Verhoeff check digit.
///
/// Returns `false` for empty input or any non-ASCII-digit character.
pub fn verhoeff_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut c = 0u8;
    for (i, ch) in digits.bytes().rev().enumerate() {
        if !ch.is_ascii_digit() {
            return false;
        }
        let digit = (ch - b'0') as usize;
        c = VERHOEFF_D[c as usize][VERHOEFF_P[i % 8][digit] as usize];
    }
    c == 0
}

/// True if `s` has the PAN shape: 5 uppercase letters, 4 digits, 1 letter.
pub fn pan_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[..5].iter().all(|b| b.is_ascii_uppercase())
        && bytes[5..9].iter().all(|b| b.is_ascii_digit())
        && bytes[9].is_ascii_uppercase()
}

/// Compute the expected check character for the first nine PAN characters.
///
/// Character values are 0-9 for digits and 10-35 for A-Z; values are
/// weighted by position (1-9), summed, and reduced mod 26 to a letter.
/// Returns `None` unless the input is exactly 9 characters of the
/// expected classes.
pub fn pan_check_char(first_nine: &str) -> Option<char> {
    let bytes = first_nine.as_bytes();
    if bytes.len() != 9 {
        return None;
    }

    let mut sum = 0u32;
    for (i, &b) in bytes.iter().enumerate() {
        let value = match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'A'..=b'Z' => (b - b'A') as u32 + 10,
            _ => return None,
        };
        sum += value * (i as u32 + 1);
    }
    Some((b'A' + (sum % 26) as u8) as char)
}

/// Full PAN validation: shape plus check character.
pub fn pan_valid(s: &str) -> bool {
    if !pan_shape(s) {
        return false;
    }
    pan_check_char(&s[..9]) == Some(s.as_bytes()[9] as char)
}
