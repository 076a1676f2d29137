use std::sync::OnceLock;

use opencv::core::Mat;
use regex::Regex;

use crate::error::CapabilityError;

/// Plate field when the reader answered but nothing matched the plate grammar.
pub const NOT_DETECTED: &str = "Not Detected";
/// Plate field when no read happened: empty crop, reader failure or timeout.
pub const UNKNOWN: &str = "UNKNOWN";

const PLATE_PATTERN: &str = "[A-Z]{2}[0-9]{2}[A-Z]{1,2}[0-9]{4}";
const PLATE_LEN: std::ops::RangeInclusive<usize> = 10..=11;

fn full_match() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{PLATE_PATTERN}$")).ok())
        .as_ref()
}

fn search() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLATE_PATTERN).ok()).as_ref()
}

/// Reads a plate string off a vehicle crop. Implementations may block on the
/// network; the pipeline wraps them in a deadline.
pub trait PlateReader: Send + Sync {
    fn read(&self, crop: &Mat) -> Result<String, CapabilityError>;
}

/// State code, district digits, one or two series letters, four digits, and
/// 10 to 11 characters overall.
pub fn validate_plate(text: &str) -> bool {
    PLATE_LEN.contains(&text.len()) && full_match().is_some_and(|re| re.is_match(text))
}

/// Either placeholder, in any letter case.
pub fn is_sentinel(plate: &str) -> bool {
    let plate = plate.trim();
    plate.eq_ignore_ascii_case(NOT_DETECTED) || plate.eq_ignore_ascii_case(UNKNOWN)
}

/// Information content of a stored plate: sentinels carry none.
pub fn plate_strength(plate: &str) -> usize {
    if is_sentinel(plate) || !validate_plate(plate) {
        0
    } else {
        plate.len()
    }
}

/// Uppercase and keep only ASCII letters and digits.
pub fn clean_ocr_text(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Pull the first plate-shaped run out of free OCR text.
pub fn extract_plate(raw: &str) -> Option<String> {
    let cleaned = clean_ocr_text(raw);
    search()?.find(&cleaned).map(|m| m.as_str().to_string())
}

/// Map a reader result onto the stored plate vocabulary. The grammar check is
/// strict: a partial read such as `KA05M1234` is `Not Detected`.
pub fn normalize_read(result: &Result<String, CapabilityError>) -> String {
    match result {
        Ok(text) => {
            let cleaned = clean_ocr_text(text);
            if validate_plate(&cleaned) {
                cleaned
            } else {
                NOT_DETECTED.to_string()
            }
        }
        Err(_) => UNKNOWN.to_string(),
    }
}
