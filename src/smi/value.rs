// Helpers shared by the nvidia-smi table parsers.
//
// nvidia-smi prints a reading it could not obtain as a placeholder
// ("N/A", "[N/A]", "ERR!", "ERR%", ...) instead of a number. Every
// such token maps to `None`, which stays distinct from a real zero.

/// Parse a numeric reading, dropping the unit suffix first.
///
/// Decimal readings are rounded to the nearest integer.
pub fn reading(token: &str, unit: &str) -> Option<u32> {
    let token = token.trim();
    let value = token.strip_suffix(unit).unwrap_or(token);

    if let Ok(value) = value.parse::<u32>() {
        return Some(value);
    }

    match value.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => {
            Some(value.round() as u32)
        }
        _ => None,
    }
}

/// Return a raw text field, or `None` for the not-applicable placeholder.
pub fn text(token: &str) -> Option<String> {
    let token = token.trim();

    if token.is_empty() || is_placeholder(token) {
        None
    } else {
        Some(token.to_string())
    }
}

// Matches "N/A" and its bracketed or prefixed variants
fn is_placeholder(token: &str) -> bool {
    token.contains("N/A")
}
