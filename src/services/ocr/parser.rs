use regex::Regex;
use std::sync::LazyLock;

use super::normalize::normalize;
use crate::error::ValidationError;
use crate::models::config::WeightLimits;

// Digits, optional decimal part, optional whitespace, then KG as a whole word
static KG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*KG\b").expect("valid kg pattern"));

/// Parse a kilogram weight from OCR text
/// Expected format: "2,350 KG", "2.1kg", "Paino 0,45 kg"
/// Only the first weight in the text is used.
pub fn extract_kg(raw_text: &str) -> Option<f64> {
    let text = normalize(raw_text).replace(',', ".");

    let captures = KG_PATTERN.captures(&text)?;
    let kg: f64 = captures.get(1)?.as_str().parse().ok()?;

    kg.is_finite().then_some(kg)
}

/// Parse and validate the operator-entered weight at confirm time
pub fn parse_kg_input(kg_text: &str, limits: &WeightLimits) -> Result<f64, ValidationError> {
    let cleaned = kg_text.trim().replace(',', ".");
    if cleaned.is_empty() {
        return Err(ValidationError::WeightMissing);
    }

    let kg: f64 = cleaned.parse().map_err(|_| ValidationError::WeightNotANumber)?;
    validate_kg(kg, limits)?;

    Ok(kg)
}

/// Validate a weight is finite, positive and inside the configured range
pub fn validate_kg(kg: f64, limits: &WeightLimits) -> Result<(), ValidationError> {
    if !kg.is_finite() {
        return Err(ValidationError::WeightNotANumber);
    }
    if kg <= 0.0 {
        return Err(ValidationError::WeightNotPositive);
    }
    if kg < limits.min_kg || kg > limits.max_kg {
        return Err(ValidationError::WeightOutOfRange {
            kg,
            min: limits.min_kg,
            max: limits.max_kg,
        });
    }

    Ok(())
}
