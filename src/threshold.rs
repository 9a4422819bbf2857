//! Inclusive value-range selection of pixels.

use std::fmt;
use std::str::FromStr;

use crate::error::ExtractError;

/// One `(label, min, max)` selection rule.
///
/// A pixel is selected when `min <= value <= max`. Either bound may be
/// infinite for one-sided thresholds; `min == max` selects one exact value,
/// which is how discrete classification labels are extracted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub label: i32,
    pub min: f64,
    pub max: f64,
}

impl Threshold {
    pub fn range(label: i32, min: f64, max: f64) -> Self {
        Self { label, min, max }
    }

    /// Select pixels equal to `value`.
    pub fn exact(label: i32, value: f64) -> Self {
        Self::range(label, value, value)
    }

    /// Select pixels `>= min`.
    pub fn above(label: i32, min: f64) -> Self {
        Self::range(label, min, f64::INFINITY)
    }

    /// Select pixels `<= max`.
    pub fn below(label: i32, max: f64) -> Self {
        Self::range(label, f64::NEG_INFINITY, max)
    }

    /// Whether `value` falls inside the inclusive range. NaN never does.
    #[inline]
    pub fn selects(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Reject bounds that can never describe a usable range.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.min.is_nan() || self.max.is_nan() {
            return Err(ExtractError::InvalidThreshold(format!(
                "label {} has a NaN bound",
                self.label
            )));
        }
        if self.min > self.max {
            return Err(ExtractError::InvalidThreshold(format!(
                "label {}: min {} exceeds max {}",
                self.label, self.min, self.max
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[{}, {}]", self.label, self.min, self.max)
    }
}

/// Parses `label:min:max`, or `label:value` for an exact match.
/// Bounds accept `inf`, `+inf` and `-inf`.
impl FromStr for Threshold {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ExtractError::InvalidThreshold(format!("expected label:min:max, got '{s}'"));
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let label: i32 = parts.first().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let threshold = match parts.as_slice() {
            [_, value] => Threshold::exact(label, parse_bound(value).ok_or_else(invalid)?),
            [_, min, max] => Threshold::range(
                label,
                parse_bound(min).ok_or_else(invalid)?,
                parse_bound(max).ok_or_else(invalid)?,
            ),
            _ => return Err(invalid()),
        };
        threshold.validate()?;
        Ok(threshold)
    }
}

fn parse_bound(s: &str) -> Option<f64> {
    match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}
