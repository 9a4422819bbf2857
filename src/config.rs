use std::collections::BTreeSet;

use crate::error::ExtractError;
use crate::mapper::PixelCalibration;
use crate::merge::{DEFAULT_SEAM_TOLERANCE, DEFAULT_SNAP_PRECISION};
use crate::threshold::Threshold;

/// All extraction parameters in one struct.
/// Build with struct-update syntax over `Default`.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    // -- Selection --
    /// One rule per output label. Labels must be distinct.
    pub thresholds: Vec<Threshold>,

    // -- Merge --
    /// Half-width of the band around each interior tile boundary, in
    /// full-resolution pixels. Pieces whose bounding box reaches into a band
    /// are candidates for the seam union.
    pub seam_tolerance: f64,
    /// Grid that failing union inputs are snapped to before retrying.
    pub snap_precision: f64,

    // -- Output --
    /// Drop merged polygons smaller than this (full-resolution pixels²).
    /// 0 = keep everything.
    pub min_area: f64,
    /// Compare each tile's traced area with its selected pixel count and
    /// report mismatches.
    pub check_area: bool,
    /// Convert the merged geometry to physical units as the last step.
    pub calibration: Option<PixelCalibration>,
}

impl ExtractionConfig {
    pub fn with_thresholds(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        let mut labels = BTreeSet::new();
        for threshold in &self.thresholds {
            threshold.validate()?;
            if !labels.insert(threshold.label) {
                return Err(ExtractError::InvalidThreshold(format!(
                    "label {} is used by more than one threshold",
                    threshold.label
                )));
            }
        }
        if !(self.seam_tolerance >= 0.0 && self.seam_tolerance.is_finite()) {
            return Err(ExtractError::InvalidThreshold(format!(
                "seam tolerance must be finite and non-negative, got {}",
                self.seam_tolerance
            )));
        }
        if let Some(c) = self.calibration {
            if !(c.pixel_width > 0.0 && c.pixel_height > 0.0) {
                return Err(ExtractError::InvalidThreshold(format!(
                    "pixel size must be positive, got {}x{}",
                    c.pixel_width, c.pixel_height
                )));
            }
        }
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![],
            seam_tolerance: DEFAULT_SEAM_TOLERANCE,
            snap_precision: DEFAULT_SNAP_PRECISION,
            min_area: 0.0,
            check_area: true,
            calibration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExtractionConfig::default().validate().is_ok());
        let config = ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0), Threshold::above(2, 0.5)]);
        assert!(config.validate().is_ok());
        assert!(config.check_area);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let config = ExtractionConfig::with_thresholds(vec![Threshold::exact(1, 1.0), Threshold::exact(1, 2.0)]);
        assert!(matches!(config.validate(), Err(ExtractError::InvalidThreshold(_))));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let inverted = ExtractionConfig::with_thresholds(vec![Threshold::range(1, 2.0, 1.0)]);
        assert!(inverted.validate().is_err());

        let tolerance = ExtractionConfig { seam_tolerance: f64::NAN, ..Default::default() };
        assert!(tolerance.validate().is_err());

        let calibration = ExtractionConfig {
            calibration: Some(PixelCalibration::square(0.0)),
            ..Default::default()
        };
        assert!(calibration.validate().is_err());
    }
}
