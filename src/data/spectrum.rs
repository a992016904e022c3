use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Why an axis has no usable ppm calibration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("axis {dim} has no calibration parameters")]
    Missing { dim: usize },
    #[error("axis {dim}: {parameter} is {value}")]
    Malformed {
        dim: usize,
        parameter: &'static str,
        value: f64,
    },
}

/// Affine index → ppm mapping for one array axis.
///
/// `ppm = offset - index * scale`, so ppm decreases as the index grows
/// (index 0 is the high-shift edge of the spectrum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    /// Array axis, 0 = outermost
    pub dim: usize,
    pub label: String,
    pub num_points: usize,
    /// ppm of index 0
    pub offset: f64,
    /// ppm per point, always > 0
    pub scale: f64,
}

impl AxisCalibration {
    pub fn new(
        dim: usize,
        label: impl Into<String>,
        num_points: usize,
        offset: f64,
        scale: f64,
    ) -> Result<Self, CalibrationError> {
        if !offset.is_finite() {
            return Err(CalibrationError::Malformed {
                dim,
                parameter: "offset",
                value: offset,
            });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CalibrationError::Malformed {
                dim,
                parameter: "scale",
                value: scale,
            });
        }
        Ok(Self {
            dim,
            label: label.into(),
            num_points,
            offset,
            scale,
        })
    }

    /// Build from NMRPipe spectral parameters.
    ///
    /// NMRPipe stores the origin (Hz of the right-most point). The carrier is
    /// `orig + sw/2 - sw/size` and the first point sits half a sweep above it.
    pub fn from_spectral(
        dim: usize,
        label: impl Into<String>,
        size: usize,
        sw_hz: f64,
        obs_mhz: f64,
        orig_hz: f64,
    ) -> Result<Self, CalibrationError> {
        if size == 0 {
            return Err(CalibrationError::Missing { dim });
        }
        for (parameter, value) in [("sweep width", sw_hz), ("observe frequency", obs_mhz)] {
            if !value.is_finite() || value == 0.0 {
                return Err(CalibrationError::Malformed {
                    dim,
                    parameter,
                    value,
                });
            }
        }
        if !orig_hz.is_finite() {
            return Err(CalibrationError::Malformed {
                dim,
                parameter: "origin",
                value: orig_hz,
            });
        }
        let n = size as f64;
        let scale = sw_hz / (n * obs_mhz);
        let offset = (orig_hz + sw_hz - sw_hz / n) / obs_mhz;
        Self::new(dim, label, size, offset, scale)
    }

    pub fn index_to_unit(&self, index: usize) -> f64 {
        self.offset - index as f64 * self.scale
    }

    /// Fractional index for a ppm value (inverse of [`index_to_unit`]).
    ///
    /// [`index_to_unit`]: AxisCalibration::index_to_unit
    pub fn unit_to_index(&self, unit: f64) -> f64 {
        (self.offset - unit) / self.scale
    }

    /// ppm scale over the whole axis
    pub fn ppm_scale(&self) -> Vec<f64> {
        (0..self.num_points).map(|i| self.index_to_unit(i)).collect()
    }
}

/// Free-function form of [`AxisCalibration::index_to_unit`].
pub fn index_to_unit(calibration: &AxisCalibration, index: usize) -> f64 {
    calibration.index_to_unit(index)
}

/// Free-function form of [`AxisCalibration::unit_to_index`].
pub fn unit_to_index(calibration: &AxisCalibration, unit: f64) -> f64 {
    calibration.unit_to_index(unit)
}

/// Spectrum as delivered by a reader: an n-d array plus per-axis calibration.
#[derive(Debug, Clone)]
pub struct SpectrumData {
    pub source_path: PathBuf,
    /// Extents, outermost axis first
    pub shape: Vec<usize>,
    /// Row-major intensities (innermost axis is fastest)
    pub values: Vec<f64>,
    /// One slot per axis, in `shape` order
    pub calibrations: Vec<Result<AxisCalibration, CalibrationError>>,
}

impl SpectrumData {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
