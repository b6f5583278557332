// error.rs — Error taxonomy for the flow filter.
//
//   InvalidDimension  construction with a zero height or width; fatal
//   ShapeMismatch     host/device shape disagreement on load, download, copy
//   InvalidParameter  a scalar parameter outside its domain
//   Device            wgpu adapter/device/mapping failure, passed through
//
// Nothing in this crate retries: the caller decides what to do with a
// dropped frame.

use std::fmt;

use crate::gpu::device::GpuError;

/// Shape of an image or buffer: height × width × channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Shape { height, width, channels }
    }

    /// Same height and width, different channel count.
    pub fn with_channels(self, channels: usize) -> Self {
        Shape { channels, ..self }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}×{}", self.height, self.width, self.channels)
    }
}

/// Errors returned by the flow filter and its stages.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("invalid filter dimensions {height}×{width}: height and width must be positive")]
    InvalidDimension { height: usize, width: usize },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("invalid value {value} for parameter `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error(transparent)]
    Device(#[from] GpuError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Fail with `ShapeMismatch` unless `actual == expected`.
pub(crate) fn check_shape(expected: Shape, actual: Shape) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FlowError::ShapeMismatch { expected, actual })
    }
}

/// Validate an iteration count (must be ≥ 1).
pub(crate) fn check_iterations(name: &'static str, n: usize) -> Result<()> {
    if n == 0 {
        return Err(FlowError::InvalidParameter {
            name,
            value: 0.0,
            reason: "must be at least 1",
        });
    }
    Ok(())
}

/// Validate a strictly positive, finite scalar.
pub(crate) fn check_positive(name: &'static str, v: f32) -> Result<()> {
    if !(v.is_finite() && v > 0.0) {
        return Err(FlowError::InvalidParameter {
            name,
            value: v as f64,
            reason: "must be finite and greater than zero",
        });
    }
    Ok(())
}

/// Largest accepted `max_flow`. Each unit of `max_flow` costs one
/// propagation step per frame.
pub const MAX_FLOW_LIMIT: f32 = u16::MAX as f32;

/// Validate `max_flow` and return the propagation step count it implies,
/// `ceil(max_flow)`.
pub(crate) fn check_max_flow(max_flow: f32) -> Result<usize> {
    check_positive("max_flow", max_flow)?;
    if max_flow > MAX_FLOW_LIMIT {
        return Err(FlowError::InvalidParameter {
            name: "max_flow",
            value: max_flow as f64,
            reason: "must not exceed 65535 pixels per frame",
        });
    }
    Ok(max_flow.ceil() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::new(480, 752, 2).to_string(), "480×752×2");
    }

    #[test]
    fn test_check_shape() {
        assert!(check_shape(Shape::new(4, 4, 1), Shape::new(4, 4, 1)).is_ok());
        let err = check_shape(Shape::new(4, 4, 1), Shape::new(4, 5, 1)).unwrap_err();
        assert!(matches!(err, FlowError::ShapeMismatch { .. }));
        assert!(err.to_string().contains("4×5×1"));
    }

    #[test]
    fn test_check_positive_rejects_bad_values() {
        assert!(check_positive("gamma", 0.5).is_ok());
        assert!(check_positive("gamma", 0.0).is_err());
        assert!(check_positive("gamma", -1.0).is_err());
        assert!(check_positive("gamma", f32::NAN).is_err());
        assert!(check_positive("gamma", f32::INFINITY).is_err());
    }

    #[test]
    fn test_check_max_flow_bounds() {
        assert_eq!(check_max_flow(0.3).unwrap(), 1);
        assert_eq!(check_max_flow(2.0).unwrap(), 2);
        assert_eq!(check_max_flow(MAX_FLOW_LIMIT).unwrap(), 65535);
        assert!(check_max_flow(65535.5).is_err());
        assert!(check_max_flow(1.0e9).is_err());
        let err = check_max_flow(1.0e20).unwrap_err();
        assert!(err.to_string().contains("max_flow"));
        assert!(check_max_flow(0.0).is_err());
    }

    #[test]
    fn test_check_iterations() {
        assert!(check_iterations("smooth_iterations", 1).is_ok());
        let err = check_iterations("smooth_iterations", 0).unwrap_err();
        assert!(err.to_string().contains("smooth_iterations"));
    }
}
