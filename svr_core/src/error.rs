//! Error types for svr_core operations.
//!
//! Provides a simple error enum with no external dependencies for no_std compatibility.

use core::fmt;

/// Error types that can occur during svr_core operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreError {
    /// A stack was built from zero slices.
    EmptyStack,
    /// A slice or mask does not have the size of the rest of the stack.
    ShapeMismatch {
        /// Expected element count.
        expected: usize,
        /// Element count that was provided.
        got: usize,
    },
    /// A per-slice sequence does not have one entry per slice.
    CountMismatch {
        /// Expected number of entries.
        expected: usize,
        /// Number of entries provided.
        got: usize,
    },
    /// A resolution, gap or thickness is not strictly positive and finite.
    InvalidResolution {
        /// Name of the offending quantity.
        name: &'static str,
        /// The value that was provided.
        value: f32,
    },
    /// A scalar parameter is outside its valid range.
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// The value that was provided.
        value: f64,
    },
    /// Milestone fractions are not strictly increasing inside (0, 1).
    InvalidMilestones {
        /// Index of the first offending milestone.
        index: usize,
        /// The offending fraction.
        value: f64,
    },
    /// A 4×4 matrix is not a proper rigid transform.
    NotRigid,
    /// A pixel or voxel value is NaN or infinite.
    NonFiniteValue {
        /// Flat index of the offending element.
        index: usize,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::EmptyStack => write!(f, "stack contains no slices"),
            CoreError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {} elements, got {}", expected, got)
            }
            CoreError::CountMismatch { expected, got } => {
                write!(f, "count mismatch: expected {} entries, got {}", expected, got)
            }
            CoreError::InvalidResolution { name, value } => {
                write!(f, "{} must be positive and finite, got {}", name, value)
            }
            CoreError::InvalidParameter { name, value } => {
                write!(f, "parameter {} is out of range: {}", name, value)
            }
            CoreError::InvalidMilestones { index, value } => {
                write!(
                    f,
                    "milestone {} ({}) breaks the strictly increasing (0, 1) sequence",
                    index, value
                )
            }
            CoreError::NotRigid => write!(f, "matrix is not a rigid transform"),
            CoreError::NonFiniteValue { index } => {
                write!(f, "non-finite value at index {}", index)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "std")]
    #[test]
    fn test_error_display() {
        use std::format;

        assert_eq!(format!("{}", CoreError::EmptyStack), "stack contains no slices");

        let err = CoreError::ShapeMismatch {
            expected: 4096,
            got: 4000,
        };
        assert_eq!(
            format!("{}", err),
            "shape mismatch: expected 4096 elements, got 4000"
        );

        let err = CoreError::InvalidResolution {
            name: "gap",
            value: 0.0,
        };
        assert_eq!(format!("{}", err), "gap must be positive and finite, got 0");

        let err = CoreError::InvalidMilestones {
            index: 1,
            value: 0.4,
        };
        assert_eq!(
            format!("{}", err),
            "milestone 1 (0.4) breaks the strictly increasing (0, 1) sequence"
        );
    }

    #[test]
    fn test_error_equality() {
        let a = CoreError::CountMismatch { expected: 3, got: 2 };
        let b = CoreError::CountMismatch { expected: 3, got: 2 };
        let c = CoreError::CountMismatch { expected: 3, got: 4 };

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
