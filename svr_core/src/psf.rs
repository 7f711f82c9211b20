//! Point-spread-function footprints.
//!
//! The slice profile is modelled as an axis-aligned Gaussian in the
//! slice-local frame: in-plane FWHM is `1.2 ×` the pixel spacing, and the
//! through-plane FWHM equals the slice thickness.

use crate::error::CoreError;

/// Converts a full width at half maximum to a Gaussian sigma (`1 / (2√(2 ln 2))`).
pub const FWHM_TO_SIGMA: f32 = 1.0 / 2.354_82;

/// In-plane FWHM as a multiple of the pixel spacing.
pub const IN_PLANE_FWHM_FACTOR: f32 = 1.2;

/// Per-axis Gaussian standard deviations in millimetres (slice-local frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsfSigma {
    /// Sigma along the slice rows' pixel direction.
    pub x: f32,
    /// Sigma along the slice columns' pixel direction.
    pub y: f32,
    /// Sigma through the slice plane.
    pub z: f32,
}

impl PsfSigma {
    /// Footprint of an acquired slice.
    pub fn for_slice(resolution_x: f32, resolution_y: f32, thickness: f32) -> Result<Self, CoreError> {
        check_positive("resolution_x", resolution_x)?;
        check_positive("resolution_y", resolution_y)?;
        check_positive("thickness", thickness)?;
        Ok(Self::from_fwhm([
            IN_PLANE_FWHM_FACTOR * resolution_x,
            IN_PLANE_FWHM_FACTOR * resolution_y,
            thickness,
        ]))
    }

    /// Isotropic footprint whose FWHM equals the voxel size of an output grid.
    pub fn isotropic(resolution: f32) -> Result<Self, CoreError> {
        check_positive("resolution", resolution)?;
        Ok(Self::from_fwhm([resolution; 3]))
    }

    /// Build from per-axis FWHM values.
    pub fn from_fwhm(fwhm: [f32; 3]) -> Self {
        Self {
            x: fwhm[0] * FWHM_TO_SIGMA,
            y: fwhm[1] * FWHM_TO_SIGMA,
            z: fwhm[2] * FWHM_TO_SIGMA,
        }
    }

    /// Per-axis FWHM values.
    pub fn fwhm(&self) -> [f32; 3] {
        [
            self.x / FWHM_TO_SIGMA,
            self.y / FWHM_TO_SIGMA,
            self.z / FWHM_TO_SIGMA,
        ]
    }

    /// Map a standard-normal draw to a footprint offset.
    #[inline]
    pub fn scale(&self, standard: [f32; 3]) -> [f32; 3] {
        [standard[0] * self.x, standard[1] * self.y, standard[2] * self.z]
    }

    /// Kernel density at a local offset.
    pub fn density(&self, offset: [f32; 3]) -> f32 {
        let norm = (2.0 * core::f32::consts::PI) * libm::sqrtf(2.0 * core::f32::consts::PI);
        let q = (offset[0] / self.x) * (offset[0] / self.x)
            + (offset[1] / self.y) * (offset[1] / self.y)
            + (offset[2] / self.z) * (offset[2] / self.z);
        libm::expf(-0.5 * q) / (norm * self.x * self.y * self.z)
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<(), CoreError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidResolution { name, value })
    }
}
