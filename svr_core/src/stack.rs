//! Slice stacks.
//!
//! A [`Stack`] is an ordered set of parallel 2D slices sharing in-plane
//! resolution, gap and thickness, with an optional per-pixel mask and one
//! initial pose per slice. Stacks are validated on construction and are
//! immutable afterwards.
//!
//! Slice-local frame: pixel `(row, col)` of an `H × W` slice sits at
//! `((col - (W-1)/2)·res_x, (row - (H-1)/2)·res_y, 0)` millimetres.

use crate::alloc_prelude::{vec, Vec};
use crate::error::CoreError;
use crate::psf::PsfSigma;
use crate::transform::RigidTransform;
use crate::types::Point3;

/// A row-major 2D image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image2D {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Image2D {
    /// Wrap row-major pixel data.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, CoreError> {
        if data.len() != width * height || data.is_empty() {
            return Err(CoreError::ShapeMismatch {
                expected: width * height,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An image filled with one value.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Image width (columns).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height (rows).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// Row-major pixel values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Initial poses for `n` parallel slices spaced `gap` apart along z,
/// centred on the origin.
pub fn default_transforms(n: usize, gap: f32) -> Vec<RigidTransform> {
    let centre = (n as f32 - 1.0) * 0.5;
    (0..n)
        .map(|k| RigidTransform::from_translation([0.0, 0.0, (k as f32 - centre) * gap]))
        .collect()
}

/// An ordered stack of parallel slices.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    slices: Vec<Image2D>,
    masks: Option<Vec<Vec<bool>>>,
    transforms: Vec<RigidTransform>,
    resolution_x: f32,
    resolution_y: f32,
    gap: f32,
    thickness: Option<f32>,
}

impl Stack {
    /// Build a stack with default poses (see [`default_transforms`]).
    pub fn new(
        slices: Vec<Image2D>,
        resolution_x: f32,
        resolution_y: f32,
        gap: f32,
    ) -> Result<Self, CoreError> {
        let first = slices.first().ok_or(CoreError::EmptyStack)?;
        let (width, height) = (first.width(), first.height());
        for slice in &slices {
            if slice.width() != width || slice.height() != height {
                return Err(CoreError::ShapeMismatch {
                    expected: width * height,
                    got: slice.len(),
                });
            }
            if let Some(index) = slice.data().iter().position(|v| !v.is_finite()) {
                return Err(CoreError::NonFiniteValue { index });
            }
        }
        positive("resolution_x", resolution_x)?;
        positive("resolution_y", resolution_y)?;
        positive("gap", gap)?;

        let transforms = default_transforms(slices.len(), gap);
        Ok(Self {
            slices,
            masks: None,
            transforms,
            resolution_x,
            resolution_y,
            gap,
            thickness: None,
        })
    }

    /// Set an explicit slice thickness (defaults to the gap).
    pub fn with_thickness(mut self, thickness: f32) -> Result<Self, CoreError> {
        positive("thickness", thickness)?;
        self.thickness = Some(thickness);
        Ok(self)
    }

    /// Attach one row-major mask per slice.
    pub fn with_masks(mut self, masks: Vec<Vec<bool>>) -> Result<Self, CoreError> {
        if masks.len() != self.slices.len() {
            return Err(CoreError::CountMismatch {
                expected: self.slices.len(),
                got: masks.len(),
            });
        }
        let pixels = self.width() * self.height();
        if let Some(bad) = masks.iter().find(|m| m.len() != pixels) {
            return Err(CoreError::ShapeMismatch {
                expected: pixels,
                got: bad.len(),
            });
        }
        self.masks = Some(masks);
        Ok(self)
    }

    /// Replace the initial poses (e.g. with registration output).
    pub fn with_transforms(mut self, transforms: Vec<RigidTransform>) -> Result<Self, CoreError> {
        if transforms.len() != self.slices.len() {
            return Err(CoreError::CountMismatch {
                expected: self.slices.len(),
                got: transforms.len(),
            });
        }
        self.transforms = transforms;
        Ok(self)
    }

    /// The slices.
    pub fn slices(&self) -> &[Image2D] {
        &self.slices
    }

    /// Initial slice-to-world poses.
    pub fn transforms(&self) -> &[RigidTransform] {
        &self.transforms
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Always false for a constructed stack.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slice width in pixels.
    pub fn width(&self) -> usize {
        self.slices[0].width()
    }

    /// Slice height in pixels.
    pub fn height(&self) -> usize {
        self.slices[0].height()
    }

    /// In-plane spacing along columns (mm).
    pub fn resolution_x(&self) -> f32 {
        self.resolution_x
    }

    /// In-plane spacing along rows (mm).
    pub fn resolution_y(&self) -> f32 {
        self.resolution_y
    }

    /// Distance between slice centres (mm).
    pub fn gap(&self) -> f32 {
        self.gap
    }

    /// Slice thickness (mm); the gap unless set explicitly.
    pub fn thickness(&self) -> f32 {
        self.thickness.unwrap_or(self.gap)
    }

    /// PSF footprint shared by every slice of the stack.
    pub fn psf(&self) -> Result<PsfSigma, CoreError> {
        PsfSigma::for_slice(self.resolution_x, self.resolution_y, self.thickness())
    }

    /// Whether pixel `index` of slice `slice` is inside the mask.
    pub fn is_masked(&self, slice: usize, index: usize) -> bool {
        match &self.masks {
            Some(masks) => masks[slice][index],
            None => true,
        }
    }

    /// Number of pixels inside the mask across all slices.
    pub fn mask_count(&self) -> usize {
        match &self.masks {
            Some(masks) => masks.iter().flatten().filter(|&&m| m).count(),
            None => self.len() * self.width() * self.height(),
        }
    }

    /// Slice-local position of pixel `(row, col)`.
    pub fn pixel_position(&self, row: usize, col: usize) -> Point3 {
        pixel_position(
            row,
            col,
            self.width(),
            self.height(),
            self.resolution_x,
            self.resolution_y,
        )
    }
}

/// Slice-local position of pixel `(row, col)` in an `width × height` slice.
pub fn pixel_position(
    row: usize,
    col: usize,
    width: usize,
    height: usize,
    resolution_x: f32,
    resolution_y: f32,
) -> Point3 {
    Point3::new(
        (col as f32 - (width as f32 - 1.0) * 0.5) * resolution_x,
        (row as f32 - (height as f32 - 1.0) * 0.5) * resolution_y,
        0.0,
    )
}

fn positive(name: &'static str, value: f32) -> Result<(), CoreError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidResolution { name, value })
    }
}
