//! Flattened pixel table built from input stacks.

use svr_core::{pixel_position, Aabb, Point3, PsfSigma, RigidTransform, Stack};

use crate::error::{NeuralSvrError, Result};

/// Geometry of one slice, detached from its pixel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceGeometry {
    /// Index of the owning stack.
    pub stack: usize,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Spacing along columns (mm).
    pub resolution_x: f32,
    /// Spacing along rows (mm).
    pub resolution_y: f32,
    /// Slice thickness (mm).
    pub thickness: f32,
    /// PSF footprint of every pixel.
    pub psf: PsfSigma,
    /// Slice-to-world pose at the start of training.
    pub initial: RigidTransform,
}

impl SliceGeometry {
    /// Geometry of an arbitrary slice. The PSF follows the resolution and
    /// thickness.
    pub fn new(
        width: usize,
        height: usize,
        resolution_x: f32,
        resolution_y: f32,
        thickness: f32,
        pose: RigidTransform,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(NeuralSvrError::data(format!(
                "slice must have at least one pixel, got {width}x{height}"
            )));
        }
        Ok(Self {
            stack: 0,
            width,
            height,
            resolution_x,
            resolution_y,
            thickness,
            psf: PsfSigma::for_slice(resolution_x, resolution_y, thickness)?,
            initial: pose,
        })
    }

    /// Slice-local centre of pixel `(row, col)`.
    pub fn pixel_position(&self, row: usize, col: usize) -> Point3 {
        pixel_position(
            row,
            col,
            self.width,
            self.height,
            self.resolution_x,
            self.resolution_y,
        )
    }

    /// Slice-local corners of the imaged rectangle.
    pub fn local_corners(&self) -> [Point3; 4] {
        let hx = self.width as f32 * self.resolution_x * 0.5;
        let hy = self.height as f32 * self.resolution_y * 0.5;
        [
            Point3::new(-hx, -hy, 0.0),
            Point3::new(hx, -hy, 0.0),
            Point3::new(-hx, hy, 0.0),
            Point3::new(hx, hy, 0.0),
        ]
    }

    /// Number of pixels.
    pub fn n_pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Every masked pixel of every input slice, as parallel arrays.
///
/// Pixels reference their slice by index into [`SliceDataset::geometries`];
/// values are divided by the mean masked intensity so the data has mean 1.
#[derive(Debug, Clone)]
pub struct SliceDataset {
    geometries: Vec<SliceGeometry>,
    slice_ids: Vec<u32>,
    positions: Vec<[f32; 2]>,
    values: Vec<f32>,
    intensity_mean: f32,
    bounds: Aabb,
}

impl SliceDataset {
    /// Collect the masked pixels of `stacks`.
    ///
    /// Fails with [`NeuralSvrError::DataValidation`] when there are no stacks,
    /// no usable pixel, or the mean intensity is not positive. Slices whose
    /// mask is empty keep their parameters but contribute no pixels.
    pub fn from_stacks(stacks: &[Stack]) -> Result<Self> {
        if stacks.is_empty() {
            return Err(NeuralSvrError::data("no input stacks"));
        }

        let mut geometries = Vec::new();
        let mut slice_ids = Vec::new();
        let mut positions = Vec::new();
        let mut values = Vec::new();
        let mut bounds = Aabb::empty();
        let mut max_thickness = 0.0f32;

        for (s, stack) in stacks.iter().enumerate() {
            let psf = stack.psf()?;
            max_thickness = max_thickness.max(stack.thickness());
            for (k, (slice, pose)) in stack.slices().iter().zip(stack.transforms()).enumerate() {
                let id = geometries.len() as u32;
                let geometry = SliceGeometry {
                    stack: s,
                    width: stack.width(),
                    height: stack.height(),
                    resolution_x: stack.resolution_x(),
                    resolution_y: stack.resolution_y(),
                    thickness: stack.thickness(),
                    psf,
                    initial: *pose,
                };
                for corner in geometry.local_corners() {
                    bounds.include(pose.apply(corner));
                }
                geometries.push(geometry);

                let before = values.len();
                for row in 0..stack.height() {
                    for col in 0..stack.width() {
                        let index = row * stack.width() + col;
                        if !stack.is_masked(k, index) {
                            continue;
                        }
                        let p = stack.pixel_position(row, col);
                        slice_ids.push(id);
                        positions.push([p.x, p.y]);
                        values.push(slice.get(row, col));
                    }
                }
                if values.len() == before {
                    log::warn!("stack {s} slice {k} has no pixels inside its mask");
                }
            }
        }

        if values.is_empty() {
            return Err(NeuralSvrError::data("no pixels inside the masks"));
        }
        let mean = (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32;
        if !(mean.is_finite() && mean > 0.0) {
            return Err(NeuralSvrError::data(format!(
                "mean masked intensity must be positive, got {mean}"
            )));
        }
        values.iter_mut().for_each(|v| *v /= mean);

        log::info!(
            "dataset: {} stacks, {} slices, {} pixels, mean intensity {:.3}",
            stacks.len(),
            geometries.len(),
            values.len(),
            mean
        );

        Ok(Self {
            geometries,
            slice_ids,
            positions,
            values,
            intensity_mean: mean,
            bounds: bounds.padded(max_thickness),
        })
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no pixels (never for a constructed dataset).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of slices, including those without pixels.
    pub fn n_slices(&self) -> usize {
        self.geometries.len()
    }

    /// Per-slice geometry.
    pub fn geometries(&self) -> &[SliceGeometry] {
        &self.geometries
    }

    /// Initial pose of every slice.
    pub fn initial_transforms(&self) -> Vec<RigidTransform> {
        self.geometries.iter().map(|g| g.initial).collect()
    }

    /// Slice index of pixel `i`.
    pub fn slice_of(&self, i: usize) -> usize {
        self.slice_ids[i] as usize
    }

    /// Slice-local `(x, y)` centre of pixel `i` (mm).
    pub fn position(&self, i: usize) -> [f32; 2] {
        self.positions[i]
    }

    /// Normalised value of pixel `i`.
    pub fn value(&self, i: usize) -> f32 {
        self.values[i]
    }

    /// Mean masked intensity the values were divided by.
    pub fn intensity_mean(&self) -> f32 {
        self.intensity_mean
    }

    /// World box covering every slice, padded by the largest thickness.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svr_core::Image2D;

    fn stack(n: usize, value: f32) -> Stack {
        let slices = (0..n).map(|_| Image2D::filled(4, 3, value)).collect();
        Stack::new(slices, 1.0, 2.0, 3.0).unwrap()
    }

    #[test]
    fn test_pixels_are_normalised() {
        let dataset = SliceDataset::from_stacks(&[stack(2, 4.0), stack(3, 8.0)]).unwrap();
        assert_eq!(dataset.n_slices(), 5);
        assert_eq!(dataset.len(), 5 * 12);
        assert!((dataset.intensity_mean() - 6.4).abs() < 1e-5);
        let mean: f32 = (0..dataset.len()).map(|i| dataset.value(i)).sum::<f32>() / dataset.len() as f32;
        assert!((mean - 1.0).abs() < 1e-5);
        assert_eq!(dataset.slice_of(0), 0);
        assert_eq!(dataset.slice_of(dataset.len() - 1), 4);
        assert_eq!(dataset.geometries()[3].stack, 1);
    }

    #[test]
    fn test_bounds_cover_slices() {
        let dataset = SliceDataset::from_stacks(&[stack(3, 1.0)]).unwrap();
        let bounds = dataset.bounds();
        // 4 x 1mm by 3 x 2mm, slices at z = -3, 0, 3, padded by 3mm.
        assert_eq!(bounds.min, Point3::new(-5.0, -6.0, -6.0));
        assert_eq!(bounds.max, Point3::new(5.0, 6.0, 6.0));
    }

    #[test]
    fn test_empty_mask_slice_is_kept() {
        let masks = vec![vec![true; 12], vec![false; 12]];
        let stack = stack(2, 1.0).with_masks(masks).unwrap();
        let dataset = SliceDataset::from_stacks(&[stack]).unwrap();
        assert_eq!(dataset.n_slices(), 2);
        assert_eq!(dataset.len(), 12);
    }

    #[test]
    fn test_rejects_unusable_input() {
        assert!(matches!(
            SliceDataset::from_stacks(&[]),
            Err(NeuralSvrError::DataValidation { .. })
        ));

        let masked = stack(1, 1.0).with_masks(vec![vec![false; 12]]).unwrap();
        assert!(matches!(
            SliceDataset::from_stacks(&[masked]),
            Err(NeuralSvrError::DataValidation { .. })
        ));

        assert!(SliceDataset::from_stacks(&[stack(2, 0.0)]).is_err());
    }
}
