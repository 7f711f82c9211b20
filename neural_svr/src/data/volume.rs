//! Regular voxel grids produced by volume sampling.

use svr_core::{trilinear_interpolate, Aabb, Point3, CORNER_OFFSETS};

use crate::error::{NeuralSvrError, Result};

/// An isotropic voxel grid in world coordinates.
///
/// Voxel `(i, j, k)` sits at `origin + (i, j, k) · resolution` and is stored
/// at `i + dims[0] · (j + dims[1] · k)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    dims: [usize; 3],
    resolution: f32,
    origin: Point3,
    data: Vec<f32>,
    mask: Option<Vec<bool>>,
}

impl Volume {
    /// Wrap voxel values.
    pub fn new(dims: [usize; 3], resolution: f32, origin: Point3, data: Vec<f32>) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(NeuralSvrError::data(format!(
                "voxel size must be positive, got {resolution}"
            )));
        }
        let expected = dims.iter().product::<usize>();
        if expected == 0 || data.len() != expected {
            return Err(NeuralSvrError::data(format!(
                "volume {dims:?} needs {expected} voxels, got {}",
                data.len()
            )));
        }
        Ok(Self {
            dims,
            resolution,
            origin,
            data,
            mask: None,
        })
    }

    /// Evaluate `f` at every voxel centre.
    pub fn from_fn(
        dims: [usize; 3],
        resolution: f32,
        origin: Point3,
        f: impl Fn(Point3) -> f32,
    ) -> Result<Self> {
        let mut data = Vec::with_capacity(dims.iter().product());
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    let p = origin
                        + Point3::new(i as f32, j as f32, k as f32) * resolution;
                    data.push(f(p));
                }
            }
        }
        Self::new(dims, resolution, origin, data)
    }

    /// Grid shape and origin covering `bounds` at `resolution`, centred on
    /// the box.
    pub fn grid_for(bounds: &Aabb, resolution: f32) -> ([usize; 3], Point3) {
        let extent = bounds.extent().to_array();
        let mut dims = [1usize; 3];
        let mut origin = [0.0f32; 3];
        let centre = bounds.center().to_array();
        for axis in 0..3 {
            dims[axis] = (extent[axis] / resolution).ceil().max(0.0) as usize + 1;
            origin[axis] = centre[axis] - (dims[axis] - 1) as f32 * resolution * 0.5;
        }
        (dims, Point3::from(origin))
    }

    /// Attach a voxel mask.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Result<Self> {
        if mask.len() != self.data.len() {
            return Err(NeuralSvrError::data(format!(
                "mask has {} voxels, volume has {}",
                mask.len(),
                self.data.len()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    /// Grid shape.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Voxel size (mm).
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// World position of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> Point3 {
        self.origin
    }

    /// Voxel values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable voxel values.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Voxel mask, if any.
    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed volume.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear index of voxel `(i, j, k)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Value of voxel `(i, j, k)`.
    pub fn get(&self, i: usize, j: usize, k: usize) -> f32 {
        self.data[self.index(i, j, k)]
    }

    /// World position of voxel `(i, j, k)`.
    pub fn position(&self, i: usize, j: usize, k: usize) -> Point3 {
        self.origin + Point3::new(i as f32, j as f32, k as f32) * self.resolution
    }

    /// World positions of every voxel, in storage order.
    pub fn positions(&self) -> Vec<Point3> {
        let mut out = Vec::with_capacity(self.len());
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    out.push(self.position(i, j, k));
                }
            }
        }
        out
    }

    /// Whether voxel `index` is inside the mask (every voxel when unmasked).
    pub fn in_mask(&self, index: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m[index])
    }

    /// Trilinear value at a world point, `None` outside the grid.
    pub fn interpolate(&self, p: Point3) -> Option<f32> {
        let local = ((p - self.origin) * (1.0 / self.resolution)).to_array();
        let mut base = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for axis in 0..3 {
            let max = (self.dims[axis] - 1) as f32;
            if !(local[axis] >= 0.0 && local[axis] <= max) {
                return None;
            }
            // Points on the upper face use the last cell.
            let cell = local[axis].floor().min((max - 1.0).max(0.0));
            base[axis] = cell as usize;
            frac[axis] = local[axis] - cell;
        }
        let mut values = [0.0f32; 8];
        for (v, offset) in values.iter_mut().zip(CORNER_OFFSETS.iter()) {
            let idx = [
                (base[0] + offset[0] as usize).min(self.dims[0] - 1),
                (base[1] + offset[1] as usize).min(self.dims[1] - 1),
                (base[2] + offset[2] as usize).min(self.dims[2] - 1),
            ];
            *v = self.get(idx[0], idx[1], idx[2]);
        }
        Some(trilinear_interpolate(&values, frac))
    }

    /// Mean value over the masked voxels.
    pub fn mean_in_mask(&self) -> f32 {
        let (sum, count) = self
            .data
            .iter()
            .enumerate()
            .filter(|(i, _)| self.in_mask(*i))
            .fold((0.0f64, 0usize), |(s, c), (_, &v)| (s + v as f64, c + 1));
        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_linear_field() {
        let f = |p: Point3| 2.0 * p.x - p.y + 0.5 * p.z + 1.0;
        let volume = Volume::from_fn([5, 4, 3], 0.5, Point3::new(-1.0, 0.0, 2.0), f).unwrap();
        assert_eq!(volume.len(), 60);
        assert_eq!(volume.get(1, 2, 0), f(Point3::new(-0.5, 1.0, 2.0)));

        for p in [
            Point3::new(-0.8, 0.3, 2.2),
            Point3::new(0.99, 1.49, 2.99),
            Point3::new(1.0, 1.5, 3.0),
        ] {
            let v = volume.interpolate(p).unwrap();
            assert!((v - f(p)).abs() < 1e-4, "{v} vs {}", f(p));
        }
        assert!(volume.interpolate(Point3::new(1.1, 0.0, 2.0)).is_none());
    }

    #[test]
    fn test_grid_covers_bounds() {
        let bounds = Aabb::new(Point3::splat(-3.0), Point3::new(3.0, 2.0, 1.0));
        let (dims, origin) = Volume::grid_for(&bounds, 0.8);
        assert_eq!(dims, [9, 8, 6]);
        for axis in 0..3 {
            let last = origin.to_array()[axis] + (dims[axis] - 1) as f32 * 0.8;
            assert!(origin.to_array()[axis] <= bounds.min.to_array()[axis] + 1e-5);
            assert!(last >= bounds.max.to_array()[axis] - 1e-5);
        }
    }

    #[test]
    fn test_mask_restricts_mean() {
        let volume = Volume::new([2, 1, 1], 1.0, Point3::splat(0.0), vec![2.0, 6.0])
            .unwrap()
            .with_mask(vec![false, true])
            .unwrap();
        assert_eq!(volume.mean_in_mask(), 6.0);
        assert!(volume.with_mask(vec![true]).is_err());
        assert!(Volume::new([2, 2, 1], 1.0, Point3::splat(0.0), vec![0.0; 3]).is_err());
    }
}
