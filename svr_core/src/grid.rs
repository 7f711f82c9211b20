//! Multi-resolution hash-grid layout.
//!
//! Level `l` has a cell size of `max(coarsest / scale^l, finest)` millimetres
//! over a fixed world bounding box. Each level owns a slice of one shared
//! feature table; `offset` locates it. Levels whose dense corner count fits
//! in `2^log2_hashmap_size` are indexed densely, the rest are hashed.

use crate::alloc_prelude::Vec;
use crate::error::CoreError;
use crate::hash::{dense_index, spatial_hash};
use crate::interpolation::CORNER_OFFSETS;
use crate::types::{Aabb, Point3};

/// Number of levels between `coarsest` and `finest` for a growth factor.
pub fn level_count(coarsest: f32, finest: f32, level_scale: f32) -> usize {
    if coarsest <= finest {
        return 1;
    }
    let steps = libm::logf(coarsest / finest) / libm::logf(level_scale);
    libm::ceilf(steps - 1e-6) as usize + 1
}

/// Geometry of one grid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLevel {
    /// Cell size in millimetres.
    pub resolution: f32,
    /// Number of grid corners per axis.
    pub dims: [u32; 3],
    /// Number of table rows owned by this level.
    pub table_size: usize,
    /// First row of this level in the shared table.
    pub offset: usize,
    /// Whether corners map one-to-one onto rows.
    pub dense: bool,
}

/// Layout of every level of a hash grid over a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct HashGridLayout {
    bounds: Aabb,
    levels: Vec<GridLevel>,
}

impl HashGridLayout {
    /// Build the level table.
    pub fn new(
        bounds: Aabb,
        coarsest: f32,
        finest: f32,
        level_scale: f32,
        log2_hashmap_size: u32,
    ) -> Result<Self, CoreError> {
        if bounds.is_empty() || !bounds.min.is_finite() || !bounds.max.is_finite() {
            return Err(CoreError::InvalidParameter {
                name: "bounds",
                value: f64::NAN,
            });
        }
        positive("finest_resolution", finest)?;
        positive("coarsest_resolution", coarsest)?;
        if coarsest < finest {
            return Err(CoreError::InvalidParameter {
                name: "coarsest_resolution",
                value: coarsest as f64,
            });
        }
        if !level_scale.is_finite() || level_scale <= 1.0 {
            return Err(CoreError::InvalidParameter {
                name: "level_scale",
                value: level_scale as f64,
            });
        }
        if !(1..=30).contains(&log2_hashmap_size) {
            return Err(CoreError::InvalidParameter {
                name: "log2_hashmap_size",
                value: log2_hashmap_size as f64,
            });
        }

        let capacity = 1u64 << log2_hashmap_size;
        let extent = bounds.extent();
        let n_levels = level_count(coarsest, finest, level_scale);

        let mut levels = Vec::with_capacity(n_levels);
        let mut offset = 0usize;
        for l in 0..n_levels {
            let resolution = (coarsest / libm::powf(level_scale, l as f32)).max(finest);
            let mut dims = [0u32; 3];
            for (axis, d) in dims.iter_mut().enumerate() {
                *d = (libm::ceilf(extent[axis] / resolution) as u32 + 1).max(2);
            }
            let dense_size = dims.iter().map(|&d| d as u64).product::<u64>();
            let dense = dense_size <= capacity;
            let table_size = dense_size.min(capacity) as usize;
            levels.push(GridLevel {
                resolution,
                dims,
                table_size,
                offset,
                dense,
            });
            offset += table_size;
        }

        Ok(Self { bounds, levels })
    }

    /// The world box covered by the grid.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// All levels, coarsest first.
    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    /// Number of levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Total rows of the shared feature table.
    pub fn total_entries(&self) -> usize {
        self.levels.iter().map(|l| l.table_size).sum()
    }

    /// Continuous grid coordinate of `p` at `level`, clamped to the grid.
    pub fn scaled(&self, level: usize, p: Point3) -> [f32; 3] {
        let lv = &self.levels[level];
        let local = p - self.bounds.min;
        let mut out = [0.0f32; 3];
        for (axis, o) in out.iter_mut().enumerate() {
            let max = (lv.dims[axis] - 1) as f32;
            *o = (local[axis] / lv.resolution).clamp(0.0, max);
        }
        out
    }

    /// Lower corner of the cell containing `p` at `level`.
    pub fn cell(&self, level: usize, p: Point3) -> [u32; 3] {
        let lv = &self.levels[level];
        let s = self.scaled(level, p);
        let mut base = [0u32; 3];
        for axis in 0..3 {
            base[axis] = (libm::floorf(s[axis]) as u32).min(lv.dims[axis] - 2);
        }
        base
    }

    /// Table row of a corner at `level`.
    #[inline]
    pub fn corner_index(&self, level: usize, corner: [u32; 3]) -> usize {
        let lv = &self.levels[level];
        let local = if lv.dense {
            dense_index(corner, lv.dims)
        } else {
            spatial_hash(corner, lv.table_size)
        };
        lv.offset + local
    }

    /// Table rows of the eight corners around `p`, plus the lower corner.
    pub fn corner_indices(&self, level: usize, p: Point3) -> ([usize; 8], [u32; 3]) {
        let base = self.cell(level, p);
        let mut rows = [0usize; 8];
        for (row, offset) in rows.iter_mut().zip(CORNER_OFFSETS.iter()) {
            let corner = [base[0] + offset[0], base[1] + offset[1], base[2] + offset[2]];
            *row = self.corner_index(level, corner);
        }
        (rows, base)
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), CoreError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidResolution { name, value })
    }
}
