//! Hash-grid encoder configuration.

use burn::config::Config;
use svr_core::{level_count, Aabb, CoreError, HashGridLayout};

/// Configuration for a multi-resolution hash-grid encoder.
///
/// Resolutions are cell sizes in millimetres: level 0 uses
/// `coarsest_resolution` and every following level divides it by
/// `level_scale` until `finest_resolution` is reached.
#[derive(Config, Debug)]
pub struct HashEncoderConfig {
    /// Feature length stored per level.
    #[config(default = 2)]
    pub n_features_per_level: usize,

    /// Maximum table rows per level is `2^log2_hashmap_size`.
    #[config(default = 19)]
    pub log2_hashmap_size: u32,

    /// Growth factor of the grid resolution between levels.
    #[config(default = 1.3819)]
    pub level_scale: f32,

    /// Cell size of the coarsest level (mm).
    #[config(default = 16.0)]
    pub coarsest_resolution: f32,

    /// Cell size of the finest level (mm).
    #[config(default = 0.5)]
    pub finest_resolution: f32,
}

impl Default for HashEncoderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEncoderConfig {
    /// Number of levels between the coarsest and finest resolution.
    pub fn n_levels(&self) -> usize {
        level_count(
            self.coarsest_resolution,
            self.finest_resolution,
            self.level_scale,
        )
    }

    /// Length of the concatenated feature vector.
    #[inline]
    pub fn output_dim(&self) -> usize {
        self.n_levels() * self.n_features_per_level
    }

    /// Level geometry over a world bounding box.
    pub fn layout(&self, bounds: Aabb) -> Result<HashGridLayout, CoreError> {
        HashGridLayout::new(
            bounds,
            self.coarsest_resolution,
            self.finest_resolution,
            self.level_scale,
            self.log2_hashmap_size,
        )
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.n_features_per_level == 0 {
            return Err("n_features_per_level must be positive".to_string());
        }
        if !(4..=30).contains(&self.log2_hashmap_size) {
            return Err(format!(
                "log2_hashmap_size must be within [4, 30], got {}",
                self.log2_hashmap_size
            ));
        }
        if !self.finest_resolution.is_finite() || self.finest_resolution <= 0.0 {
            return Err("finest_resolution must be positive".to_string());
        }
        if !self.coarsest_resolution.is_finite() || self.coarsest_resolution < self.finest_resolution
        {
            return Err("coarsest_resolution must be at least finest_resolution".to_string());
        }
        if !self.level_scale.is_finite() || self.level_scale <= 1.0 {
            return Err("level_scale must be greater than 1".to_string());
        }
        Ok(())
    }
}
