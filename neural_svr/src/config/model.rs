//! Model architecture configuration.

use burn::config::Config;

/// Configuration of the density decoder and the slice-conditioned heads.
#[derive(Config, Debug)]
pub struct ImplicitNetworkConfig {
    /// Hidden layers of every decoder head.
    #[config(default = 1)]
    pub depth: usize,

    /// Hidden width of every decoder head.
    #[config(default = 64)]
    pub width: usize,

    /// Length of the intermediate feature `z` emitted next to the density.
    #[config(default = 15)]
    pub n_features_z: usize,

    /// Length of the learned per-slice embedding `e`.
    #[config(default = 16)]
    pub n_features_slice: usize,
}

impl Default for ImplicitNetworkConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ImplicitNetworkConfig {
    /// Hidden layer sizes for an MLP head.
    pub fn hidden_dims(&self) -> Vec<usize> {
        vec![self.width; self.depth]
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 {
            return Err("network width must be positive".to_string());
        }
        if self.n_features_z == 0 {
            return Err("n_features_z must be positive".to_string());
        }
        if self.n_features_slice == 0 {
            return Err("n_features_slice must be positive".to_string());
        }
        Ok(())
    }
}

/// Which per-slice parameters are learned.
#[derive(Config, Debug)]
pub struct SliceModelConfig {
    /// Optimise the rigid pose of each slice. When false the initial
    /// transforms are constants.
    #[config(default = true)]
    pub optimize_transformation: bool,

    /// Learn a multiplicative intensity scale per slice.
    #[config(default = true)]
    pub slice_scale: bool,

    /// Predict a per-pixel variance from `[z, e]`.
    #[config(default = true)]
    pub pixel_variance: bool,

    /// Learn a variance scalar per slice.
    #[config(default = true)]
    pub slice_variance: bool,
}

impl Default for SliceModelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SliceModelConfig {
    /// True when the data term is variance weighted.
    pub fn uses_variance(&self) -> bool {
        self.pixel_variance || self.slice_variance
    }

    /// Whether any per-slice embedding is consumed by a head.
    pub fn needs_embedding(&self, bias: bool) -> bool {
        self.pixel_variance || bias
    }
}

/// Low-resolution multiplicative bias field.
///
/// The field reads the coarsest `n_levels` levels of the main encoder, which
/// are then no longer fed to the density decoder.
#[derive(Config, Debug)]
pub struct BiasFieldConfig {
    /// Number of coarse encoder levels reserved for the bias path.
    pub n_levels: usize,

    /// Hidden width of the bias head.
    #[config(default = 64)]
    pub width: usize,

    /// Hidden layers of the bias head.
    #[config(default = 1)]
    pub depth: usize,
}

impl BiasFieldConfig {
    /// Validate against the number of encoder levels.
    pub fn validate(&self, encoder_levels: usize) -> Result<(), String> {
        if self.n_levels == 0 {
            return Err("bias n_levels must be at least 1".to_string());
        }
        if self.n_levels >= encoder_levels {
            return Err(format!(
                "bias n_levels ({}) must leave at least one of the {} encoder levels for density",
                self.n_levels, encoder_levels
            ));
        }
        if self.width == 0 {
            return Err("bias width must be positive".to_string());
        }
        Ok(())
    }
}

/// Non-rigid deformation field.
#[derive(Config, Debug)]
pub struct DeformationConfig {
    /// Length of the per-slice deformation embedding.
    #[config(default = 8)]
    pub n_features_deform: usize,

    /// Feature length per level of the deformation encoder.
    #[config(default = 4)]
    pub n_features_per_level: usize,

    /// Growth factor between deformation encoder levels.
    #[config(default = 1.3819)]
    pub level_scale: f32,

    /// Coarsest cell size (mm).
    #[config(default = 32.0)]
    pub coarsest_resolution: f32,

    /// Finest cell size (mm).
    #[config(default = 8.0)]
    pub finest_resolution: f32,

    /// Table size exponent of the deformation encoder.
    #[config(default = 19)]
    pub log2_hashmap_size: u32,

    /// Hidden width of the displacement head.
    #[config(default = 64)]
    pub width: usize,

    /// Hidden layers of the displacement head.
    #[config(default = 1)]
    pub depth: usize,
}

impl Default for DeformationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeformationConfig {
    /// The encoder configuration for the deformation grid.
    pub fn encoder(&self) -> super::HashEncoderConfig {
        super::HashEncoderConfig::new()
            .with_n_features_per_level(self.n_features_per_level)
            .with_log2_hashmap_size(self.log2_hashmap_size)
            .with_level_scale(self.level_scale)
            .with_coarsest_resolution(self.coarsest_resolution)
            .with_finest_resolution(self.finest_resolution)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.encoder()
            .validate()
            .map_err(|e| format!("deformation: {e}"))?;
        if self.n_features_deform == 0 {
            return Err("n_features_deform must be positive".to_string());
        }
        if self.width == 0 {
            return Err("deformation width must be positive".to_string());
        }
        Ok(())
    }
}

/// Arithmetic precision of the encoder/decoder path.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Features and decoder outputs are rounded to float16.
    Half,
    /// Full float32 everywhere.
    Single,
}
