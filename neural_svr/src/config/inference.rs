//! Inference configuration.

use burn::config::Config;

/// Settings for sampling a trained model.
#[derive(Config, Debug)]
pub struct InferenceConfig {
    /// Isotropic voxel size of sampled volumes (mm).
    #[config(default = 0.8)]
    pub output_resolution: f32,

    /// Mean intensity of the sampled volume inside its mask.
    #[config(default = 700.0)]
    pub output_intensity_mean: f32,

    /// Points evaluated per forward pass.
    #[config(default = 32768)]
    pub inference_batch_size: usize,

    /// PSF samples per voxel or pixel.
    #[config(default = 512)]
    pub n_inference_samples: usize,

    /// Average PSF samples per voxel instead of querying voxel centres.
    #[config(default = true)]
    pub output_psf: bool,

    /// Seed for PSF sampling; stochastic when `None`.
    pub seed: Option<u64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.output_resolution.is_finite() || self.output_resolution <= 0.0 {
            return Err("output_resolution must be positive".to_string());
        }
        if !self.output_intensity_mean.is_finite() || self.output_intensity_mean <= 0.0 {
            return Err("output_intensity_mean must be positive".to_string());
        }
        if self.inference_batch_size == 0 {
            return Err("inference_batch_size must be positive".to_string());
        }
        if self.n_inference_samples == 0 {
            return Err("n_inference_samples must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InferenceConfig::new();
        assert_eq!(config.output_resolution, 0.8);
        assert_eq!(config.output_intensity_mean, 700.0);
        assert_eq!(config.n_inference_samples, 512);
        assert!(config.output_psf);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
        assert!(config.with_output_resolution(-1.0).validate().is_err());
    }
}
