//! Loss, optimisation and top-level reconstruction configuration.

use burn::config::Config;
use svr_core::MilestoneSchedule;

use super::{
    BiasFieldConfig, DeformationConfig, HashEncoderConfig, ImplicitNetworkConfig, Precision,
    SliceModelConfig,
};
use crate::error::NeuralSvrError;

/// Penalty applied to the spatial gradient of the reconstructed density.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum ImageRegularization {
    /// Total variation: L1 of the gradient magnitude.
    Tv,
    /// Edge preserving: quadratic below `delta`, saturating above.
    Edge,
    /// Squared gradient magnitude.
    L2,
}

impl ImageRegularization {
    /// Parse a selector (`"TV"`, `"edge"` or `"L2"`, case-insensitive).
    pub fn parse(name: &str) -> crate::error::Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tv" => Ok(Self::Tv),
            "edge" => Ok(Self::Edge),
            "l2" => Ok(Self::L2),
            _ => Err(NeuralSvrError::config(format!(
                "unsupported image regularization '{name}', expected TV, edge or L2"
            ))),
        }
    }
}

/// Weights of the loss terms. All weights are fixed for the run.
#[derive(Config, Debug)]
pub struct LossConfig {
    /// Weight of the deviation of slice poses from their initial values.
    #[config(default = 0.1)]
    pub weight_transformation: f32,

    /// Weight of the log-bias magnitude penalty.
    #[config(default = 100.0)]
    pub weight_bias: f32,

    /// Image regulariser applied to the density gradient.
    #[config(default = "ImageRegularization::Edge")]
    pub image_regularization: ImageRegularization,

    /// Weight of the image regulariser.
    #[config(default = 2.0)]
    pub weight_image: f32,

    /// Weight of the deformation smoothness penalty.
    #[config(default = 0.0)]
    pub weight_deform: f32,

    /// Edge threshold of [`ImageRegularization::Edge`].
    #[config(default = 0.2)]
    pub delta: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LossConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let weights = [
            ("weight_transformation", self.weight_transformation),
            ("weight_bias", self.weight_bias),
            ("weight_image", self.weight_image),
            ("weight_deform", self.weight_deform),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{name} must be finite and non-negative, got {w}"));
            }
        }
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(format!("delta must be positive, got {}", self.delta));
        }
        Ok(())
    }
}

/// Optimiser and sampling configuration.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Initial learning rate.
    #[config(default = 5e-3)]
    pub learning_rate: f64,

    /// Decay factor applied at each milestone.
    #[config(default = 0.33)]
    pub gamma: f64,

    /// Milestones as strictly increasing fractions of `n_iter`.
    #[config(default = "vec![0.5, 0.75, 0.9]")]
    pub milestones: Vec<f64>,

    /// Total number of iterations.
    #[config(default = 6000)]
    pub n_iter: usize,

    /// Pixels per batch.
    #[config(default = 4096)]
    pub batch_size: usize,

    /// PSF samples per pixel during training.
    #[config(default = 256)]
    pub n_samples: usize,

    /// Seed for initialisation, batch sampling and PSF sampling.
    pub seed: Option<u64>,

    /// Iterations between progress log lines.
    #[config(default = 100)]
    pub log_interval: usize,

    /// Memory budget for the pre-flight estimate, in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingConfig {
    /// The learning-rate schedule.
    pub fn schedule(&self) -> crate::error::Result<MilestoneSchedule> {
        Ok(MilestoneSchedule::new(
            self.learning_rate,
            self.gamma,
            &self.milestones,
            self.n_iter,
        )?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if self.n_samples == 0 {
            return Err("n_samples must be positive".to_string());
        }
        self.schedule().map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Complete configuration of a reconstruction.
#[derive(Config, Debug)]
pub struct ReconstructionConfig {
    /// Main hash-grid encoder.
    #[config(default = "HashEncoderConfig::new()")]
    pub encoder: HashEncoderConfig,

    /// Decoder heads.
    #[config(default = "ImplicitNetworkConfig::new()")]
    pub network: ImplicitNetworkConfig,

    /// Per-slice parameters.
    #[config(default = "SliceModelConfig::new()")]
    pub slices: SliceModelConfig,

    /// Bias field; disabled when `None`.
    pub bias: Option<BiasFieldConfig>,

    /// Deformation field; disabled when `None`.
    pub deformation: Option<DeformationConfig>,

    /// Loss weights.
    #[config(default = "LossConfig::new()")]
    pub loss: LossConfig,

    /// Optimiser settings.
    #[config(default = "TrainingConfig::new()")]
    pub training: TrainingConfig,

    /// Precision of the encoder/decoder path.
    #[config(default = "Precision::Half")]
    pub precision: Precision,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconstructionConfig {
    /// A small configuration for quick runs: coarse grid, short schedule,
    /// full precision.
    pub fn fast() -> Self {
        Self::new()
            .with_encoder(
                HashEncoderConfig::new()
                    .with_coarsest_resolution(8.0)
                    .with_finest_resolution(2.0)
                    .with_level_scale(2.0)
                    .with_log2_hashmap_size(12),
            )
            .with_network(ImplicitNetworkConfig::new().with_width(32).with_n_features_slice(8))
            .with_training(
                TrainingConfig::new()
                    .with_n_iter(200)
                    .with_batch_size(256)
                    .with_n_samples(8)
                    .with_learning_rate(5e-3),
            )
            .with_precision(Precision::Single)
    }

    /// Validate every sub-configuration.
    ///
    /// Fails with [`NeuralSvrError::Configuration`] before any tensor is
    /// allocated.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.encoder.validate().map_err(NeuralSvrError::config)?;
        self.network.validate().map_err(NeuralSvrError::config)?;
        if let Some(bias) = &self.bias {
            bias.validate(self.encoder.n_levels())
                .map_err(NeuralSvrError::config)?;
        }
        if let Some(deformation) = &self.deformation {
            deformation.validate().map_err(NeuralSvrError::config)?;
        }
        self.loss.validate().map_err(NeuralSvrError::config)?;
        self.training.validate().map_err(NeuralSvrError::config)?;
        Ok(())
    }

    /// Number of encoder levels feeding the density decoder.
    pub fn density_levels(&self) -> usize {
        let reserved = self.bias.as_ref().map_or(0, |b| b.n_levels);
        self.encoder.n_levels().saturating_sub(reserved)
    }
}
