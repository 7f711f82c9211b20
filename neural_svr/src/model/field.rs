//! The complete learnable reconstruction model.

use burn::module::{Ignored, Module};
use burn::prelude::*;
use rand::Rng;

use svr_core::{Aabb, RigidTransform};

use super::SliceParameters;
use crate::config::{Precision, ReconstructionConfig};
use crate::error::Result;
use crate::nn::{softplus, DeformationField, HashEncoder, Mlp, MlpConfig};

/// Per-sample outputs of [`NesvorModel::forward_samples`].
#[derive(Debug, Clone)]
pub struct SampleOutput<B: Backend> {
    /// Density at each sample: [num_samples]
    pub density: Tensor<B, 1>,
    /// Log pixel variance at each sample: [num_samples]
    pub log_variance: Option<Tensor<B, 1>>,
    /// Log bias at each sample: [num_samples]
    pub log_bias: Option<Tensor<B, 1>>,
}

/// Implicit volume, auxiliary fields and slice parameters as one module.
///
/// - the hash encoder feeds its fine levels to `density_net`, which emits
///   `[raw density, z]`
/// - `variance_net` maps `[z, e]` to a log pixel variance
/// - `bias_net` maps the coarse encoder levels and `e` to a log bias
/// - `deformation` displaces points per slice before encoding
#[derive(Module, Debug)]
pub struct NesvorModel<B: Backend> {
    pub(crate) encoder: HashEncoder<B>,
    density_net: Mlp<B>,
    variance_net: Option<Mlp<B>>,
    bias_net: Option<Mlp<B>>,
    deformation: Option<DeformationField<B>>,
    pub(crate) slices: SliceParameters<B>,
    precision: Ignored<Precision>,
    n_bias_levels: usize,
    n_features_z: usize,
}

impl<B: Backend> NesvorModel<B> {
    /// Build a model over `bounds` for slices starting at `initial` poses.
    pub fn new<R: Rng>(
        config: &ReconstructionConfig,
        bounds: Aabb,
        initial: &[RigidTransform],
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let network = &config.network;
        let hidden = network.hidden_dims();
        let n_features = config.encoder.n_features_per_level;

        let encoder = HashEncoder::new(config.encoder.layout(bounds)?, n_features, rng, device);
        let n_bias_levels = config.bias.as_ref().map_or(0, |b| b.n_levels);
        let density_levels = encoder.n_levels() - n_bias_levels;

        let density_net = MlpConfig::new(density_levels * n_features, 1 + network.n_features_z)
            .with_hidden_dims(hidden.clone())
            .init(device);
        let variance_net = config.slices.pixel_variance.then(|| {
            MlpConfig::new(network.n_features_z + network.n_features_slice, 1)
                .with_hidden_dims(hidden)
                .init(device)
        });
        let bias_net = config.bias.as_ref().map(|bias| {
            MlpConfig::new(
                bias.n_levels * n_features + network.n_features_slice,
                1,
            )
            .with_hidden_dims(vec![bias.width; bias.depth])
            .with_zero_output(true)
            .init(device)
        });
        let deformation = match &config.deformation {
            Some(deform) => {
                let layout = deform.encoder().layout(bounds)?;
                Some(DeformationField::new(deform, layout, initial.len(), rng, device))
            }
            None => None,
        };
        let slices = SliceParameters::new(
            initial,
            network.n_features_slice,
            &config.slices,
            rng,
            device,
        );

        Ok(Self {
            encoder,
            density_net,
            variance_net,
            bias_net,
            deformation,
            slices,
            precision: Ignored(config.precision),
            n_bias_levels,
            n_features_z: network.n_features_z,
        })
    }

    /// Per-slice parameters.
    pub fn slices(&self) -> &SliceParameters<B> {
        &self.slices
    }

    /// The main encoder.
    pub fn encoder(&self) -> &HashEncoder<B> {
        &self.encoder
    }

    /// Whether a deformation field is present.
    pub fn has_deformation(&self) -> bool {
        self.deformation.is_some()
    }

    /// Whether a bias field is present.
    pub fn has_bias(&self) -> bool {
        self.bias_net.is_some()
    }

    /// Whether the pixel variance head is present.
    pub fn has_pixel_variance(&self) -> bool {
        self.variance_net.is_some()
    }

    /// Finest cell size of the main encoder (mm).
    pub fn finest_resolution(&self) -> f32 {
        self.encoder
            .layout()
            .levels()
            .last()
            .map_or(1.0, |level| level.resolution)
    }

    /// Decode density and `z` from level features.
    fn decode(&self, levels: Tensor<B, 3>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let [num_points, n_levels, _] = levels.dims();
        let features = crate::nn::select_levels(levels, self.n_bias_levels..n_levels);
        let features = self.precision.apply(features);
        let out = self.precision.apply(self.density_net.forward(features));
        let raw = out.clone().slice([0..num_points, 0..1]).reshape([num_points]);
        let z = out.slice([0..num_points, 1..1 + self.n_features_z]);
        (softplus(raw), z)
    }

    /// Density of the volume at world points, without slice-specific terms.
    ///
    /// Input shape: [num_points, 3]
    /// Output shape: [num_points]
    pub fn density(&self, points: Tensor<B, 2>) -> Tensor<B, 1> {
        self.decode(self.encoder.forward_levels(points)).0
    }

    /// Evaluate every per-sample quantity.
    ///
    /// With `slice_ids` the deformation, variance and bias heads of those
    /// slices are applied; without, only the density is produced.
    ///
    /// Input shapes: points [num_points, 3], slice_ids [num_points]
    pub fn forward_samples(
        &self,
        points: Tensor<B, 2>,
        slice_ids: Option<Tensor<B, 1, Int>>,
    ) -> SampleOutput<B> {
        let Some(ids) = slice_ids else {
            return SampleOutput {
                density: self.density(points),
                log_variance: None,
                log_bias: None,
            };
        };
        let [num_points, _] = points.dims();

        let points = match &self.deformation {
            Some(field) => field.warp(points, ids.clone()),
            None => points,
        };
        let levels = self.encoder.forward_levels(points);
        let (density, z) = self.decode(levels.clone());

        let needs_embedding = self.variance_net.is_some() || self.bias_net.is_some();
        let embedding = needs_embedding.then(|| self.slices.embedding_of(ids));

        let log_variance = match (&self.variance_net, &embedding) {
            (Some(net), Some(e)) => {
                let input = Tensor::cat(vec![z, e.clone()], 1);
                Some(self.precision.apply(net.forward(input)).reshape([num_points]))
            }
            _ => None,
        };
        let log_bias = match (&self.bias_net, &embedding) {
            (Some(net), Some(e)) => {
                let coarse = crate::nn::select_levels(levels, 0..self.n_bias_levels);
                let input = Tensor::cat(vec![self.precision.apply(coarse), e.clone()], 1);
                Some(self.precision.apply(net.forward(input)).reshape([num_points]))
            }
            _ => None,
        };

        SampleOutput {
            density,
            log_variance,
            log_bias,
        }
    }

    /// Squared Jacobian norm of the deformation at points, if enabled.
    pub fn deformation_jacobian(
        &self,
        points: Tensor<B, 2>,
        slice_ids: Tensor<B, 1, Int>,
        step: f32,
    ) -> Option<Tensor<B, 1>> {
        self.deformation
            .as_ref()
            .map(|field| field.jacobian_norm(points, slice_ids, step))
    }

    /// Total number of learnable scalars.
    pub fn parameter_count(&self) -> usize {
        self.num_params()
    }
}
