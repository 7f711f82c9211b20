//! Per-slice non-rigid deformation field.

use burn::module::{Module, Param};
use burn::prelude::*;
use rand::Rng;
use rand_distr::StandardNormal;

use super::{HashEncoder, Mlp, MlpConfig};
use crate::config::DeformationConfig;
use svr_core::HashGridLayout;

/// Displacement field `u(x, e_d)` added to world points before the density
/// is queried.
///
/// The output layer starts at zero, so a fresh field is the identity map.
#[derive(Module, Debug)]
pub struct DeformationField<B: Backend> {
    encoder: HashEncoder<B>,
    net: Mlp<B>,
    /// Per-slice deformation embedding: [n_slices, n_features_deform]
    embedding: Param<Tensor<B, 2>>,
}

impl<B: Backend> DeformationField<B> {
    /// Build the field for `n_slices` slices.
    pub fn new<R: Rng>(
        config: &DeformationConfig,
        layout: HashGridLayout,
        n_slices: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let encoder = HashEncoder::new(layout, config.n_features_per_level, rng, device);
        let net = MlpConfig::new(encoder.output_dim() + config.n_features_deform, 3)
            .with_hidden_dims(vec![config.width; config.depth])
            .with_zero_output(true)
            .init(device);
        let values: Vec<f32> = (0..n_slices * config.n_features_deform)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        let embedding = Tensor::from_data(
            TensorData::new(values, [n_slices, config.n_features_deform]),
            device,
        );

        Self {
            encoder,
            net,
            embedding: Param::from_tensor(embedding),
        }
    }

    /// Displacement at each point for its slice.
    ///
    /// Input shapes: points [num_points, 3], slice_ids [num_points]
    /// Output shape: [num_points, 3]
    pub fn forward(&self, points: Tensor<B, 2>, slice_ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let features = self.encoder.forward(points);
        let embedding = self.embedding.val().select(0, slice_ids);
        self.net.forward(Tensor::cat(vec![features, embedding], 1))
    }

    /// Deformed points `x + u(x)`.
    pub fn warp(&self, points: Tensor<B, 2>, slice_ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        points.clone() + self.forward(points, slice_ids)
    }

    /// Squared Frobenius norm of the finite-difference Jacobian of `u`.
    ///
    /// Output shape: [num_points]
    pub fn jacobian_norm(
        &self,
        points: Tensor<B, 2>,
        slice_ids: Tensor<B, 1, Int>,
        step: f32,
    ) -> Tensor<B, 1> {
        let device = points.device();
        let [num_points, _] = points.dims();

        // Evaluate u at x and x + h e_k in one pass.
        let mut shifted = vec![points.clone()];
        for axis in 0..3 {
            let mut offset = [0.0f32; 3];
            offset[axis] = step;
            let offset = Tensor::<B, 2>::from_data(TensorData::new(offset.to_vec(), [1, 3]), &device);
            shifted.push(points.clone() + offset);
        }
        let ids = slice_ids.repeat_dim(0, 4);
        let u = self
            .forward(Tensor::cat(shifted, 0), ids)
            .reshape([4, num_points, 3]);

        let centre = u.clone().slice([0..1, 0..num_points, 0..3]);
        let diffs = (u.slice([1..4, 0..num_points, 0..3]) - centre).div_scalar(step);
        diffs
            .powf_scalar(2.0)
            .sum_dim(2)
            .sum_dim(0)
            .reshape([num_points])
    }
}
