//! Per-slice motion and appearance parameters.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use rand::Rng;
use rand_distr::StandardNormal;

use svr_core::RigidTransform;

use crate::config::SliceModelConfig;
use crate::nn::to_host;

/// Learnable parameters of every slice, stored as one row per slice.
///
/// Slice `i` owns row `i` of each tensor; the optimiser addresses the rows
/// through the shared parameter tensors.
#[derive(Module, Debug)]
pub struct SliceParameters<B: Backend> {
    /// Rigid poses `[rx, ry, rz, tx, ty, tz]`: [n_slices, 6]
    pose: Param<Tensor<B, 2>>,
    /// Log intensity scale: [n_slices]
    log_scale: Param<Tensor<B, 1>>,
    /// Log slice variance: [n_slices]
    log_variance: Param<Tensor<B, 1>>,
    /// Slice embedding `e`: [n_slices, n_features_slice]
    embedding: Param<Tensor<B, 2>>,
    /// Poses at construction, the anchor of the transformation penalty.
    initial_pose: Ignored<Vec<[f32; 6]>>,
    optimize_pose: bool,
    scale_enabled: bool,
    variance_enabled: bool,
}

impl<B: Backend> SliceParameters<B> {
    /// Create parameters from the initial poses.
    pub fn new<R: Rng>(
        initial: &[RigidTransform],
        n_features_slice: usize,
        config: &SliceModelConfig,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let n = initial.len();
        let initial_pose: Vec<[f32; 6]> = initial.iter().map(|t| t.to_params()).collect();
        let flat: Vec<f32> = initial_pose.iter().flatten().copied().collect();
        let pose = Tensor::from_data(TensorData::new(flat, [n, 6]), device);

        let values: Vec<f32> = (0..n * n_features_slice)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        let embedding = Tensor::from_data(TensorData::new(values, [n, n_features_slice]), device);

        Self {
            pose: Param::from_tensor(pose),
            log_scale: Param::from_tensor(Tensor::zeros([n], device)),
            log_variance: Param::from_tensor(Tensor::zeros([n], device)),
            embedding: Param::from_tensor(embedding),
            initial_pose: Ignored(initial_pose),
            optimize_pose: config.optimize_transformation,
            scale_enabled: config.slice_scale,
            variance_enabled: config.slice_variance,
        }
    }

    /// Number of slices.
    pub fn len(&self) -> usize {
        self.initial_pose.len()
    }

    /// True when there are no slices.
    pub fn is_empty(&self) -> bool {
        self.initial_pose.is_empty()
    }

    /// Whether poses receive gradients.
    pub fn optimizes_pose(&self) -> bool {
        self.optimize_pose
    }

    /// All poses: [n_slices, 6]. Detached when pose optimisation is off.
    pub fn pose(&self) -> Tensor<B, 2> {
        let pose = self.pose.val();
        if self.optimize_pose {
            pose
        } else {
            pose.detach()
        }
    }

    /// Poses of the given slices: [n, 6]
    pub fn pose_of(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.pose().select(0, ids)
    }

    /// Poses at construction: [n_slices, 6]
    pub fn initial_pose(&self, device: &B::Device) -> Tensor<B, 2> {
        let flat: Vec<f32> = self.initial_pose.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [self.len(), 6]), device)
    }

    /// Intensity scale `exp(l_i - mean(l))` of the given slices, or 1 when
    /// scaling is disabled. The geometric mean over all slices is 1.
    pub fn scale_of(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [n] = ids.dims();
        if !self.scale_enabled {
            return Tensor::ones([n], &ids.device());
        }
        let log_scale = self.log_scale.val();
        let mean = log_scale.clone().mean();
        (log_scale - mean).exp().select(0, ids)
    }

    /// Slice variance `exp(v_i)` of the given slices, if enabled.
    pub fn variance_of(&self, ids: Tensor<B, 1, Int>) -> Option<Tensor<B, 1>> {
        self.variance_enabled
            .then(|| self.log_variance.val().exp().select(0, ids))
    }

    /// Slice embeddings of the given rows: [n, n_features_slice]
    pub fn embedding_of(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        self.embedding.val().select(0, ids)
    }

    /// Every slice embedding: [n_slices, n_features_slice]
    pub(crate) fn embeddings(&self) -> Tensor<B, 2> {
        self.embedding.val()
    }

    /// Mean squared deviation of the poses from their initial values.
    ///
    /// Exactly zero, without gradient, when poses are frozen.
    pub fn pose_deviation(&self) -> Tensor<B, 1> {
        let device = self.pose.device();
        if !self.optimize_pose {
            return Tensor::zeros([1], &device);
        }
        (self.pose.val() - self.initial_pose(&device))
            .powf_scalar(2.0)
            .mean()
    }

    /// Current poses as rigid transforms.
    pub fn transforms(&self) -> Vec<RigidTransform> {
        to_host(self.pose.val())
            .chunks_exact(6)
            .map(|p| RigidTransform::from_params([p[0], p[1], p[2], p[3], p[4], p[5]]))
            .collect()
    }

    /// Current intensity scale of every slice.
    pub fn scales(&self) -> Vec<f32> {
        let device = self.pose.device();
        let ids = Tensor::<B, 1, Int>::arange(0..self.len() as i64, &device);
        to_host(self.scale_of(ids))
    }

    /// Raw pose parameters, for bit-exact comparisons.
    pub fn pose_params(&self) -> Vec<f32> {
        to_host(self.pose.val())
    }
}
