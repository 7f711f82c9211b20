//! Monte-Carlo PSF rendering of slice pixels.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use svr_core::{PsfSigma, RigidTransform};

use super::transform_points;
use crate::model::NesvorModel;

/// Pixels to render: slice index, slice-local centre and PSF footprint.
#[derive(Debug, Clone, Default)]
pub struct RenderQuery {
    slice_ids: Vec<i64>,
    centres: Vec<[f32; 3]>,
    sigmas: Vec<PsfSigma>,
}

impl RenderQuery {
    /// An empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty query with room for `n` pixels.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            slice_ids: Vec::with_capacity(n),
            centres: Vec::with_capacity(n),
            sigmas: Vec::with_capacity(n),
        }
    }

    /// Add one pixel.
    pub fn push(&mut self, slice: usize, centre: [f32; 3], sigma: PsfSigma) {
        self.slice_ids.push(slice as i64);
        self.centres.push(centre);
        self.sigmas.push(sigma);
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.slice_ids.len()
    }

    /// True when no pixel was added.
    pub fn is_empty(&self) -> bool {
        self.slice_ids.is_empty()
    }

    /// Slice index of every pixel.
    pub fn slice_ids(&self) -> &[i64] {
        &self.slice_ids
    }

    /// Pixels `range` of the query, keeping their slice indices.
    pub fn range(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            slice_ids: self.slice_ids[range.clone()].to_vec(),
            centres: self.centres[range.clone()].to_vec(),
            sigmas: self.sigmas[range].to_vec(),
        }
    }

    fn ids_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        Tensor::from_data(TensorData::new(self.slice_ids.clone(), [self.len()]), device)
    }

    fn centres_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        let flat: Vec<f32> = self.centres.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [self.len(), 1, 3]), device)
    }
}

/// Differentiable outputs of [`PsfRenderer::render`].
#[derive(Debug, Clone)]
pub struct RenderOutput<B: Backend> {
    /// Predicted pixel values `c_i · mean_s(b_s ρ_s)`: [n]
    pub value: Tensor<B, 1>,
    /// Mean predicted pixel variance over the samples: [n]
    pub pixel_variance: Option<Tensor<B, 1>>,
    /// Variance of each pixel's slice: [n]
    pub slice_variance: Option<Tensor<B, 1>>,
    /// Log bias at every sample: [n * n_samples]
    pub log_bias: Option<Tensor<B, 1>>,
    /// World positions of the pixel centres, without gradient: [n, 3]
    pub centres_world: Tensor<B, 2>,
    /// Slice index of every pixel: [n]
    pub slice_ids: Tensor<B, 1, Int>,
}

impl<B: Backend> RenderOutput<B> {
    /// Total variance of each pixel, when any variance is modelled.
    pub fn variance(&self) -> Option<Tensor<B, 1>> {
        match (&self.pixel_variance, &self.slice_variance) {
            (Some(p), Some(s)) => Some(p.clone() + s.clone()),
            (Some(v), None) | (None, Some(v)) => Some(v.clone()),
            (None, None) => None,
        }
    }
}

/// Renders pixels by averaging the volume over Gaussian PSF samples.
///
/// Samples are drawn from the PSF itself, so every sample carries weight
/// `1 / n_samples`. The random stream is owned by the renderer: a fixed seed
/// reproduces the same sample positions call for call.
#[derive(Debug, Clone)]
pub struct PsfRenderer {
    rng: StdRng,
    n_samples: usize,
}

impl PsfRenderer {
    /// Create a renderer; `seed = None` draws from OS entropy.
    pub fn new(n_samples: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            n_samples: n_samples.max(1),
        }
    }

    /// PSF samples per pixel.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Draw `n_samples` footprint offsets for each sigma.
    ///
    /// Output layout: `[sigmas.len(), n_samples, 3]`, flattened.
    pub fn sample_offsets(&mut self, sigmas: &[PsfSigma]) -> Vec<f32> {
        let mut out = Vec::with_capacity(sigmas.len() * self.n_samples * 3);
        for sigma in sigmas {
            for _ in 0..self.n_samples {
                let standard = [
                    self.rng.sample::<f32, _>(StandardNormal),
                    self.rng.sample::<f32, _>(StandardNormal),
                    self.rng.sample::<f32, _>(StandardNormal),
                ];
                out.extend_from_slice(&sigma.scale(standard));
            }
        }
        out
    }

    /// Slice-local sample positions: [n, n_samples, 3]
    fn local_samples<B: Backend>(&mut self, query: &RenderQuery, device: &B::Device) -> Tensor<B, 3> {
        let s = self.n_samples;
        let mut samples = self.sample_offsets(&query.sigmas);
        for (i, centre) in query.centres.iter().enumerate() {
            for chunk in samples[i * s * 3..(i + 1) * s * 3].chunks_exact_mut(3) {
                chunk[0] += centre[0];
                chunk[1] += centre[1];
                chunk[2] += centre[2];
            }
        }
        Tensor::from_data(TensorData::new(samples, [query.len(), s, 3]), device)
    }

    /// Render the query through the model's learned poses and slice terms.
    ///
    /// Gradients flow from the rendered values to the poses, the scales, the
    /// slice embeddings and every network weight.
    pub fn render<B: Backend>(
        &mut self,
        model: &NesvorModel<B>,
        query: &RenderQuery,
        device: &B::Device,
    ) -> RenderOutput<B> {
        let n = query.len();
        let s = self.n_samples;
        let ids = query.ids_tensor::<B>(device);
        let pose = model.slices().pose_of(ids.clone());

        let local = self.local_samples::<B>(query, device);
        let world = transform_points(pose.clone(), local).reshape([n * s, 3]);
        let sample_ids: Vec<i64> = query
            .slice_ids
            .iter()
            .flat_map(|&id| std::iter::repeat(id).take(s))
            .collect();
        let sample_ids = Tensor::<B, 1, Int>::from_data(TensorData::new(sample_ids, [n * s]), device);

        let out = model.forward_samples(world, Some(sample_ids));
        let density = out.density.reshape([n, s]);
        let weighted = match &out.log_bias {
            Some(log_bias) => density * log_bias.clone().exp().reshape([n, s]),
            None => density,
        };
        let value = weighted.mean_dim(1).reshape([n]) * model.slices().scale_of(ids.clone());

        let pixel_variance = out
            .log_variance
            .map(|lv| lv.exp().reshape([n, s]).mean_dim(1).reshape([n]));
        let slice_variance = model.slices().variance_of(ids.clone());

        let centres_world =
            transform_points(pose.detach(), query.centres_tensor::<B>(device)).reshape([n, 3]);

        RenderOutput {
            value,
            pixel_variance,
            slice_variance,
            log_bias: out.log_bias,
            centres_world,
            slice_ids: ids,
        }
    }

    /// Render the volume alone through explicit poses.
    ///
    /// `poses[k]` places slice `k` of the query. No slice-specific term is
    /// applied: this is the PSF-blurred density.
    pub fn render_density<B: Backend>(
        &mut self,
        model: &NesvorModel<B>,
        poses: &[RigidTransform],
        query: &RenderQuery,
        device: &B::Device,
    ) -> Tensor<B, 1> {
        let n = query.len();
        let s = self.n_samples;
        let params: Vec<f32> = poses.iter().flat_map(|p| p.to_params()).collect();
        let pose = Tensor::<B, 2>::from_data(TensorData::new(params, [poses.len(), 6]), device)
            .select(0, query.ids_tensor::<B>(device));

        let local = self.local_samples::<B>(query, device);
        let world = transform_points(pose, local).reshape([n * s, 3]);
        model
            .density(world)
            .reshape([n, s])
            .mean_dim(1)
            .reshape([n])
    }
}
