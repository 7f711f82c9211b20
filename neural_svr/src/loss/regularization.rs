//! Regularisation terms.

use burn::prelude::*;

use crate::config::ImageRegularization;

/// Added to the squared gradient magnitude before the square root.
const GRADIENT_EPS: f32 = 1e-12;

/// Penalty on the spatial gradient of the density.
///
/// The variant is fixed at configuration time; every variant maps a squared
/// gradient magnitude `g²` to a per-point penalty.
#[derive(Debug, Clone, Copy)]
pub struct ImageRegularizer {
    kind: ImageRegularization,
    delta: f32,
}

impl ImageRegularizer {
    /// Create a regulariser. `delta` is only read by the edge variant.
    pub fn new(kind: ImageRegularization, delta: f32) -> Self {
        Self { kind, delta }
    }

    /// Selected variant.
    pub fn kind(&self) -> ImageRegularization {
        self.kind
    }

    /// Per-point penalty of squared gradient magnitudes.
    ///
    /// - TV: `g`
    /// - L2: `g²`
    /// - Edge: `δ² g² / (g² + δ²)`, quadratic for `g ≪ δ`, tending to `δ²`
    ///   for `g ≫ δ`
    pub fn penalty<B: Backend>(&self, magnitude_sq: Tensor<B, 1>) -> Tensor<B, 1> {
        match self.kind {
            ImageRegularization::Tv => magnitude_sq.add_scalar(GRADIENT_EPS).sqrt(),
            ImageRegularization::L2 => magnitude_sq,
            ImageRegularization::Edge => {
                let d2 = self.delta * self.delta;
                magnitude_sq.clone().mul_scalar(d2) / magnitude_sq.add_scalar(d2)
            }
        }
    }
}

/// Squared magnitude of the forward-difference gradient of `field`.
///
/// `field` is evaluated once on the stacked points `[x, x + h e_x, x + h e_y,
/// x + h e_z]`.
///
/// Input shape: [n, 3]
/// Output shape: [n]
pub fn finite_difference_gradient_sq<B, F>(field: F, points: Tensor<B, 2>, step: f32) -> Tensor<B, 1>
where
    B: Backend,
    F: FnOnce(Tensor<B, 2>) -> Tensor<B, 1>,
{
    let device = points.device();
    let [n, _] = points.dims();
    let mut stacked = vec![points.clone()];
    for axis in 0..3 {
        let mut offset = [0.0f32; 3];
        offset[axis] = step;
        let offset = Tensor::<B, 2>::from_data(TensorData::new(offset.to_vec(), [1, 3]), &device);
        stacked.push(points.clone() + offset);
    }
    let values = field(Tensor::cat(stacked, 0)).reshape([4, n]);
    let centre = values.clone().slice([0..1, 0..n]);
    let diffs = (values.slice([1..4, 0..n]) - centre).div_scalar(step);
    diffs.powf_scalar(2.0).sum_dim(0).reshape([n])
}
