//! Neural network building blocks.
//!
//! - [`Mlp`]: fully connected heads
//! - [`HashEncoder`]: multi-resolution hash-grid feature lookup
//! - [`DeformationField`]: per-slice displacement field
//! - [`Precision`](crate::config::Precision) emulation for the reduced-precision path

mod deformation;
mod hash_encoder;
mod mlp;
mod precision;

pub use deformation::DeformationField;
pub use hash_encoder::{select_levels, HashEncoder};
pub use mlp::{Mlp, MlpConfig};

use burn::prelude::*;

/// Numerically stable softplus, `relu(x) + ln(1 + e^{-|x|})`.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let tail = x.clone().abs().neg().exp().add_scalar(1.0).log();
    x.clamp_min(0.0) + tail
}

/// Copy a tensor to host memory as `f32`.
pub(crate) fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().iter::<f32>().collect()
}
