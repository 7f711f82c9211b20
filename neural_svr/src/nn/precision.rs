//! Reduced-precision emulation for the encoder/decoder path.
//!
//! `Half` rounds values to the nearest float16 (11-bit significand, clamped
//! to the float16 range, subnormals below 2^-14) in the forward pass and
//! passes gradients straight through.

use burn::prelude::*;
use core::f32::consts::LN_2;

use crate::config::Precision;

/// Largest finite float16.
pub const HALF_MAX: f32 = 65504.0;

/// Exponent of the smallest normal float16.
const HALF_MIN_EXPONENT: f32 = -14.0;

/// Explicit significand bits of float16.
const HALF_MANTISSA_BITS: f32 = 10.0;

impl Precision {
    /// Apply the precision to a tensor of activations.
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Precision::Single => x,
            Precision::Half => {
                let exact = x.clone().detach();
                let rounded = round_to_half(exact.clone());
                x + (rounded - exact)
            }
        }
    }
}

/// Round every element to the nearest representable float16 value.
pub fn round_to_half<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let clamped = x.clamp(-HALF_MAX, HALF_MAX);
    let magnitude = clamped.clone().abs().clamp_min(HALF_MIN_EXPONENT.exp2());
    let exponent = magnitude
        .log()
        .div_scalar(LN_2)
        .floor()
        .clamp_min(HALF_MIN_EXPONENT);
    let step = exponent.sub_scalar(HALF_MANTISSA_BITS).mul_scalar(LN_2).exp();
    (clamped / step.clone()).round() * step
}
