//! Loss composition.
//!
//! The objective is the data term plus four weighted regularisers:
//! - transformation: drift of poses from their initial values
//! - bias: magnitude of the log bias field
//! - image: TV, edge or L2 penalty on the density gradient
//! - deformation: Jacobian norm of the displacement field
//!
//! Weights are fixed for the run. A term with zero weight, or whose feature
//! is disabled, is never evaluated: its value is exactly zero and it adds no
//! gradient.

mod data;
mod regularization;

pub use data::data_term;
pub use regularization::{finite_difference_gradient_sq, ImageRegularizer};

use burn::prelude::*;

use crate::config::LossConfig;
use crate::model::NesvorModel;
use crate::nn::to_host;
use crate::render::RenderOutput;

/// Per-term loss tensors of one step. Each has shape [1].
#[derive(Debug, Clone)]
pub struct LossOutput<B: Backend> {
    /// Sum of every term.
    pub total: Tensor<B, 1>,
    /// Data fidelity.
    pub data: Tensor<B, 1>,
    /// Weighted pose drift.
    pub transformation: Tensor<B, 1>,
    /// Weighted bias magnitude.
    pub bias: Tensor<B, 1>,
    /// Weighted image regulariser.
    pub image: Tensor<B, 1>,
    /// Weighted deformation regulariser.
    pub deformation: Tensor<B, 1>,
}

/// Host copy of a [`LossOutput`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    /// Total loss.
    pub total: f32,
    /// Data term.
    pub data: f32,
    /// Transformation term.
    pub transformation: f32,
    /// Bias term.
    pub bias: f32,
    /// Image term.
    pub image: f32,
    /// Deformation term.
    pub deformation: f32,
}

impl LossBreakdown {
    /// True when every term is finite.
    pub fn is_finite(&self) -> bool {
        [
            self.total,
            self.data,
            self.transformation,
            self.bias,
            self.image,
            self.deformation,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

impl<B: Backend> LossOutput<B> {
    /// Copy every term to the host.
    pub fn breakdown(&self) -> LossBreakdown {
        let scalar = |t: &Tensor<B, 1>| to_host(t.clone()).first().copied().unwrap_or(f32::NAN);
        LossBreakdown {
            total: scalar(&self.total),
            data: scalar(&self.data),
            transformation: scalar(&self.transformation),
            bias: scalar(&self.bias),
            image: scalar(&self.image),
            deformation: scalar(&self.deformation),
        }
    }
}

/// Combines the data term and the regularisers with fixed weights.
#[derive(Debug, Clone)]
pub struct ReconstructionLoss {
    config: LossConfig,
    image: ImageRegularizer,
}

impl ReconstructionLoss {
    /// Create the loss from its weights.
    pub fn new(config: LossConfig) -> Self {
        let image = ImageRegularizer::new(config.image_regularization, config.delta);
        Self { config, image }
    }

    /// Loss weights.
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Evaluate every term for one rendered batch.
    ///
    /// `observed` holds the target pixel values: [n]
    pub fn evaluate<B: Backend>(
        &self,
        model: &NesvorModel<B>,
        rendered: &RenderOutput<B>,
        observed: Tensor<B, 1>,
    ) -> LossOutput<B> {
        let device = observed.device();
        let zero = || Tensor::<B, 1>::zeros([1], &device);
        let weights = &self.config;

        let data = data_term(rendered.value.clone(), observed, rendered.variance());

        let transformation = if weights.weight_transformation > 0.0 && model.slices().optimizes_pose() {
            model
                .slices()
                .pose_deviation()
                .mul_scalar(weights.weight_transformation)
        } else {
            zero()
        };

        let bias = match &rendered.log_bias {
            Some(log_bias) if weights.weight_bias > 0.0 => log_bias
                .clone()
                .powf_scalar(2.0)
                .mean()
                .mul_scalar(weights.weight_bias),
            _ => zero(),
        };

        let step = model.finest_resolution();
        let image = if weights.weight_image > 0.0 {
            let g2 = finite_difference_gradient_sq(
                |p| model.density(p),
                rendered.centres_world.clone(),
                step,
            );
            self.image.penalty(g2).mean().mul_scalar(weights.weight_image)
        } else {
            zero()
        };

        let deformation = if weights.weight_deform > 0.0 {
            model
                .deformation_jacobian(
                    rendered.centres_world.clone(),
                    rendered.slice_ids.clone(),
                    step,
                )
                .map(|jac| jac.mean().mul_scalar(weights.weight_deform))
                .unwrap_or_else(zero)
        } else {
            zero()
        };

        let total = data.clone()
            + transformation.clone()
            + bias.clone()
            + image.clone()
            + deformation.clone();

        LossOutput {
            total,
            data,
            transformation,
            bias,
            image,
            deformation,
        }
    }
}
