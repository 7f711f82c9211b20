//! Configuration types for neural_svr.
//!
//! Burn-style configuration structs for the encoders, decoder heads, per-slice
//! parameters, optional auxiliary fields, loss weights, optimisation and
//! inference. [`ReconstructionConfig`] composes them.

mod encoder;
mod inference;
mod model;
mod training;

pub use encoder::HashEncoderConfig;
pub use inference::InferenceConfig;
pub use model::{
    BiasFieldConfig, DeformationConfig, ImplicitNetworkConfig, Precision, SliceModelConfig,
};
pub use training::{ImageRegularization, LossConfig, ReconstructionConfig, TrainingConfig};
