//! Querying a trained snapshot.
//!
//! - [`sample_volume`]: the reconstruction on a regular grid
//! - [`sample_slices`]: the volume seen through arbitrary slices
//! - [`simulate_observed_slices`]: the model's explanation of the training data
//!
//! Inference runs on any backend; use the inner backend of a trained model to
//! skip gradient tracking.

mod slices;
mod volume;

pub use slices::{sample_slices, simulate_observed_slices, SliceRequest};
pub use volume::sample_volume;
