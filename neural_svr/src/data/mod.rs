//! Training data and sampled outputs.
//!
//! - [`SliceDataset`]: masked pixels of the input stacks, normalised
//! - [`SliceGeometry`]: size, spacing, PSF and initial pose of a slice
//! - [`Volume`]: regular voxel grid

mod dataset;
mod volume;

pub use dataset::{SliceDataset, SliceGeometry};
pub use volume::Volume;
