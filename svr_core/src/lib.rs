//! # svr_core
//!
//! Pure geometry for slice-to-volume reconstruction.
//!
//! This crate holds the tensor-free half of the reconstruction stack: the
//! math that decides *where* things are, leaving *what value they have* to
//! the learned model in `neural_svr`.
//!
//! ## Features
//!
//! - **no_std compatible**: Works without the standard library (`alloc` for collections)
//! - **Rigid transforms**: Axis-angle poses with 4×4 matrix round-trips
//! - **Hash-grid layout**: Multi-resolution level geometry and corner indexing
//! - **PSF footprints**: Gaussian slice profile from resolution and thickness
//! - **Schedules**: Milestone learning-rate decay
//! - **Stacks**: Validated slice stacks with masks and initial poses
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables standard library support
//! - `alloc`: Enables heap allocation (Vec, etc.) without full std
//!
//! ## Modules
//!
//! - [`types`]: `Point3` and `Aabb`
//! - [`transform`]: `RigidTransform`
//! - [`hash`]: Spatial hashing of integer grid corners
//! - [`grid`]: `HashGridLayout` (needs `alloc`)
//! - [`interpolation`]: Trilinear corner weights
//! - [`psf`]: Point-spread-function sigmas
//! - [`schedule`]: `MilestoneSchedule` (needs `alloc`)
//! - [`stack`]: `Image2D` and `Stack` (needs `alloc`)
//! - [`assessment`]: Stack ranking and filtering (needs `alloc`)
//! - [`error`]: Error types
//!
//! ## Usage
//!
//! ```ignore
//! use svr_core::prelude::*;
//!
//! let pose = RigidTransform::new([0.0, 0.0, 0.1], [1.0, 0.0, 0.0]);
//! let world = pose.apply(Point3::new(2.0, 0.0, 0.0));
//!
//! let schedule = MilestoneSchedule::new(5e-3, 0.33, &[0.5, 0.75, 0.9], 6000)?;
//! assert_eq!(schedule.milestones(), &[3000, 4500, 5400]);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(feature = "alloc", not(feature = "std")))]
extern crate alloc;

#[cfg(feature = "std")]
mod alloc_prelude {
    pub use std::vec;
    pub use std::vec::Vec;
}

#[cfg(all(feature = "alloc", not(feature = "std")))]
mod alloc_prelude {
    pub use alloc::vec;
    pub use alloc::vec::Vec;
}

pub mod error;
pub mod hash;
pub mod interpolation;
pub mod psf;
pub mod transform;
pub mod types;

#[cfg(any(feature = "std", feature = "alloc"))]
pub mod assessment;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod grid;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod schedule;
#[cfg(any(feature = "std", feature = "alloc"))]
pub mod stack;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::hash::{dense_index, spatial_hash, HASH_PRIMES};
    pub use crate::interpolation::{compute_trilinear_weights, trilinear_interpolate, CORNER_OFFSETS};
    pub use crate::psf::{PsfSigma, FWHM_TO_SIGMA, IN_PLANE_FWHM_FACTOR};
    pub use crate::transform::RigidTransform;
    pub use crate::types::{Aabb, Point3};

    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::assessment::{sort_and_filter, volume_score, FilterMethod, Ranking};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::grid::{level_count, GridLevel, HashGridLayout};
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::schedule::MilestoneSchedule;
    #[cfg(any(feature = "std", feature = "alloc"))]
    pub use crate::stack::{default_transforms, pixel_position, Image2D, Stack};
}

pub use error::CoreError;
pub use hash::{dense_index, spatial_hash, HASH_PRIMES};
pub use interpolation::{compute_trilinear_weights, trilinear_interpolate, CORNER_OFFSETS};
pub use psf::{PsfSigma, FWHM_TO_SIGMA, IN_PLANE_FWHM_FACTOR};
pub use transform::RigidTransform;
pub use types::{Aabb, Point3};

#[cfg(any(feature = "std", feature = "alloc"))]
pub use assessment::{sort_and_filter, volume_score, FilterMethod, Ranking};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use grid::{level_count, GridLevel, HashGridLayout};
#[cfg(any(feature = "std", feature = "alloc"))]
pub use schedule::MilestoneSchedule;
#[cfg(any(feature = "std", feature = "alloc"))]
pub use stack::{default_transforms, pixel_position, Image2D, Stack};
