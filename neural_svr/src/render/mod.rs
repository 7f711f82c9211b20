//! Forward model from the volume to slice pixels.
//!
//! - [`PsfRenderer`]: Monte-Carlo PSF integration, differentiable end to end
//! - [`transform_points`] / [`axis_angle_to_matrix`]: batched rigid poses

mod psf;
mod rotation;

pub use psf::{PsfRenderer, RenderOutput, RenderQuery};
pub use rotation::{axis_angle_to_matrix, transform_points};
