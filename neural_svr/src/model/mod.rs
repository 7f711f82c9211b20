//! The learnable model.
//!
//! [`NesvorModel`] is the whole closure of learned state as one burn module:
//! the implicit volume, the optional bias and deformation fields, and the
//! [`SliceParameters`] arena holding every slice's pose and appearance.

mod field;
mod slices;

pub use field::{NesvorModel, SampleOutput};
pub use slices::SliceParameters;
