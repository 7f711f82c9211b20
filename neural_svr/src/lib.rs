//! # neural_svr
//!
//! Joint slice-to-volume reconstruction with Burn.
//!
//! Motion-corrupted 2D slices from several stacks are explained by one
//! implicit volumetric field (a multi-resolution hash grid decoded by a small
//! MLP) together with a per-slice rigid pose, intensity scale, variance and
//! embedding. Everything is optimised jointly by rendering each observed
//! pixel through its point-spread function.
//!
//! ## Features
//!
//! - **Hash-grid field**: `HashEncoder` + `Mlp` decoding density and a feature `z`
//! - **Slice model**: poses, scales, pixel/slice variances, embeddings in one arena
//! - **Auxiliary fields**: optional bias field and deformation field
//! - **PSF renderer**: Monte-Carlo footprint sampling, differentiable end to end
//! - **Losses**: variance-weighted data term, transformation, bias, image
//!   (TV / edge / L2) and deformation regularisers
//! - **Snapshots**: byte-encoded trained models for volume and slice sampling
//!
//! ## Quick Start
//!
//! ```ignore
//! use neural_svr::prelude::*;
//! use burn::backend::{Autodiff, NdArray};
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let stacks = load_stacks();
//! let config = ReconstructionConfig::new();
//! let device = Default::default();
//!
//! let mut trainer = ReconstructionTrainer::<MyBackend>::new(config, &stacks, &device)?;
//! trainer.train(None)?;
//!
//! let snapshot = trainer.snapshot();
//! let volume = sample_volume(&snapshot, &InferenceConfig::new(), None, &device)?;
//! let bytes = snapshot.to_bytes()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! svr_core (pure math: transforms, hashing, PSF, stacks)
//!     │
//!     ▼
//! neural_svr
//!   data ──► training ──► snapshot ──► inference
//!              │  ▲
//!              ▼  │
//!   render ◄─ model ◄─ nn        loss
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support
//! - `ndarray` (default): CPU backend using ndarray
//! - `wgpu`: GPU acceleration via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod loss;
pub mod model;
pub mod nn;
pub mod render;
pub mod snapshot;
pub mod training;

// Re-export key types for convenience
pub use config::{InferenceConfig, ReconstructionConfig};
pub use error::{NeuralSvrError, Result};
pub use model::NesvorModel;
pub use snapshot::ModelSnapshot;
pub use training::{ReconstructionTrainer, TrainOutcome, TrainerState};

pub use svr_core::{Aabb, Image2D, Point3, RigidTransform, Stack};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        BiasFieldConfig, DeformationConfig, HashEncoderConfig, ImageRegularization,
        ImplicitNetworkConfig, InferenceConfig, LossConfig, Precision, ReconstructionConfig,
        SliceModelConfig, TrainingConfig,
    };
    pub use crate::data::{SliceDataset, SliceGeometry, Volume};
    pub use crate::error::{NeuralSvrError, Result};
    pub use crate::inference::{
        sample_slices, sample_volume, simulate_observed_slices, SliceRequest,
    };
    pub use crate::loss::{ImageRegularizer, LossBreakdown, ReconstructionLoss};
    pub use crate::model::{NesvorModel, SliceParameters};
    pub use crate::render::{PsfRenderer, RenderQuery};
    pub use crate::snapshot::ModelSnapshot;
    pub use crate::training::{
        CancellationToken, MetricsTracker, ReconstructionTrainer, TrainMetrics, TrainOutcome,
        TrainerState,
    };

    pub use svr_core::{Aabb, Image2D, MilestoneSchedule, Point3, PsfSigma, RigidTransform, Stack};
}
