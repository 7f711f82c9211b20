//! Training infrastructure.
//!
//! This module provides:
//! - `ReconstructionTrainer`: the INITIALIZED → RUNNING → CONVERGED loop
//! - `PixelSampler`: seeded batches of observed pixels
//! - `ScheduledOptimizer`: Adam with milestone learning-rate decay
//! - Training metrics and cooperative cancellation

mod batch;
mod metrics;
mod optimizer;
mod trainer;

pub use batch::{PixelBatch, PixelSampler};
pub use metrics::{MetricsTracker, TrainMetrics};
pub use optimizer::{ScheduledOptimizer, ADAM_EPSILON};
pub use trainer::{
    estimate_memory_bytes, CancellationToken, ReconstructionTrainer, TrainOutcome, TrainerState,
};
