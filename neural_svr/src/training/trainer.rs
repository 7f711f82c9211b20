//! Reconstruction trainer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;

use svr_core::{Aabb, RigidTransform, Stack};

use super::batch::PixelSampler;
use super::metrics::{MetricsTracker, TrainMetrics};
use super::optimizer::ScheduledOptimizer;
use crate::config::ReconstructionConfig;
use crate::data::SliceDataset;
use crate::error::{NeuralSvrError, Result};
use crate::loss::{LossBreakdown, ReconstructionLoss};
use crate::model::NesvorModel;
use crate::nn::to_host;
use crate::render::PsfRenderer;
use crate::snapshot::ModelSnapshot;

/// Bytes per f32 activation.
const F32_BYTES: u64 = 4;

/// Lifecycle of a [`ReconstructionTrainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Parameters are initialised, no step taken yet.
    Initialized,
    /// At least one step taken, budget not exhausted.
    Running,
    /// The iteration budget is exhausted.
    Converged,
}

impl fmt::Display for TrainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// Cooperative stop request, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the training loop to stop before its next iteration.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of [`ReconstructionTrainer::train`].
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// State when the loop returned.
    pub state: TrainerState,
    /// Iterations completed so far.
    pub iterations: usize,
    /// True when the loop stopped on a cancellation request.
    pub cancelled: bool,
    /// Loss averaged over the last iterations.
    pub average_loss: LossBreakdown,
}

/// Rough activation and optimiser-state footprint of a configuration.
///
/// Activations: `batch · samples · (encoder features + hidden units + z)`
/// f32 values, counted three times for forward, backward and the image
/// term. Tables: every hash-table value with its gradient and two Adam
/// moments.
pub fn estimate_memory_bytes(config: &ReconstructionConfig, bounds: Aabb) -> Result<u64> {
    let layout = config.encoder.layout(bounds)?;
    let training = &config.training;
    let network = &config.network;

    let per_sample = (layout.n_levels() * config.encoder.n_features_per_level
        + network.width * network.depth
        + network.n_features_z) as u64;
    let activations =
        training.batch_size as u64 * training.n_samples as u64 * per_sample * F32_BYTES * 3;
    let tables = (layout.total_entries() * config.encoder.n_features_per_level) as u64 * F32_BYTES * 4;
    Ok(activations.saturating_add(tables))
}

/// Joint optimisation of the volume and every slice parameter.
///
/// ```text
/// INITIALIZED --step--> RUNNING --n_iter steps--> CONVERGED
/// ```
///
/// Each step samples a pixel batch, renders it through the PSF, evaluates
/// the loss, backpropagates and applies one Adam update to all parameter
/// groups. A non-finite loss or gradient aborts with
/// [`NeuralSvrError::NumericalDivergence`] and leaves the model as it was
/// before the step.
pub struct ReconstructionTrainer<B: AutodiffBackend> {
    config: ReconstructionConfig,
    dataset: SliceDataset,
    model: NesvorModel<B>,
    optimizer: ScheduledOptimizer<B>,
    sampler: PixelSampler,
    renderer: PsfRenderer,
    loss: ReconstructionLoss,
    tracker: MetricsTracker,
    state: TrainerState,
    iteration: usize,
    device: B::Device,
}

impl<B: AutodiffBackend> ReconstructionTrainer<B> {
    /// Validate inputs and initialise every parameter group.
    ///
    /// Configuration errors surface before the stacks are read; data errors
    /// before any tensor is allocated.
    pub fn new(config: ReconstructionConfig, stacks: &[Stack], device: &B::Device) -> Result<Self> {
        config.validate()?;
        let dataset = SliceDataset::from_stacks(stacks)?;

        if let Some(available) = config.training.max_memory_bytes {
            let required = estimate_memory_bytes(&config, dataset.bounds())?;
            if required > available {
                return Err(NeuralSvrError::ResourceExhaustion {
                    required_bytes: required,
                    available_bytes: available,
                });
            }
        }

        let seed = config.training.seed;
        if let Some(seed) = seed {
            B::seed(seed);
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = NesvorModel::new(
            &config,
            dataset.bounds(),
            &dataset.initial_transforms(),
            &mut rng,
            device,
        )?;

        let optimizer = ScheduledOptimizer::new(config.training.schedule()?);
        let sampler = PixelSampler::new(config.training.batch_size, seed.map(|s| s.wrapping_add(1)));
        let renderer = PsfRenderer::new(config.training.n_samples, seed.map(|s| s.wrapping_add(2)));
        let loss = ReconstructionLoss::new(config.loss.clone());
        let tracker = MetricsTracker::new(config.training.log_interval);

        log::info!(
            "reconstruction: {} slices, {} pixels, {} encoder levels ({} for density), {} parameters",
            dataset.n_slices(),
            dataset.len(),
            model.encoder().n_levels(),
            config.density_levels(),
            model.parameter_count()
        );
        log::info!(
            "schedule: {} iterations, lr {:.2e}, milestones {:?}",
            config.training.n_iter,
            config.training.learning_rate,
            optimizer.schedule().milestones()
        );

        Ok(Self {
            config,
            dataset,
            model,
            optimizer,
            sampler,
            renderer,
            loss,
            tracker,
            state: TrainerState::Initialized,
            iteration: 0,
            device: device.clone(),
        })
    }

    /// Current state.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Iterations completed.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Configuration in use.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Training pixels.
    pub fn dataset(&self) -> &SliceDataset {
        &self.dataset
    }

    /// The model being optimised.
    pub fn model(&self) -> &NesvorModel<B> {
        &self.model
    }

    /// Current slice-to-world transforms.
    pub fn transforms(&self) -> Vec<RigidTransform> {
        self.model.slices().transforms()
    }

    /// Run one optimisation step.
    pub fn step(&mut self) -> Result<TrainMetrics> {
        if self.state == TrainerState::Converged {
            return Err(NeuralSvrError::InvalidState {
                state: self.state.to_string(),
                action: "step".to_string(),
            });
        }
        self.state = TrainerState::Running;
        let iteration = self.iteration;

        let batch = self.sampler.sample(&self.dataset);
        let rendered = self.renderer.render(&self.model, &batch.query, &self.device);
        let losses = self
            .loss
            .evaluate(&self.model, &rendered, batch.targets(&self.device));
        let breakdown = losses.breakdown();
        if !breakdown.is_finite() {
            return Err(NeuralSvrError::NumericalDivergence {
                iteration,
                quantity: "loss".to_string(),
            });
        }

        let grads = losses.total.backward();
        if let Some(quantity) = self.non_finite_gradient(&grads) {
            return Err(NeuralSvrError::NumericalDivergence {
                iteration,
                quantity: quantity.to_string(),
            });
        }
        let grads = GradientsParams::from_grads(grads, &self.model);

        let learning_rate = self.optimizer.learning_rate(iteration);
        self.model = self.optimizer.step(iteration, self.model.clone(), grads);

        let metrics = TrainMetrics::new(breakdown, learning_rate, iteration);
        self.tracker.add(&metrics);
        let n_iter = self.config.training.n_iter;
        let log_interval = self.config.training.log_interval;
        if log_interval > 0 && (iteration % log_interval == 0 || iteration + 1 == n_iter) {
            metrics.log("train", n_iter);
        }

        self.iteration += 1;
        if self.iteration >= n_iter {
            self.state = TrainerState::Converged;
            let avg = self.tracker.average();
            log::info!(
                "training converged after {} iterations, mean loss {:.5} over the last {} steps",
                self.iteration,
                avg.total,
                log_interval.max(1).min(self.iteration)
            );
        }
        Ok(metrics)
    }

    /// Step until the budget is exhausted or `cancel` is triggered.
    ///
    /// Cancellation is not an error: the trainer stays `Running` and can be
    /// resumed with another call.
    pub fn train(&mut self, cancel: Option<&CancellationToken>) -> Result<TrainOutcome> {
        let mut cancelled = false;
        while self.state != TrainerState::Converged {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                log::warn!("training cancelled at iteration {}", self.iteration);
                cancelled = true;
                break;
            }
            self.step()?;
        }
        Ok(TrainOutcome {
            state: self.state,
            iterations: self.iteration,
            cancelled,
            average_loss: self.tracker.average(),
        })
    }

    /// Freeze the current parameters into a gradient-free snapshot.
    pub fn snapshot(&self) -> ModelSnapshot<B::InnerBackend> {
        ModelSnapshot::new(
            self.model.valid(),
            self.config.clone(),
            self.dataset.bounds(),
            self.dataset.geometries().to_vec(),
            self.dataset.intensity_mean(),
        )
    }

    /// Name of a parameter group with a non-finite gradient.
    ///
    /// Every float parameter of the model is checked; pose, slice embedding
    /// and hash table are reported by name.
    fn non_finite_gradient(&self, grads: &B::Gradients) -> Option<&'static str> {
        let mut check = FiniteGradients::<B> {
            grads,
            finite: true,
        };
        self.model.visit(&mut check);
        if check.finite {
            return None;
        }

        let finite = |sum: Option<Tensor<B::InnerBackend, 1>>| {
            sum.map_or(true, |s| to_host(s).iter().all(|v| v.is_finite()))
        };
        let slices = self.model.slices();
        if !finite(slices.pose().grad(grads).map(|g| g.sum())) {
            Some("pose gradient")
        } else if !finite(slices.embeddings().grad(grads).map(|g| g.sum())) {
            Some("slice embedding gradient")
        } else if !finite(self.model.encoder().table().grad(grads).map(|g| g.sum())) {
            Some("hash table gradient")
        } else {
            Some("parameter gradient")
        }
    }
}

/// Clears `finite` on the first parameter whose gradient holds NaN or inf.
struct FiniteGradients<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    finite: bool,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for FiniteGradients<'_, B> {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if !self.finite {
            return;
        }
        if let Some(grad) = tensor.grad(self.grads) {
            self.finite = to_host(grad.sum()).iter().all(|v| v.is_finite());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashEncoderConfig, TrainingConfig};
    use burn::backend::{Autodiff, NdArray};
    use svr_core::Image2D;

    type B = Autodiff<NdArray>;

    fn stacks() -> Vec<Stack> {
        let slices = (0..3)
            .map(|k| Image2D::filled(6, 6, 1.0 + 0.1 * k as f32))
            .collect();
        vec![Stack::new(slices, 1.0, 1.0, 2.0).unwrap()]
    }

    fn config(n_iter: usize) -> ReconstructionConfig {
        ReconstructionConfig::fast()
            .with_encoder(
                HashEncoderConfig::new()
                    .with_coarsest_resolution(4.0)
                    .with_finest_resolution(2.0)
                    .with_level_scale(2.0)
                    .with_log2_hashmap_size(8),
            )
            .with_training(
                TrainingConfig::new()
                    .with_n_iter(n_iter)
                    .with_batch_size(16)
                    .with_n_samples(4)
                    .with_seed(Some(1))
                    .with_log_interval(1),
            )
    }

    #[test]
    fn test_state_machine() {
        let device = Default::default();
        let mut trainer = ReconstructionTrainer::<B>::new(config(3), &stacks(), &device).unwrap();
        assert_eq!(trainer.state(), TrainerState::Initialized);

        let metrics = trainer.step().unwrap();
        assert_eq!(metrics.step, 0);
        assert!(metrics.total_loss().is_finite());
        assert_eq!(trainer.state(), TrainerState::Running);

        let outcome = trainer.train(None).unwrap();
        assert_eq!(outcome.state, TrainerState::Converged);
        assert_eq!(outcome.iterations, 3);
        assert!(!outcome.cancelled);

        assert!(matches!(
            trainer.step(),
            Err(NeuralSvrError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_cancellation_keeps_running_state() {
        let device = Default::default();
        let mut trainer = ReconstructionTrainer::<B>::new(config(5), &stacks(), &device).unwrap();
        trainer.step().unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let outcome = trainer.train(Some(&token)).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.state, TrainerState::Running);
    }

    #[test]
    fn test_memory_budget() {
        let device = Default::default();
        let config = config(1).with_training(
            TrainingConfig::new()
                .with_n_iter(1)
                .with_max_memory_bytes(Some(1024)),
        );
        assert!(matches!(
            ReconstructionTrainer::<B>::new(config, &stacks(), &device),
            Err(NeuralSvrError::ResourceExhaustion { available_bytes: 1024, .. })
        ));
    }

    #[test]
    fn test_rejects_before_training() {
        let device = Default::default();
        let bad = config(1).with_training(TrainingConfig::new().with_milestones(vec![0.9, 0.1]));
        assert!(matches!(
            ReconstructionTrainer::<B>::new(bad, &stacks(), &device),
            Err(NeuralSvrError::Configuration { .. })
        ));
        assert!(matches!(
            ReconstructionTrainer::<B>::new(config(1), &[], &device),
            Err(NeuralSvrError::DataValidation { .. })
        ));
    }

    #[test]
    fn test_non_finite_scale_gradient_is_detected() {
        let device = Default::default();
        let trainer = ReconstructionTrainer::<B>::new(config(1), &stacks(), &device).unwrap();
        let ids = Tensor::<B, 1, Int>::from_ints([0, 2], &device);

        let clean = trainer.model().slices().scale_of(ids.clone()).sum().backward();
        assert_eq!(trainer.non_finite_gradient(&clean), None);

        let poisoned = trainer
            .model()
            .slices()
            .scale_of(ids)
            .mul_scalar(f32::NAN)
            .sum()
            .backward();
        assert_eq!(trainer.non_finite_gradient(&poisoned), Some("parameter gradient"));
    }

    #[test]
    fn test_snapshot_matches_model() {
        let device = Default::default();
        let mut trainer = ReconstructionTrainer::<B>::new(config(2), &stacks(), &device).unwrap();
        trainer.train(None).unwrap();
        let snapshot = trainer.snapshot();
        assert_eq!(snapshot.slice_transforms(), trainer.transforms());
        assert_eq!(snapshot.geometries().len(), 3);
    }
}
