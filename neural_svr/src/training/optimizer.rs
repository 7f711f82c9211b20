//! Adam with milestone learning-rate decay.

use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;

use svr_core::MilestoneSchedule;

use crate::model::NesvorModel;

/// Adam epsilon, small enough not to damp the tiny hash-table gradients.
pub const ADAM_EPSILON: f32 = 1e-15;

/// One Adam optimiser over every parameter group, driven by a
/// [`MilestoneSchedule`].
///
/// Network weights, hash tables, poses, scales, variances and embeddings are
/// all updated by the same step. Parameters without a gradient in a step
/// (frozen poses, disabled terms) are left untouched.
pub struct ScheduledOptimizer<B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<Adam, NesvorModel<B>, B>,
    schedule: MilestoneSchedule,
}

impl<B: AutodiffBackend> ScheduledOptimizer<B> {
    /// Create the optimiser for a schedule.
    pub fn new(schedule: MilestoneSchedule) -> Self {
        Self {
            optimizer: AdamConfig::new().with_epsilon(ADAM_EPSILON).init(),
            schedule,
        }
    }

    /// The learning-rate schedule.
    pub fn schedule(&self) -> &MilestoneSchedule {
        &self.schedule
    }

    /// Learning rate used at `iteration`.
    pub fn learning_rate(&self, iteration: usize) -> f64 {
        self.schedule.learning_rate(iteration)
    }

    /// Apply one update at `iteration`.
    pub fn step(
        &mut self,
        iteration: usize,
        model: NesvorModel<B>,
        grads: GradientsParams,
    ) -> NesvorModel<B> {
        let lr = self.learning_rate(iteration);
        if self.schedule.is_milestone(iteration) {
            log::info!("iteration {iteration}: learning rate decayed to {lr:.3e}");
        }
        self.optimizer.step(lr, model, grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashEncoderConfig, ReconstructionConfig, SliceModelConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use svr_core::{Aabb, Point3, RigidTransform};

    type B = Autodiff<NdArray>;

    fn model(optimize: bool) -> NesvorModel<B> {
        let config = ReconstructionConfig::fast()
            .with_encoder(
                HashEncoderConfig::new()
                    .with_coarsest_resolution(4.0)
                    .with_finest_resolution(2.0)
                    .with_level_scale(2.0)
                    .with_log2_hashmap_size(8),
            )
            .with_slices(SliceModelConfig::new().with_optimize_transformation(optimize));
        let bounds = Aabb::new(Point3::splat(-4.0), Point3::splat(4.0));
        let initial = [RigidTransform::new([0.1, 0.0, 0.0], [0.0, 0.0, 1.0])];
        let mut rng = StdRng::seed_from_u64(2);
        NesvorModel::new(&config, bounds, &initial, &mut rng, &Default::default()).unwrap()
    }

    #[test]
    fn test_learning_rate_follows_schedule() {
        let schedule = MilestoneSchedule::new(1e-2, 0.5, &[0.5], 10).unwrap();
        let optim = ScheduledOptimizer::<B>::new(schedule);
        assert_eq!(optim.learning_rate(4), 1e-2);
        assert_eq!(optim.learning_rate(5), 5e-3);
    }

    #[test]
    fn test_step_moves_poses_only_when_optimised() {
        for optimize in [true, false] {
            let model = model(optimize);
            let before = model.slices().pose_params();
            let points = model.slices().pose().slice([0..1, 3..6]);
            let loss = model.density(points).sum() + model.slices().pose().sum();
            let grads = GradientsParams::from_grads(loss.backward(), &model);

            let schedule = MilestoneSchedule::new(1e-2, 0.5, &[0.5], 10).unwrap();
            let mut optim = ScheduledOptimizer::new(schedule);
            let model = optim.step(0, model, grads);
            let after = model.slices().pose_params();
            if optimize {
                assert_ne!(before, after);
            } else {
                assert_eq!(before, after);
            }
        }
    }
}
