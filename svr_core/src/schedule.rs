//! Milestone learning-rate schedule.
//!
//! The rate starts at `base` and is multiplied by `gamma` once per milestone
//! reached. Milestones are given as fractions of the iteration budget and are
//! converted once to absolute iterations with `round(fraction × n_iter)`.

use crate::alloc_prelude::Vec;
use crate::error::CoreError;

/// Piecewise-constant decaying learning rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneSchedule {
    base: f64,
    gamma: f64,
    milestones: Vec<usize>,
    n_iter: usize,
}

impl MilestoneSchedule {
    /// Validate the fractions and convert them to absolute iterations.
    ///
    /// Fractions must be strictly increasing and lie in the open interval
    /// (0, 1). `base` must be positive and `gamma` in (0, 1].
    pub fn new(base: f64, gamma: f64, fractions: &[f64], n_iter: usize) -> Result<Self, CoreError> {
        if !base.is_finite() || base <= 0.0 {
            return Err(CoreError::InvalidParameter {
                name: "learning_rate",
                value: base,
            });
        }
        if !gamma.is_finite() || gamma <= 0.0 || gamma > 1.0 {
            return Err(CoreError::InvalidParameter {
                name: "gamma",
                value: gamma,
            });
        }
        if n_iter == 0 {
            return Err(CoreError::InvalidParameter {
                name: "n_iter",
                value: 0.0,
            });
        }

        let mut previous = 0.0;
        for (index, &value) in fractions.iter().enumerate() {
            if !value.is_finite() || value <= previous || value >= 1.0 {
                return Err(CoreError::InvalidMilestones { index, value });
            }
            previous = value;
        }

        let milestones = fractions
            .iter()
            .map(|f| libm::round(f * n_iter as f64) as usize)
            .collect();

        Ok(Self {
            base,
            gamma,
            milestones,
            n_iter,
        })
    }

    /// Initial learning rate.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Decay factor applied at each milestone.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Absolute milestone iterations.
    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }

    /// Total iteration budget.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Number of decays applied by iteration `iteration` (0-based).
    pub fn decays_at(&self, iteration: usize) -> usize {
        self.milestones.iter().filter(|&&m| m <= iteration).count()
    }

    /// Learning rate used for the step at `iteration` (0-based).
    pub fn learning_rate(&self, iteration: usize) -> f64 {
        self.base * libm::pow(self.gamma, self.decays_at(iteration) as f64)
    }

    /// True when the rate changes at `iteration`.
    pub fn is_milestone(&self, iteration: usize) -> bool {
        self.milestones.contains(&iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_milestones() {
        let schedule = MilestoneSchedule::new(5e-3, 0.33, &[0.5, 0.75, 0.9], 6000).unwrap();
        assert_eq!(schedule.milestones(), &[3000, 4500, 5400]);
        assert_eq!(schedule.learning_rate(0), 5e-3);
        assert_eq!(schedule.learning_rate(2999), 5e-3);
        assert!((schedule.learning_rate(3000) - 5e-3 * 0.33).abs() < 1e-15);
        assert!((schedule.learning_rate(5999) - 5e-3 * 0.33 * 0.33 * 0.33).abs() < 1e-15);
    }

    #[test]
    fn test_rounding() {
        let schedule = MilestoneSchedule::new(1.0, 0.5, &[0.25, 0.5], 10).unwrap();
        // round(2.5) = 3, round(5.0) = 5
        assert_eq!(schedule.milestones(), &[3, 5]);
        assert!(schedule.is_milestone(3));
        assert!(!schedule.is_milestone(4));
    }

    #[test]
    fn test_monotone_non_increasing() {
        let schedule = MilestoneSchedule::new(1e-2, 0.1, &[0.2, 0.4, 0.6, 0.8], 137).unwrap();
        let mut last = f64::INFINITY;
        for it in 0..137 {
            let lr = schedule.learning_rate(it);
            assert!(lr <= last);
            if it > 0 && lr != schedule.learning_rate(it - 1) {
                assert!(schedule.is_milestone(it));
            }
            last = lr;
        }
    }

    #[test]
    fn test_rejects_invalid_milestones() {
        assert_eq!(
            MilestoneSchedule::new(1.0, 0.5, &[0.5, 0.5], 10),
            Err(CoreError::InvalidMilestones {
                index: 1,
                value: 0.5
            })
        );
        assert!(MilestoneSchedule::new(1.0, 0.5, &[0.0], 10).is_err());
        assert!(MilestoneSchedule::new(1.0, 0.5, &[1.0], 10).is_err());
        assert!(MilestoneSchedule::new(1.0, 0.5, &[0.7, 0.3], 10).is_err());
        assert!(MilestoneSchedule::new(0.0, 0.5, &[0.5], 10).is_err());
        assert!(MilestoneSchedule::new(1.0, 1.5, &[0.5], 10).is_err());
    }

    #[test]
    fn test_empty_milestones_is_constant() {
        let schedule = MilestoneSchedule::new(2e-3, 0.5, &[], 100).unwrap();
        assert!(schedule.milestones().is_empty());
        assert_eq!(schedule.learning_rate(99), 2e-3);
    }
}
