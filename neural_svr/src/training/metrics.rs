//! Training metrics.

use std::collections::VecDeque;

use crate::loss::LossBreakdown;

/// Metrics of a single training step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrainMetrics {
    /// Per-term losses.
    pub loss: LossBreakdown,
    /// Learning rate used by the step.
    pub learning_rate: f64,
    /// Zero-based iteration of the step.
    pub step: usize,
}

impl TrainMetrics {
    /// Create metrics for one step.
    pub fn new(loss: LossBreakdown, learning_rate: f64, step: usize) -> Self {
        Self {
            loss,
            learning_rate,
            step,
        }
    }

    /// Total loss.
    pub fn total_loss(&self) -> f32 {
        self.loss.total
    }

    /// Log the metrics at info level.
    pub fn log(&self, prefix: &str, n_iter: usize) {
        log::info!(
            "{} iter {}/{} total={:.5} data={:.5} transform={:.5} bias={:.5} image={:.5} deform={:.5} lr={:.2e}",
            prefix,
            self.step + 1,
            n_iter,
            self.loss.total,
            self.loss.data,
            self.loss.transformation,
            self.loss.bias,
            self.loss.image,
            self.loss.deformation,
            self.learning_rate,
        );
    }
}

/// Running average of the loss terms over a fixed window of steps.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    window_size: usize,
    window: VecDeque<LossBreakdown>,
    total_steps: usize,
}

impl MetricsTracker {
    /// Create a tracker averaging the last `window_size` steps.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            window: VecDeque::with_capacity(window_size),
            total_steps: 0,
        }
    }

    /// Record one step.
    pub fn add(&mut self, metrics: &TrainMetrics) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(metrics.loss);
        self.total_steps += 1;
    }

    /// Average of every term over the window.
    pub fn average(&self) -> LossBreakdown {
        let n = self.window.len().max(1) as f32;
        let mut avg = LossBreakdown::default();
        for loss in &self.window {
            avg.total += loss.total;
            avg.data += loss.data;
            avg.transformation += loss.transformation;
            avg.bias += loss.bias;
            avg.image += loss.image;
            avg.deformation += loss.deformation;
        }
        avg.total /= n;
        avg.data /= n;
        avg.transformation /= n;
        avg.bias /= n;
        avg.image /= n;
        avg.deformation /= n;
        avg
    }

    /// Number of recorded steps.
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(data: f32) -> TrainMetrics {
        let loss = LossBreakdown {
            total: data + 0.5,
            data,
            image: 0.5,
            ..Default::default()
        };
        TrainMetrics::new(loss, 1e-3, 0)
    }

    #[test]
    fn test_tracker_window() {
        let mut tracker = MetricsTracker::new(10);
        for i in 0..20 {
            tracker.add(&metrics(i as f32 * 0.1));
        }
        assert_eq!(tracker.total_steps(), 20);

        // Last 10 data losses: 1.0, 1.1, ..., 1.9
        let avg = tracker.average();
        assert!((avg.data - 1.45).abs() < 1e-5);
        assert!((avg.image - 0.5).abs() < 1e-6);
        assert!((avg.total - 1.95).abs() < 1e-5);
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = MetricsTracker::new(0);
        assert_eq!(tracker.average(), LossBreakdown::default());
    }
}
