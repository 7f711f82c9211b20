//! Pixel batch sampling.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::SliceDataset;
use crate::render::RenderQuery;

/// A batch of observed pixels ready for rendering.
#[derive(Debug, Clone)]
pub struct PixelBatch {
    /// Pixels to render.
    pub query: RenderQuery,
    /// Observed normalised values, aligned with `query`.
    pub values: Vec<f32>,
}

impl PixelBatch {
    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observed values as a tensor: [n]
    pub fn targets<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::new(self.values.clone(), [self.len()]), device)
    }
}

/// Draws pixels uniformly, with replacement, from a [`SliceDataset`].
#[derive(Debug, Clone)]
pub struct PixelSampler {
    rng: StdRng,
    batch_size: usize,
}

impl PixelSampler {
    /// Create a sampler; `seed = None` draws from OS entropy.
    pub fn new(batch_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, batch_size }
    }

    /// Pixels per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Draw the next batch.
    pub fn sample(&mut self, dataset: &SliceDataset) -> PixelBatch {
        let geometries = dataset.geometries();
        let mut query = RenderQuery::with_capacity(self.batch_size);
        let mut values = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            let i = self.rng.gen_range(0..dataset.len());
            let slice = dataset.slice_of(i);
            let [x, y] = dataset.position(i);
            query.push(slice, [x, y, 0.0], geometries[slice].psf);
            values.push(dataset.value(i));
        }
        PixelBatch { query, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svr_core::{Image2D, Stack};

    fn dataset() -> SliceDataset {
        let slices = (0..3)
            .map(|k| Image2D::filled(5, 5, 1.0 + k as f32))
            .collect();
        let stack = Stack::new(slices, 1.0, 1.0, 2.0).unwrap();
        SliceDataset::from_stacks(&[stack]).unwrap()
    }

    #[test]
    fn test_batch_shape_and_values() {
        let dataset = dataset();
        let batch = PixelSampler::new(64, Some(0)).sample(&dataset);
        assert_eq!(batch.len(), 64);
        assert_eq!(batch.query.len(), 64);
        for (&slice, &value) in batch.query.slice_ids().iter().zip(&batch.values) {
            // Slice k holds (1 + k) / mean, mean = 2.
            assert!((value - (1.0 + slice as f32) / 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let dataset = dataset();
        let a = PixelSampler::new(32, Some(9)).sample(&dataset);
        let b = PixelSampler::new(32, Some(9)).sample(&dataset);
        assert_eq!(a.query.slice_ids(), b.query.slice_ids());
        assert_eq!(a.values, b.values);
    }
}
