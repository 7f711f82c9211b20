//! Differentiable multi-resolution hash-grid encoder.

use burn::module::{Ignored, Module, Param};
use burn::prelude::*;
use rand::Rng;
use rayon::prelude::*;

use svr_core::{HashGridLayout, Point3, CORNER_OFFSETS};

use super::to_host;

/// Half-width of the uniform distribution used to initialise the tables.
pub const EMBEDDING_INIT_RANGE: f32 = 1e-4;

/// Hash-grid encoder backed by one shared feature table.
///
/// The table has shape `[total_entries, n_features]`; each level owns the
/// rows described by its [`svr_core::GridLevel`]. A query gathers the eight
/// corner rows of the enclosing cell at every level and blends them
/// trilinearly. Corner lookup happens on the host from a detached copy of the
/// points; blending weights are tensor operations, so gradients reach both
/// the table and the query points.
///
/// Hashed levels may map distinct corners to one row. Such collisions are
/// part of the encoding: the shared row receives the sum of their gradients.
#[derive(Module, Debug)]
pub struct HashEncoder<B: Backend> {
    /// Feature table: [total_entries, n_features]
    pub(crate) embeddings: Param<Tensor<B, 2>>,
    /// Level geometry.
    layout: Ignored<HashGridLayout>,
    /// Features per level.
    n_features: usize,
}

impl<B: Backend> HashEncoder<B> {
    /// Create an encoder with a table drawn uniformly from
    /// `±EMBEDDING_INIT_RANGE`.
    pub fn new<R: Rng>(
        layout: HashGridLayout,
        n_features: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let rows = layout.total_entries();
        let values: Vec<f32> = (0..rows * n_features)
            .map(|_| rng.gen_range(-EMBEDDING_INIT_RANGE..EMBEDDING_INIT_RANGE))
            .collect();
        let embeddings = Tensor::from_data(TensorData::new(values, [rows, n_features]), device);

        log::debug!(
            "hash encoder: {} levels, {} rows x {} features",
            layout.n_levels(),
            rows,
            n_features
        );
        for (l, level) in layout.levels().iter().enumerate() {
            log::debug!(
                "  level {l}: {:.3} mm, dims {:?}, {} rows{}",
                level.resolution,
                level.dims,
                level.table_size,
                if level.dense { " (dense)" } else { "" }
            );
        }

        Self {
            embeddings: Param::from_tensor(embeddings),
            layout: Ignored(layout),
            n_features,
        }
    }

    /// Level geometry.
    pub fn layout(&self) -> &HashGridLayout {
        &self.layout
    }

    /// Number of levels.
    pub fn n_levels(&self) -> usize {
        self.layout.n_levels()
    }

    /// Features per level.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Length of the concatenated output.
    pub fn output_dim(&self) -> usize {
        self.n_levels() * self.n_features
    }

    /// Every level's table, stacked: [total_entries, n_features]
    pub fn table(&self) -> Tensor<B, 2> {
        self.embeddings.val()
    }

    /// Number of learnable table values.
    pub fn num_params(&self) -> usize {
        self.layout.total_entries() * self.n_features
    }

    /// Encode points level by level.
    ///
    /// Input shape: [num_points, 3] (world millimetres)
    /// Output shape: [num_points, n_levels, n_features]
    pub fn forward_levels(&self, points: Tensor<B, 2>) -> Tensor<B, 3> {
        let device = points.device();
        let [num_points, _] = points.dims();
        let levels = self.layout.levels();
        let n_levels = levels.len();
        let n_features = self.n_features;

        // Host-side corner lookup.
        let coords = to_host(points.clone().detach());
        let mut rows = vec![0i64; num_points * n_levels * 8];
        let mut bases = vec![0f32; num_points * n_levels * 3];
        let layout = &*self.layout;
        rows.par_chunks_mut(n_levels * 8)
            .zip(bases.par_chunks_mut(n_levels * 3))
            .enumerate()
            .for_each(|(i, (point_rows, point_bases))| {
                let p = Point3::new(coords[i * 3], coords[i * 3 + 1], coords[i * 3 + 2]);
                for level in 0..n_levels {
                    let (corners, base) = layout.corner_indices(level, p);
                    for (dst, &row) in point_rows[level * 8..level * 8 + 8].iter_mut().zip(&corners) {
                        *dst = row as i64;
                    }
                    for axis in 0..3 {
                        point_bases[level * 3 + axis] = base[axis] as f32;
                    }
                }
            });

        // Local cell coordinates, differentiable in the points.
        let origin = layout.bounds().min.to_array();
        let origin = Tensor::<B, 2>::from_data(TensorData::new(origin.to_vec(), [1, 3]), &device);
        let inv_resolution: Vec<f32> = levels.iter().map(|l| 1.0 / l.resolution).collect();
        let inv_resolution =
            Tensor::<B, 3>::from_data(TensorData::new(inv_resolution, [1, n_levels, 1]), &device);
        let scaled = (points - origin).reshape([num_points, 1, 3]) * inv_resolution;
        let base = Tensor::<B, 3>::from_data(TensorData::new(bases, [num_points, n_levels, 3]), &device);
        let frac = (scaled - base).clamp(0.0, 1.0);

        let fx = frac.clone().slice([0..num_points, 0..n_levels, 0..1]);
        let fy = frac.clone().slice([0..num_points, 0..n_levels, 1..2]);
        let fz = frac.slice([0..num_points, 0..n_levels, 2..3]);
        let pick = |f: &Tensor<B, 3>, upper: u32| {
            if upper == 1 {
                f.clone()
            } else {
                f.clone().neg().add_scalar(1.0)
            }
        };
        let weights: Vec<Tensor<B, 3>> = CORNER_OFFSETS
            .iter()
            .map(|o| pick(&fx, o[0]) * pick(&fy, o[1]) * pick(&fz, o[2]))
            .collect();
        let weights = Tensor::cat(weights, 2).reshape([num_points, n_levels, 8, 1]);

        // Gather and blend.
        let rows = Tensor::<B, 1, Int>::from_data(
            TensorData::new(rows, [num_points * n_levels * 8]),
            &device,
        );
        let corners = self
            .embeddings
            .val()
            .select(0, rows)
            .reshape([num_points, n_levels, 8, n_features]);

        (corners * weights)
            .sum_dim(2)
            .reshape([num_points, n_levels, n_features])
    }

    /// Encode points into one concatenated feature vector.
    ///
    /// Input shape: [num_points, 3]
    /// Output shape: [num_points, n_levels * n_features]
    pub fn forward(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let [num_points, _] = points.dims();
        let dim = self.output_dim();
        self.forward_levels(points).reshape([num_points, dim])
    }
}

/// Flatten a contiguous range of levels from [`HashEncoder::forward_levels`].
pub fn select_levels<B: Backend>(
    features: Tensor<B, 3>,
    levels: core::ops::Range<usize>,
) -> Tensor<B, 2> {
    let [num_points, _, n_features] = features.dims();
    let n = levels.len();
    features
        .slice([0..num_points, levels, 0..n_features])
        .reshape([num_points, n * n_features])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use svr_core::Aabb;

    type TestBackend = NdArray;

    fn encoder<B: Backend>(device: &B::Device) -> HashEncoder<B> {
        let bounds = Aabb::new(Point3::splat(-8.0), Point3::splat(8.0));
        let layout = HashGridLayout::new(bounds, 4.0, 1.0, 2.0, 8).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        HashEncoder::new(layout, 2, &mut rng, device)
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let enc = encoder::<TestBackend>(&device);
        assert_eq!(enc.n_levels(), 3);
        let points = Tensor::<TestBackend, 2>::zeros([5, 3], &device);
        assert_eq!(enc.forward(points.clone()).dims(), [5, 6]);
        assert_eq!(enc.forward_levels(points.clone()).dims(), [5, 3, 2]);
        let coarse = select_levels(enc.forward_levels(points), 0..1);
        assert_eq!(coarse.dims(), [5, 2]);
    }

    #[test]
    fn test_corner_reproduces_table_row() {
        let device = Default::default();
        let enc = encoder::<TestBackend>(&device);
        // Grid corner (2, 1, 0) of level 0 sits at min + corner * 4mm.
        let p = Point3::new(-8.0 + 8.0, -8.0 + 4.0, -8.0);
        let row = enc.layout().corner_index(0, [2, 1, 0]);
        let table: Vec<f32> = enc.embeddings.val().to_data().to_vec().unwrap();

        let points = Tensor::<TestBackend, 2>::from_floats([[p.x, p.y, p.z]], &device);
        let out: Vec<f32> = enc.forward(points).to_data().to_vec().unwrap();
        assert!((out[0] - table[row * 2]).abs() < 1e-9);
        assert!((out[1] - table[row * 2 + 1]).abs() < 1e-9);
    }

    #[test]
    fn test_gradients_reach_table_and_points() {
        type B = Autodiff<NdArray>;
        let device = Default::default();
        let enc = encoder::<B>(&device);
        let points =
            Tensor::<B, 2>::from_floats([[0.3, -1.2, 2.5], [4.1, 0.0, -3.3]], &device).require_grad();
        let grads = enc.forward(points.clone()).sum().backward();

        let table_grad: Vec<f32> = enc
            .embeddings
            .val()
            .grad(&grads)
            .unwrap()
            .to_data()
            .to_vec()
            .unwrap();
        // Each point touches 8 corners on each of 3 levels, weights sum to 1
        // per level and feature: total gradient = 2 points * 3 levels * 2 features.
        let total: f32 = table_grad.iter().sum();
        assert!((total - 12.0).abs() < 1e-4);
        assert!(points.grad(&grads).is_some());
    }

    #[test]
    fn test_point_gradient_matches_finite_difference() {
        type B = Autodiff<NdArray>;
        let device = Default::default();
        let mut enc = encoder::<B>(&device);
        let dims = enc.embeddings.val().dims();
        enc.embeddings =
            Param::from_tensor(Tensor::random(dims, Distribution::Uniform(-1.0, 1.0), &device));

        // Every coordinate stays inside its cell at all levels within ±h.
        let coords = vec![0.3, -1.2, 2.5, 4.1, 0.45, -3.3];
        let weights = Tensor::<B, 3>::random([2, 3, 2], Distribution::Uniform(-1.0, 1.0), &device);
        let objective = |coords: Vec<f32>, track: bool| {
            let points = Tensor::<B, 2>::from_data(TensorData::new(coords, [2, 3]), &device);
            let points = if track { points.require_grad() } else { points };
            let value = (enc.forward_levels(points.clone()) * weights.clone()).sum();
            (points, value)
        };

        let (points, value) = objective(coords.clone(), true);
        let grads = value.backward();
        let analytic: Vec<f32> = points.grad(&grads).unwrap().to_data().to_vec().unwrap();

        let h = 1e-2;
        for i in 0..coords.len() {
            let mut plus = coords.clone();
            let mut minus = coords.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (objective(plus, false).1.into_scalar()
                - objective(minus, false).1.into_scalar())
                / (2.0 * h);
            assert!(
                (analytic[i] - numeric).abs() <= 1e-3 * numeric.abs().max(1.0),
                "coordinate {i}: autodiff {} vs finite difference {numeric}",
                analytic[i]
            );
        }
    }
}
