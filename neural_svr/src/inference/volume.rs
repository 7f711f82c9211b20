//! Dense volume sampling.

use burn::prelude::*;

use svr_core::{Point3, PsfSigma};

use crate::config::InferenceConfig;
use crate::data::Volume;
use crate::error::{NeuralSvrError, Result};
use crate::model::NesvorModel;
use crate::nn::to_host;
use crate::render::PsfRenderer;
use crate::snapshot::ModelSnapshot;

/// Mask voxels are those where the interpolated mask exceeds this value.
const MASK_THRESHOLD: f32 = 0.5;

/// Sample the reconstructed volume on a regular grid.
///
/// The grid covers the snapshot bounds at `output_resolution`. With
/// `output_psf` every voxel averages `n_inference_samples` draws of an
/// isotropic PSF whose FWHM is the voxel size; otherwise voxel centres are
/// queried directly. `mask`, when given, is resampled onto the output grid:
/// voxels outside it are zero. The result is scaled so that its mean over the
/// mask is `output_intensity_mean`.
pub fn sample_volume<B: Backend>(
    snapshot: &ModelSnapshot<B>,
    config: &InferenceConfig,
    mask: Option<&Volume>,
    device: &B::Device,
) -> Result<Volume> {
    config.validate().map_err(NeuralSvrError::config)?;
    let resolution = config.output_resolution;
    let (dims, origin) = Volume::grid_for(&snapshot.bounds(), resolution);
    let grid = Volume::new(dims, resolution, origin, vec![0.0; dims.iter().product()])?;
    let positions = grid.positions();

    let inside: Vec<bool> = match mask {
        Some(mask) => positions
            .iter()
            .map(|&p| mask.interpolate(p).is_some_and(|m| m > MASK_THRESHOLD))
            .collect(),
        None => vec![true; positions.len()],
    };
    let n_inside = inside.iter().filter(|&&m| m).count();
    if n_inside == 0 {
        return Err(NeuralSvrError::data("sampling mask does not overlap the volume"));
    }

    let selected: Vec<Point3> = positions
        .iter()
        .zip(&inside)
        .filter(|(_, m)| **m)
        .map(|(&p, _)| p)
        .collect();
    let mut renderer = config
        .output_psf
        .then(|| PsfRenderer::new(config.n_inference_samples, config.seed));
    let sigma = PsfSigma::isotropic(resolution)?;
    let values = average_density(
        snapshot.model(),
        renderer.as_mut(),
        sigma,
        &selected,
        config.inference_batch_size,
        device,
    );

    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
    let scale = if mean > 0.0 {
        (config.output_intensity_mean as f64 / mean) as f32
    } else {
        log::warn!("sampled volume has non-positive mean {mean:.3e}, skipping rescaling");
        1.0
    };

    let mut data = vec![0.0f32; positions.len()];
    let mut values = values.into_iter();
    for (v, _) in data.iter_mut().zip(&inside).filter(|(_, m)| **m) {
        *v = values.next().unwrap_or(0.0) * scale;
    }

    log::info!(
        "sampled volume {:?} at {:.2} mm, {} voxels in mask",
        dims,
        resolution,
        n_inside
    );
    Volume::new(dims, resolution, origin, data)?.with_mask(inside)
}

/// Density at `points`, PSF averaged when a renderer is given.
///
/// Points are processed in chunks so that at most `batch_size` samples are
/// evaluated per forward pass.
pub(crate) fn average_density<B: Backend>(
    model: &NesvorModel<B>,
    mut renderer: Option<&mut PsfRenderer>,
    sigma: PsfSigma,
    points: &[Point3],
    batch_size: usize,
    device: &B::Device,
) -> Vec<f32> {
    let n_samples = renderer.as_ref().map_or(1, |r| r.n_samples());
    let chunk_size = (batch_size / n_samples).max(1);
    let mut out = Vec::with_capacity(points.len());

    for chunk in points.chunks(chunk_size) {
        let n = chunk.len();
        let mut coords: Vec<f32> = match renderer.as_deref_mut() {
            Some(renderer) => renderer.sample_offsets(&vec![sigma; n]),
            None => vec![0.0; n * 3],
        };
        for (i, p) in chunk.iter().enumerate() {
            for sample in coords[i * n_samples * 3..(i + 1) * n_samples * 3].chunks_exact_mut(3) {
                sample[0] += p.x;
                sample[1] += p.y;
                sample[2] += p.z;
            }
        }
        let points = Tensor::<B, 2>::from_data(TensorData::new(coords, [n * n_samples, 3]), device);
        let density = model
            .density(points)
            .reshape([n, n_samples])
            .mean_dim(1)
            .reshape([n]);
        out.extend(to_host(density));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashEncoderConfig, ReconstructionConfig};
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::tensor::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use svr_core::{Aabb, RigidTransform};

    type TestBackend = NdArray;

    fn rough_model(device: &<TestBackend as Backend>::Device) -> NesvorModel<TestBackend> {
        let config = ReconstructionConfig::fast().with_encoder(
            HashEncoderConfig::new()
                .with_coarsest_resolution(4.0)
                .with_finest_resolution(0.5)
                .with_level_scale(2.0)
                .with_log2_hashmap_size(12),
        );
        let bounds = Aabb::new(Point3::splat(-8.0), Point3::splat(8.0));
        let mut rng = StdRng::seed_from_u64(8);
        let mut model =
            NesvorModel::new(&config, bounds, &[RigidTransform::IDENTITY], &mut rng, device).unwrap();
        // Large table values make the density vary within a voxel.
        let dims = model.encoder.embeddings.val().dims();
        model.encoder.embeddings =
            Param::from_tensor(Tensor::random(dims, Distribution::Uniform(-1.0, 1.0), device));
        model
    }

    fn spread(model: &NesvorModel<TestBackend>, n_samples: usize) -> f32 {
        let device = Default::default();
        let sigma = PsfSigma::isotropic(2.0).unwrap();
        let points = [Point3::new(0.3, -1.1, 2.2), Point3::new(-3.0, 2.5, 0.7)];
        let mut total = 0.0;
        for (p, point) in points.iter().enumerate() {
            let estimates: Vec<f32> = (0..12)
                .map(|seed| {
                    let mut renderer = PsfRenderer::new(n_samples, Some(seed * 31 + p as u64));
                    average_density(model, Some(&mut renderer), sigma, &[*point], 4096, &device)[0]
                })
                .collect();
            let mean = estimates.iter().sum::<f32>() / estimates.len() as f32;
            total += estimates.iter().map(|e| (e - mean).powi(2)).sum::<f32>();
        }
        total
    }

    #[test]
    fn test_more_samples_reduce_variance() {
        let device = Default::default();
        let model = rough_model(&device);
        let coarse = spread(&model, 2);
        let fine = spread(&model, 128);
        assert!(coarse > 0.0);
        assert!(fine < coarse, "fine {fine} vs coarse {coarse}");
    }

    #[test]
    fn test_chunking_does_not_change_values() {
        let device = Default::default();
        let model = rough_model(&device);
        let sigma = PsfSigma::isotropic(1.0).unwrap();
        let points: Vec<Point3> = (0..7).map(|i| Point3::new(i as f32 - 3.0, 0.5, -0.5)).collect();
        let whole = average_density(&model, None, sigma, &points, 1024, &device);
        let chunked = average_density(&model, None, sigma, &points, 2, &device);
        assert_eq!(whole, chunked);
    }
}
