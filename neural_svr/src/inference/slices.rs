//! Slice simulation from a trained snapshot.

use burn::prelude::*;

use svr_core::{Image2D, RigidTransform};

use crate::config::InferenceConfig;
use crate::data::SliceGeometry;
use crate::error::{NeuralSvrError, Result};
use crate::nn::to_host;
use crate::render::{PsfRenderer, RenderQuery};
use crate::snapshot::ModelSnapshot;

/// A slice to render: its pixel grid and where it sits in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceRequest {
    /// Pixel grid, spacing and PSF.
    pub geometry: SliceGeometry,
    /// Slice-to-world pose.
    pub pose: RigidTransform,
}

impl SliceRequest {
    /// Render `geometry` at `pose`.
    pub fn new(geometry: SliceGeometry, pose: RigidTransform) -> Self {
        Self { geometry, pose }
    }

    /// Render `geometry` at its initial pose.
    pub fn from_geometry(geometry: SliceGeometry) -> Self {
        Self::new(geometry, geometry.initial)
    }
}

/// Every pixel of every slice as a flat render query.
fn pixel_query<'a>(geometries: impl Iterator<Item = &'a SliceGeometry>) -> RenderQuery {
    let mut query = RenderQuery::new();
    for (slice, g) in geometries.enumerate() {
        for row in 0..g.height {
            for col in 0..g.width {
                query.push(slice, g.pixel_position(row, col).to_array(), g.psf);
            }
        }
    }
    query
}

/// Split a flat pixel buffer back into one image per geometry.
fn into_images<'a>(
    values: Vec<f32>,
    geometries: impl Iterator<Item = &'a SliceGeometry>,
) -> Result<Vec<Image2D>> {
    let mut values = values.into_iter();
    geometries
        .map(|g| -> Result<Image2D> {
            let data: Vec<f32> = values.by_ref().take(g.n_pixels()).collect();
            Ok(Image2D::new(g.width, g.height, data)?)
        })
        .collect()
}

/// Chunk a query so that at most `batch_size` PSF samples run per pass.
fn for_chunks(
    query: &RenderQuery,
    n_samples: usize,
    batch_size: usize,
    mut f: impl FnMut(&RenderQuery) -> Vec<f32>,
) -> Vec<f32> {
    let chunk = (batch_size / n_samples).max(1);
    let mut out = Vec::with_capacity(query.len());
    let mut start = 0;
    while start < query.len() {
        let end = (start + chunk).min(query.len());
        out.extend(f(&query.range(start..end)));
        start = end;
    }
    out
}

/// Render the learned volume through arbitrary slices.
///
/// Only the PSF-blurred density is rendered: no slice scale, bias or
/// deformation applies, since the requested slices were never observed.
/// Values are in the units of the input stacks.
pub fn sample_slices<B: Backend>(
    snapshot: &ModelSnapshot<B>,
    requests: &[SliceRequest],
    config: &InferenceConfig,
    device: &B::Device,
) -> Result<Vec<Image2D>> {
    config.validate().map_err(NeuralSvrError::config)?;
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    let poses: Vec<RigidTransform> = requests.iter().map(|r| r.pose).collect();
    let query = pixel_query(requests.iter().map(|r| &r.geometry));
    let mut renderer = PsfRenderer::new(config.n_inference_samples, config.seed);
    let n_samples = renderer.n_samples();

    let values = for_chunks(&query, n_samples, config.inference_batch_size, |chunk| {
        let density = renderer.render_density(snapshot.model(), &poses, chunk, device);
        to_host(density * snapshot.intensity_mean())
    });
    log::debug!("rendered {} slices ({} pixels)", requests.len(), values.len());
    into_images(values, requests.iter().map(|r| &r.geometry))
}

/// Re-render every training slice as the model explains it.
///
/// Uses the learned pose, scale, bias field and deformation of each slice,
/// giving the model's prediction of the acquired data in input units.
pub fn simulate_observed_slices<B: Backend>(
    snapshot: &ModelSnapshot<B>,
    config: &InferenceConfig,
    device: &B::Device,
) -> Result<Vec<Image2D>> {
    config.validate().map_err(NeuralSvrError::config)?;
    let geometries = snapshot.geometries();
    let query = pixel_query(geometries.iter());
    let mut renderer = PsfRenderer::new(config.n_inference_samples, config.seed);
    let n_samples = renderer.n_samples();

    let values = for_chunks(&query, n_samples, config.inference_batch_size, |chunk| {
        let out = renderer.render(snapshot.model(), chunk, device);
        to_host(out.value * snapshot.intensity_mean())
    });
    into_images(values, geometries.iter())
}
