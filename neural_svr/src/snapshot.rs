//! Trained model snapshots and their byte encoding.
//!
//! A snapshot is everything needed to sample the reconstruction later:
//! the learned module, its configuration, the volume bounds, the slice
//! geometry and the intensity normalisation. It is encoded to an in-memory
//! byte buffer; where the bytes are kept is up to the caller.
//!
//! Layout (little endian):
//!
//! ```text
//! "NSVR" | version u32 | config_len u32 | config JSON
//! bounds 6 x f32 | intensity_mean f32
//! n_slices u32 | n_slices x (stack u32, width u32, height u32,
//!                            res_x f32, res_y f32, thickness f32, pose 6 x f32)
//! record_len u64 | burn binary record
//! ```

use burn::module::Module;
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use rand::rngs::StdRng;
use rand::SeedableRng;

use svr_core::{Aabb, Point3, RigidTransform};

use crate::config::ReconstructionConfig;
use crate::data::SliceGeometry;
use crate::error::{NeuralSvrError, Result};
use crate::model::NesvorModel;

const MAGIC: &[u8; 4] = b"NSVR";
const VERSION: u32 = 1;

/// A trained reconstruction, detached from the optimiser.
#[derive(Debug, Clone)]
pub struct ModelSnapshot<B: Backend> {
    model: NesvorModel<B>,
    config: ReconstructionConfig,
    bounds: Aabb,
    geometries: Vec<SliceGeometry>,
    intensity_mean: f32,
}

impl<B: Backend> ModelSnapshot<B> {
    /// Bundle a model with the context needed to query it.
    pub fn new(
        model: NesvorModel<B>,
        config: ReconstructionConfig,
        bounds: Aabb,
        geometries: Vec<SliceGeometry>,
        intensity_mean: f32,
    ) -> Self {
        Self {
            model,
            config,
            bounds,
            geometries,
            intensity_mean,
        }
    }

    /// The learned model.
    pub fn model(&self) -> &NesvorModel<B> {
        &self.model
    }

    /// Configuration the model was trained with.
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// World box covered by the volume.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Geometry of every training slice.
    pub fn geometries(&self) -> &[SliceGeometry] {
        &self.geometries
    }

    /// Mean input intensity the training data was divided by.
    pub fn intensity_mean(&self) -> f32 {
        self.intensity_mean
    }

    /// Motion-corrected slice-to-world transforms.
    pub fn slice_transforms(&self) -> Vec<RigidTransform> {
        self.model.slices().transforms()
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .record(self.model.clone().into_record(), ())
            .map_err(|e| NeuralSvrError::Snapshot {
                message: format!("failed to record model: {e}"),
            })?;

        let config = self.config.to_string();
        let mut out = Vec::with_capacity(record.len() + config.len() + 64 * self.geometries.len());
        out.extend_from_slice(MAGIC);
        put_u32(&mut out, VERSION);
        put_u32(&mut out, config.len() as u32);
        out.extend_from_slice(config.as_bytes());
        for v in self.bounds.min.to_array().into_iter().chain(self.bounds.max.to_array()) {
            put_f32(&mut out, v);
        }
        put_f32(&mut out, self.intensity_mean);

        put_u32(&mut out, self.geometries.len() as u32);
        for g in &self.geometries {
            put_u32(&mut out, g.stack as u32);
            put_u32(&mut out, g.width as u32);
            put_u32(&mut out, g.height as u32);
            put_f32(&mut out, g.resolution_x);
            put_f32(&mut out, g.resolution_y);
            put_f32(&mut out, g.thickness);
            for v in g.initial.to_params() {
                put_f32(&mut out, v);
            }
        }

        out.extend_from_slice(&(record.len() as u64).to_le_bytes());
        out.extend_from_slice(&record);
        Ok(out)
    }

    /// Decode bytes produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8], device: &B::Device) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        if reader.take(4)? != MAGIC {
            return Err(snapshot_error("not a model snapshot"));
        }
        let version = reader.u32()?;
        if version != VERSION {
            return Err(snapshot_error(format!("unsupported snapshot version {version}")));
        }

        let config_len = reader.u32()? as usize;
        let config = ReconstructionConfig::load_binary(reader.take(config_len)?)
            .map_err(|e| snapshot_error(format!("invalid configuration: {e}")))?;

        let mut corners = [0.0f32; 6];
        for v in corners.iter_mut() {
            *v = reader.f32()?;
        }
        let bounds = Aabb::new(
            Point3::new(corners[0], corners[1], corners[2]),
            Point3::new(corners[3], corners[4], corners[5]),
        );
        let intensity_mean = reader.f32()?;

        let n_slices = reader.u32()? as usize;
        let mut geometries = Vec::with_capacity(n_slices.min(1 << 20));
        for _ in 0..n_slices {
            let stack = reader.u32()? as usize;
            let width = reader.u32()? as usize;
            let height = reader.u32()? as usize;
            let resolution_x = reader.f32()?;
            let resolution_y = reader.f32()?;
            let thickness = reader.f32()?;
            let mut params = [0.0f32; 6];
            for v in params.iter_mut() {
                *v = reader.f32()?;
            }
            let mut geometry = SliceGeometry::new(
                width,
                height,
                resolution_x,
                resolution_y,
                thickness,
                RigidTransform::from_params(params),
            )?;
            geometry.stack = stack;
            geometries.push(geometry);
        }

        let record_len = reader.u64()? as usize;
        let record_bytes = reader.take(record_len)?.to_vec();

        let initial: Vec<RigidTransform> = geometries.iter().map(|g| g.initial).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let model = NesvorModel::new(&config, bounds, &initial, &mut rng, device)?;
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(record_bytes, device)
            .map_err(|e| snapshot_error(format!("failed to load model record: {e}")))?;

        Ok(Self {
            model: model.load_record(record),
            config,
            bounds,
            geometries,
            intensity_mean,
        })
    }
}

fn snapshot_error(message: impl Into<String>) -> NeuralSvrError {
    NeuralSvrError::Snapshot {
        message: message.into(),
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| snapshot_error(format!("truncated snapshot at byte {}", self.offset)))?;
        let out = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BiasFieldConfig, HashEncoderConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn snapshot() -> ModelSnapshot<TestBackend> {
        let config = ReconstructionConfig::fast()
            .with_encoder(
                HashEncoderConfig::new()
                    .with_coarsest_resolution(8.0)
                    .with_finest_resolution(2.0)
                    .with_level_scale(2.0)
                    .with_log2_hashmap_size(9),
            )
            .with_bias(Some(BiasFieldConfig::new(1).with_width(4)));
        let bounds = Aabb::new(Point3::splat(-10.0), Point3::splat(10.0));
        let geometries: Vec<SliceGeometry> = (0..3)
            .map(|k| {
                SliceGeometry::new(
                    8,
                    6,
                    1.0,
                    1.0,
                    2.0,
                    RigidTransform::new([0.0, 0.1 * k as f32, 0.0], [0.0, 0.0, k as f32]),
                )
                .unwrap()
            })
            .collect();
        let initial: Vec<_> = geometries.iter().map(|g| g.initial).collect();
        let mut rng = StdRng::seed_from_u64(4);
        let model = NesvorModel::new(&config, bounds, &initial, &mut rng, &Default::default()).unwrap();
        ModelSnapshot::new(model, config, bounds, geometries, 123.5)
    }

    #[test]
    fn test_bytes_roundtrip() {
        let device = Default::default();
        let original = snapshot();
        let bytes = original.to_bytes().unwrap();
        let restored = ModelSnapshot::<TestBackend>::from_bytes(&bytes, &device).unwrap();

        assert_eq!(restored.bounds(), original.bounds());
        assert_eq!(restored.intensity_mean(), 123.5);
        assert_eq!(restored.geometries(), original.geometries());
        assert_eq!(restored.slice_transforms(), original.slice_transforms());

        let points = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0, 0.0], [3.3, -2.1, 7.5], [-9.0, 4.0, 1.0]],
            &device,
        );
        let a: Vec<f32> = original.model().density(points.clone()).to_data().to_vec().unwrap();
        let b: Vec<f32> = restored.model().density(points).to_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_corrupt_bytes() {
        let device = Default::default();
        let bytes = snapshot().to_bytes().unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            ModelSnapshot::<TestBackend>::from_bytes(&bad_magic, &device),
            Err(NeuralSvrError::Snapshot { .. })
        ));

        let truncated = &bytes[..bytes.len() / 2];
        assert!(ModelSnapshot::<TestBackend>::from_bytes(truncated, &device).is_err());
    }
}
