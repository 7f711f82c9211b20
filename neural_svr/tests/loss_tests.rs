//! Loss composition tests.

use burn::backend::{Autodiff, NdArray};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use neural_svr::loss::LossOutput;
use neural_svr::prelude::*;

type TestBackend = Autodiff<NdArray>;

fn model(config: &ReconstructionConfig) -> NesvorModel<TestBackend> {
    let bounds = Aabb::new(Point3::splat(-10.0), Point3::splat(10.0));
    let initial = [
        RigidTransform::from_translation([0.0, 0.0, -2.0]),
        RigidTransform::new([0.05, 0.0, 0.0], [0.0, 0.0, 2.0]),
    ];
    let mut rng = StdRng::seed_from_u64(17);
    NesvorModel::new(config, bounds, &initial, &mut rng, &Default::default()).unwrap()
}

fn config(loss: LossConfig) -> ReconstructionConfig {
    ReconstructionConfig::fast()
        .with_encoder(
            HashEncoderConfig::new()
                .with_coarsest_resolution(8.0)
                .with_finest_resolution(1.0)
                .with_level_scale(2.0)
                .with_log2_hashmap_size(10),
        )
        .with_bias(Some(BiasFieldConfig::new(1)))
        .with_loss(loss)
}

fn query() -> RenderQuery {
    let psf = PsfSigma::for_slice(1.0, 1.0, 2.0).unwrap();
    let mut query = RenderQuery::new();
    for i in 0..12 {
        let x = i as f32 - 6.0;
        query.push(i % 2, [x, 0.5 * x, 0.0], psf);
    }
    query
}

/// Render the fixed query and evaluate the loss on a fresh graph.
fn evaluate(model: &NesvorModel<TestBackend>, loss: &ReconstructionLoss) -> LossOutput<TestBackend> {
    let device = Default::default();
    let query = query();
    let rendered = PsfRenderer::new(8, Some(5)).render(model, &query, &device);
    let observed = Tensor::<TestBackend, 1>::ones([query.len()], &device);
    loss.evaluate(model, &rendered, observed)
}

fn table_grad(model: &NesvorModel<TestBackend>, loss: Tensor<TestBackend, 1>) -> Vec<f32> {
    let grads = loss.backward();
    let grad = model.encoder().table().grad(&grads).unwrap();
    grad.to_data().to_vec().unwrap()
}

fn pose_grad(model: &NesvorModel<TestBackend>, loss: Tensor<TestBackend, 1>) -> Vec<f32> {
    let grads = loss.backward();
    let grad = model.slices().pose().grad(&grads).unwrap();
    grad.to_data().to_vec().unwrap()
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() <= 1e-6 * x.abs().max(y.abs()).max(1.0), "{x} vs {y}");
    }
}

#[test]
fn test_zero_weights_leave_data_transform_and_bias_only() {
    let loss_config = LossConfig::new().with_weight_image(0.0).with_weight_deform(0.0);
    let model = model(&config(loss_config.clone()));
    let loss = ReconstructionLoss::new(loss_config);

    let out = evaluate(&model, &loss);
    let breakdown = out.breakdown();
    assert_eq!(breakdown.image, 0.0);
    assert_eq!(breakdown.deformation, 0.0);
    let reduced = breakdown.data + breakdown.transformation + breakdown.bias;
    assert!((breakdown.total - reduced).abs() <= 1e-6 * reduced.abs().max(1.0));

    let full_table = table_grad(&model, out.total);
    let out = evaluate(&model, &loss);
    let reduced_table = table_grad(&model, out.data + out.transformation + out.bias);
    assert_close(&full_table, &reduced_table);

    let full_pose = pose_grad(&model, evaluate(&model, &loss).total);
    let out = evaluate(&model, &loss);
    let reduced_pose = pose_grad(&model, out.data + out.transformation + out.bias);
    assert_close(&full_pose, &reduced_pose);
}

#[test]
fn test_image_term_contributes_gradient_when_weighted() {
    let loss_config = LossConfig::new()
        .with_weight_image(2.0)
        .with_image_regularization(ImageRegularization::L2);
    let model = model(&config(loss_config.clone()));
    let loss = ReconstructionLoss::new(loss_config);

    let out = evaluate(&model, &loss);
    assert!(out.breakdown().image > 0.0);
    let full_table = table_grad(&model, out.total);

    let out = evaluate(&model, &loss);
    let reduced_table = table_grad(&model, out.data + out.transformation + out.bias);
    assert!(full_table
        .iter()
        .zip(&reduced_table)
        .any(|(a, b)| (a - b).abs() > 1e-9));
}

#[test]
fn test_transformation_term_measures_drift() {
    let loss_config = LossConfig::new().with_weight_transformation(0.1);
    let model = model(&config(loss_config.clone()));
    let loss = ReconstructionLoss::new(loss_config);

    // Poses start at their initial values.
    assert_eq!(evaluate(&model, &loss).breakdown().transformation, 0.0);
}
