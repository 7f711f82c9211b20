//! Batched axis-angle rotations as tensors.

use burn::prelude::*;

/// Below this squared angle the Rodrigues coefficients use their Taylor
/// expansions.
const SMALL_ANGLE2: f32 = 1e-4;

/// Skew-symmetric generators, row `i` is `[e_i]×` flattened row-major.
const GENERATORS: [f32; 27] = [
    0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, //
    0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// Rodrigues formula for a batch of axis-angle vectors.
///
/// Input shape: [n, 3]
/// Output shape: [n, 3, 3] (row-major rotation matrices)
pub fn axis_angle_to_matrix<B: Backend>(v: Tensor<B, 2>) -> Tensor<B, 3> {
    let device = v.device();
    let [n, _] = v.dims();

    let theta2 = (v.clone() * v.clone()).sum_dim(1);
    let small = theta2.clone().lower_elem(SMALL_ANGLE2);
    // Keeps the unused branch finite at θ = 0.
    let safe2 = theta2.clone().mask_fill(small.clone(), 1.0);
    let theta = safe2.clone().sqrt();

    // A = sin(θ)/θ ≈ 1 - θ²/6
    let a = (theta.clone().sin() / theta.clone())
        .mask_where(small.clone(), theta2.clone().mul_scalar(-1.0 / 6.0).add_scalar(1.0));
    // B = 2 sin²(θ/2)/θ² = (1 - cos θ)/θ² ≈ 1/2 - θ²/24
    let half = theta.mul_scalar(0.5).sin();
    let b = (half.clone() * half * 2.0 / safe2)
        .mask_where(small, theta2.mul_scalar(-1.0 / 24.0).add_scalar(0.5));

    let generators =
        Tensor::<B, 2>::from_data(TensorData::new(GENERATORS.to_vec(), [3, 9]), &device);
    let k = v.matmul(generators).reshape([n, 3, 3]);
    let k2 = k.clone().matmul(k.clone());

    let identity = Tensor::<B, 3>::from_data(
        TensorData::new(vec![1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], [1, 3, 3]),
        &device,
    )
    .repeat_dim(0, n);

    identity + k * a.reshape([n, 1, 1]) + k2 * b.reshape([n, 1, 1])
}

/// Apply per-row rigid poses to groups of points.
///
/// Input shapes: pose [n, 6] (`[rx, ry, rz, tx, ty, tz]`), points [n, s, 3]
/// Output shape: [n, s, 3]
pub fn transform_points<B: Backend>(pose: Tensor<B, 2>, points: Tensor<B, 3>) -> Tensor<B, 3> {
    let [n, _] = pose.dims();
    let rotation = axis_angle_to_matrix(pose.clone().slice([0..n, 0..3]));
    let translation = pose.slice([0..n, 3..6]).reshape([n, 1, 3]);
    points.matmul(rotation.swap_dims(1, 2)) + translation
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use svr_core::{Point3, RigidTransform};

    type TestBackend = NdArray;

    #[test]
    fn test_matches_host_rodrigues() {
        let device = Default::default();
        let poses = [
            RigidTransform::new([0.0, 0.0, 0.0], [1.0, 2.0, 3.0]),
            RigidTransform::new([0.3, -0.2, 0.5], [4.0, -1.0, 2.5]),
            RigidTransform::new([0.0, 1.5, 0.0], [0.0, 0.0, 0.0]),
        ];
        let params: Vec<f32> = poses.iter().flat_map(|p| p.to_params()).collect();
        let pose = Tensor::<TestBackend, 2>::from_data(TensorData::new(params, [3, 6]), &device);

        let local = Point3::new(1.5, -0.5, 2.0);
        let points = Tensor::<TestBackend, 3>::from_data(
            TensorData::new([local.x, local.y, local.z].repeat(3), [3, 1, 3]),
            &device,
        );
        let world: Vec<f32> = transform_points(pose, points).to_data().to_vec().unwrap();

        for (i, p) in poses.iter().enumerate() {
            let expected = p.apply(local);
            let got = Point3::new(world[i * 3], world[i * 3 + 1], world[i * 3 + 2]);
            assert!(got.distance(expected) < 1e-4, "{:?} vs {:?}", got, expected);
        }
    }

    /// `sum(transform_points(pose, points) * weights)` for three poses and
    /// two points each.
    fn weighted_sum<B: Backend>(pose: Tensor<B, 2>) -> Tensor<B, 1> {
        let device = pose.device();
        let points: Vec<f32> = [1.5, -0.5, 2.0, -2.0, 0.7, 1.1].repeat(3);
        let weights: Vec<f32> = (0..18).map(|i| ((i * 7 % 5) as f32 - 2.0) * 0.5).collect();
        let points = Tensor::<B, 3>::from_data(TensorData::new(points, [3, 2, 3]), &device);
        let weights = Tensor::<B, 3>::from_data(TensorData::new(weights, [3, 2, 3]), &device);
        (transform_points(pose, points) * weights).sum()
    }

    #[test]
    fn test_pose_gradient_matches_finite_difference() {
        type B = Autodiff<NdArray>;
        let device = Default::default();
        // A generic pose, the identity rotation and a rotation near the
        // small-angle branch.
        let params = vec![
            0.3, -0.2, 0.5, 4.0, -1.0, 2.5, //
            0.0, 0.0, 0.0, 1.0, 2.0, 3.0, //
            0.004, -0.003, 0.002, 0.0, 0.5, 0.0,
        ];
        let pose = Tensor::<B, 2>::from_data(TensorData::new(params.clone(), [3, 6]), &device)
            .require_grad();
        let grads = weighted_sum(pose.clone()).backward();
        let analytic: Vec<f32> = pose.grad(&grads).unwrap().to_data().to_vec().unwrap();

        let h = 1e-2;
        let eval = |params: Vec<f32>| -> f32 {
            let pose = Tensor::<NdArray, 2>::from_data(TensorData::new(params, [3, 6]), &device);
            weighted_sum(pose).into_scalar()
        };
        for i in 0..params.len() {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += h;
            minus[i] -= h;
            let numeric = (eval(plus) - eval(minus)) / (2.0 * h);
            assert!(
                (analytic[i] - numeric).abs() <= 1e-2 * numeric.abs().max(1.0),
                "component {i}: autodiff {} vs finite difference {numeric}",
                analytic[i]
            );
        }
    }

    #[test]
    fn test_identity_rotation_is_exact() {
        let device = Default::default();
        let v = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let m: Vec<f32> = axis_angle_to_matrix(v).to_data().to_vec().unwrap();
        let expected = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0].repeat(2);
        assert_eq!(m, expected);
    }
}
