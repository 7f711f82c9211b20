//! Data-fidelity term.

use burn::prelude::*;

/// Mean squared error between rendered and observed pixels, variance
/// weighted when a variance is modelled.
///
/// With variance `σ²` each pixel contributes `(v - y)² / (2σ²) + ½ ln σ²`,
/// the negative Gaussian log-likelihood up to a constant. Without, it
/// contributes `(v - y)²`.
///
/// Input shapes: all [n]
/// Output shape: [1]
pub fn data_term<B: Backend>(
    predicted: Tensor<B, 1>,
    observed: Tensor<B, 1>,
    variance: Option<Tensor<B, 1>>,
) -> Tensor<B, 1> {
    let residual = (predicted - observed).powf_scalar(2.0);
    match variance {
        Some(var) => (residual / var.clone().mul_scalar(2.0) + var.log().mul_scalar(0.5)).mean(),
        None => residual.mean(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_plain_mse() {
        let device = Default::default();
        let v = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0], &device);
        let y = Tensor::<TestBackend, 1>::from_floats([1.0, 1.0, 1.0], &device);
        let loss: Vec<f32> = data_term(v, y, None).to_data().to_vec().unwrap();
        assert!((loss[0] - 5.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_high_variance_downweights_residual() {
        let device = Default::default();
        let v = Tensor::<TestBackend, 1>::from_floats([3.0], &device);
        let y = Tensor::<TestBackend, 1>::from_floats([1.0], &device);

        let unit = Tensor::<TestBackend, 1>::from_floats([1.0], &device);
        let loss: Vec<f32> = data_term(v.clone(), y.clone(), Some(unit)).to_data().to_vec().unwrap();
        assert!((loss[0] - 2.0).abs() < 1e-6);

        let noisy = Tensor::<TestBackend, 1>::from_floats([4.0], &device);
        let loss: Vec<f32> = data_term(v, y, Some(noisy)).to_data().to_vec().unwrap();
        assert!((loss[0] - (0.5 + 0.5 * 4f32.ln())).abs() < 1e-6);
    }
}
