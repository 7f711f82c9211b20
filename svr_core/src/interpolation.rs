//! Trilinear interpolation weights.
//!
//! Corner order is shared by the CPU helpers here and the tensor encoder in
//! `neural_svr`, so weights computed on either side line up.

/// Offsets of the eight cell corners, in weight order.
pub const CORNER_OFFSETS: [[u32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Trilinear weights for a fractional position `frac ∈ [0, 1]³` within a cell.
///
/// Weights are non-negative and sum to 1.
#[inline]
pub fn compute_trilinear_weights(frac: [f32; 3]) -> [f32; 8] {
    let mut weights = [0.0f32; 8];
    for (w, offset) in weights.iter_mut().zip(CORNER_OFFSETS.iter()) {
        let mut product = 1.0;
        for axis in 0..3 {
            product *= if offset[axis] == 1 {
                frac[axis]
            } else {
                1.0 - frac[axis]
            };
        }
        *w = product;
    }
    weights
}

/// Interpolate eight corner values (in [`CORNER_OFFSETS`] order).
#[inline]
pub fn trilinear_interpolate(values: &[f32; 8], frac: [f32; 3]) -> f32 {
    compute_trilinear_weights(frac)
        .iter()
        .zip(values.iter())
        .map(|(w, v)| w * v)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        for frac in [[0.0, 0.0, 0.0], [0.25, 0.5, 0.75], [1.0, 1.0, 1.0], [0.9, 0.1, 0.4]] {
            let sum: f32 = compute_trilinear_weights(frac).iter().sum();
            assert!(libm::fabsf(sum - 1.0) < 1e-6);
        }
    }

    #[test]
    fn test_corner_weights_select_corner() {
        for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
            let frac = [offset[0] as f32, offset[1] as f32, offset[2] as f32];
            let weights = compute_trilinear_weights(frac);
            assert_eq!(weights[i], 1.0);
        }
    }

    #[test]
    fn test_linear_function_is_exact() {
        // f(x, y, z) = x + 2y + 3z is reproduced exactly.
        let mut values = [0.0f32; 8];
        for (v, o) in values.iter_mut().zip(CORNER_OFFSETS.iter()) {
            *v = o[0] as f32 + 2.0 * o[1] as f32 + 3.0 * o[2] as f32;
        }
        let frac = [0.3, 0.6, 0.2];
        let expected = 0.3 + 1.2 + 0.6;
        assert!(libm::fabsf(trilinear_interpolate(&values, frac) - expected) < 1e-6);
    }
}
