//! Rigid slice poses.
//!
//! A pose maps slice-local millimetres to world millimetres. Rotation is
//! stored as an axis-angle vector (direction = axis, norm = angle in
//! radians), which is also the parameterisation optimised per slice.

use crate::error::CoreError;
use crate::types::Point3;

/// 3×3 rotation matrix, row-major.
pub type Mat3 = [[f32; 3]; 3];

/// 4×4 homogeneous matrix, row-major.
pub type Mat4 = [[f32; 4]; 4];

const SMALL_ANGLE: f32 = 1e-4;
const NEAR_PI: f32 = core::f32::consts::PI - 1e-3;
const RIGID_TOLERANCE: f32 = 1e-3;

/// Rigid transform: `p ↦ R(rotation) · p + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RigidTransform {
    /// Axis-angle rotation vector in radians.
    pub rotation: [f32; 3],
    /// Translation in millimetres.
    pub translation: [f32; 3],
}

impl RigidTransform {
    /// The identity pose.
    pub const IDENTITY: Self = Self {
        rotation: [0.0; 3],
        translation: [0.0; 3],
    };

    /// Create a transform from an axis-angle vector and a translation.
    pub const fn new(rotation: [f32; 3], translation: [f32; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pure translation.
    pub const fn from_translation(translation: [f32; 3]) -> Self {
        Self::new([0.0; 3], translation)
    }

    /// Pack into the 6-vector `[rx, ry, rz, tx, ty, tz]` used by the optimiser.
    pub fn to_params(&self) -> [f32; 6] {
        let [rx, ry, rz] = self.rotation;
        let [tx, ty, tz] = self.translation;
        [rx, ry, rz, tx, ty, tz]
    }

    /// Inverse of [`Self::to_params`].
    pub fn from_params(p: [f32; 6]) -> Self {
        Self::new([p[0], p[1], p[2]], [p[3], p[4], p[5]])
    }

    /// Rotation angle in radians.
    pub fn angle(&self) -> f32 {
        Point3::from(self.rotation).length()
    }

    /// Rotation matrix via the Rodrigues formula.
    pub fn rotation_matrix(&self) -> Mat3 {
        axis_angle_to_matrix(self.rotation)
    }

    /// Homogeneous 4×4 matrix.
    pub fn to_matrix(&self) -> Mat4 {
        let r = self.rotation_matrix();
        let t = self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t[0]],
            [r[1][0], r[1][1], r[1][2], t[1]],
            [r[2][0], r[2][1], r[2][2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Build from a homogeneous matrix.
    ///
    /// Fails with [`CoreError::NotRigid`] unless the upper-left block is a
    /// proper rotation (orthonormal, determinant +1) and the last row is
    /// `[0, 0, 0, 1]`.
    pub fn from_matrix(m: &Mat4) -> Result<Self, CoreError> {
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CoreError::NotRigid);
        }
        let last = m[3];
        if libm::fabsf(last[0]) > RIGID_TOLERANCE
            || libm::fabsf(last[1]) > RIGID_TOLERANCE
            || libm::fabsf(last[2]) > RIGID_TOLERANCE
            || libm::fabsf(last[3] - 1.0) > RIGID_TOLERANCE
        {
            return Err(CoreError::NotRigid);
        }

        let r = [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ];
        for i in 0..3 {
            for j in 0..3 {
                let dot = r[0][i] * r[0][j] + r[1][i] * r[1][j] + r[2][i] * r[2][j];
                let expected = if i == j { 1.0 } else { 0.0 };
                if libm::fabsf(dot - expected) > RIGID_TOLERANCE {
                    return Err(CoreError::NotRigid);
                }
            }
        }
        if libm::fabsf(determinant(&r) - 1.0) > RIGID_TOLERANCE {
            return Err(CoreError::NotRigid);
        }

        Ok(Self::new(matrix_to_axis_angle(&r), [m[0][3], m[1][3], m[2][3]]))
    }

    /// Apply to a point.
    pub fn apply(&self, p: Point3) -> Point3 {
        let r = self.rotation_matrix();
        let t = self.translation;
        Point3::new(
            r[0][0] * p.x + r[0][1] * p.y + r[0][2] * p.z + t[0],
            r[1][0] * p.x + r[1][1] * p.y + r[1][2] * p.z + t[1],
            r[2][0] * p.x + r[2][1] * p.y + r[2][2] * p.z + t[2],
        )
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        let a = self.rotation_matrix();
        let b = other.rotation_matrix();
        let r = mat_mul(&a, &b);
        let t = self.apply(Point3::from(other.translation));
        Self::new(matrix_to_axis_angle(&r), t.to_array())
    }

    /// The transform undoing `self`.
    pub fn inverse(&self) -> Self {
        let r = self.rotation_matrix();
        let t = self.translation;
        let inv_t = [
            -(r[0][0] * t[0] + r[1][0] * t[1] + r[2][0] * t[2]),
            -(r[0][1] * t[0] + r[1][1] * t[1] + r[2][1] * t[2]),
            -(r[0][2] * t[0] + r[1][2] * t[1] + r[2][2] * t[2]),
        ];
        let [rx, ry, rz] = self.rotation;
        Self::new([-rx, -ry, -rz], inv_t)
    }

    /// Angle in radians of the rotation taking `self` to `other`.
    pub fn angle_to(&self, other: &Self) -> f32 {
        let a = self.rotation_matrix();
        let b = other.rotation_matrix();
        let mut trace = 0.0;
        for i in 0..3 {
            for k in 0..3 {
                trace += a[k][i] * b[k][i];
            }
        }
        libm::acosf(((trace - 1.0) * 0.5).clamp(-1.0, 1.0))
    }

    /// Euclidean distance between the two translations.
    pub fn translation_distance(&self, other: &Self) -> f32 {
        Point3::from(self.translation).distance(Point3::from(other.translation))
    }
}

/// Rodrigues formula `R = I + A·K + B·K²` with `K = [v]×`.
pub fn axis_angle_to_matrix(v: [f32; 3]) -> Mat3 {
    let theta2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    let theta = libm::sqrtf(theta2);
    let (a, b) = if theta < SMALL_ANGLE {
        (1.0 - theta2 / 6.0, 0.5 - theta2 / 24.0)
    } else {
        let half = libm::sinf(theta * 0.5);
        (libm::sinf(theta) / theta, 2.0 * half * half / theta2)
    };

    let k = [[0.0, -v[2], v[1]], [v[2], 0.0, -v[0]], [-v[1], v[0], 0.0]];
    let mut r = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let identity = if i == j { 1.0 } else { 0.0 };
            let k2 = v[i] * v[j] - if i == j { theta2 } else { 0.0 };
            r[i][j] = identity + a * k[i][j] + b * k2;
        }
    }
    r
}

/// Logarithm map of a proper rotation matrix.
pub fn matrix_to_axis_angle(r: &Mat3) -> [f32; 3] {
    let trace = r[0][0] + r[1][1] + r[2][2];
    let cos = ((trace - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = libm::acosf(cos);
    let w = [r[2][1] - r[1][2], r[0][2] - r[2][0], r[1][0] - r[0][1]];

    if theta < SMALL_ANGLE {
        return [0.5 * w[0], 0.5 * w[1], 0.5 * w[2]];
    }

    if theta > NEAR_PI {
        // sin θ vanishes; recover the axis from the symmetric part.
        let diag = [r[0][0], r[1][1], r[2][2]];
        let mut i = 0;
        for k in 1..3 {
            if diag[k] > diag[i] {
                i = k;
            }
        }
        let one_minus_cos = 1.0 - cos;
        let ai = libm::sqrtf(((diag[i] - cos) / one_minus_cos).max(0.0));
        let mut axis = [0.0f32; 3];
        for j in 0..3 {
            axis[j] = if j == i {
                ai
            } else {
                (r[i][j] + r[j][i]) / (2.0 * one_minus_cos * ai)
            };
        }
        let sign = if axis[0] * w[0] + axis[1] * w[1] + axis[2] * w[2] < 0.0 {
            -1.0
        } else {
            1.0
        };
        let norm = Point3::from(axis).length();
        return [
            sign * theta * axis[0] / norm,
            sign * theta * axis[1] / norm,
            sign * theta * axis[2] / norm,
        ];
    }

    let s = theta / (2.0 * libm::sinf(theta));
    [s * w[0], s * w[1], s * w[2]]
}

fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

fn determinant(r: &Mat3) -> f32 {
    r[0][0] * (r[1][1] * r[2][2] - r[1][2] * r[2][1])
        - r[0][1] * (r[1][0] * r[2][2] - r[1][2] * r[2][0])
        + r[0][2] * (r[1][0] * r[2][1] - r[1][1] * r[2][0])
}
