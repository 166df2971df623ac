//! Attitude quaternion with Euler angle and rotation matrix conversions.
//!
//! A [`Quaternion`] `[e0, e1, e2, e3]` (`e0` being the scalar part) describes
//! the rotation from the body frame (front, right, bottom) into the
//! navigation frame (north, east, down). Euler angles follow the 3-2-1
//! convention: yaw, then pitch (nick), then roll.

use core::ops::{Index, Mul};

use nalgebra::UnitQuaternion;

use crate::error::AlgebraError;
use crate::matrix::Matrix3;
use crate::vector::{real, Real, Vector3, Vector4};

/// Roll, pitch and yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EulerAngles<T> {
    /// Rotation about the body front axis.
    pub roll: T,
    /// Rotation about the body right axis.
    pub pitch: T,
    /// Rotation about the navigation down axis, the heading.
    pub yaw: T,
}

impl<T: Copy> EulerAngles<T> {
    /// Creates an Euler angle triple.
    pub fn new(roll: T, pitch: T, yaw: T) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Glider pilots call the pitch angle "nick".
    pub fn nick(&self) -> T {
        self.pitch
    }
}

/// A unit quaternion representing the body to navigation rotation.
///
/// The norm is one after every public operation; the additive update in
/// [`Quaternion::rotate`] restores it before returning.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quaternion<T: Real>(Vector4<T>);

impl<T: Real> Quaternion<T> {
    /// The identity rotation, body frame aligned with the navigation frame.
    #[must_use]
    pub fn identity() -> Self {
        let zero = nalgebra::zero();
        Self(Vector4::new([nalgebra::one(), zero, zero, zero]))
    }

    /// Builds a quaternion from arbitrary components, normalizing them.
    ///
    /// # Errors
    ///
    /// Returns [`AlgebraError::ZeroNorm`] for an all-zero input.
    pub fn from_components(e0: T, e1: T, e2: T, e3: T) -> Result<Self, AlgebraError> {
        Vector4::new([e0, e1, e2, e3]).normalized().map(Self)
    }

    /// Builds the quaternion from a 3-2-1 Euler sequence (yaw, then pitch,
    /// then roll).
    #[must_use]
    pub fn from_euler(roll: T, pitch: T, yaw: T) -> Self {
        let half = real::<T>(0.5);
        let (sin_phi, cos_phi) = (roll * half).sin_cos();
        let (sin_theta, cos_theta) = (pitch * half).sin_cos();
        let (sin_psi, cos_psi) = (yaw * half).sin_cos();

        Self(Vector4::new([
            cos_phi * cos_theta * cos_psi + sin_phi * sin_theta * sin_psi,
            sin_phi * cos_theta * cos_psi - cos_phi * sin_theta * sin_psi,
            cos_phi * sin_theta * cos_psi + sin_phi * cos_theta * sin_psi,
            cos_phi * cos_theta * sin_psi - sin_phi * sin_theta * cos_psi,
        ]))
    }

    /// Inverse of [`Quaternion::rotation_matrix`].
    ///
    /// Picks the numerically largest component first (Shepperd's method) so
    /// rotations close to 180 degrees stay well-conditioned, then
    /// renormalizes to absorb round-off in the matrix.
    #[must_use]
    pub fn from_rotation_matrix(m: &Matrix3<T>) -> Self {
        let one = nalgebra::one::<T>();
        let quarter = real::<T>(0.25);
        let half = real::<T>(0.5);
        let trace = m[(0, 0)] + m[(1, 1)] + m[(2, 2)];

        let e = if trace >= m[(0, 0)] && trace >= m[(1, 1)] && trace >= m[(2, 2)] {
            let e0 = (one + trace).max(nalgebra::zero()).sqrt() * half;
            let f = quarter / e0;
            [
                e0,
                f * (m[(2, 1)] - m[(1, 2)]),
                f * (m[(0, 2)] - m[(2, 0)]),
                f * (m[(1, 0)] - m[(0, 1)]),
            ]
        } else if m[(0, 0)] >= m[(1, 1)] && m[(0, 0)] >= m[(2, 2)] {
            let e1 = (one + m[(0, 0)] - m[(1, 1)] - m[(2, 2)]).sqrt() * half;
            let f = quarter / e1;
            [
                f * (m[(2, 1)] - m[(1, 2)]),
                e1,
                f * (m[(0, 1)] + m[(1, 0)]),
                f * (m[(0, 2)] + m[(2, 0)]),
            ]
        } else if m[(1, 1)] >= m[(2, 2)] {
            let e2 = (one - m[(0, 0)] + m[(1, 1)] - m[(2, 2)]).sqrt() * half;
            let f = quarter / e2;
            [
                f * (m[(0, 2)] - m[(2, 0)]),
                f * (m[(0, 1)] + m[(1, 0)]),
                e2,
                f * (m[(1, 2)] + m[(2, 1)]),
            ]
        } else {
            let e3 = (one - m[(0, 0)] - m[(1, 1)] + m[(2, 2)]).sqrt() * half;
            let f = quarter / e3;
            [
                f * (m[(1, 0)] - m[(0, 1)]),
                f * (m[(0, 2)] + m[(2, 0)]),
                f * (m[(1, 2)] + m[(2, 1)]),
                e3,
            ]
        };

        let mut q = Self(Vector4::new(e));
        q.renormalize();
        q
    }

    /// Euler angles of this attitude.
    ///
    /// Near a pitch of +-90 degrees the `asin` saturates and roll and yaw are
    /// no longer separable; use the quaternion or rotation matrix there.
    #[must_use]
    pub fn euler(&self) -> EulerAngles<T> {
        let [e0, e1, e2, e3] = self.components();
        let one = nalgebra::one::<T>();
        let two = real::<T>(2.0);

        let sin_pitch = (two * (e0 * e2 - e3 * e1)).clamp(-one, one);

        EulerAngles {
            roll: (two * (e0 * e1 + e2 * e3)).atan2(e0 * e0 - e1 * e1 - e2 * e2 + e3 * e3),
            pitch: sin_pitch.asin(),
            yaw: (two * (e0 * e3 + e1 * e2)).atan2(e0 * e0 + e1 * e1 - e2 * e2 - e3 * e3),
        }
    }

    /// The body to navigation direction cosine matrix.
    #[must_use]
    pub fn rotation_matrix(&self) -> Matrix3<T> {
        let [e0, e1, e2, e3] = self.components();
        let one = nalgebra::one::<T>();
        let two = real::<T>(2.0);

        Matrix3::from_rows([
            [
                two * (e0 * e0 + e1 * e1) - one,
                two * (e1 * e2 - e0 * e3),
                two * (e1 * e3 + e0 * e2),
            ],
            [
                two * (e1 * e2 + e0 * e3),
                two * (e0 * e0 + e2 * e2) - one,
                two * (e2 * e3 - e0 * e1),
            ],
            [
                two * (e1 * e3 - e0 * e2),
                two * (e2 * e3 + e0 * e1),
                two * (e0 * e0 + e3 * e3) - one,
            ],
        ])
    }

    /// Applies a small body-frame rotation `(p, q, r)`, given in radians for
    /// one sample interval.
    ///
    /// This is the linearized update `q += 1/2 q * (0, p, q, r)` followed by
    /// renormalization, not an exact composition. It is only valid for small
    /// increments, as produced by one gyro sample.
    pub fn rotate(&mut self, p: T, q: T, r: T) {
        let [e0, e1, e2, e3] = self.components();
        let half = real::<T>(0.5);
        let (p, q, r) = (p * half, q * half, r * half);

        self.0[0] += -e1 * p - e2 * q - e3 * r;
        self.0[1] += e0 * p + e2 * r - e3 * q;
        self.0[2] += e0 * q - e1 * r + e3 * p;
        self.0[3] += e0 * r + e1 * q - e2 * p;

        self.renormalize();
    }

    /// Like [`Quaternion::rotate`], taking the rotation as a vector.
    pub fn rotate_by(&mut self, rotation: &Vector3<T>) {
        self.rotate(rotation[0], rotation[1], rotation[2]);
    }

    /// North component of the body front axis in the navigation frame.
    #[must_use]
    pub fn north(&self) -> T {
        let [e0, e1, e2, e3] = self.components();
        e0 * e0 + e1 * e1 - e2 * e2 - e3 * e3
    }

    /// East component of the body front axis in the navigation frame.
    #[must_use]
    pub fn east(&self) -> T {
        let [e0, e1, e2, e3] = self.components();
        real::<T>(2.0) * (e0 * e3 + e1 * e2)
    }

    /// Down component of the body front axis in the navigation frame.
    #[must_use]
    pub fn down(&self) -> T {
        let [e0, e1, e2, e3] = self.components();
        real::<T>(2.0) * (e1 * e3 - e0 * e2)
    }

    /// Heading (yaw) in radians, in `(-pi, pi]`.
    #[must_use]
    pub fn heading(&self) -> T {
        self.east().atan2(self.north())
    }

    /// The conjugate, i.e. the navigation to body rotation.
    #[must_use]
    pub fn conjugate(&self) -> Self {
        let [e0, e1, e2, e3] = self.components();
        Self(Vector4::new([e0, -e1, -e2, -e3]))
    }

    /// The four components `[e0, e1, e2, e3]`.
    #[must_use]
    pub fn components(&self) -> [T; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    /// Norm of the underlying 4-vector.
    #[must_use]
    pub fn norm(&self) -> T {
        self.0.norm()
    }

    /// Restores unit norm. Every quaternion built by this type has a norm of
    /// at least one half at this point, so the division is safe.
    fn renormalize(&mut self) {
        let norm = self.0.norm();
        self.0 *= nalgebra::one::<T>() / norm;
    }
}

impl<T: Real> Default for Quaternion<T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T: Real> Index<usize> for Quaternion<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.0[index]
    }
}

/// Hamilton product: `left * right` rotates by `right` first, then by `left`.
impl<T: Real> Mul for Quaternion<T> {
    type Output = Self;

    fn mul(self, right: Self) -> Self {
        let [w1, x1, y1, z1] = self.components();
        let [w2, x2, y2, z2] = right.components();

        let mut product = Self(Vector4::new([
            w1 * w2 - x1 * x2 - y1 * y2 - z1 * z2,
            w1 * x2 + x1 * w2 + y1 * z2 - z1 * y2,
            w1 * y2 - x1 * z2 + y1 * w2 + z1 * x2,
            w1 * z2 + x1 * y2 - y1 * x2 + z1 * w2,
        ]));
        product.renormalize();
        product
    }
}

impl<T: Real> From<Quaternion<T>> for EulerAngles<T> {
    fn from(q: Quaternion<T>) -> Self {
        q.euler()
    }
}

impl<T: Real> From<EulerAngles<T>> for Quaternion<T> {
    fn from(euler: EulerAngles<T>) -> Self {
        Self::from_euler(euler.roll, euler.pitch, euler.yaw)
    }
}

impl<T: Real> From<Quaternion<T>> for UnitQuaternion<T> {
    fn from(q: Quaternion<T>) -> Self {
        let [e0, e1, e2, e3] = q.components();
        UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(e0, e1, e2, e3))
    }
}

impl<T: Real> From<UnitQuaternion<T>> for Quaternion<T> {
    fn from(q: UnitQuaternion<T>) -> Self {
        Self(Vector4::new([q.w, q.i, q.j, q.k]))
    }
}
