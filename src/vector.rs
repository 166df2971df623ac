//! Fixed-size numeric vectors.
//!
//! [`Vector`] is a thin value type over nalgebra's [`SVector`]: the size is a
//! const generic, so mixing sizes is a compile error, and the cross product
//! only exists for [`Vector3`].

use core::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

use nalgebra::{RealField, SVector};

use crate::error::AlgebraError;

/// Scalar types usable in [`Vector`], [`crate::Matrix`] and
/// [`crate::Quaternion`]; in practice `f32` or `f64`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Convert an `f64` literal into the scalar type `T`.
#[inline]
pub(crate) fn real<T: Real>(value: f64) -> T {
    nalgebra::convert(value)
}

/// An `N` element vector of scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector<T: Real, const N: usize>(SVector<T, N>);

/// A 3 element vector, the workhorse of the estimator.
pub type Vector3<T> = Vector<T, 3>;

/// A 4 element vector, the storage of [`crate::Quaternion`].
pub type Vector4<T> = Vector<T, 4>;

impl<T: Real, const N: usize> Vector<T, N> {
    /// Creates a vector from its elements.
    #[must_use]
    pub fn new(elements: [T; N]) -> Self {
        Self(SVector::from(elements))
    }

    /// The zero vector.
    #[must_use]
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    /// Scalar (dot) product.
    #[must_use]
    pub fn dot(&self, right: &Self) -> T {
        self.0.dot(&right.0)
    }

    /// Euclidean norm, `sqrt(sum of squares)`.
    #[must_use]
    pub fn norm(&self) -> T {
        self.0.norm()
    }

    /// Sets all elements to zero.
    pub fn set_zero(&mut self) {
        self.0.fill(nalgebra::zero());
    }

    /// Negates all elements in place.
    pub fn negate(&mut self) -> &mut Self {
        self.0.neg_mut();
        self
    }

    /// Scales the vector to unit length in place.
    ///
    /// # Errors
    ///
    /// Returns [`AlgebraError::ZeroNorm`] if the norm is zero or not finite;
    /// the vector is left unchanged.
    pub fn normalize(&mut self) -> Result<&mut Self, AlgebraError> {
        *self = self.normalized()?;
        Ok(self)
    }

    /// Returns a unit length copy of this vector.
    ///
    /// # Errors
    ///
    /// Returns [`AlgebraError::ZeroNorm`] if the norm is zero or not finite.
    pub fn normalized(&self) -> Result<Self, AlgebraError> {
        let norm = self.norm();
        if norm > nalgebra::zero() && norm.is_finite() {
            Ok(Self(self.0 / norm))
        } else {
            Err(AlgebraError::ZeroNorm)
        }
    }

    /// Element access without panicking.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.0.get(index).copied()
    }

    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.0.as_slice()
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl FnMut(T) -> T) -> Self {
        Self(self.0.map(f))
    }

    /// The underlying nalgebra vector.
    #[must_use]
    pub fn into_inner(self) -> SVector<T, N> {
        self.0
    }
}

impl<T: Real> Vector<T, 3> {
    /// Creates a 3-vector from its components.
    #[must_use]
    pub fn from_xyz(x: T, y: T, z: T) -> Self {
        Self::new([x, y, z])
    }

    /// Vector (cross) product.
    #[must_use]
    pub fn cross(&self, right: &Self) -> Self {
        Self(self.0.cross(&right.0))
    }
}

impl<T: Real, const N: usize> Default for Vector<T, N> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T: Real, const N: usize> From<[T; N]> for Vector<T, N> {
    fn from(elements: [T; N]) -> Self {
        Self::new(elements)
    }
}

impl<T: Real, const N: usize> From<SVector<T, N>> for Vector<T, N> {
    fn from(inner: SVector<T, N>) -> Self {
        Self(inner)
    }
}

impl<T: Real, const N: usize> From<Vector<T, N>> for SVector<T, N> {
    fn from(vector: Vector<T, N>) -> Self {
        vector.0
    }
}

/// Indexing panics if `index >= N`, in every build configuration. Use
/// [`Vector::get`] for a checked access.
impl<T: Real, const N: usize> Index<usize> for Vector<T, N> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.0[index]
    }
}

impl<T: Real, const N: usize> IndexMut<usize> for Vector<T, N> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.0[index]
    }
}

impl<T: Real, const N: usize> Add for Vector<T, N> {
    type Output = Self;

    fn add(self, right: Self) -> Self {
        Self(self.0 + right.0)
    }
}

impl<T: Real, const N: usize> Sub for Vector<T, N> {
    type Output = Self;

    fn sub(self, right: Self) -> Self {
        Self(self.0 - right.0)
    }
}

impl<T: Real, const N: usize> Neg for Vector<T, N> {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

/// Scalar product of two vectors.
impl<T: Real, const N: usize> Mul for Vector<T, N> {
    type Output = T;

    fn mul(self, right: Self) -> T {
        self.dot(&right)
    }
}

impl<T: Real, const N: usize> Mul<T> for Vector<T, N> {
    type Output = Self;

    fn mul(self, right: T) -> Self {
        Self(self.0 * right)
    }
}

impl<T: Real, const N: usize> Div<T> for Vector<T, N> {
    type Output = Self;

    fn div(self, right: T) -> Self {
        Self(self.0 / right)
    }
}

impl<T: Real, const N: usize> AddAssign for Vector<T, N> {
    fn add_assign(&mut self, right: Self) {
        self.0 += right.0;
    }
}

impl<T: Real, const N: usize> SubAssign for Vector<T, N> {
    fn sub_assign(&mut self, right: Self) {
        self.0 -= right.0;
    }
}

impl<T: Real, const N: usize> MulAssign<T> for Vector<T, N> {
    fn mul_assign(&mut self, right: T) {
        self.0 *= right;
    }
}
