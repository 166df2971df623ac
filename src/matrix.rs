//! Square matrices, used here as 3x3 rotation (direction cosine) matrices.

use core::ops::{Index, IndexMut, Mul};

use nalgebra::SMatrix;

use crate::vector::{Real, Vector};

/// An `N x N` matrix of scalars, accessed as `(row, column)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix<T: Real, const N: usize>(SMatrix<T, N, N>);

/// A 3x3 matrix.
pub type Matrix3<T> = Matrix<T, 3>;

impl<T: Real, const N: usize> Matrix<T, N> {
    /// The identity matrix.
    #[must_use]
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// The zero matrix.
    #[must_use]
    pub fn zeros() -> Self {
        Self(SMatrix::zeros())
    }

    /// Builds a matrix from row arrays.
    #[must_use]
    pub fn from_rows(rows: [[T; N]; N]) -> Self {
        Self(SMatrix::from_fn(|row, column| rows[row][column]))
    }

    /// The transposed matrix. For a rotation matrix this is its inverse.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    /// Maps `vector` through the transposed matrix.
    ///
    /// For a body to navigation rotation this is the navigation to body
    /// transformation, without forming the transpose.
    #[must_use]
    pub fn reverse_map(&self, vector: &Vector<T, N>) -> Vector<T, N> {
        Vector::from(self.0.tr_mul(&vector.into_inner()))
    }

    /// One row as a vector.
    #[must_use]
    pub fn row(&self, row: usize) -> Vector<T, N> {
        Vector::from(self.0.row(row).transpose())
    }

    /// One column as a vector.
    #[must_use]
    pub fn column(&self, column: usize) -> Vector<T, N> {
        Vector::from(self.0.column(column).into_owned())
    }

    /// The underlying nalgebra matrix.
    #[must_use]
    pub fn into_inner(self) -> SMatrix<T, N, N> {
        self.0
    }
}

impl<T: Real, const N: usize> Default for Matrix<T, N> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T: Real, const N: usize> From<SMatrix<T, N, N>> for Matrix<T, N> {
    fn from(inner: SMatrix<T, N, N>) -> Self {
        Self(inner)
    }
}

impl<T: Real, const N: usize> From<Matrix<T, N>> for SMatrix<T, N, N> {
    fn from(matrix: Matrix<T, N>) -> Self {
        matrix.0
    }
}

/// Indexing panics if either index is out of range.
impl<T: Real, const N: usize> Index<(usize, usize)> for Matrix<T, N> {
    type Output = T;

    #[inline]
    fn index(&self, index: (usize, usize)) -> &T {
        &self.0[index]
    }
}

impl<T: Real, const N: usize> IndexMut<(usize, usize)> for Matrix<T, N> {
    #[inline]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut T {
        &mut self.0[index]
    }
}

impl<T: Real, const N: usize> Mul<Vector<T, N>> for Matrix<T, N> {
    type Output = Vector<T, N>;

    fn mul(self, right: Vector<T, N>) -> Vector<T, N> {
        Vector::from(self.0 * right.into_inner())
    }
}

impl<T: Real, const N: usize> Mul for Matrix<T, N> {
    type Output = Self;

    fn mul(self, right: Self) -> Self {
        Self(self.0 * right.0)
    }
}
