//! Value + gradient buffers.
//!
//! # Blobs
//!
//! A [`Blob`] pairs a flat row-major value buffer (`data`) with a gradient
//! buffer of the same length (`diff`), shaped `num × channels × height × width`.
//! The first axis indexes examples; the remaining three make up one example's
//! features, stored contiguously.
//!
//! Layers never allocate blobs. They read `data`, write `diff`, and resize the
//! blobs they own the shape of (their outputs) through [`Blob::reshape`].
//!
//! ## Example
//!
//! ```rust
//! use angle_loss::blob::{Blob, BlobShape};
//! let b = Blob::from_data(BlobShape::new(2, 3, 1, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! assert_eq!(b.stride(), 3);
//! assert_eq!(b.example(1), &[4.0, 5.0, 6.0]);
//! ```

use crate::error::LayerError;
use crate::Real;
use briny::prelude::{Validate, ValidationError};
use core::fmt;

/// Shape of a 4-axis blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlobShape {
    pub num: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl BlobShape {
    /// Creates a shape from its four axes.
    #[must_use]
    pub const fn new(num: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            num,
            channels,
            height,
            width,
        }
    }

    /// The single-element shape of a scalar output.
    #[must_use]
    pub const fn scalar() -> Self {
        Self::new(1, 1, 1, 1)
    }

    /// Total element count.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.num * self.stride()
    }

    /// Elements per example (`channels × height × width`).
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.channels * self.height * self.width
    }
}

impl Validate for BlobShape {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.channels == 0 || self.height == 0 || self.width == 0 {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl fmt::Display for BlobShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            self.num, self.channels, self.height, self.width
        )
    }
}

/// A buffer of values and their gradients.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blob<T> {
    shape: BlobShape,
    data: Vec<T>,
    diff: Vec<T>,
}

impl<T: Real> Blob<T> {
    /// Creates a zero-filled blob.
    #[must_use]
    pub fn zeros(shape: BlobShape) -> Self {
        Self {
            shape,
            data: vec![T::ZERO; shape.count()],
            diff: vec![T::ZERO; shape.count()],
        }
    }

    /// Wraps existing values; gradients start at zero.
    ///
    /// # Errors
    /// Returns [`LayerError::BufferLength`] if `data.len()` differs from `shape.count()`.
    pub fn from_data(shape: BlobShape, data: Vec<T>) -> Result<Self, LayerError> {
        if data.len() != shape.count() {
            return Err(LayerError::BufferLength {
                expected: shape.count(),
                found: data.len(),
            });
        }
        let diff = vec![T::ZERO; data.len()];
        Ok(Self { shape, data, diff })
    }

    /// Resizes the blob to `shape`.
    ///
    /// Existing elements are kept up to the new length; new elements are zero.
    pub fn reshape(&mut self, shape: BlobShape) {
        self.shape = shape;
        self.data.resize(shape.count(), T::ZERO);
        self.diff.resize(shape.count(), T::ZERO);
    }

    /// Sets every gradient element to `value`.
    pub fn fill_diff(&mut self, value: T) {
        self.diff.fill(value);
    }
}

impl<T> Blob<T> {
    /// The blob's shape.
    #[must_use]
    pub const fn shape(&self) -> &BlobShape {
        &self.shape
    }

    /// Number of examples.
    #[must_use]
    pub const fn num(&self) -> usize {
        self.shape.num
    }

    /// Total element count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Elements per example.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.shape.stride()
    }

    /// Read-only values.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable values.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Read-only gradients.
    #[must_use]
    pub fn diff(&self) -> &[T] {
        &self.diff
    }

    /// Mutable gradients.
    pub fn diff_mut(&mut self) -> &mut [T] {
        &mut self.diff
    }

    /// Values and gradients at once, for kernels that read one and write the other.
    pub fn data_and_diff_mut(&mut self) -> (&[T], &mut [T]) {
        (&self.data, &mut self.diff)
    }

    /// The contiguous features of example `i`.
    ///
    /// # Panics
    /// Panics if `i >= num()`.
    #[must_use]
    pub fn example(&self, i: usize) -> &[T] {
        let d = self.stride();
        &self.data[i * d..(i + 1) * d]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_feature_axis_fails_validation() {
        assert!(BlobShape::new(0, 3, 1, 1).validate().is_ok());
        assert!(BlobShape::new(2, 0, 1, 1).validate().is_err());
        assert!(BlobShape::new(2, 3, 1, 0).validate().is_err());
    }

    #[test]
    fn from_data_checks_length() {
        let err = Blob::from_data(BlobShape::new(2, 2, 1, 1), vec![1.0f64; 3]).unwrap_err();
        assert_eq!(
            err,
            LayerError::BufferLength {
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn reshape_resizes_both_buffers() {
        let mut b = Blob::<f32>::zeros(BlobShape::new(2, 3, 1, 1));
        b.reshape(BlobShape::scalar());
        assert_eq!(b.count(), 1);
        assert_eq!(b.diff().len(), 1);
        assert_eq!(b.shape().to_string(), "1x1x1x1");
    }
}
