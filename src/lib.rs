//! angle_loss: an angular (arccosine) loss layer for batches of paired vectors.
//!
//! Given two batches `A` and `B` of `N` examples with `D` features each, the
//! layer computes the mean angle between corresponding examples,
//!
//! ```text
//! L = 1/N · Σ_i acos(clamp(⟨A_i, B_i⟩, -1, 1))
//! ```
//!
//! and, on the reverse pass, writes `∂L/∂A` and/or `∂L/∂B` into the gradient
//! buffers of the inputs that request propagation.
//!
//! Inputs are expected to be unit-normalized upstream; this crate does not
//! normalize them.
//!
//! # Modules
//!
//! - [`blob`]: value + gradient buffers shaped `num × channels × height × width`.
//! - [`layer`]: the [`Layer`](layer::Layer) lifecycle and [`AngleLossLayer`](layer::AngleLossLayer).
//! - [`ops`]: the numerical kernels and their backend dispatch.
//! - [`backend`]: compute backend selection.
//! - [`config`]: per-layer configuration.
//! - [`check`]: finite-difference gradient checking for any layer.
//! - [`error`]: the crate's error type.
//!
//! # Example
//!
//! ```rust
//! use angle_loss::blob::{Blob, BlobShape};
//! use angle_loss::layer::{AngleLossLayer, Layer};
//!
//! let shape = BlobShape::new(2, 3, 1, 1);
//! let a = Blob::from_data(shape, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
//! let b = Blob::from_data(shape, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]).unwrap();
//! let mut bottom = [a, b];
//! let mut top = Blob::<f64>::default();
//!
//! let mut layer = AngleLossLayer::default();
//! layer.setup(&bottom, &mut top).unwrap();
//! let loss = layer.forward(&bottom, &mut top).unwrap();
//! assert!((loss - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
//!
//! layer.backward(&top, &[true, true], &mut bottom).unwrap();
//! ```

pub mod backend;
pub mod blob;
pub mod check;
pub mod config;
pub mod error;
pub mod layer;
pub mod ops;

use core::fmt::{Debug, Display};
use core::iter::Sum;
use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Floating point element types the kernels operate on.
///
/// Implemented for `f32` and `f64`. Conversions through `f32`/`f64` are used
/// by accelerator paths, which compute in single precision.
pub trait Real:
    Copy
    + Send
    + Sync
    + Default
    + PartialOrd
    + Debug
    + Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + Sum
    + 'static
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;

    /// Arccosine in radians.
    fn acos(self) -> Self;
    /// Square root.
    fn sqrt(self) -> Self;
    /// Absolute value.
    fn abs(self) -> Self;
    /// Whether the value is neither infinite nor NaN.
    fn is_finite(self) -> bool;
    /// Restricts `self` to `[min, max]`.
    fn clamp(self, min: Self, max: Self) -> Self;
    /// Larger of two values.
    fn max(self, other: Self) -> Self;
    /// Lossy conversion from a count.
    fn from_usize(n: usize) -> Self;

    /// Convert to `f32`.
    fn into_f32(self) -> f32;
    /// Convert from `f32`.
    fn from_f32(x: f32) -> Self;
    /// Convert to `f64`.
    fn into_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;
}

macro_rules! impl_real {
    ($t:ty) => {
        impl Real for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn acos(self) -> Self {
                <$t>::acos(self)
            }

            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }

            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }

            #[inline]
            fn clamp(self, min: Self, max: Self) -> Self {
                <$t>::clamp(self, min, max)
            }

            #[inline]
            fn max(self, other: Self) -> Self {
                <$t>::max(self, other)
            }

            #[allow(clippy::cast_precision_loss)]
            #[inline]
            fn from_usize(n: usize) -> Self {
                n as $t
            }

            #[allow(clippy::cast_possible_truncation)]
            #[inline]
            fn into_f32(self) -> f32 {
                self as f32
            }

            #[inline]
            fn from_f32(x: f32) -> Self {
                x as $t
            }

            #[inline]
            fn into_f64(self) -> f64 {
                self as f64
            }

            #[allow(clippy::cast_possible_truncation)]
            #[inline]
            fn from_f64(x: f64) -> Self {
                x as $t
            }
        }
    };
}

impl_real!(f32);
impl_real!(f64);
