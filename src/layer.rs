//! Layer lifecycle and the angular loss layer.
//!
//! A [`Layer`] reads a fixed number of input ("bottom") blobs and writes one
//! output ("top") blob. The lifecycle is:
//!
//! 1. [`Layer::setup`] once, which validates inputs and sizes the output.
//! 2. [`Layer::reshape`] whenever input shapes may have changed.
//! 3. [`Layer::forward`] to compute the output.
//! 4. [`Layer::backward`] to write input gradients from the output gradient.
//!
//! Layers hold no per-batch state between calls.

use crate::backend::Backend;
use crate::blob::{Blob, BlobShape};
use crate::config::AngleLossConfig;
use crate::error::{Axis, LayerError};
use crate::ops::dispatch;
use crate::Real;
use briny::prelude::Validate;
use log::{debug, warn};

/// A computation node with gradients.
pub trait Layer<T: Real> {
    /// Short type name, used in logs.
    fn layer_type(&self) -> &'static str;

    /// Number of bottom blobs the layer requires.
    fn exact_num_bottom_blobs(&self) -> usize;

    /// Weight this layer's output contributes to the objective.
    ///
    /// Zero for layers that are not losses.
    fn loss_weight(&self) -> T {
        T::ZERO
    }

    /// One-time initialization: reshapes, then seeds the output gradient with
    /// [`Layer::loss_weight`] if it is non-zero.
    ///
    /// # Errors
    /// Whatever [`Layer::reshape`] reports.
    fn setup(&mut self, bottom: &[Blob<T>], top: &mut Blob<T>) -> Result<(), LayerError> {
        self.reshape(bottom, top)?;
        let weight = self.loss_weight();
        if weight != T::ZERO {
            top.fill_diff(weight);
        }
        Ok(())
    }

    /// Validates `bottom` and sizes `top` accordingly.
    ///
    /// # Errors
    /// Returns an error if the inputs are unusable; `top` is left untouched then.
    fn reshape(&mut self, bottom: &[Blob<T>], top: &mut Blob<T>) -> Result<(), LayerError>;

    /// Computes the output into `top.data` and returns the layer's weighted loss.
    ///
    /// # Errors
    /// Returns an error if `bottom` no longer matches what `reshape` accepted.
    fn forward(&mut self, bottom: &[Blob<T>], top: &mut Blob<T>) -> Result<T, LayerError>;

    /// Writes gradients into the `diff` of every bottom blob whose
    /// `propagate_down` flag is set. Others are not touched.
    ///
    /// # Errors
    /// Returns an error on mismatched flag or blob counts.
    fn backward(
        &mut self,
        top: &Blob<T>,
        propagate_down: &[bool],
        bottom: &mut [Blob<T>],
    ) -> Result<(), LayerError>;
}

/// Mean angle between corresponding examples of two unit-vector batches.
///
/// Takes two bottoms of identical shape `N × C × H × W` and produces a single
/// scalar: `L = 1/N · Σ_i acos(clamp(A_i · B_i, -1, 1))`.
///
/// The backward pass is the exact derivative of `acos`, which is infinite when
/// a pair is identical or antipodal. Those gradients come out as `±inf` or
/// `NaN` unless [`AngleLossConfig::gradient_floor`] is set.
///
/// # Example
///
/// ```rust
/// use angle_loss::blob::{Blob, BlobShape};
/// use angle_loss::config::AngleLossConfig;
/// use angle_loss::layer::{AngleLossLayer, Layer};
///
/// let shape = BlobShape::new(1, 2, 1, 1);
/// let mut bottom = [
///     Blob::from_data(shape, vec![1.0f32, 0.0]).unwrap(),
///     Blob::from_data(shape, vec![-1.0f32, 0.0]).unwrap(),
/// ];
/// let mut top = Blob::default();
/// let mut layer = AngleLossLayer::new(AngleLossConfig::default());
/// layer.setup(&bottom, &mut top).unwrap();
/// let loss = layer.forward(&bottom, &mut top).unwrap();
/// assert!((loss - core::f32::consts::PI).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct AngleLossLayer<T> {
    config: AngleLossConfig<T>,
}

impl<T: Real> Default for AngleLossLayer<T> {
    fn default() -> Self {
        Self::new(AngleLossConfig::default())
    }
}

impl<T: Real> AngleLossLayer<T> {
    /// Creates a layer. An unavailable accelerator is reported once here and
    /// the CPU is used instead.
    #[must_use]
    pub fn new(config: AngleLossConfig<T>) -> Self {
        if let Err(err) = config.backend.ensure_available() {
            warn!("{err}; angle loss will run on the cpu");
        }
        Self { config }
    }

    /// The layer's configuration.
    #[must_use]
    pub const fn config(&self) -> &AngleLossConfig<T> {
        &self.config
    }

    /// The backend the layer dispatches to.
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.config.backend
    }

    /// Checks that two input shapes are acceptable.
    ///
    /// Both must be well formed, agree on every axis, and hold at least one
    /// example. Feature axes are compared before the batch axis.
    ///
    /// # Errors
    /// - [`LayerError::InvalidShape`] for a zero feature axis.
    /// - [`LayerError::ShapeMismatch`] naming the first axis that differs.
    /// - [`LayerError::EmptyBatch`] if `num == 0`.
    pub fn validate_shapes(first: &BlobShape, second: &BlobShape) -> Result<(), LayerError> {
        for shape in [first, second] {
            shape
                .validate()
                .map_err(|_| LayerError::InvalidShape(*shape))?;
        }

        let axes = [
            (Axis::Channels, first.channels, second.channels),
            (Axis::Height, first.height, second.height),
            (Axis::Width, first.width, second.width),
            (Axis::Num, first.num, second.num),
        ];
        if let Some(&(axis, first, second)) = axes.iter().find(|(_, a, b)| a != b) {
            return Err(LayerError::ShapeMismatch {
                axis,
                first,
                second,
            });
        }

        if first.num == 0 {
            return Err(LayerError::EmptyBatch);
        }
        Ok(())
    }

    fn check_bottom(&self, bottom: &[Blob<T>]) -> Result<(), LayerError> {
        let expected = Layer::<T>::exact_num_bottom_blobs(self);
        if bottom.len() != expected {
            return Err(LayerError::BottomCount {
                expected,
                found: bottom.len(),
            });
        }
        Self::validate_shapes(bottom[0].shape(), bottom[1].shape())?;
        for blob in bottom {
            if blob.count() != blob.shape().count() {
                return Err(LayerError::BufferLength {
                    expected: blob.shape().count(),
                    found: blob.count(),
                });
            }
        }
        Ok(())
    }
}

impl<T: Real> Layer<T> for AngleLossLayer<T> {
    fn layer_type(&self) -> &'static str {
        "AngleLoss"
    }

    fn exact_num_bottom_blobs(&self) -> usize {
        2
    }

    fn loss_weight(&self) -> T {
        self.config.loss_weight
    }

    fn reshape(&mut self, bottom: &[Blob<T>], top: &mut Blob<T>) -> Result<(), LayerError> {
        self.check_bottom(bottom)?;
        top.reshape(BlobShape::scalar());
        debug!(
            "{} reshaped: bottom {} -> top {}",
            self.layer_type(),
            bottom[0].shape(),
            top.shape()
        );
        Ok(())
    }

    fn forward(&mut self, bottom: &[Blob<T>], top: &mut Blob<T>) -> Result<T, LayerError> {
        self.check_bottom(bottom)?;
        if top.count() == 0 {
            top.reshape(BlobShape::scalar());
        }

        let (a, b) = (&bottom[0], &bottom[1]);
        let loss = dispatch::angle_loss_forward(self.backend(), a.data(), b.data(), a.num());
        top.data_mut()[0] = loss;

        Ok(loss * self.config.loss_weight)
    }

    fn backward(
        &mut self,
        top: &Blob<T>,
        propagate_down: &[bool],
        bottom: &mut [Blob<T>],
    ) -> Result<(), LayerError> {
        if propagate_down.len() != 2 {
            return Err(LayerError::PropagateCount {
                expected: 2,
                found: propagate_down.len(),
            });
        }
        self.check_bottom(bottom)?;
        let &top_diff = top.diff().first().ok_or(LayerError::BufferLength {
            expected: 1,
            found: 0,
        })?;

        let num = bottom[0].num();
        let floor = self.config.gradient_floor;
        let backend = self.backend();
        let (first, second) = bottom.split_at_mut(1);
        let (a, b) = (&mut first[0], &mut second[0]);

        if propagate_down[0] {
            let other = b.data();
            let (data, diff) = a.data_and_diff_mut();
            dispatch::angle_loss_backward(backend, top_diff, data, other, num, floor, diff);
        }
        if propagate_down[1] {
            let other = a.data();
            let (data, diff) = b.data_and_diff_mut();
            dispatch::angle_loss_backward(backend, top_diff, data, other, num, floor, diff);
        }
        Ok(())
    }
}
