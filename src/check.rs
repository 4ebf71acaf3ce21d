//! Finite-difference gradient checking.
//!
//! [`GradientChecker`] compares the gradients a layer writes in
//! [`Layer::backward`] against centered differences of its forward output:
//!
//! ```text
//! estimated = (L(x + h) - L(x - h)) / 2h
//! ```
//!
//! where `L` is the weighted loss returned by [`Layer::forward`]. A pair passes
//! when `|computed - estimated| <= threshold · max(|computed|, |estimated|, 1)`.

use crate::blob::Blob;
use crate::error::LayerError;
use crate::layer::Layer;
use crate::Real;
use log::{debug, info};

/// One element whose analytic and numerical gradients disagreed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch<T> {
    /// Which bottom blob.
    pub blob: usize,
    /// Flat element index inside that blob.
    pub index: usize,
    /// Gradient written by `backward`.
    pub computed: T,
    /// Centered-difference estimate.
    pub estimated: T,
}

/// Outcome of a gradient check.
#[derive(Debug, Clone, Default)]
pub struct GradientReport<T> {
    /// Number of elements compared.
    pub checked: usize,
    /// Elements outside tolerance.
    pub mismatches: Vec<Mismatch<T>>,
}

impl<T> GradientReport<T> {
    /// True if every element was within tolerance.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Numerical gradient checker.
#[derive(Debug, Clone, Copy)]
pub struct GradientChecker<T> {
    stepsize: T,
    threshold: T,
}

impl<T: Real> Default for GradientChecker<T> {
    /// `stepsize = 1e-2`, `threshold = 1e-3`.
    fn default() -> Self {
        Self::new(T::from_f64(1e-2), T::from_f64(1e-3))
    }
}

impl<T: Real> GradientChecker<T> {
    /// Creates a checker perturbing inputs by `±stepsize`.
    #[must_use]
    pub const fn new(stepsize: T, threshold: T) -> Self {
        Self {
            stepsize,
            threshold,
        }
    }

    /// Checks every element of every bottom blob.
    ///
    /// The layer is set up on `bottom`/`top`, run forward and backward once with
    /// all inputs propagating, and then run forward twice per element with that
    /// element nudged by `±stepsize`. `bottom` values are restored afterwards;
    /// `bottom` gradients hold the analytic result.
    ///
    /// # Errors
    /// Propagates any error from the layer.
    pub fn check_exhaustive<L: Layer<T>>(
        &self,
        layer: &mut L,
        bottom: &mut [Blob<T>],
        top: &mut Blob<T>,
    ) -> Result<GradientReport<T>, LayerError> {
        layer.setup(bottom, top)?;
        layer.forward(bottom, top)?;
        let propagate = vec![true; bottom.len()];
        layer.backward(top, &propagate, bottom)?;

        let computed: Vec<Vec<T>> = bottom.iter().map(|b| b.diff().to_vec()).collect();
        let two_h = self.stepsize + self.stepsize;
        let mut report = GradientReport {
            checked: 0,
            mismatches: Vec::new(),
        };

        for (blob, grads) in computed.iter().enumerate() {
            for (index, &computed) in grads.iter().enumerate() {
                let original = bottom[blob].data()[index];

                bottom[blob].data_mut()[index] = original + self.stepsize;
                let plus = layer.forward(bottom, top)?;
                bottom[blob].data_mut()[index] = original - self.stepsize;
                let minus = layer.forward(bottom, top)?;
                bottom[blob].data_mut()[index] = original;

                let estimated = (plus - minus) / two_h;
                let scale = computed.abs().max(estimated.abs()).max(T::ONE);
                report.checked += 1;

                if !((computed - estimated).abs() <= self.threshold * scale) {
                    debug!(
                        "{} gradient mismatch at bottom[{blob}][{index}]: computed {computed}, estimated {estimated}",
                        layer.layer_type()
                    );
                    report.mismatches.push(Mismatch {
                        blob,
                        index,
                        computed,
                        estimated,
                    });
                }
            }
        }

        info!(
            "{} gradient check: {} elements, {} mismatches",
            layer.layer_type(),
            report.checked,
            report.mismatches.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobShape;

    /// `L = Σ x²` over the single bottom, with a deliberately wrong gradient
    /// when `broken` is set.
    struct SumOfSquares {
        broken: bool,
    }

    impl Layer<f64> for SumOfSquares {
        fn layer_type(&self) -> &'static str {
            "SumOfSquares"
        }

        fn exact_num_bottom_blobs(&self) -> usize {
            1
        }

        fn loss_weight(&self) -> f64 {
            1.0
        }

        fn reshape(&mut self, _: &[Blob<f64>], top: &mut Blob<f64>) -> Result<(), LayerError> {
            top.reshape(BlobShape::scalar());
            Ok(())
        }

        fn forward(&mut self, bottom: &[Blob<f64>], top: &mut Blob<f64>) -> Result<f64, LayerError> {
            let loss: f64 = bottom[0].data().iter().map(|x| x * x).sum();
            top.data_mut()[0] = loss;
            Ok(loss)
        }

        fn backward(
            &mut self,
            top: &Blob<f64>,
            _: &[bool],
            bottom: &mut [Blob<f64>],
        ) -> Result<(), LayerError> {
            let factor = if self.broken { 3.0 } else { 2.0 };
            let (data, diff) = bottom[0].data_and_diff_mut();
            for (g, &x) in diff.iter_mut().zip(data) {
                *g = factor * x * top.diff()[0];
            }
            Ok(())
        }
    }

    fn input() -> Vec<Blob<f64>> {
        vec![Blob::from_data(BlobShape::new(1, 3, 1, 1), vec![0.5, -1.0, 2.0]).unwrap()]
    }

    #[test]
    fn correct_gradients_pass() {
        let mut bottom = input();
        let mut top = Blob::default();
        let report = GradientChecker::default()
            .check_exhaustive(&mut SumOfSquares { broken: false }, &mut bottom, &mut top)
            .unwrap();
        assert_eq!(report.checked, 3);
        assert!(report.is_ok(), "{:?}", report.mismatches);
        assert_eq!(bottom[0].data(), &[0.5, -1.0, 2.0]);
    }

    #[test]
    fn wrong_gradients_are_reported() {
        let mut bottom = input();
        let mut top = Blob::default();
        let report = GradientChecker::default()
            .check_exhaustive(&mut SumOfSquares { broken: true }, &mut bottom, &mut top)
            .unwrap();
        assert_eq!(report.mismatches.len(), 3);
        assert_eq!(report.mismatches[2].index, 2);
    }
}
