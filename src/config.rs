//! Per-layer configuration.

use crate::backend::{get_backend, Backend};
use crate::Real;

/// Settings captured by an [`AngleLossLayer`](crate::layer::AngleLossLayer) at construction.
///
/// # Example
///
/// ```rust
/// use angle_loss::backend::Backend;
/// use angle_loss::config::AngleLossConfig;
///
/// let cfg = AngleLossConfig::<f32>::default()
///     .with_backend(Backend::Cpu)
///     .with_loss_weight(0.5);
/// assert_eq!(cfg.loss_weight, 0.5);
/// assert_eq!(cfg.gradient_floor, None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleLossConfig<T> {
    /// Where the kernels run. Unavailable accelerators fall back to the CPU.
    pub backend: Backend,
    /// Multiplier applied to the reported loss and seeded as the upstream gradient.
    pub loss_weight: T,
    /// Lower bound for `1 - dot²` in the backward pass.
    ///
    /// `None` keeps the exact derivative, which is infinite for identical or
    /// antipodal pairs.
    pub gradient_floor: Option<T>,
}

impl<T: Real> Default for AngleLossConfig<T> {
    fn default() -> Self {
        Self {
            backend: get_backend(),
            loss_weight: T::ONE,
            gradient_floor: None,
        }
    }
}

impl<T: Real> AngleLossConfig<T> {
    /// Selects the compute backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the loss weight.
    #[must_use]
    pub fn with_loss_weight(mut self, loss_weight: T) -> Self {
        self.loss_weight = loss_weight;
        self
    }

    /// Bounds `1 - dot²` from below by `floor` when computing gradients.
    #[must_use]
    pub fn with_gradient_floor(mut self, floor: T) -> Self {
        self.gradient_floor = Some(floor);
        self
    }
}
