//! Operation Dispatch Layer
//!
//! Routes each angular-loss kernel to the backend a layer was configured with.
//!
//! Each function attempts backend-specific implementations in priority order:
//! 1. `Cuda` (if requested and enabled)
//! 2. `Wgpu` (if requested and enabled)
//! 3. Falls back to `Cpu`
//!
//! # Design Highlights
//! - **Pluggable**: Backends are optional and modular
//! - **Minimal overhead**: Function returns immediately upon match
//! - **Fallback logic**: An accelerator that is missing, not compiled in, or
//!   fails at runtime never fails the call; the CPU result is returned instead
//!
//! # Example
//! ```rust
//! use angle_loss::backend::Backend;
//! use angle_loss::ops::dispatch::angle_loss_forward;
//!
//! let u = [1.0f32, 0.0];
//! let v = [0.0f32, 1.0];
//! // Runs on the CPU when no GPU support was compiled in.
//! let loss = angle_loss_forward(Backend::Wgpu, &u, &v, 1);
//! assert!((loss - core::f32::consts::FRAC_PI_2).abs() < 1e-5);
//! ```

use crate::backend::Backend;
use crate::Real;
use log::{debug, trace};

/// Dispatches the forward pass (mean clamped angle) to `backend`.
///
/// # Behavior
/// Attempts CUDA → WGPU → CPU, depending on the request and enabled features.
pub fn angle_loss_forward<T: Real>(backend: Backend, u: &[T], v: &[T], num: usize) -> T {
    trace!("angle_loss_forward: backend={backend} num={num} len={}", u.len());

    match backend {
        Backend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                if let Some(loss) = super::cuda::cuda_angle_loss_forward(u, v, num) {
                    return loss;
                }
            }
        }
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if let Some(loss) = super::wgpu::wgpu_angle_loss_forward(u, v, num) {
                    return loss;
                }
            }
        }
        Backend::Cpu => {}
    }

    if backend.is_accelerator() {
        debug!("{backend} forward unavailable, falling back to cpu");
    }
    super::cpu::angle_loss_forward(u, v, num)
}

/// Dispatches the backward pass for one input to `backend`.
///
/// `u` is the input whose gradient is written to `out`; `v` is its partner.
///
/// # Behavior
/// Attempts CUDA → WGPU → CPU, depending on the request and enabled features.
pub fn angle_loss_backward<T: Real>(
    backend: Backend,
    top_diff: T,
    u: &[T],
    v: &[T],
    num: usize,
    floor: Option<T>,
    out: &mut [T],
) {
    trace!("angle_loss_backward: backend={backend} num={num} len={}", u.len());

    match backend {
        Backend::Cuda => {
            #[cfg(feature = "cuda")]
            {
                if super::cuda::cuda_angle_loss_backward(top_diff, u, v, num, floor, out) {
                    return;
                }
            }
        }
        Backend::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                if super::wgpu::wgpu_angle_loss_backward(top_diff, u, v, num, floor, out) {
                    return;
                }
            }
        }
        Backend::Cpu => {}
    }

    if backend.is_accelerator() {
        debug!("{backend} backward unavailable, falling back to cpu");
    }
    super::cpu::angle_loss_backward(top_diff, u, v, num, floor, out);
}
