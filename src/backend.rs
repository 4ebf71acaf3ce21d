//! Backend selection module.
//!
//! This module defines the available computation backends and the process-wide
//! default that new layers pick up.
//!
//! # Supported Backends
//!
//! - `Cpu`: Pure Rust backend parallelized with `rayon` (default, always available).
//! - `Wgpu`: GPU compute shaders through `wgpu` (feature `wgpu`).
//! - `Cuda`: Reserved; currently routed through the `wgpu` path (feature `cuda`).
//!
//! The default is stored in an `AtomicU8`. Layers capture a backend once, at
//! construction, through their [`AngleLossConfig`](crate::config::AngleLossConfig);
//! changing the default afterwards does not affect existing layers.
//!
//! A backend that was not compiled in is never an error at call time: kernels
//! fall back to the CPU. [`Backend::ensure_available`] reports the gap for
//! callers that want to know.

use crate::error::LayerError;
use core::convert::TryFrom;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// General-purpose processor (default).
    #[default]
    Cpu = 0,
    /// GPU-accelerated backend using `wgpu`.
    Wgpu,
    /// Placeholder for native CUDA support.
    Cuda,
}

impl Backend {
    /// Whether this backend targets an accelerator rather than the CPU.
    #[must_use]
    pub const fn is_accelerator(self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Whether support for this backend was compiled into the crate.
    #[must_use]
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Wgpu => cfg!(feature = "wgpu"),
            Self::Cuda => cfg!(feature = "cuda"),
        }
    }

    /// Fails with [`LayerError::NotImplemented`] if this backend was not compiled in.
    ///
    /// # Errors
    /// Returns `NotImplemented` for `Wgpu`/`Cuda` without their feature.
    pub fn ensure_available(self) -> Result<(), LayerError> {
        if self.is_compiled() {
            Ok(())
        } else {
            Err(LayerError::NotImplemented {
                backend: self,
                op: "angle_loss",
            })
        }
    }

    /// Lower-case name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Wgpu),
            2 => Ok(Self::Cuda),
            _ => Err(()),
        }
    }
}

/// Process-wide default backend for newly configured layers.
///
/// Changes are rare and never happen inside a kernel, so acquire/release is enough.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Cpu as u8);

/// Sets the default backend picked up by [`AngleLossConfig::default`](crate::config::AngleLossConfig).
///
/// # Example
///
/// ```
/// use angle_loss::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Cpu);
/// assert_eq!(get_backend(), Backend::Cpu);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the current default backend.
///
/// If the stored value is invalid, defaults to [`Backend::Cpu`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
