//! # Operation Dispatch Layer
//!
//! The angular-loss kernels and their dispatch across compute backends.
//!
//! ## Submodules
//!
//! - [`cpu`]: Multi-threaded CPU kernels (reference semantics, always available)
//! - [`wgpu`] *(opt-in)*: GPU compute shader pipelines using `wgpu`
//! - [`cuda`] *(planned)*: CUDA backend; currently dispatches to WebGPU
//! - [`dispatch`]: Backend routing with CPU fallback
//!
//! ## Backend Selection
//!
//! Layers pass the backend they were configured with to [`dispatch`]. Calling
//! the [`cpu`] functions directly bypasses dispatch entirely.
//!
//! ## Notes
//!
//! - Accelerators compute in `f32`; inputs of other precisions are converted
//!   on the way in and out.
//! - GPU results must match the CPU path up to floating point tolerance.
//!
//! ## Feature Flags
//!
//! - `wgpu`: Enables `wgpu` (WebGPU) backend
//! - `cuda`: Enables placeholder CUDA module (dispatches to WGPU)

pub mod cpu;
pub mod dispatch;

#[cfg(feature = "cuda")]
pub mod cuda;
#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub mod wgpu;
