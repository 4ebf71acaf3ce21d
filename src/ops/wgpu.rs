//! GPU-accelerated angular loss using WGPU.
//!
//! Two WGSL compute kernels mirror the CPU reference:
//!
//! - `angle_loss_forward`: one invocation per example writes its clamped angle;
//!   the host takes the mean in `f64`.
//! - `angle_loss_backward`: one invocation per element writes `a_i · v[i, j]`.
//!
//! The device, queue and pipelines are created once, lazily. If no adapter can
//! be acquired the context stays empty, a warning is logged, and every call
//! here returns `None`/`false` so dispatch falls back to the CPU.
//!
//! All computation happens in `f32`.

use crate::Real;
use briny::prelude::{Validate, ValidationError};
use log::{debug, warn};
use std::sync::mpsc;
use thiserror::Error;
use wgpu::util::DeviceExt;

const FORWARD: &str = include_str!("shaders/angle_loss_forward.wgsl");
const BACKWARD: &str = include_str!("shaders/angle_loss_backward.wgsl");

/// Must match `@workgroup_size` in both shaders.
const WORKGROUP_SIZE: usize = 64;

/// Failures of the GPU path. None of them reach layer callers.
#[derive(Error, Debug)]
pub enum GpuFailure {
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("shader `{0}` failed validation")]
    Shader(&'static str),

    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("mapping callback was dropped")]
    Disconnected,

    #[error("{groups} workgroups exceed the device limit of {limit}")]
    TooLarge { groups: usize, limit: u32 },
}

/// Secure wrapper for WGSL source code embedded in the crate.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 || !src.contains("fn main") {
            return Err(ValidationError);
        }

        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// A compiled compute pipeline and the bind group layout it expects.
struct Kernel {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

/// Device, queue and the angular-loss pipelines.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    forward: Kernel,
    backward: Kernel,
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            warn!("wgpu backend unavailable: {err}");
            None
        }
    };
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn from_bytes(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Little-endian `Params { num, dim, top_diff, floor }` as laid out in the shaders.
#[allow(clippy::cast_possible_truncation)]
fn params_bytes(num: usize, dim: usize, top_diff: f32, floor: f32) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&(num as u32).to_le_bytes());
    out[4..8].copy_from_slice(&(dim as u32).to_le_bytes());
    out[8..12].copy_from_slice(&top_diff.to_le_bytes());
    out[12..16].copy_from_slice(&floor.to_le_bytes());
    out
}

impl GpuContext {
    /// Acquires the default adapter and compiles both kernels.
    ///
    /// # Errors
    /// Fails if no adapter/device is available or a shader is rejected.
    pub fn new() -> Result<Self, GpuFailure> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("angle_loss"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;
        debug!("wgpu adapter: {:?}", adapter.get_info().name);

        let forward = Self::kernel(&device, "angle_loss_forward", FORWARD)?;
        let backward = Self::kernel(&device, "angle_loss_backward", BACKWARD)?;

        Ok(Self {
            device,
            queue,
            forward,
            backward,
        })
    }

    fn kernel(
        device: &wgpu::Device,
        label: &'static str,
        source: &'static str,
    ) -> Result<Kernel, GpuFailure> {
        WgslSource(source)
            .validate()
            .map_err(|_| GpuFailure::Shader(label))?;

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Ok(Kernel { layout, pipeline })
    }

    /// Runs `kernel` over `invocations` threads and reads back `out_len` floats.
    fn run(
        &self,
        kernel: &Kernel,
        params: &[u8; 16],
        u: &[f32],
        v: &[f32],
        invocations: usize,
        out_len: usize,
    ) -> Result<Vec<f32>, GpuFailure> {
        let groups = invocations.div_ceil(WORKGROUP_SIZE);
        let limit = self.device.limits().max_compute_workgroups_per_dimension;
        let groups = u32::try_from(groups)
            .ok()
            .filter(|&g| g <= limit)
            .ok_or(GpuFailure::TooLarge { groups, limit })?;

        let device = &self.device;
        let size = (out_len * size_of::<f32>()) as u64;

        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: params,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let u_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("u"),
            contents: &to_bytes(u),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let v_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("v"),
            contents: &to_bytes(v),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let out_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("out"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("angle_loss_bind_group"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: u_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: v_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: out_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("angle_loss_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("angle_loss_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&out_buf, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| GpuFailure::Disconnected)??;

        let out = from_bytes(&slice.get_mapped_range());
        staging.unmap();
        Ok(out)
    }
}

/// Computes the mean clamped angle on the GPU.
///
/// # Returns
/// - `Some(loss)` on success
/// - `None` if no GPU is available, the batch is empty, or execution fails
#[must_use]
pub fn wgpu_angle_loss_forward<T: Real>(u: &[T], v: &[T], num: usize) -> Option<T> {
    let ctx = GPU_CONTEXT.as_ref()?;
    if num == 0 || u.is_empty() {
        return None;
    }

    let dim = u.len() / num;
    let u32s: Vec<f32> = u.iter().map(|&x| x.into_f32()).collect();
    let v32s: Vec<f32> = v.iter().map(|&x| x.into_f32()).collect();
    let params = params_bytes(num, dim, 0.0, -1.0);

    let theta = ctx
        .run(&ctx.forward, &params, &u32s, &v32s, num, num)
        .map_err(|err| debug!("wgpu forward failed: {err}"))
        .ok()?;

    #[allow(clippy::cast_precision_loss)]
    let mean = theta.iter().map(|&t| f64::from(t)).sum::<f64>() / num as f64;
    Some(T::from_f64(mean))
}

/// Computes the gradient with respect to `u` on the GPU and writes it to `out`.
///
/// Returns `false` (leaving `out` untouched) if the GPU path is unavailable.
pub fn wgpu_angle_loss_backward<T: Real>(
    top_diff: T,
    u: &[T],
    v: &[T],
    num: usize,
    floor: Option<T>,
    out: &mut [T],
) -> bool {
    let Some(ctx) = GPU_CONTEXT.as_ref() else {
        return false;
    };
    if num == 0 || u.is_empty() || out.len() != u.len() {
        return false;
    }

    let dim = u.len() / num;
    let u32s: Vec<f32> = u.iter().map(|&x| x.into_f32()).collect();
    let v32s: Vec<f32> = v.iter().map(|&x| x.into_f32()).collect();
    let floor = floor.map_or(-1.0, Real::into_f32);
    let params = params_bytes(num, dim, top_diff.into_f32(), floor);

    match ctx.run(&ctx.backward, &params, &u32s, &v32s, u.len(), u.len()) {
        Ok(grad) => {
            for (o, g) in out.iter_mut().zip(grad) {
                *o = T::from_f32(g);
            }
            true
        }
        Err(err) => {
            debug!("wgpu backward failed: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_shaders_pass_validation() {
        assert!(WgslSource(FORWARD).validate().is_ok());
        assert!(WgslSource(BACKWARD).validate().is_ok());
    }

    #[test]
    fn rejects_shaders_with_includes() {
        let src = "#include \"x\"\nfn main() {}";
        assert!(WgslSource(src).validate().is_err());
    }

    #[test]
    fn params_are_little_endian() {
        let p = params_bytes(3, 5, 1.0, -1.0);
        assert_eq!(&p[0..4], &3u32.to_le_bytes());
        assert_eq!(&p[4..8], &5u32.to_le_bytes());
        assert_eq!(&p[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&p[12..16], &(-1.0f32).to_le_bytes());
    }

    #[test]
    fn matches_cpu_when_a_gpu_is_present() {
        let u = [0.6f32, 0.8, 0.0, 1.0, 1.0, 0.0];
        let v = [0.8f32, 0.6, 0.6, 0.8, 0.0, 1.0];
        let Some(loss) = wgpu_angle_loss_forward(&u, &v, 3) else {
            return; // no adapter on this machine
        };
        let expected = crate::ops::cpu::angle_loss_forward(&u, &v, 3);
        assert!((loss - expected).abs() < 1e-4);

        let mut gpu = [0.0f32; 6];
        let mut cpu = [0.0f32; 6];
        assert!(wgpu_angle_loss_backward(1.0, &u, &v, 3, None, &mut gpu));
        crate::ops::cpu::angle_loss_backward(1.0, &u, &v, 3, None, &mut cpu);
        for (g, c) in gpu.iter().zip(&cpu) {
            assert!((g - c).abs() < 1e-4, "gpu {g} vs cpu {c}");
        }
    }
}
