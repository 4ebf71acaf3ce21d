use crate::Real;

pub fn cuda_angle_loss_forward<T: Real>(u: &[T], v: &[T], num: usize) -> Option<T> {
    // TODO: implement using `cust` crate
    super::wgpu::wgpu_angle_loss_forward(u, v, num) // wgpu fallback
}

pub fn cuda_angle_loss_backward<T: Real>(
    top_diff: T,
    u: &[T],
    v: &[T],
    num: usize,
    floor: Option<T>,
    out: &mut [T],
) -> bool {
    // TODO: implement with a CUDA kernel
    super::wgpu::wgpu_angle_loss_backward(top_diff, u, v, num, floor, out) // wgpu fallback
}
