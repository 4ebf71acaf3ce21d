//! Parallel CPU backend for the angular loss.
//!
//! # CPU Backend
//!
//! The reference implementation every other backend must reproduce. Both passes
//! treat each example independently and run as a `rayon` parallel-for over
//! example slices.
//!
//! ## Layout
//!
//! Inputs are flat, example-major buffers: the `d = len / num` features of
//! example `i` occupy `[i * d, (i + 1) * d)`.
//!
//! ## Determinism
//!
//! The forward sum is a parallel reduction, so the last bits of the loss may
//! depend on how `rayon` splits the work. Gradients are computed per example
//! and are exact.

use crate::Real;
use rayon::prelude::*;

/// Dot product of two equally long slices.
#[inline]
pub fn dot<T: Real>(u: &[T], v: &[T]) -> T {
    u.iter()
        .zip(v)
        .fold(T::ZERO, |acc, (&x, &y)| acc + x * y)
}

/// Angle between two unit vectors, with the cosine clamped into `acos`'s domain.
#[inline]
pub fn angle<T: Real>(u: &[T], v: &[T]) -> T {
    dot(u, v).clamp(-T::ONE, T::ONE).acos()
}

/// `-top_diff / sqrt(1 - dot²) / num`, the per-example gradient scale.
///
/// Infinite at `dot = ±1` unless `floor` bounds `1 - dot²` from below.
#[inline]
pub fn coefficient<T: Real>(top_diff: T, dot: T, num: T, floor: Option<T>) -> T {
    let mut r = T::ONE - dot * dot;
    if let Some(floor) = floor {
        r = r.max(floor);
    }
    -top_diff * (T::ONE / r.sqrt()) / num
}

/// Mean angle between paired examples of `u` and `v`.
///
/// # Formula
/// $$ L = \\frac{1}{N} \\sum_i \\arccos(\\mathrm{clamp}(u_i \\cdot v_i, -1, 1)) $$
///
/// # Preconditions
/// - `num >= 1`; the mean of zero examples is undefined.
/// - `u.len() == v.len()` and both are a non-zero multiple of `num`.
///
/// # Example
/// ```rust
/// use angle_loss::ops::cpu::angle_loss_forward;
///
/// let u = [1.0f64, 0.0, 0.0, 1.0];
/// let v = [0.0, 1.0, 1.0, 0.0];
/// let loss = angle_loss_forward(&u, &v, 2);
/// assert!((loss - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
/// ```
pub fn angle_loss_forward<T: Real>(u: &[T], v: &[T], num: usize) -> T {
    debug_assert!(num > 0, "angle loss needs at least one example");
    debug_assert_eq!(u.len(), v.len(), "inputs must have equal length");
    let d = u.len() / num;

    let sum: T = u
        .par_chunks(d)
        .zip(v.par_chunks(d))
        .map(|(ui, vi)| angle(ui, vi))
        .sum();

    sum / T::from_usize(num)
}

/// Gradient of the mean angle with respect to `u`, written into `out`.
///
/// For each example, `out_i = coefficient(top_diff, u_i · v_i, num) · v_i`. The
/// dot product is recomputed and deliberately left unclamped. Every element of
/// `out` is overwritten; nothing is accumulated.
///
/// Call it again with `u` and `v` swapped for the other input's gradient.
///
/// # Preconditions
/// Same as [`angle_loss_forward`], and `out.len() == u.len()`.
pub fn angle_loss_backward<T: Real>(
    top_diff: T,
    u: &[T],
    v: &[T],
    num: usize,
    floor: Option<T>,
    out: &mut [T],
) {
    debug_assert!(num > 0, "angle loss needs at least one example");
    debug_assert_eq!(u.len(), out.len(), "gradient buffer must match its input");
    let d = u.len() / num;
    let n = T::from_usize(num);

    out.par_chunks_mut(d)
        .zip(u.par_chunks(d))
        .zip(v.par_chunks(d))
        .for_each(|((g, ui), vi)| {
            let a = coefficient(top_diff, dot(ui, vi), n, floor);
            for (g_j, &v_j) in g.iter_mut().zip(vi) {
                *g_j = a * v_j;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use core::f64::consts::{FRAC_PI_2, FRAC_PI_3, PI};

    #[test]
    fn acos_of_half_is_a_third_of_pi() {
        assert_abs_diff_eq!(0.5f64.acos(), FRAC_PI_3, epsilon = 1e-12);
    }

    #[test]
    fn orthogonal_pairs_give_half_pi() {
        let u = [1.0f64, 0.0, 0.0, 0.0, 1.0, 0.0];
        let v = [0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        assert_abs_diff_eq!(angle_loss_forward(&u, &v, 2), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn overshooting_cosine_is_clamped() {
        // |u·v| slightly above 1 would be NaN without the clamp.
        let u = [1.000_001f64, 0.0];
        let v = [1.0, 0.0];
        let loss = angle_loss_forward(&u, &v, 1);
        assert_eq!(loss, 0.0);

        let w = [-1.0, 0.0];
        assert_abs_diff_eq!(angle_loss_forward(&u, &w, 1), PI, epsilon = 1e-12);
    }

    #[test]
    fn forward_matches_sequential_loop() {
        let u = [0.6f64, 0.8, 0.0, 1.0, 0.28, 0.96];
        let v = [0.8, 0.6, 1.0, 0.0, 0.96, 0.28];
        let mut expected = 0.0f64;
        for i in 0..3 {
            let d = u[2 * i] * v[2 * i] + u[2 * i + 1] * v[2 * i + 1];
            expected += d.acos();
        }
        expected /= 3.0;
        assert_abs_diff_eq!(angle_loss_forward(&u, &v, 3), expected, epsilon = 1e-12);
    }

    #[test]
    fn backward_scales_the_other_side() {
        // u·v = 0.6 → coefficient = -1 / sqrt(1 - 0.36) / 1 = -1.25
        let u = [1.0f64, 0.0];
        let v = [0.6, 0.8];
        let mut out = [0.0; 2];
        angle_loss_backward(1.0, &u, &v, 1, None, &mut out);
        assert_abs_diff_eq!(out[0], -0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn backward_divides_by_batch_and_scales_by_top_diff() {
        let u = [1.0f64, 0.0, 0.0, 1.0];
        let v = [0.0, 1.0, 1.0, 0.0];
        let mut out = [0.0; 4];
        angle_loss_backward(2.0, &u, &v, 2, None, &mut out);
        // dot = 0 → coefficient = -2 / 1 / 2 = -1
        assert_eq!(out, [0.0, -1.0, -1.0, 0.0]);
    }

    #[test]
    fn backward_overwrites_previous_contents() {
        let u = [1.0f64, 0.0];
        let v = [0.0, 1.0];
        let mut out = [42.0, 42.0];
        angle_loss_backward(1.0, &u, &v, 1, None, &mut out);
        assert_eq!(out, [0.0, -1.0]);
    }

    #[test]
    fn identical_pairs_have_a_singular_gradient() {
        let u = [1.0f64, 0.0];
        let mut out = [0.0; 2];
        angle_loss_backward(1.0, &u, &u, 1, None, &mut out);
        assert_eq!(out[0], f64::NEG_INFINITY);
        assert!(out[1].is_nan()); // -inf * 0
    }

    #[test]
    fn gradient_floor_keeps_singular_pairs_finite() {
        let u = [1.0f64, 0.0];
        let mut out = [0.0; 2];
        angle_loss_backward(1.0, &u, &u, 1, Some(1e-4), &mut out);
        assert!(out.iter().all(|g| g.is_finite()));
        assert_abs_diff_eq!(out[0], -100.0, epsilon = 1e-9);
    }

    #[test]
    fn single_precision_matches_double() {
        let u_single = [0.6f32, 0.8, 0.0, 1.0];
        let v_single = [0.8f32, 0.6, 0.6, 0.8];
        let u_double = u_single.map(f64::from);
        let v_double = v_single.map(f64::from);
        let loss_single = angle_loss_forward(&u_single, &v_single, 2);
        let loss_double = angle_loss_forward(&u_double, &v_double, 2);
        assert_abs_diff_eq!(f64::from(loss_single), loss_double, epsilon = 1e-5);
    }
}
