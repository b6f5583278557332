// convolution.rs — Separable 1D convolution on f32 images.
//
// A 2D convolution with a separable kernel K = k_col * k_row^T decomposes
// into two 1D passes, reducing cost from O(k²) to O(2k) per pixel. Both the
// image model (binomial blur + central-difference gradient) and the flow
// smoother (box filter) are built from these passes.
//
// BORDER HANDLING: Clamp (replicate edge pixels), matching clamp-to-edge
// addressing in the WGSL kernels so the CPU and GPU stages agree at borders.
//
// All functions write into a caller-provided destination so stages can run
// every frame without allocating.

use crate::image::Image;

/// 5-tap binomial low-pass kernel, a cheap Gaussian approximation (σ ≈ 1).
pub const BINOMIAL_5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Central difference kernel: d/dx ≈ (f(x+1) − f(x−1)) / 2.
pub const CENTRAL_DIFF: [f32; 3] = [-0.5, 0.0, 0.5];

/// 3-tap box kernel used by the flow smoother.
pub const BOX_3: [f32; 3] = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];

/// Convolve each row of `src` with a 1D kernel (horizontal pass).
///
/// The kernel is applied centered: for a kernel of length K, the center
/// element is at index K/2.
///
/// # Panics
/// Panics if the kernel is empty or of even length, or if `dst` has a
/// different size than `src`.
pub fn convolve_rows(src: &Image<f32>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);
    check_dims(src, dst);
    let half = kernel.len() as isize / 2;
    for y in 0..src.height() {
        for x in 0..src.width() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = x as isize + ki as isize - half;
                acc += src.get_clamped(sx, y as isize) * kv;
            }
            dst.set(x, y, acc);
        }
    }
}

/// Convolve each column of `src` with a 1D kernel (vertical pass).
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32], dst: &mut Image<f32>) {
    check_kernel(kernel);
    check_dims(src, dst);
    let half = kernel.len() as isize / 2;
    for y in 0..src.height() {
        for x in 0..src.width() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = y as isize + ki as isize - half;
                acc += src.get_clamped(x as isize, sy) * kv;
            }
            dst.set(x, y, acc);
        }
    }
}

/// Separable 2D convolution: rows with `kernel_row`, then columns with
/// `kernel_col`. `tmp` holds the intermediate horizontal result.
pub fn convolve_separable(
    src: &Image<f32>,
    kernel_row: &[f32],
    kernel_col: &[f32],
    tmp: &mut Image<f32>,
    dst: &mut Image<f32>,
) {
    convolve_rows(src, kernel_row, tmp);
    convolve_cols(tmp, kernel_col, dst);
}

fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}

fn check_dims(src: &Image<f32>, dst: &Image<f32>) {
    assert!(
        src.width() == dst.width() && src.height() == dst.height(),
        "destination {}×{} does not match source {}×{}",
        dst.width(),
        dst.height(),
        src.width(),
        src.height(),
    );
}
