// smoother.rs — Flow smoothing stage (spatial regularization).
//
// Copies the updated flow into the smoothed flow buffer, then applies N
// passes of a separable 3×3 box filter, rows then columns, each pass
// going through a scratch image. Borders replicate edge pixels.
//
// The output buffer is supplied by the caller rather than allocated here:
// the filter owns the smoothed flow handle because it doubles as the
// propagator's input on the next frame.

use crate::buffer::Buffer;
use crate::convolution::BOX_3;
use crate::error::{check_iterations, check_shape, Result};
use crate::image::Image;

/// Diffuses the updated flow into the smoothed flow.
pub struct FlowSmoother {
    input_flow: Buffer<[f32; 2]>,
    smoothed_flow: Buffer<[f32; 2]>,
    scratch: Image<[f32; 2]>,
    iterations: usize,
}

impl FlowSmoother {
    /// Bind to `input_flow`, writing into `smoothed_flow`.
    pub fn new(
        input_flow: &Buffer<[f32; 2]>,
        smoothed_flow: &Buffer<[f32; 2]>,
        iterations: usize,
    ) -> Result<Self> {
        check_iterations("smooth_iterations", iterations)?;
        check_shape(input_flow.shape(), smoothed_flow.shape())?;
        let (h, w) = (input_flow.height(), input_flow.width());
        Ok(FlowSmoother {
            input_flow: input_flow.clone(),
            smoothed_flow: smoothed_flow.clone(),
            scratch: Image::new(w, h),
            iterations,
        })
    }

    /// Smooth the current input flow into `smoothed_flow`.
    pub fn compute(&mut self) -> Result<()> {
        self.smoothed_flow.copy_from(&self.input_flow)?;
        let mut out = self.smoothed_flow.write();
        for _ in 0..self.iterations {
            box_pass(&out, &mut self.scratch, 1, 0);
            box_pass(&self.scratch, &mut out, 0, 1);
        }
        Ok(())
    }

    pub fn set_iterations(&mut self, iterations: usize) -> Result<()> {
        check_iterations("smooth_iterations", iterations)?;
        self.iterations = iterations;
        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn input_flow(&self) -> &Buffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn smoothed_flow(&self) -> &Buffer<[f32; 2]> {
        &self.smoothed_flow
    }
}

/// One 3-tap box pass along (step_x, step_y), clamped at borders.
pub(crate) fn box_pass(src: &Image<[f32; 2]>, dst: &mut Image<[f32; 2]>, step_x: isize, step_y: isize) {
    for y in 0..src.height() {
        for x in 0..src.width() {
            let (xi, yi) = (x as isize, y as isize);
            let mut acc = [0.0f32; 2];
            for (k, &w) in BOX_3.iter().enumerate() {
                let o = k as isize - 1;
                let p = src.get_clamped(xi + o * step_x, yi + o * step_y);
                acc[0] += p[0] * w;
                acc[1] += p[1] * w;
            }
            dst.set(x, y, acc);
        }
    }
}
