// update.rs — Flow update stage (correction step).
//
// Corrects the propagated flow w⁻ against the new image. Per pixel, with
//   g  = image gradient of the new frame
//   e  = image constant − updated image   (brightness change since last frame)
//   γ  = gamma, weight of the prior
//
// the updated flow minimizes  (gᵀw + e)² + γ‖w − w⁻‖², i.e. solves
//
//   (g gᵀ + γ I) w = γ w⁻ − g e
//
// a 2×2 SPD system with determinant γ(γ + ‖g‖²) > 0, solved in closed form.
// Each component is then clamped to [−max_flow, max_flow]. Finally the
// updated image takes the new image constant, which becomes the reference
// brightness for the next frame.
//
// The input flow is late-bound: the filter constructs this stage against a
// placeholder buffer and rebinds it with `set_input_flow` once the
// propagator exists.

use crate::buffer::Buffer;
use crate::error::{check_max_flow, check_positive, check_shape, Result};

/// Brightness-constancy correction of the propagated flow.
pub struct FlowUpdate {
    input_flow: Buffer<[f32; 2]>,
    image_constant: Buffer<f32>,
    image_gradient: Buffer<[f32; 2]>,
    updated_flow: Buffer<[f32; 2]>,
    updated_image: Buffer<f32>,
    gamma: f32,
    max_flow: f32,
}

impl FlowUpdate {
    /// Bind to the flow and image-model buffers and allocate the outputs.
    pub fn new(
        input_flow: &Buffer<[f32; 2]>,
        image_constant: &Buffer<f32>,
        image_gradient: &Buffer<[f32; 2]>,
        gamma: f32,
        max_flow: f32,
    ) -> Result<Self> {
        check_positive("gamma", gamma)?;
        check_max_flow(max_flow)?;
        check_shape(image_constant.shape().with_channels(2), image_gradient.shape())?;
        check_shape(image_gradient.shape(), input_flow.shape())?;
        let (h, w) = (image_constant.height(), image_constant.width());
        Ok(FlowUpdate {
            input_flow: input_flow.clone(),
            image_constant: image_constant.clone(),
            image_gradient: image_gradient.clone(),
            updated_flow: Buffer::new(h, w),
            updated_image: Buffer::new(h, w),
            gamma,
            max_flow,
        })
    }

    /// Replace the input flow binding. The new buffer must have the same shape.
    pub fn set_input_flow(&mut self, input_flow: &Buffer<[f32; 2]>) -> Result<()> {
        check_shape(self.input_flow.shape(), input_flow.shape())?;
        log::trace!("FlowUpdate: input flow rebound to {input_flow:?}");
        self.input_flow = input_flow.clone();
        Ok(())
    }

    /// Compute the updated flow and updated image.
    pub fn compute(&mut self) {
        let input_flow = self.input_flow.read();
        let constant = self.image_constant.read();
        let gradient = self.image_gradient.read();
        let mut flow = self.updated_flow.write();
        let mut image = self.updated_image.write();

        for y in 0..flow.height() {
            for x in 0..flow.width() {
                let c = constant.get(x, y);
                let e = c - image.get(x, y);
                let w = solve_pixel(gradient.get(x, y), input_flow.get(x, y), e, self.gamma, self.max_flow);
                flow.set(x, y, w);
                image.set(x, y, c);
            }
        }
    }

    pub fn set_gamma(&mut self, gamma: f32) -> Result<()> {
        check_positive("gamma", gamma)?;
        self.gamma = gamma;
        Ok(())
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn set_max_flow(&mut self, max_flow: f32) -> Result<()> {
        check_max_flow(max_flow)?;
        self.max_flow = max_flow;
        Ok(())
    }

    pub fn max_flow(&self) -> f32 {
        self.max_flow
    }

    pub fn input_flow(&self) -> &Buffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn updated_flow(&self) -> &Buffer<[f32; 2]> {
        &self.updated_flow
    }

    pub fn updated_image(&self) -> &Buffer<f32> {
        &self.updated_image
    }
}

/// Closed-form solution of the per-pixel 2×2 update system.
#[inline]
pub(crate) fn solve_pixel(g: [f32; 2], prior: [f32; 2], e: f32, gamma: f32, max_flow: f32) -> [f32; 2] {
    let [gx, gy] = g;
    let a00 = gamma + gx * gx;
    let a01 = gx * gy;
    let a11 = gamma + gy * gy;
    let b0 = gamma * prior[0] - gx * e;
    let b1 = gamma * prior[1] - gy * e;
    let det = a00 * a11 - a01 * a01;
    let u = (a11 * b0 - a01 * b1) / det;
    let v = (a00 * b1 - a01 * b0) / det;
    [u.clamp(-max_flow, max_flow), v.clamp(-max_flow, max_flow)]
}
