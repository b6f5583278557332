// propagation.rs — Flow propagation stage (prediction step).
//
// Transports the previous flow estimate along itself:
//
//   ∂W/∂t = −(W·∇)W,   W = (u, v)
//
// integrated over one frame interval with N explicit steps of dt = 1/N.
// Spatial derivatives use first-order upwinding: along x, the backward
// difference when u > 0 and the forward difference otherwise (same along
// y with v). The scheme is stable while |u|·dt ≤ 1 and |v|·dt ≤ 1, which is
// why the filter ties N to ceil(max_flow): the update stage clamps every
// component to max_flow.
//
// Steps ping-pong between the output buffer and a scratch image; both are
// allocated once at construction.

use crate::buffer::Buffer;
use crate::error::{check_iterations, Result};
use crate::image::Image;

/// Warps the previous flow field forward by one frame.
pub struct FlowPropagator {
    input_flow: Buffer<[f32; 2]>,
    propagated_flow: Buffer<[f32; 2]>,
    scratch: Image<[f32; 2]>,
    iterations: usize,
    dt: f32,
}

impl FlowPropagator {
    /// Bind to `input_flow` and allocate the propagated flow output.
    pub fn new(input_flow: &Buffer<[f32; 2]>, iterations: usize) -> Result<Self> {
        check_iterations("propagation_iterations", iterations)?;
        let (h, w) = (input_flow.height(), input_flow.width());
        Ok(FlowPropagator {
            input_flow: input_flow.clone(),
            propagated_flow: Buffer::new(h, w),
            scratch: Image::new(w, h),
            iterations,
            dt: 1.0 / iterations as f32,
        })
    }

    /// Propagate the current input flow into `propagated_flow`.
    pub fn compute(&mut self) -> Result<()> {
        self.propagated_flow.copy_from(&self.input_flow)?;
        let mut out = self.propagated_flow.write();
        for _ in 0..self.iterations {
            upwind_step(&out, &mut self.scratch, self.dt);
            std::mem::swap(&mut *out, &mut self.scratch);
        }
        Ok(())
    }

    pub fn set_iterations(&mut self, iterations: usize) -> Result<()> {
        check_iterations("propagation_iterations", iterations)?;
        self.iterations = iterations;
        self.dt = 1.0 / iterations as f32;
        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Integration time step, 1 / iterations.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn input_flow(&self) -> &Buffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn propagated_flow(&self) -> &Buffer<[f32; 2]> {
        &self.propagated_flow
    }
}

/// One explicit upwind step from `src` into `dst`.
pub(crate) fn upwind_step(src: &Image<[f32; 2]>, dst: &mut Image<[f32; 2]>, dt: f32) {
    for y in 0..src.height() {
        for x in 0..src.width() {
            let (xi, yi) = (x as isize, y as isize);
            let c = src.get(x, y);
            let [u, v] = c;

            let (l, r) = (src.get_clamped(xi - 1, yi), src.get_clamped(xi + 1, yi));
            let (t, b) = (src.get_clamped(xi, yi - 1), src.get_clamped(xi, yi + 1));

            let mut next = [0.0f32; 2];
            for k in 0..2 {
                let dx = if u > 0.0 { c[k] - l[k] } else { r[k] - c[k] };
                let dy = if v > 0.0 { c[k] - t[k] } else { b[k] - c[k] };
                next[k] = c[k] - dt * (u * dx + v * dy);
            }
            dst.set(x, y, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn propagator_with(flow: &Image<[f32; 2]>, iterations: usize) -> FlowPropagator {
        let input = Buffer::new(flow.height(), flow.width());
        input.upload(flow).unwrap();
        FlowPropagator::new(&input, iterations).unwrap()
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let input: Buffer<[f32; 2]> = Buffer::new(4, 4);
        assert!(FlowPropagator::new(&input, 0).is_err());
        let mut p = FlowPropagator::new(&input, 1).unwrap();
        assert!(p.set_iterations(0).is_err());
        assert_eq!(p.iterations(), 1);
    }

    #[test]
    fn test_set_iterations_updates_dt() {
        let input: Buffer<[f32; 2]> = Buffer::new(2, 2);
        let mut p = FlowPropagator::new(&input, 1).unwrap();
        p.set_iterations(4).unwrap();
        assert_eq!(p.iterations(), 4);
        assert!((p.dt() - 0.25).abs() < 1e-7);
    }

    #[test]
    fn test_zero_flow_stays_zero() {
        let mut p = propagator_with(&Image::new(8, 8), 3);
        p.compute().unwrap();
        for (_, _, f) in p.propagated_flow().to_image().pixels() {
            assert_eq!(f, [0.0, 0.0]);
        }
    }

    #[test]
    fn test_uniform_flow_is_preserved() {
        // A spatially constant field has no gradient, so transport leaves it unchanged.
        let mut p = propagator_with(&Image::filled(8, 6, [1.5, -0.5]), 2);
        p.compute().unwrap();
        for (x, y, f) in p.propagated_flow().to_image().pixels() {
            assert!((f[0] - 1.5).abs() < 1e-6 && (f[1] + 0.5).abs() < 1e-6, "({x},{y}) = {f:?}");
        }
    }

    #[test]
    fn test_patch_trailing_edge_is_transported() {
        // A 1 px/frame rightward patch over a static background. The upwind
        // difference at the patch's left edge looks back into the background,
        // so one full step (dt = 1) carries the background value in.
        let flow = Image::from_fn(16, 4, |x, _| if (4..8).contains(&x) { [1.0, 0.0] } else { [0.0, 0.0] });
        let mut p = propagator_with(&flow, 1);
        p.compute().unwrap();
        let out = p.propagated_flow().to_image();
        assert_eq!(out.get(4, 2), [0.0, 0.0]);
        assert_eq!(out.get(7, 2), [1.0, 0.0]);
        assert_eq!(out.get(8, 2), [0.0, 0.0]);
        assert_eq!(out.get(2, 2), [0.0, 0.0]);
    }

    #[test]
    fn test_substeps_split_the_frame() {
        // Same patch with two half steps: the left edge only drains halfway
        // on the first step.
        let flow = Image::from_fn(16, 4, |x, _| if (4..8).contains(&x) { [1.0, 0.0] } else { [0.0, 0.0] });
        let src = flow.clone();
        let mut half = Image::new(16, 4);
        upwind_step(&src, &mut half, 0.5);
        assert!((half.get(4, 1)[0] - 0.5).abs() < 1e-6);
        assert!((half.get(5, 1)[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_input_is_not_modified() {
        let flow = Image::from_fn(8, 8, |x, y| [(x as f32) * 0.1, (y as f32) * -0.1]);
        let mut p = propagator_with(&flow, 2);
        p.compute().unwrap();
        assert_eq!(p.input_flow().to_image().as_slice(), flow.as_slice());
    }
}
