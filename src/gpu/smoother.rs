// gpu/smoother.rs — GPU flow smoothing.
//
// Mirrors `smoother::FlowSmoother`: copy the updated flow into the
// caller-supplied smoothed flow buffer, then N × (smooth_x, smooth_y)
// through a scratch buffer.

use bytemuck::{Pod, Zeroable};

use crate::error::{check_iterations, check_shape, Result};
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::device::GpuDevice;
use crate::gpu::kernel::{params_buffer, write_params, Binding, ComputeKernel};

const SMOOTH_X: usize = 0;
const SMOOTH_Y: usize = 1;

/// Layout must match `Params` in smoother.wgsl (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct SmootherParams {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Diffuses the updated flow into the smoothed flow on the GPU.
pub struct GpuFlowSmoother {
    input_flow: GpuBuffer<[f32; 2]>,
    smoothed_flow: GpuBuffer<[f32; 2]>,
    kernel: ComputeKernel,
    bind_group: wgpu::BindGroup,
    iterations: usize,
    _scratch: GpuBuffer<[f32; 2]>,
    _params: wgpu::Buffer,
}

impl GpuFlowSmoother {
    /// Bind to `input_flow`, writing into `smoothed_flow`.
    pub fn new(
        gpu: &GpuDevice,
        input_flow: &GpuBuffer<[f32; 2]>,
        smoothed_flow: &GpuBuffer<[f32; 2]>,
        iterations: usize,
    ) -> Result<Self> {
        check_iterations("smooth_iterations", iterations)?;
        check_shape(input_flow.shape(), smoothed_flow.shape())?;
        let (h, w) = (input_flow.height(), input_flow.width());
        let scratch = GpuBuffer::new(gpu, h, w, "GpuFlowSmoother::scratch");

        let kernel = ComputeKernel::new(
            gpu,
            "smoother.wgsl",
            include_str!("../shaders/smoother.wgsl"),
            &[Binding::ReadWrite, Binding::ReadWrite, Binding::Uniform],
            &["smooth_x", "smooth_y"],
        );
        let params = params_buffer::<SmootherParams>(gpu, "SmootherParams");
        write_params(
            gpu,
            &params,
            &SmootherParams { width: w as u32, height: h as u32, _pad0: 0, _pad1: 0 },
        );
        let bind_group = kernel.bind_group(
            gpu,
            &[smoothed_flow.binding(), scratch.binding(), params.as_entire_binding()],
        );

        Ok(GpuFlowSmoother {
            input_flow: input_flow.clone(),
            smoothed_flow: smoothed_flow.clone(),
            kernel,
            bind_group,
            iterations,
            _scratch: scratch,
            _params: params,
        })
    }

    /// Record the smoothing into `encoder`.
    pub fn encode(&self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        let (h, w) = (self.smoothed_flow.height(), self.smoothed_flow.width());
        self.smoothed_flow.encode_copy_from(encoder, &self.input_flow)?;
        for _ in 0..self.iterations {
            self.kernel.dispatch(gpu, encoder, SMOOTH_X, &self.bind_group, w, h);
            self.kernel.dispatch(gpu, encoder, SMOOTH_Y, &self.bind_group, w, h);
        }
        Ok(())
    }

    /// Run the smoother immediately.
    pub fn compute(&self, gpu: &GpuDevice) -> Result<()> {
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowSmoother::compute") },
        );
        self.encode(gpu, &mut encoder)?;
        gpu.queue.submit(std::iter::once(encoder.finish()));
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

    pub fn input_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn smoothed_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.smoothed_flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::gpu::run_gpu_test_in_subprocess;
    use crate::image::Image;
    use crate::smoother::FlowSmoother;

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let flow = Image::from_fn(9, 7, |x, y| {
            if (x + y) % 3 == 0 { [1.0, -0.5] } else { [0.0, 0.25] }
        });

        let cpu_in = Buffer::new(7, 9);
        let cpu_out = Buffer::new(7, 9);
        cpu_in.upload(&flow).unwrap();
        let mut cpu = FlowSmoother::new(&cpu_in, &cpu_out, 3).unwrap();
        cpu.compute().unwrap();

        let g_in = GpuBuffer::new(&gpu, 7, 9, "in");
        let g_out = GpuBuffer::new(&gpu, 7, 9, "out");
        g_in.upload(&gpu, &flow).unwrap();
        let smoother = GpuFlowSmoother::new(&gpu, &g_in, &g_out, 3).unwrap();
        assert!(smoother.smoothed_flow().ptr_eq(&g_out));
        smoother.compute(&gpu).unwrap();

        let got = g_out.to_image(&gpu).unwrap();
        let want = cpu_out.to_image();
        for (x, y, g) in got.pixels() {
            let c = want.get(x, y);
            assert!((g[0] - c[0]).abs() < 1e-5 && (g[1] - c[1]).abs() < 1e-5, "({x},{y}): {g:?} vs {c:?}");
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::smoother::tests::inner_gpu_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
