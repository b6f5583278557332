// gpu/update.rs — GPU flow update (correction step).
//
// Mirrors `update::FlowUpdate`; the per-pixel solve is in update.wgsl.
//
// A bind group captures its buffers at creation, so rebinding the input
// flow with `set_input_flow` rebuilds the bind group. That happens once,
// while the filter closes its feedback loop.

use bytemuck::{Pod, Zeroable};

use crate::error::{check_max_flow, check_positive, check_shape, Result};
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::device::GpuDevice;
use crate::gpu::kernel::{params_buffer, write_params, Binding, ComputeKernel};

const UPDATE: usize = 0;

/// Layout must match `Params` in update.wgsl (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct UpdateParams {
    width: u32,
    height: u32,
    gamma: f32,
    max_flow: f32,
}

/// Brightness-constancy correction of the propagated flow on the GPU.
pub struct GpuFlowUpdate {
    input_flow: GpuBuffer<[f32; 2]>,
    image_constant: GpuBuffer<f32>,
    image_gradient: GpuBuffer<[f32; 2]>,
    updated_flow: GpuBuffer<[f32; 2]>,
    updated_image: GpuBuffer<f32>,
    kernel: ComputeKernel,
    bind_group: wgpu::BindGroup,
    params: wgpu::Buffer,
    gamma: f32,
    max_flow: f32,
}

impl GpuFlowUpdate {
    /// Bind to the flow and image-model buffers and allocate the outputs.
    pub fn new(
        gpu: &GpuDevice,
        input_flow: &GpuBuffer<[f32; 2]>,
        image_constant: &GpuBuffer<f32>,
        image_gradient: &GpuBuffer<[f32; 2]>,
        gamma: f32,
        max_flow: f32,
    ) -> Result<Self> {
        check_positive("gamma", gamma)?;
        check_max_flow(max_flow)?;
        check_shape(image_constant.shape().with_channels(2), image_gradient.shape())?;
        check_shape(image_gradient.shape(), input_flow.shape())?;

        let (h, w) = (image_constant.height(), image_constant.width());
        let updated_flow = GpuBuffer::new(gpu, h, w, "GpuFlowUpdate::updated_flow");
        let updated_image = GpuBuffer::new(gpu, h, w, "GpuFlowUpdate::updated_image");

        let kernel = ComputeKernel::new(
            gpu,
            "update.wgsl",
            include_str!("../shaders/update.wgsl"),
            &[
                Binding::ReadOnly,
                Binding::ReadOnly,
                Binding::ReadOnly,
                Binding::ReadWrite,
                Binding::ReadWrite,
                Binding::Uniform,
            ],
            &["update"],
        );
        let params = params_buffer::<UpdateParams>(gpu, "UpdateParams");
        let bind_group = Self::make_bind_group(
            gpu,
            &kernel,
            input_flow,
            image_constant,
            image_gradient,
            &updated_flow,
            &updated_image,
            &params,
        );

        Ok(GpuFlowUpdate {
            input_flow: input_flow.clone(),
            image_constant: image_constant.clone(),
            image_gradient: image_gradient.clone(),
            updated_flow,
            updated_image,
            kernel,
            bind_group,
            params,
            gamma,
            max_flow,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn make_bind_group(
        gpu: &GpuDevice,
        kernel: &ComputeKernel,
        input_flow: &GpuBuffer<[f32; 2]>,
        image_constant: &GpuBuffer<f32>,
        image_gradient: &GpuBuffer<[f32; 2]>,
        updated_flow: &GpuBuffer<[f32; 2]>,
        updated_image: &GpuBuffer<f32>,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        kernel.bind_group(
            gpu,
            &[
                input_flow.binding(),
                image_constant.binding(),
                image_gradient.binding(),
                updated_flow.binding(),
                updated_image.binding(),
                params.as_entire_binding(),
            ],
        )
    }

    /// Replace the input flow binding. The new buffer must have the same shape.
    pub fn set_input_flow(&mut self, gpu: &GpuDevice, input_flow: &GpuBuffer<[f32; 2]>) -> Result<()> {
        check_shape(self.input_flow.shape(), input_flow.shape())?;
        log::trace!("GpuFlowUpdate: input flow rebound to {input_flow:?}");
        self.input_flow = input_flow.clone();
        self.bind_group = Self::make_bind_group(
            gpu,
            &self.kernel,
            &self.input_flow,
            &self.image_constant,
            &self.image_gradient,
            &self.updated_flow,
            &self.updated_image,
            &self.params,
        );
        Ok(())
    }

    /// Record the update dispatch into `encoder`.
    pub fn encode(&self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder) {
        let (h, w) = (self.updated_flow.height(), self.updated_flow.width());
        write_params(
            gpu,
            &self.params,
            &UpdateParams {
                width: w as u32,
                height: h as u32,
                gamma: self.gamma,
                max_flow: self.max_flow,
            },
        );
        self.kernel.dispatch(gpu, encoder, UPDATE, &self.bind_group, w, h);
    }

    /// Run the update immediately.
    pub fn compute(&self, gpu: &GpuDevice) {
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowUpdate::compute") },
        );
        self.encode(gpu, &mut encoder);
        gpu.queue.submit(std::iter::once(encoder.finish()));
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

    pub fn input_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn updated_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.updated_flow
    }

    pub fn updated_image(&self) -> &GpuBuffer<f32> {
        &self.updated_image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::gpu::run_gpu_test_in_subprocess;
    use crate::image::Image;
    use crate::update::FlowUpdate;

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let (w, h) = (10, 6);
        let prior = Image::from_fn(w, h, |x, y| [0.1 * x as f32 - 0.4, 0.05 * y as f32]);
        let constant = Image::from_fn(w, h, |x, y| ((x * 3 + y * 5) % 11) as f32 / 11.0);
        let gradient = Image::from_fn(w, h, |x, y| [0.3 - 0.07 * x as f32, 0.02 * y as f32 - 0.1]);

        let cpu_flow = Buffer::new(h, w);
        let cpu_const = Buffer::new(h, w);
        let cpu_grad = Buffer::new(h, w);
        cpu_flow.upload(&prior).unwrap();
        cpu_const.upload(&constant).unwrap();
        cpu_grad.upload(&gradient).unwrap();
        let mut cpu = FlowUpdate::new(&cpu_flow, &cpu_const, &cpu_grad, 0.5, 0.75).unwrap();
        cpu.compute();

        let g_flow = GpuBuffer::new(&gpu, h, w, "flow");
        let g_const = GpuBuffer::new(&gpu, h, w, "constant");
        let g_grad = GpuBuffer::new(&gpu, h, w, "gradient");
        g_flow.upload(&gpu, &prior).unwrap();
        g_const.upload(&gpu, &constant).unwrap();
        g_grad.upload(&gpu, &gradient).unwrap();
        let upd = GpuFlowUpdate::new(&gpu, &g_flow, &g_const, &g_grad, 0.5, 0.75).unwrap();
        upd.compute(&gpu);

        let got = upd.updated_flow().to_image(&gpu).unwrap();
        let want = cpu.updated_flow().to_image();
        for (x, y, g) in got.pixels() {
            let c = want.get(x, y);
            assert!((g[0] - c[0]).abs() < 1e-5 && (g[1] - c[1]).abs() < 1e-5, "({x},{y}): {g:?} vs {c:?}");
            assert!(g[0].abs() <= 0.75 && g[1].abs() <= 0.75);
        }
        let image = upd.updated_image().to_image(&gpu).unwrap();
        assert_eq!(image.as_slice(), constant.as_slice());
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_rebind_reads_new_input() {
        let gpu = GpuDevice::new().expect("need a GPU");
        let zero: GpuBuffer<[f32; 2]> = GpuBuffer::new(&gpu, 4, 4, "zero");
        let constant: GpuBuffer<f32> = GpuBuffer::new(&gpu, 4, 4, "constant");
        let gradient: GpuBuffer<[f32; 2]> = GpuBuffer::new(&gpu, 4, 4, "gradient");
        let mut upd = GpuFlowUpdate::new(&gpu, &zero, &constant, &gradient, 1.0, 2.0).unwrap();

        // Zero gradient and zero brightness change: the output equals the prior.
        let prior = GpuBuffer::new(&gpu, 4, 4, "prior");
        prior.upload(&gpu, &Image::filled(4, 4, [0.5f32, -0.25])).unwrap();
        upd.set_input_flow(&gpu, &prior).unwrap();
        assert!(upd.input_flow().ptr_eq(&prior));
        upd.compute(&gpu);
        let out = upd.updated_flow().to_image(&gpu).unwrap();
        assert!(out.pixels().all(|(_, _, f)| f == [0.5, -0.25]));

        let wrong: GpuBuffer<[f32; 2]> = GpuBuffer::new(&gpu, 4, 5, "wrong");
        assert!(upd.set_input_flow(&gpu, &wrong).is_err());
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_gpu_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::update::tests::inner_gpu_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU"]
    fn test_rebind_reads_new_input() {
        let out = run_gpu_test_in_subprocess("gpu::update::tests::inner_rebind_reads_new_input");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
