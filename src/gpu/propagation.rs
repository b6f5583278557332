// gpu/propagation.rs — GPU flow propagation (prediction step).
//
// Mirrors `propagation::FlowPropagator`. Per frame:
//
//   copy input_flow → propagated
//   N × propagate      propagated → scratch   (bind group A)
//                      scratch → propagated   (bind group B)
//   if N is odd: copy scratch → propagated
//
// The two bind groups are built once; only `dt` changes when the iteration
// count does, and it is re-staged every frame with the params uniform.

use bytemuck::{Pod, Zeroable};

use crate::error::{check_iterations, Result};
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::device::GpuDevice;
use crate::gpu::kernel::{params_buffer, write_params, Binding, ComputeKernel};

const PROPAGATE: usize = 0;

/// Layout must match `Params` in propagation.wgsl (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct PropagationParams {
    width: u32,
    height: u32,
    dt: f32,
    _pad: u32,
}

/// Warps the previous flow field forward by one frame on the GPU.
pub struct GpuFlowPropagator {
    input_flow: GpuBuffer<[f32; 2]>,
    propagated_flow: GpuBuffer<[f32; 2]>,
    scratch: GpuBuffer<[f32; 2]>,
    kernel: ComputeKernel,
    /// [propagated → scratch, scratch → propagated]
    bind_groups: [wgpu::BindGroup; 2],
    params: wgpu::Buffer,
    iterations: usize,
}

impl GpuFlowPropagator {
    /// Bind to `input_flow` and allocate the propagated flow output.
    pub fn new(gpu: &GpuDevice, input_flow: &GpuBuffer<[f32; 2]>, iterations: usize) -> Result<Self> {
        check_iterations("propagation_iterations", iterations)?;
        let (h, w) = (input_flow.height(), input_flow.width());
        let propagated_flow = GpuBuffer::new(gpu, h, w, "GpuFlowPropagator::propagated_flow");
        let scratch = GpuBuffer::new(gpu, h, w, "GpuFlowPropagator::scratch");

        let kernel = ComputeKernel::new(
            gpu,
            "propagation.wgsl",
            include_str!("../shaders/propagation.wgsl"),
            &[Binding::ReadOnly, Binding::ReadWrite, Binding::Uniform],
            &["propagate"],
        );
        let params = params_buffer::<PropagationParams>(gpu, "PropagationParams");

        let forward = kernel.bind_group(
            gpu,
            &[propagated_flow.binding(), scratch.binding(), params.as_entire_binding()],
        );
        let backward = kernel.bind_group(
            gpu,
            &[scratch.binding(), propagated_flow.binding(), params.as_entire_binding()],
        );

        Ok(GpuFlowPropagator {
            input_flow: input_flow.clone(),
            propagated_flow,
            scratch,
            kernel,
            bind_groups: [forward, backward],
            params,
            iterations,
        })
    }

    /// Record the propagation into `encoder`.
    pub fn encode(&self, gpu: &GpuDevice, encoder: &mut wgpu::CommandEncoder) -> Result<()> {
        let (h, w) = (self.propagated_flow.height(), self.propagated_flow.width());
        write_params(
            gpu,
            &self.params,
            &PropagationParams { width: w as u32, height: h as u32, dt: self.dt(), _pad: 0 },
        );

        self.propagated_flow.encode_copy_from(encoder, &self.input_flow)?;
        for i in 0..self.iterations {
            self.kernel.dispatch(gpu, encoder, PROPAGATE, &self.bind_groups[i % 2], w, h);
        }
        if self.iterations % 2 == 1 {
            self.propagated_flow.encode_copy_from(encoder, &self.scratch)?;
        }
        Ok(())
    }

    /// Run the propagation immediately.
    pub fn compute(&self, gpu: &GpuDevice) -> Result<()> {
        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowPropagator::compute") },
        );
        self.encode(gpu, &mut encoder)?;
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    pub fn set_iterations(&mut self, iterations: usize) -> Result<()> {
        check_iterations("propagation_iterations", iterations)?;
        self.iterations = iterations;
        Ok(())
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Step size, 1 / iterations.
    pub fn dt(&self) -> f32 {
        1.0 / self.iterations as f32
    }

    pub fn input_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.input_flow
    }

    pub fn propagated_flow(&self) -> &GpuBuffer<[f32; 2]> {
        &self.propagated_flow
    }
}
