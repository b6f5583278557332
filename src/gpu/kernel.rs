// gpu/kernel.rs — Shared compute-pipeline plumbing for the flow stages.
//
// Every stage shader follows the same shape:
//   - @group(0) holds storage buffers followed by one uniform params struct
//   - one or more 2D per-pixel entry points sharing that layout
//   - @workgroup_size({{WG_X}}, {{WG_Y}}, 1), baked in here
//
// `ComputeKernel` compiles the module once, derives one bind group layout
// from a list of binding kinds and creates a pipeline per entry point.
// Stages keep the kernel and build their bind groups against `bgl`.

use crate::gpu::device::GpuDevice;

/// How a binding is accessed by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// `var<storage, read>`
    ReadOnly,
    /// `var<storage, read_write>`
    ReadWrite,
    /// `var<uniform>`
    Uniform,
}

impl Binding {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Binding::ReadOnly => wgpu::BufferBindingType::Storage { read_only: true },
            Binding::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
            Binding::Uniform => wgpu::BufferBindingType::Uniform,
        };
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
}

/// A compiled shader module with one pipeline per entry point.
pub(crate) struct ComputeKernel {
    label: &'static str,
    pipelines: Vec<wgpu::ComputePipeline>,
    pub bgl: wgpu::BindGroupLayout,
}

impl ComputeKernel {
    /// Compile `template` with the device's workgroup size and create
    /// pipelines for `entry_points`, in order. Pipeline `i` is dispatched
    /// with `dispatch(.., i, ..)`.
    pub fn new(
        gpu: &GpuDevice,
        label: &'static str,
        template: &str,
        bindings: &[Binding],
        entry_points: &[&str],
    ) -> Self {
        let source = template
            .replace("{{WG_X}}", &gpu.workgroup_size.x.to_string())
            .replace("{{WG_Y}}", &gpu.workgroup_size.y.to_string());

        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let entries: Vec<_> = bindings
            .iter()
            .enumerate()
            .map(|(i, b)| b.layout_entry(i as u32))
            .collect();
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipelines = entry_points
            .iter()
            .map(|&entry| {
                gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&layout),
                    module: &module,
                    entry_point: entry,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    cache: None,
                })
            })
            .collect();

        log::debug!("compiled {label} ({} entry points)", entry_points.len());
        ComputeKernel { label, pipelines, bgl }
    }

    /// Create a bind group whose entries are `resources` in binding order.
    pub fn bind_group(&self, gpu: &GpuDevice, resources: &[wgpu::BindingResource<'_>]) -> wgpu::BindGroup {
        let entries: Vec<_> = resources
            .iter()
            .enumerate()
            .map(|(i, r)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: r.clone(),
            })
            .collect();
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.bgl,
            entries: &entries,
        })
    }

    /// Record one dispatch of pipeline `entry` covering `width` × `height`
    /// pixels, in its own compute pass.
    pub fn dispatch(
        &self,
        gpu: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        entry: usize,
        bind_group: &wgpu::BindGroup,
        width: usize,
        height: usize,
    ) {
        let (wx, wy) = gpu.dispatch_size(width as u32, height as u32);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines[entry]);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(wx, wy, 1);
    }
}

/// Create a uniform buffer sized for `P`, written later with `write_params`.
pub(crate) fn params_buffer<P: bytemuck::Pod>(gpu: &GpuDevice, label: &str) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<P>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Stage a params struct; it lands before the next submit.
pub(crate) fn write_params<P: bytemuck::Pod>(gpu: &GpuDevice, buffer: &wgpu::Buffer, params: &P) {
    gpu.queue.write_buffer(buffer, 0, bytemuck::bytes_of(params));
}
