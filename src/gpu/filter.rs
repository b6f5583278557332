// gpu/filter.rs — GpuFlowFilter: the flow pipeline on the GPU.
//
// Same topology, construction order and first-frame bootstrap as
// `filter::FlowFilter`; see filter.rs for the diagram. Differences:
//
//   - Buffers are `GpuBuffer`s; rebinding the update stage's input also
//     rebuilds its bind group.
//   - `compute` records all four stages into one command encoder and
//     submits once, then waits for the queue so `elapsed_time` covers the
//     GPU work and not just the encoding.
//   - Every call takes the `GpuDevice` explicitly.

use std::time::{Duration, Instant};

use crate::error::{check_max_flow, FlowError, Result};
use crate::filter::{FilterState, FlowFilterConfig};
use crate::gpu::buffer::GpuBuffer;
use crate::gpu::device::GpuDevice;
use crate::gpu::imagemodel::GpuImageModel;
use crate::gpu::propagation::GpuFlowPropagator;
use crate::gpu::smoother::GpuFlowSmoother;
use crate::gpu::update::GpuFlowUpdate;
use crate::image::Image;

/// Incremental dense optical flow filter running on a wgpu device.
pub struct GpuFlowFilter {
    height: usize,
    width: usize,

    input_image: GpuBuffer<u8>,
    image_model: GpuImageModel,
    update: GpuFlowUpdate,
    smoother: GpuFlowSmoother,
    propagator: GpuFlowPropagator,
    smoothed_flow: GpuBuffer<[f32; 2]>,

    state: FilterState,
    elapsed: Duration,
}

impl GpuFlowFilter {
    /// Create a filter for `height` × `width` images on `gpu`.
    ///
    /// # Errors
    /// `InvalidDimension` if either dimension is zero; `InvalidParameter` if
    /// `smooth_iterations` is zero or `max_flow`/`gamma` are not positive.
    pub fn new(
        gpu: &GpuDevice,
        height: usize,
        width: usize,
        smooth_iterations: usize,
        max_flow: f32,
        gamma: f32,
    ) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(FlowError::InvalidDimension { height, width });
        }
        let mut filter = Self::configure(gpu, height, width)?;
        filter.set_gamma(gamma)?;
        filter.set_max_flow(max_flow)?;
        filter.set_smooth_iterations(smooth_iterations)?;
        log::info!(
            "GpuFlowFilter {height}×{width} on {}: gamma={gamma}, max_flow={max_flow}, \
             smooth_iterations={smooth_iterations}, propagation_iterations={}",
            gpu.adapter_info,
            filter.propagation_iterations()
        );
        Ok(filter)
    }

    /// Create a filter from a [`FlowFilterConfig`].
    pub fn with_config(gpu: &GpuDevice, height: usize, width: usize, config: FlowFilterConfig) -> Result<Self> {
        Self::new(gpu, height, width, config.smooth_iterations, config.max_flow, config.gamma)
    }

    fn configure(gpu: &GpuDevice, height: usize, width: usize) -> Result<Self> {
        let input_image: GpuBuffer<u8> = GpuBuffer::new(gpu, height, width, "GpuFlowFilter::input_image");
        let image_model = GpuImageModel::new(gpu, &input_image);

        let dummy_flow: GpuBuffer<[f32; 2]> = GpuBuffer::new(gpu, height, width, "GpuFlowFilter::dummy_flow");
        let mut update = GpuFlowUpdate::new(
            gpu,
            &dummy_flow,
            image_model.image_constant(),
            image_model.image_gradient(),
            1.0,
            1.0,
        )?;

        let smoothed_flow: GpuBuffer<[f32; 2]> =
            GpuBuffer::new(gpu, height, width, "GpuFlowFilter::smoothed_flow");
        let smoother = GpuFlowSmoother::new(gpu, update.updated_flow(), &smoothed_flow, 1)?;
        let propagator = GpuFlowPropagator::new(gpu, smoother.smoothed_flow(), 1)?;

        update.set_input_flow(gpu, propagator.propagated_flow())?;
        drop(dummy_flow);

        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowFilter::configure") },
        );
        propagator.propagated_flow().encode_clear(&mut encoder);
        update.updated_flow().encode_clear(&mut encoder);
        update.updated_image().encode_clear(&mut encoder);
        smoothed_flow.encode_clear(&mut encoder);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        Ok(GpuFlowFilter {
            height,
            width,
            input_image,
            image_model,
            update,
            smoother,
            propagator,
            smoothed_flow,
            state: FilterState::AwaitingFirstImage,
            elapsed: Duration::ZERO,
        })
    }

    /// Upload a new frame. The first call also seeds the updated image.
    ///
    /// # Errors
    /// `ShapeMismatch` if the image is not `height` × `width`.
    pub fn load_image(&mut self, gpu: &GpuDevice, image: &Image<u8>) -> Result<()> {
        self.input_image.upload(gpu, image)?;

        if self.state == FilterState::AwaitingFirstImage {
            let mut encoder = gpu.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowFilter::seed") },
            );
            self.image_model.encode(gpu, &mut encoder);
            self.update
                .updated_image()
                .encode_copy_from(&mut encoder, self.image_model.image_constant())?;
            gpu.queue.submit(std::iter::once(encoder.finish()));
            self.state = FilterState::Running;
            log::trace!("GpuFlowFilter: updated image seeded from the first frame");
        }
        Ok(())
    }

    /// Run one filter cycle on the most recently loaded image and wait for it.
    pub fn compute(&mut self, gpu: &GpuDevice) -> Result<()> {
        let t0 = Instant::now();

        let mut encoder = gpu.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some("GpuFlowFilter::compute") },
        );
        self.image_model.encode(gpu, &mut encoder);
        self.propagator.encode(gpu, &mut encoder)?;
        self.update.encode(gpu, &mut encoder);
        self.smoother.encode(gpu, &mut encoder)?;
        gpu.queue.submit(std::iter::once(encoder.finish()));
        gpu.wait_idle();

        self.elapsed = t0.elapsed();
        log::debug!("GpuFlowFilter::compute {:.3} ms", self.elapsed.as_secs_f64() * 1e3);
        Ok(())
    }

    // ---- Parameters -------------------------------------------------------

    pub fn set_gamma(&mut self, gamma: f32) -> Result<()> {
        self.update.set_gamma(gamma)
    }

    pub fn gamma(&self) -> f32 {
        self.update.gamma()
    }

    /// Set the maximum flow magnitude. Propagation iterations follow as
    /// `ceil(max_flow)`. Values above [`MAX_FLOW_LIMIT`](crate::MAX_FLOW_LIMIT)
    /// are rejected and leave the filter unchanged.
    pub fn set_max_flow(&mut self, max_flow: f32) -> Result<()> {
        let iterations = check_max_flow(max_flow)?;
        self.update.set_max_flow(max_flow)?;
        self.propagator.set_iterations(iterations)
    }

    pub fn max_flow(&self) -> f32 {
        self.update.max_flow()
    }

    pub fn set_smooth_iterations(&mut self, iterations: usize) -> Result<()> {
        self.smoother.set_iterations(iterations)
    }

    pub fn smooth_iterations(&self) -> usize {
        self.smoother.iterations()
    }

    pub fn propagation_iterations(&self) -> usize {
        self.propagator.iterations()
    }

    // ---- Outputs ----------------------------------------------------------

    /// Handle to the updated (pre-smoothing) flow.
    pub fn flow(&self) -> &GpuBuffer<[f32; 2]> {
        self.update.updated_flow()
    }

    /// Download the smoothed flow, the filter's output for this frame.
    pub fn download_flow(&self, gpu: &GpuDevice, flow: &mut Image<[f32; 2]>) -> Result<()> {
        self.smoothed_flow.download(gpu, flow)
    }

    /// Download the filter's running brightness estimate.
    pub fn download_image(&self, gpu: &GpuDevice, image: &mut Image<f32>) -> Result<()> {
        self.update.updated_image().download(gpu, image)
    }

    pub fn download_image_constant(&self, gpu: &GpuDevice, image: &mut Image<f32>) -> Result<()> {
        self.image_model.image_constant().download(gpu, image)
    }

    pub fn download_image_gradient(&self, gpu: &GpuDevice, gradient: &mut Image<[f32; 2]>) -> Result<()> {
        self.image_model.image_gradient().download(gpu, gradient)
    }

    pub fn download_propagated_flow(&self, gpu: &GpuDevice, flow: &mut Image<[f32; 2]>) -> Result<()> {
        self.propagator.propagated_flow().download(gpu, flow)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Wall time of the last `compute` call, including the GPU wait.
    pub fn elapsed_time(&self) -> Duration {
        self.elapsed
    }
}
