// filter.rs — FlowFilter: the per-frame optical flow pipeline.
//
// Wires the four stages into a feedback loop:
//
//        input image
//            │
//       ImageModel ──constant, gradient──┐
//                                        ▼
//   ┌──▶ FlowPropagator ──propagated──▶ FlowUpdate ──updated flow──▶ FlowSmoother ──┐
//   │                                   (updated image)                             │
//   └──────────────────────────── smoothed flow ◀───────────────────────────────────┘
//
// CONSTRUCTION ORDER
// ──────────────────
// Each stage is constructed against buffers that already exist, but the
// update stage reads the propagator's output and the propagator (through
// the smoother) reads the update stage's output. The cycle is broken with a
// placeholder: FlowUpdate is built against a dummy flow buffer, the smoother
// and propagator are built after it, and FlowUpdate is then rebound to the
// propagator's output. Buffers are shared handles, so the rebind swaps a
// handle and copies no pixels.
//
// The smoothed flow buffer is allocated here, not by the smoother: it is the
// public output of this frame and the propagator's input on the next.
//
// FIRST FRAME
// ───────────
// The updated image starts at zero. Comparing the first frame against an
// all-zero reference would produce a meaningless first update, so the first
// `load_image` runs the image model immediately and seeds the updated image
// with the image constant. This happens exactly once per filter.

use std::time::{Duration, Instant};

use crate::buffer::Buffer;
use crate::error::{check_max_flow, FlowError, Result};
use crate::image::Image;
use crate::imagemodel::ImageModel;
use crate::propagation::FlowPropagator;
use crate::smoother::FlowSmoother;
use crate::update::FlowUpdate;

/// Lifecycle of a filter with respect to the first-frame bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Constructed; no image loaded yet. The next `load_image` seeds the
    /// updated image.
    AwaitingFirstImage,
    /// The updated image has been seeded; it now changes only in `compute`.
    Running,
}

/// Filter parameters. `Default` gives the values the filter uses when
/// constructed without explicit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowFilterConfig {
    /// Smoothing passes per frame (≥ 1).
    pub smooth_iterations: usize,
    /// Largest flow component magnitude in pixels/frame (> 0). Also sets the
    /// number of propagation steps to `ceil(max_flow)`.
    pub max_flow: f32,
    /// Weight of the propagated prior in the update (> 0).
    pub gamma: f32,
}

impl Default for FlowFilterConfig {
    fn default() -> Self {
        FlowFilterConfig {
            smooth_iterations: 1,
            max_flow: 1.0,
            gamma: 1.0,
        }
    }
}

/// Incremental dense optical flow filter (CPU reference implementation).
///
/// # Example
/// ```
/// use flowfilter::filter::FlowFilter;
/// use flowfilter::image::Image;
///
/// let mut filter = FlowFilter::new(4, 4, 2, 4.0, 0.5).unwrap();
/// filter.load_image(&Image::filled(4, 4, 100u8)).unwrap();
/// filter.compute().unwrap();
///
/// let mut flow = Image::new(4, 4);
/// filter.download_flow(&mut flow).unwrap();
/// assert!(flow.pixels().all(|(_, _, f)| f == [0.0, 0.0]));
/// ```
pub struct FlowFilter {
    height: usize,
    width: usize,

    input_image: Buffer<u8>,
    image_model: ImageModel,
    update: FlowUpdate,
    smoother: FlowSmoother,
    propagator: FlowPropagator,
    smoothed_flow: Buffer<[f32; 2]>,

    state: FilterState,
    elapsed: Duration,
}

impl FlowFilter {
    /// Create a filter for `height` × `width` images.
    ///
    /// # Errors
    /// `InvalidDimension` if either dimension is zero; `InvalidParameter` if
    /// `smooth_iterations` is zero or `max_flow`/`gamma` are not positive.
    pub fn new(
        height: usize,
        width: usize,
        smooth_iterations: usize,
        max_flow: f32,
        gamma: f32,
    ) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(FlowError::InvalidDimension { height, width });
        }
        let mut filter = Self::configure(height, width)?;
        filter.set_gamma(gamma)?;
        filter.set_max_flow(max_flow)?;
        filter.set_smooth_iterations(smooth_iterations)?;
        log::info!(
            "FlowFilter {height}×{width}: gamma={gamma}, max_flow={max_flow}, \
             smooth_iterations={smooth_iterations}, propagation_iterations={}",
            filter.propagation_iterations()
        );
        Ok(filter)
    }

    /// Create a filter from a [`FlowFilterConfig`].
    pub fn with_config(height: usize, width: usize, config: FlowFilterConfig) -> Result<Self> {
        Self::new(height, width, config.smooth_iterations, config.max_flow, config.gamma)
    }

    /// Allocate every buffer, construct the stages and close the feedback loop.
    fn configure(height: usize, width: usize) -> Result<Self> {
        let input_image: Buffer<u8> = Buffer::new(height, width);
        let image_model = ImageModel::new(&input_image);

        let dummy_flow: Buffer<[f32; 2]> = Buffer::new(height, width);
        let mut update = FlowUpdate::new(
            &dummy_flow,
            image_model.image_constant(),
            image_model.image_gradient(),
            1.0,
            1.0,
        )?;

        let smoothed_flow: Buffer<[f32; 2]> = Buffer::new(height, width);
        let smoother = FlowSmoother::new(update.updated_flow(), &smoothed_flow, 1)?;
        let propagator = FlowPropagator::new(smoother.smoothed_flow(), 1)?;

        update.set_input_flow(propagator.propagated_flow())?;
        drop(dummy_flow);

        propagator.propagated_flow().clear();
        update.updated_flow().clear();
        update.updated_image().clear();
        smoothed_flow.clear();

        Ok(FlowFilter {
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
    pub fn load_image(&mut self, image: &Image<u8>) -> Result<()> {
        self.input_image.upload(image)?;

        if self.state == FilterState::AwaitingFirstImage {
            self.image_model.compute();
            self.update.updated_image().copy_from(self.image_model.image_constant())?;
            self.state = FilterState::Running;
            log::trace!("FlowFilter: updated image seeded from the first frame");
        }
        Ok(())
    }

    /// Run one filter cycle on the most recently loaded image.
    pub fn compute(&mut self) -> Result<()> {
        let t0 = Instant::now();

        self.image_model.compute();
        self.propagator.compute()?;
        self.update.compute();
        self.smoother.compute()?;

        self.elapsed = t0.elapsed();
        log::debug!("FlowFilter::compute {:.3} ms", self.elapsed.as_secs_f64() * 1e3);
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

    /// Derived from `max_flow`; not independently settable.
    pub fn propagation_iterations(&self) -> usize {
        self.propagator.iterations()
    }

    // ---- Outputs ----------------------------------------------------------

    /// Handle to the updated (pre-smoothing) flow.
    pub fn flow(&self) -> &Buffer<[f32; 2]> {
        self.update.updated_flow()
    }

    /// Download the smoothed flow, the filter's output for this frame.
    pub fn download_flow(&self, flow: &mut Image<[f32; 2]>) -> Result<()> {
        self.smoothed_flow.download(flow)
    }

    /// Download the filter's running brightness estimate.
    pub fn download_image(&self, image: &mut Image<f32>) -> Result<()> {
        self.update.updated_image().download(image)
    }

    pub fn download_image_constant(&self, image: &mut Image<f32>) -> Result<()> {
        self.image_model.image_constant().download(image)
    }

    pub fn download_image_gradient(&self, gradient: &mut Image<[f32; 2]>) -> Result<()> {
        self.image_model.image_gradient().download(gradient)
    }

    pub fn download_propagated_flow(&self, flow: &mut Image<[f32; 2]>) -> Result<()> {
        self.propagator.propagated_flow().download(flow)
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

    /// Wall time of the last `compute` call.
    pub fn elapsed_time(&self) -> Duration {
        self.elapsed
    }
}
