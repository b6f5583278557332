// flowfilter: incremental dense optical flow for high frame-rate video
// CPU reference implementation plus a wgpu compute mirror under `gpu`
//
// Reference: Adarve, Mahony — "A Filter Formulation for Computing Real Time
// Optical Flow" (IEEE RA-L 2016)
//
// Pipeline per frame:
//   image model → propagation → update → smoothing, with the smoothed flow
//   fed back as the next frame's propagation input.

pub mod image;
pub mod error;
pub mod buffer;
pub mod convolution;
pub mod imagemodel;
pub mod propagation;
pub mod update;
pub mod smoother;
pub mod filter;
pub mod display;

pub mod gpu;

pub use error::{FlowError, Result, Shape, MAX_FLOW_LIMIT};
pub use filter::{FilterState, FlowFilter, FlowFilterConfig};
