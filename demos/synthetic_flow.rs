// demos/synthetic_flow.rs — CPU flow filter on a synthetic translating scene.
//
// Renders a textured scene moving with a constant velocity, runs the filter
// on every frame, and prints per-frame flow statistics. The estimated mean
// flow should approach the true velocity within a few frames.
//
// The final flow field is written as a color-coded PPM (hue = direction,
// saturation = magnitude).
//
// USAGE
// ─────
//   cargo run --example synthetic_flow --release
//   cargo run --example synthetic_flow --release -- 1.5 -0.5      # velocity (u, v)
//   cargo run --example synthetic_flow --release -- 1.5 -0.5 60   # and frame count
//
// Set RUST_LOG=debug to see per-stage timing from the filter itself.

use std::fmt::Write as FmtWrite;
use std::fs;

use flowfilter::display::{flow_stats, flow_to_rgb};
use flowfilter::image::Image;
use flowfilter::{FlowFilter, FlowFilterConfig};

const WIDTH: usize = 320;
const HEIGHT: usize = 240;

fn main() {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(|l| l.log_to_stderr().start())
        .unwrap_or_else(|e| panic!("logger initialization failed: {e}"));

    let args: Vec<String> = std::env::args().collect();
    let u: f32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1.0);
    let v: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.5);
    let num_frames: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(30);

    let config = FlowFilterConfig {
        smooth_iterations: 2,
        max_flow: (u.abs().max(v.abs()) * 1.5).max(1.0),
        gamma: 0.05,
    };
    let mut filter = FlowFilter::with_config(HEIGHT, WIDTH, config).expect("valid filter parameters");
    println!(
        "{WIDTH}×{HEIGHT}, true velocity ({u:.2}, {v:.2}) px/frame, {} propagation steps",
        filter.propagation_iterations()
    );

    let mut flow = Image::new(WIDTH, HEIGHT);
    let mut total_ms = 0.0;
    for k in 0..num_frames {
        let frame = scene(WIDTH, HEIGHT, u * k as f32, v * k as f32);
        filter.load_image(&frame).expect("frame has filter shape");
        filter.compute().expect("compute");
        filter.download_flow(&mut flow).expect("flow has filter shape");

        let ms = filter.elapsed_time().as_secs_f64() * 1e3;
        total_ms += ms;
        let s = flow_stats(&flow);
        println!(
            "frame {k:3}: mean ({:+.3}, {:+.3})  |w| mean {:.3} max {:.3}  {ms:.2} ms",
            s.mean_u, s.mean_v, s.mean_magnitude, s.max_magnitude
        );
    }
    println!("average compute: {:.2} ms/frame", total_ms / num_frames.max(1) as f64);

    let path = "synthetic_flow.ppm";
    write_ppm(path, &flow_to_rgb(&flow, filter.max_flow()), WIDTH, HEIGHT);
    println!("flow field written to {path}");
}

/// Smooth random-looking texture, translated by (dx, dy).
fn scene(width: usize, height: usize, dx: f32, dy: f32) -> Image<u8> {
    Image::from_fn(width, height, |x, y| {
        let sx = x as f32 - dx;
        let sy = y as f32 - dy;
        let v = 128.0
            + 45.0 * (sx * 0.11).sin() * (sy * 0.07).cos()
            + 35.0 * ((sx * 0.05 + sy * 0.09).sin())
            + 20.0 * ((sx - sy) * 0.23).cos();
        v.round().clamp(0.0, 255.0) as u8
    })
}

/// Write packed 0RGB pixels as a binary PPM.
fn write_ppm(path: &str, rgb: &[u32], width: usize, height: usize) {
    let mut header = String::new();
    let _ = write!(header, "P6\n{width} {height}\n255\n");
    let mut bytes = header.into_bytes();
    for &p in rgb {
        bytes.extend_from_slice(&[(p >> 16) as u8, (p >> 8) as u8, p as u8]);
    }
    fs::write(path, bytes).unwrap_or_else(|e| panic!("failed to write {path}: {e}"));
}
