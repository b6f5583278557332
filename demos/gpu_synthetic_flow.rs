// demos/gpu_synthetic_flow.rs — GPU vs CPU flow filter on a synthetic scene.
//
// Runs the same translating sequence through `FlowFilter` and
// `GpuFlowFilter`, printing per-frame timing for both and the largest
// per-pixel difference between their smoothed flows.
//
// USAGE
// ─────
//   cargo run --example gpu_synthetic_flow --release
//   cargo run --example gpu_synthetic_flow --release -- 752 480 100   # size, frames
//   cargo run --example gpu_synthetic_flow --release -- 752 480 100 rpi
//                                       # simulate Raspberry Pi device limits

use flowfilter::display::flow_stats;
use flowfilter::gpu::device::{DeviceProfile, GpuDevice};
use flowfilter::gpu::filter::GpuFlowFilter;
use flowfilter::image::Image;
use flowfilter::FlowFilter;

fn main() {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(|l| l.log_to_stderr().start())
        .unwrap_or_else(|e| panic!("logger initialization failed: {e}"));

    let args: Vec<String> = std::env::args().collect();
    let width: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(752);
    let height: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(480);
    let num_frames: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(50);
    let profile = match args.get(4).map(String::as_str) {
        Some("rpi") => DeviceProfile::RaspberryPi,
        _ => DeviceProfile::Native,
    };

    let gpu = GpuDevice::new_with_profile(profile).unwrap_or_else(|e| panic!("GPU init failed: {e}"));
    println!("{gpu}");

    let (smooth, max_flow, gamma) = (2, 2.0, 0.05);
    let mut cpu = FlowFilter::new(height, width, smooth, max_flow, gamma).expect("valid parameters");
    let mut gf = GpuFlowFilter::new(&gpu, height, width, smooth, max_flow, gamma).expect("valid parameters");

    let mut cpu_flow = Image::new(width, height);
    let mut gpu_flow = Image::new(width, height);
    let (mut cpu_total, mut gpu_total) = (0.0, 0.0);
    let mut worst = 0.0f32;

    for k in 0..num_frames {
        let t = k as f32;
        let frame = scene(width, height, 0.9 * t, 0.4 * t);

        cpu.load_image(&frame).expect("frame shape");
        cpu.compute().expect("cpu compute");
        gf.load_image(&gpu, &frame).expect("frame shape");
        gf.compute(&gpu).expect("gpu compute");

        cpu.download_flow(&mut cpu_flow).expect("flow shape");
        gf.download_flow(&gpu, &mut gpu_flow).expect("flow shape");

        let diff = max_abs_diff(&cpu_flow, &gpu_flow);
        worst = worst.max(diff);
        let (c_ms, g_ms) = (
            cpu.elapsed_time().as_secs_f64() * 1e3,
            gf.elapsed_time().as_secs_f64() * 1e3,
        );
        cpu_total += c_ms;
        gpu_total += g_ms;

        let s = flow_stats(&gpu_flow);
        println!(
            "frame {k:3}: gpu mean ({:+.3}, {:+.3})  cpu {c_ms:7.2} ms  gpu {g_ms:6.2} ms  max|Δ| {diff:.2e}",
            s.mean_u, s.mean_v
        );
    }

    let n = num_frames.max(1) as f64;
    println!(
        "average: cpu {:.2} ms, gpu {:.2} ms ({:.1}× speedup), worst max|Δ| {worst:.2e}",
        cpu_total / n,
        gpu_total / n,
        cpu_total / gpu_total.max(1e-9)
    );
}

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

fn max_abs_diff(a: &Image<[f32; 2]>, b: &Image<[f32; 2]>) -> f32 {
    a.pixels()
        .map(|(x, y, p)| {
            let q = b.get(x, y);
            (p[0] - q[0]).abs().max((p[1] - q[1]).abs())
        })
        .fold(0.0, f32::max)
}
