// demos/live_flow.rs — Live flow visualization.
//
// Shows the input frame and the color-coded smoothed flow side by side:
//
//   ┌────────────────┬────────────────┐
//   │  input (gray)  │  flow (color)  │
//   └────────────────┴────────────────┘
//
// Frames come from a directory of PNGs (a EuRoC sequence root or any
// folder of same-sized images, sorted by name) or, with no path, from a
// synthetic scene drifting in a slow circle.
//
// USAGE
// ─────
//   cargo run --example live_flow --release
//   cargo run --example live_flow --release -- /path/to/MH_01_easy
//   cargo run --example live_flow --release -- /path/to/MH_01_easy --gpu
//
// Controls:
//   Space  — pause/resume
//   S      — step one frame (while paused)
//   +/-    — scale the color wheel (max displayed flow)
//   Q/Esc  — quit

use std::fs;
use std::path::{Path, PathBuf};

use minifb::{Key, KeyRepeat, Window, WindowOptions};

use flowfilter::display::{flow_stats, flow_to_rgb};
use flowfilter::gpu::device::GpuDevice;
use flowfilter::gpu::filter::GpuFlowFilter;
use flowfilter::image::Image;
use flowfilter::FlowFilter;

/// Either filter, behind one interface for the render loop.
enum Backend {
    Cpu(FlowFilter),
    Gpu(GpuDevice, GpuFlowFilter),
}

impl Backend {
    fn step(&mut self, frame: &Image<u8>, flow: &mut Image<[f32; 2]>) -> flowfilter::Result<f64> {
        match self {
            Backend::Cpu(f) => {
                f.load_image(frame)?;
                f.compute()?;
                f.download_flow(flow)?;
                Ok(f.elapsed_time().as_secs_f64() * 1e3)
            }
            Backend::Gpu(gpu, f) => {
                f.load_image(gpu, frame)?;
                f.compute(gpu)?;
                f.download_flow(gpu, flow)?;
                Ok(f.elapsed_time().as_secs_f64() * 1e3)
            }
        }
    }
}

/// Where frames come from.
enum Source {
    Files(Vec<PathBuf>),
    Synthetic { width: usize, height: usize },
}

impl Source {
    fn len(&self) -> usize {
        match self {
            Source::Files(files) => files.len(),
            Source::Synthetic { .. } => usize::MAX,
        }
    }

    fn frame(&self, k: usize) -> Image<u8> {
        match self {
            Source::Files(files) => load_grayscale(&files[k]),
            Source::Synthetic { width, height } => {
                let t = k as f32 * 0.05;
                scene(*width, *height, 30.0 * t.cos(), 20.0 * t.sin())
            }
        }
    }
}

fn main() {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")
        .and_then(|l| l.log_to_stderr().start())
        .unwrap_or_else(|e| panic!("logger initialization failed: {e}"));

    let args: Vec<String> = std::env::args().collect();
    let use_gpu = args.iter().any(|a| a == "--gpu");
    let path = args.iter().skip(1).find(|a| !a.starts_with("--"));

    let source = match path {
        Some(p) => {
            let files = list_frames(Path::new(p));
            if files.is_empty() {
                eprintln!("no PNG frames found under {p}");
                std::process::exit(1);
            }
            println!("{}: {} frames", p, files.len());
            Source::Files(files)
        }
        None => Source::Synthetic { width: 480, height: 320 },
    };

    let first = source.frame(0);
    let (w, h) = (first.width(), first.height());

    let (smooth, max_flow, gamma) = (2, 4.0, 0.05);
    let mut backend = if use_gpu {
        let gpu = GpuDevice::new().unwrap_or_else(|e| panic!("GPU init failed: {e}"));
        let filter = GpuFlowFilter::new(&gpu, h, w, smooth, max_flow, gamma).expect("valid parameters");
        Backend::Gpu(gpu, filter)
    } else {
        Backend::Cpu(FlowFilter::new(h, w, smooth, max_flow, gamma).expect("valid parameters"))
    };

    let mut window = Window::new(
        "flowfilter — Space: pause, S: step, +/-: scale, Q: quit",
        2 * w,
        h,
        WindowOptions::default(),
    )
    .unwrap_or_else(|e| panic!("failed to open window: {e}"));
    window.set_target_fps(60);

    let mut fb = vec![0u32; 2 * w * h];
    let mut flow = Image::new(w, h);
    let mut display_max = 2.0f32;
    let mut paused = false;
    let mut k = 0usize;

    while window.is_open() && !window.is_key_down(Key::Escape) && !window.is_key_down(Key::Q) {
        if window.is_key_pressed(Key::Space, KeyRepeat::No) {
            paused = !paused;
        }
        let step = window.is_key_pressed(Key::S, KeyRepeat::Yes);
        if window.is_key_pressed(Key::Equal, KeyRepeat::Yes) || window.is_key_pressed(Key::NumPadPlus, KeyRepeat::Yes) {
            display_max *= 0.8;
        }
        if window.is_key_pressed(Key::Minus, KeyRepeat::Yes) || window.is_key_pressed(Key::NumPadMinus, KeyRepeat::Yes) {
            display_max *= 1.25;
        }

        if (!paused || step) && k < source.len() {
            let frame = source.frame(k);
            if frame.width() != w || frame.height() != h {
                eprintln!("frame {k} is {}×{}, expected {w}×{h}; stopping", frame.width(), frame.height());
                break;
            }
            let ms = backend.step(&frame, &mut flow).unwrap_or_else(|e| panic!("frame {k}: {e}"));
            let s = flow_stats(&flow);
            window.set_title(&format!(
                "flowfilter — frame {k}  {ms:.1} ms  mean ({:+.2}, {:+.2})  scale {display_max:.2}",
                s.mean_u, s.mean_v
            ));

            render(&frame, &flow_to_rgb(&flow, display_max), &mut fb, w, h);
            k += 1;
        }

        window
            .update_with_buffer(&fb, 2 * w, h)
            .unwrap_or_else(|e| panic!("window update failed: {e}"));
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// PNG files under `root`, sorted by name. EuRoC roots resolve to
/// `mav0/cam0/data`.
fn list_frames(root: &Path) -> Vec<PathBuf> {
    let euroc = root.join("mav0").join("cam0").join("data");
    let dir = if euroc.is_dir() { euroc } else { root.to_path_buf() };
    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", dir.display()))
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
        .collect();
    files.sort();
    files
}

fn load_grayscale(path: &Path) -> Image<u8> {
    let img = image::open(path)
        .unwrap_or_else(|e| panic!("failed to load {}: {e}", path.display()))
        .to_luma8();
    let (w, h) = img.dimensions();
    Image::from_vec(w as usize, h as usize, img.into_raw())
}

fn scene(width: usize, height: usize, dx: f32, dy: f32) -> Image<u8> {
    Image::from_fn(width, height, |x, y| {
        let sx = x as f32 - dx;
        let sy = y as f32 - dy;
        let checker = if ((sx / 24.0).floor() as i64 + (sy / 24.0).floor() as i64) % 2 == 0 { 40.0 } else { -40.0 };
        let v = 128.0 + checker + 30.0 * (sx * 0.13).sin() * (sy * 0.09).cos();
        v.round().clamp(0.0, 255.0) as u8
    })
}

// ---------------------------------------------------------------------------
// Framebuffer rendering
// ---------------------------------------------------------------------------

/// Gray input on the left half, flow colors on the right.
fn render(frame: &Image<u8>, flow_rgb: &[u32], fb: &mut [u32], w: usize, h: usize) {
    for y in 0..h {
        let row = &mut fb[y * 2 * w..(y + 1) * 2 * w];
        for (x, &v) in frame.row(y).iter().enumerate() {
            let c = v as u32;
            row[x] = (c << 16) | (c << 8) | c;
        }
        row[w..].copy_from_slice(&flow_rgb[y * w..(y + 1) * w]);
    }
}
