// display.rs — Flow field visualization and summary statistics.
//
// `flow_to_rgb` encodes each flow vector with the Middlebury color wheel:
// hue = direction, saturation = magnitude relative to `max_flow`. Output
// pixels are packed 0RGB `u32`, the framebuffer format `minifb` expects.
//
// `flow_stats` reduces a flow field to mean/max magnitude for logging.

use crate::image::Image;

// Color wheel segment lengths: red→yellow→green→cyan→blue→magenta→red.
const RY: usize = 15;
const YG: usize = 6;
const GC: usize = 4;
const CB: usize = 11;
const BM: usize = 13;
const MR: usize = 6;
const NCOLS: usize = RY + YG + GC + CB + BM + MR;

/// The Middlebury color wheel as RGB triples in [0, 255].
fn color_wheel() -> [[f32; 3]; NCOLS] {
    let mut wheel = [[0.0f32; 3]; NCOLS];
    let mut i = 0;
    for k in 0..RY {
        wheel[i] = [255.0, 255.0 * k as f32 / RY as f32, 0.0];
        i += 1;
    }
    for k in 0..YG {
        wheel[i] = [255.0 - 255.0 * k as f32 / YG as f32, 255.0, 0.0];
        i += 1;
    }
    for k in 0..GC {
        wheel[i] = [0.0, 255.0, 255.0 * k as f32 / GC as f32];
        i += 1;
    }
    for k in 0..CB {
        wheel[i] = [0.0, 255.0 - 255.0 * k as f32 / CB as f32, 255.0];
        i += 1;
    }
    for k in 0..BM {
        wheel[i] = [255.0 * k as f32 / BM as f32, 0.0, 255.0];
        i += 1;
    }
    for k in 0..MR {
        wheel[i] = [255.0, 0.0, 255.0 - 255.0 * k as f32 / MR as f32];
        i += 1;
    }
    wheel
}

/// Encode one flow vector as an `[r, g, b]` triple.
///
/// Vectors longer than `max_flow` are drawn at full saturation, dimmed by 25%.
pub fn flow_color(flow: [f32; 2], max_flow: f32) -> [u8; 3] {
    wheel_color(&color_wheel(), flow, max_flow)
}

fn wheel_color(wheel: &[[f32; 3]; NCOLS], [u, v]: [f32; 2], max_flow: f32) -> [u8; 3] {
    let scale = if max_flow > 0.0 { max_flow } else { 1.0 };
    let (u, v) = (u / scale, v / scale);
    let rad = (u * u + v * v).sqrt();
    if !rad.is_finite() {
        return [0, 0, 0];
    }

    let angle = (-v).atan2(-u) / std::f32::consts::PI; // [-1, 1]
    let fk = (angle + 1.0) / 2.0 * (NCOLS - 1) as f32;
    let k0 = fk.floor() as usize % NCOLS;
    let k1 = (k0 + 1) % NCOLS;
    let f = fk - fk.floor();

    let mut rgb = [0u8; 3];
    for c in 0..3 {
        let col = ((1.0 - f) * wheel[k0][c] + f * wheel[k1][c]) / 255.0;
        let col = if rad <= 1.0 {
            1.0 - rad * (1.0 - col)
        } else {
            col * 0.75
        };
        rgb[c] = (255.0 * col).round().clamp(0.0, 255.0) as u8;
    }
    rgb
}

/// Encode a whole flow field as packed 0RGB pixels, row-major.
pub fn flow_to_rgb(flow: &Image<[f32; 2]>, max_flow: f32) -> Vec<u32> {
    let wheel = color_wheel();
    let mut out = Vec::with_capacity(flow.width() * flow.height());
    for (_, _, f) in flow.pixels() {
        let [r, g, b] = wheel_color(&wheel, f, max_flow);
        out.push(((r as u32) << 16) | ((g as u32) << 8) | b as u32);
    }
    out
}

/// Magnitude statistics of a flow field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowStats {
    pub mean_u: f32,
    pub mean_v: f32,
    pub mean_magnitude: f32,
    pub max_magnitude: f32,
}

/// Summarize a flow field.
pub fn flow_stats(flow: &Image<[f32; 2]>) -> FlowStats {
    let n = (flow.width() * flow.height()) as f32;
    if n == 0.0 {
        return FlowStats::default();
    }
    let mut stats = FlowStats::default();
    for (_, _, [u, v]) in flow.pixels() {
        let m = (u * u + v * v).sqrt();
        stats.mean_u += u;
        stats.mean_v += v;
        stats.mean_magnitude += m;
        stats.max_magnitude = stats.max_magnitude.max(m);
    }
    stats.mean_u /= n;
    stats.mean_v /= n;
    stats.mean_magnitude /= n;
    stats
}
