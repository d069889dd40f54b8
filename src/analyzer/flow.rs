//! Dense pyramidal Lucas-Kanade optical flow on single-channel planes.

use crate::config::MotionConfig;
use crate::error::{CurationError, Result};
use crate::frame::{downscale_for_analysis, to_gray};
use image::{GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;

/// Floating-point intensity plane
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn at(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Bilinear sample with edge clamping; exact at integer coordinates
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as isize, y0 as isize);

        let top = lerp(self.at(xi, yi), self.at(xi + 1, yi), fx);
        let bottom = lerp(self.at(xi, yi + 1), self.at(xi + 1, yi + 1), fx);
        lerp(top, bottom, fy)
    }

    /// Half-resolution plane by 2x2 averaging
    fn downsample(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = ((x * 2) as isize, (y * 2) as isize);
                let sum = self.at(sx, sy)
                    + self.at(sx + 1, sy)
                    + self.at(sx, sy + 1)
                    + self.at(sx + 1, sy + 1);
                data.push(sum / 4.0);
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }
}

/// Smallest structure-tensor eigenvalue, per window pixel, worth solving for
const MIN_EIGENVALUE: f64 = 0.01;

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[derive(Debug, Clone, Copy)]
pub struct FlowParams {
    pub pyramid_levels: usize,
    pub window_size: usize,
    pub iterations: usize,
}

/// Per-pixel displacement from the first plane to the second
#[derive(Debug, Clone)]
pub struct FlowField {
    pub width: usize,
    pub height: usize,
    pub u: Vec<f32>,
    pub v: Vec<f32>,
}

impl FlowField {
    fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            u: vec![0.0; width * height],
            v: vec![0.0; width * height],
        }
    }

    /// Nearest-neighbour upsample to the next finer level, doubling vectors
    fn upsample(&self, width: usize, height: usize) -> Self {
        let mut out = Self::zeros(width, height);
        for y in 0..height {
            let cy = (y / 2).min(self.height - 1);
            for x in 0..width {
                let cx = (x / 2).min(self.width - 1);
                let src = cy * self.width + cx;
                out.u[y * width + x] = self.u[src] * 2.0;
                out.v[y * width + x] = self.v[src] * 2.0;
            }
        }
        out
    }

    pub fn mean_magnitude(&self) -> f64 {
        if self.u.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .u
            .iter()
            .zip(&self.v)
            .map(|(u, v)| ((u * u + v * v) as f64).sqrt())
            .sum();
        total / self.u.len() as f64
    }
}

/// Windowed sums with the window clipped at the borders
fn box_sums(values: &[f32], width: usize, height: usize, radius: usize) -> Vec<f64> {
    let stride = width + 1;
    let mut integral = vec![0f64; stride * (height + 1)];
    for y in 0..height {
        let mut row = 0f64;
        for x in 0..width {
            row += values[y * width + x] as f64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let mut sums = Vec::with_capacity(width * height);
    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            sums.push(
                integral[y1 * stride + x1] - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0]
                    + integral[y0 * stride + x0],
            );
        }
    }
    sums
}

fn pyramid(plane: &Plane, levels: usize, min_side: usize) -> Vec<Plane> {
    let mut out = vec![plane.clone()];
    while out.len() < levels.max(1) {
        let Some(last) = out.last() else { break };
        let (w, h) = last.dimensions();
        if w / 2 < min_side || h / 2 < min_side {
            break;
        }
        let next = last.downsample();
        out.push(next);
    }
    out
}

/// Estimate dense flow from `prev` to `next`
///
/// Both planes must have the same dimensions.
pub fn dense_flow(prev: &Plane, next: &Plane, params: &FlowParams) -> FlowField {
    let radius = params.window_size.max(3) / 2;
    let min_side = (radius * 2 + 1).max(4);
    let prev_pyr = pyramid(prev, params.pyramid_levels, min_side);
    let next_pyr = pyramid(next, prev_pyr.len(), min_side);

    let mut flow: Option<FlowField> = None;
    for (p, n) in prev_pyr.iter().zip(next_pyr.iter()).rev() {
        let (width, height) = p.dimensions();
        let mut field = match flow.take() {
            Some(coarse) => coarse.upsample(width, height),
            None => FlowField::zeros(width, height),
        };
        refine_level(p, n, &mut field, radius, params.iterations.max(1));
        flow = Some(field);
    }

    flow.unwrap_or_else(|| FlowField::zeros(prev.width, prev.height))
}

fn refine_level(prev: &Plane, next: &Plane, field: &mut FlowField, radius: usize, iterations: usize) {
    let (width, height) = prev.dimensions();
    let count = width * height;

    let mut ix = vec![0f32; count];
    let mut iy = vec![0f32; count];
    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            ix[y * width + x] = (prev.at(xi + 1, yi) - prev.at(xi - 1, yi)) * 0.5;
            iy[y * width + x] = (prev.at(xi, yi + 1) - prev.at(xi, yi - 1)) * 0.5;
        }
    }

    let ixx: Vec<f32> = ix.iter().map(|g| g * g).collect();
    let ixy: Vec<f32> = ix.iter().zip(&iy).map(|(a, b)| a * b).collect();
    let iyy: Vec<f32> = iy.iter().map(|g| g * g).collect();
    let sxx = box_sums(&ixx, width, height, radius);
    let sxy = box_sums(&ixy, width, height, radius);
    let syy = box_sums(&iyy, width, height, radius);

    let window_area = ((radius * 2 + 1) * (radius * 2 + 1)) as f64;
    let mut ixt = vec![0f32; count];
    let mut iyt = vec![0f32; count];
    for _ in 0..iterations {
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let warped = next.sample(x as f32 + field.u[i], y as f32 + field.v[i]);
                let it = warped - prev.data[i];
                ixt[i] = ix[i] * it;
                iyt[i] = iy[i] * it;
            }
        }
        let sxt = box_sums(&ixt, width, height, radius);
        let syt = box_sums(&iyt, width, height, radius);

        for i in 0..count {
            // Flat or edge-only neighbourhoods have no unique solution
            let half_trace = (sxx[i] + syy[i]) / 2.0;
            let spread = (((sxx[i] - syy[i]) / 2.0).powi(2) + sxy[i] * sxy[i]).sqrt();
            if (half_trace - spread) / window_area < MIN_EIGENVALUE {
                continue;
            }
            let det = sxx[i] * syy[i] - sxy[i] * sxy[i];
            let du = (-syy[i] * sxt[i] + sxy[i] * syt[i]) / det;
            let dv = (sxy[i] * sxt[i] - sxx[i] * syt[i]) / det;
            field.u[i] += du as f32;
            field.v[i] += dv as f32;
        }
    }
}

/// Frame prepared for flow estimation
#[derive(Debug, Clone)]
pub struct FlowFrame {
    plane: Plane,
    scale: f64,
}

/// Turns RGB frames into flow-ready planes and measures mean motion between them
#[derive(Debug, Clone)]
pub struct FlowEstimator {
    params: FlowParams,
    max_width: u32,
}

impl FlowEstimator {
    const SMOOTHING_SIGMA: f32 = 1.0;

    pub fn new(config: &MotionConfig) -> Self {
        Self {
            params: FlowParams {
                pyramid_levels: config.pyramid_levels as usize,
                window_size: config.window_size as usize,
                iterations: config.iterations as usize,
            },
            max_width: config.flow_max_width,
        }
    }

    pub fn prepare(&self, frame: &RgbImage) -> FlowFrame {
        let (gray, scale) = downscale_for_analysis(&to_gray(frame), self.max_width);
        let smoothed = gaussian_blur_f32(&gray, Self::SMOOTHING_SIGMA);
        FlowFrame {
            plane: Plane::from_gray(&smoothed),
            scale,
        }
    }

    /// Mean flow-vector magnitude in source-resolution pixels
    pub fn mean_magnitude(&self, prev: &FlowFrame, next: &FlowFrame) -> Result<f64> {
        if prev.plane.dimensions() != next.plane.dimensions() {
            return Err(CurationError::decode(format!(
                "frame size changed mid-stream: {:?} -> {:?}",
                prev.plane.dimensions(),
                next.plane.dimensions()
            )));
        }
        let field = dense_flow(&prev.plane, &next.plane, &self.params);
        Ok(field.mean_magnitude() * prev.scale)
    }
}
