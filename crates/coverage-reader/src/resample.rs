//! Interpolation kernels and the warp of decoded rasters into output buffers.
//!
//! Kernels take center-based grid coordinates: `(0.0, 0.0)` is the center
//! of the first pixel.

use crate::affine::AffineTransform;
use crate::types::InterpolationMethod;

/// Pixel at (`col`, `row`) with both indices clamped into the grid.
fn clamped(data: &[f32], width: usize, height: usize, col: i64, row: i64) -> f32 {
    let col = col.clamp(0, width as i64 - 1) as usize;
    let row = row.clamp(0, height as i64 - 1) as usize;
    data[row * width + col]
}

pub fn nearest_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    clamped(data, width, height, x.round() as i64, y.round() as i64)
}

/// Weighted mean of the 2x2 neighborhood. NaN anywhere in it yields NaN.
pub fn bilinear_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);
    let (col, row) = (x.floor() as i64, y.floor() as i64);
    let (tx, ty) = ((x - col as f64) as f32, (y - row as f64) as f32);

    let pixel = |dc: i64, dr: i64| clamped(data, width, height, col + dc, row + dr);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    let upper = lerp(pixel(0, 0), pixel(1, 0), tx);
    let lower = lerp(pixel(0, 1), pixel(1, 1), tx);
    // NaN propagates through lerp
    lerp(upper, lower, ty)
}

/// Catmull-Rom over the 4x4 neighborhood.
///
/// A neighborhood holding NaN is resampled bilinearly instead.
pub fn cubic_interpolate(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let (col, row) = (x.floor() as i64, y.floor() as i64);
    let wx = catmull_rom_weights((x - col as f64) as f32);
    let wy = catmull_rom_weights((y - row as f64) as f32);

    let mut sum = 0.0f32;
    for (dr, weight_y) in (-1..=2).zip(wy) {
        for (dc, weight_x) in (-1..=2).zip(wx) {
            let value = clamped(data, width, height, col + dc, row + dr);
            if value.is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
            sum += value * weight_x * weight_y;
        }
    }
    sum
}

/// Weights of the four taps at offsets -1, 0, 1, 2 for fraction `t`.
fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let (t2, t3) = (t * t, t * t * t);
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// A single decoded band to sample from.
pub struct SourceBand<'a> {
    pub data: &'a [f32],
    pub width: usize,
    pub height: usize,
    /// Fill value of the source; samples equal to it are treated as missing.
    pub fill: Option<f32>,
}

impl SourceBand<'_> {
    fn is_missing(&self, value: f32) -> bool {
        value.is_nan() || self.fill.is_some_and(|fill| fill == value)
    }
}

/// Warp one band into an output buffer.
///
/// `output_to_source` maps output pixel coordinates (corner based) to decoded
/// pixel coordinates. Output pixels whose center falls outside the decoded
/// raster, or that are already marked in `filled`, are left untouched.
/// Returns the number of pixels written.
pub fn warp_band(
    source: &SourceBand<'_>,
    output_to_source: &AffineTransform,
    method: InterpolationMethod,
    output: &mut [f32],
    output_width: usize,
    filled: &mut [bool],
) -> usize {
    if source.width == 0 || source.height == 0 || output_width == 0 {
        return 0;
    }

    let output_height = output.len() / output_width;
    let mut written = 0;

    for row in 0..output_height {
        for col in 0..output_width {
            let idx = row * output_width + col;
            if filled[idx] {
                continue;
            }

            let (u, v) = output_to_source.transform_point(col as f64 + 0.5, row as f64 + 0.5);
            if !(u >= 0.0 && v >= 0.0 && u < source.width as f64 && v < source.height as f64) {
                continue;
            }

            // Kernels are center based.
            let (x, y) = (u - 0.5, v - 0.5);
            let value = match method {
                InterpolationMethod::Nearest => {
                    nearest_interpolate(source.data, source.width, source.height, x, y)
                }
                InterpolationMethod::Bilinear => {
                    bilinear_interpolate(source.data, source.width, source.height, x, y)
                }
                InterpolationMethod::Cubic => {
                    cubic_interpolate(source.data, source.width, source.height, x, y)
                }
            };

            if source.is_missing(value) {
                continue;
            }
            output[idx] = value;
            filled[idx] = true;
            written += 1;
        }
    }

    written
}
