//! Debevec radiance merge with a linear camera response.
//!
//! No response-curve calibration pass is run: the sensor pipeline is
//! treated as linear and each sample is weighted by a triangle function
//! that distrusts values near black and near saturation.

use super::pyramid::FloatImage;
use crate::frame::{CHANNELS, PixelBuffer};

/// Hat weight for an 8-bit sample, peaking at mid-range.
#[inline]
fn triangle_weight(z: u8) -> f32 {
    if z < 128 {
        z as f32 + 1.0
    } else {
        256.0 - z as f32
    }
}

/// `ln` of the linear response; zero is lifted to one so black samples
/// stay finite.
fn log_response() -> [f32; 256] {
    let mut lut = [0.0f32; 256];
    for (z, v) in lut.iter_mut().enumerate() {
        *v = (z.max(1) as f32).ln();
    }
    lut
}

/// Merge exposures taken with `exposure_seconds` into a linear radiance
/// map. All frames share one size; exposures must be positive.
pub fn merge(frames: &[PixelBuffer], exposure_seconds: &[f32]) -> FloatImage {
    let (w, h) = (frames[0].width() as usize, frames[0].height() as usize);
    let lut = log_response();
    let mut numerator = vec![0.0f32; w * h * CHANNELS];
    let mut weight_sum = vec![0.0f32; w * h];

    for (frame, &seconds) in frames.iter().zip(exposure_seconds) {
        let log_time = seconds.ln();
        for (i, px) in frame.as_bytes().chunks_exact(CHANNELS).enumerate() {
            let weight = px.iter().map(|&z| triangle_weight(z)).sum::<f32>() / CHANNELS as f32;
            for c in 0..CHANNELS {
                numerator[i * CHANNELS + c] += weight * (lut[px[c] as usize] - log_time);
            }
            weight_sum[i] += weight;
        }
    }

    let data = numerator
        .iter()
        .enumerate()
        .map(|(i, n)| (n / weight_sum[i / CHANNELS]).exp())
        .collect();

    FloatImage::from_data(w, h, CHANNELS, data)
}
