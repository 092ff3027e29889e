//! Per-frame post-processing applied just before publication: focus
//! metric, colour histogram and downscaling.

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::frame::{CHANNELS, PixelBuffer};
use crate::fusion::pyramid::{FloatImage, laplacian};

/// Number of bins per channel.
pub const HISTOGRAM_BINS: usize = 256;

/// 256-bin count of every channel of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin counts per channel, RGB order.
    pub channels: Vec<Vec<u32>>,
}

impl Histogram {
    pub fn of(frame: &PixelBuffer) -> Self {
        let mut channels = vec![vec![0u32; HISTOGRAM_BINS]; CHANNELS];
        for px in frame.as_bytes().chunks_exact(CHANNELS) {
            for (bins, &v) in channels.iter_mut().zip(px) {
                bins[v as usize] += 1;
            }
        }
        Self { channels }
    }

    pub fn channel(&self, index: usize) -> &[u32] {
        &self.channels[index]
    }

    /// Total samples counted in one channel.
    pub fn total(&self) -> u64 {
        self.channels
            .first()
            .map(|bins| bins.iter().map(|&c| c as u64).sum())
            .unwrap_or(0)
    }
}

/// Variance of the Laplacian of the grey image (0-255 scale). Higher is
/// sharper.
pub fn sharpness(frame: &PixelBuffer) -> f64 {
    let (w, h) = frame.dimensions();
    let gray: Vec<f32> = frame.to_gray_f32().into_iter().map(|g| g * 255.0).collect();
    let response = laplacian(&FloatImage::from_data(w as usize, h as usize, 1, gray));

    let n = response.data.len().max(1) as f64;
    let mean = response.data.iter().map(|&v| v as f64).sum::<f64>() / n;
    response
        .data
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Downscale by an integer `factor` with cubic filtering. A factor of 0 or
/// 1 returns the frame unchanged.
pub fn reduce(frame: PixelBuffer, factor: u32) -> PixelBuffer {
    let (w, h) = frame.dimensions();
    if factor <= 1 || w == 0 || h == 0 {
        return frame;
    }
    let (nw, nh) = ((w / factor).max(1), (h / factor).max(1));
    let img = frame.into_image();
    imageops::resize(&img, nw, nh, FilterType::CatmullRom).into()
}
