//! Mertens exposure fusion.
//!
//! Each exposure gets a per-pixel quality weight
//! `contrast^wc · saturation^ws · well_exposedness^we`; the weights are
//! normalised across the set and the exposures are blended band by band
//! through Laplacian pyramids so seams between differently weighted
//! regions do not show.

use serde::{Deserialize, Serialize};

use super::pyramid::{FloatImage, collapse, gaussian_pyramid, laplacian, laplacian_pyramid};
use crate::frame::{CHANNELS, PixelBuffer};

/// Spread of the well-exposedness Gaussian around mid-grey.
const WELL_EXPOSED_SIGMA: f32 = 0.2;

/// Keeps the weight sum away from zero on fully black frames.
const WEIGHT_EPSILON: f32 = 1e-12;

/// Exponents applied to the three quality measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MertensWeights {
    pub contrast: f32,
    pub saturation: f32,
    pub exposure: f32,
}

impl Default for MertensWeights {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            saturation: 1.0,
            exposure: 1.0,
        }
    }
}

/// Per-pixel quality weight of one exposure (single channel).
fn quality_weight(frame: &PixelBuffer, weights: &MertensWeights) -> FloatImage {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let gray = FloatImage::from_data(w, h, 1, frame.to_gray_f32());
    let contrast = laplacian(&gray);
    let two_sigma_sq = 2.0 * WELL_EXPOSED_SIGMA * WELL_EXPOSED_SIGMA;

    let data = frame
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(&contrast.data)
        .map(|(px, lap)| {
            let [r, g, b] = [px[0] as f32 / 255.0, px[1] as f32 / 255.0, px[2] as f32 / 255.0];
            let mean = (r + g + b) / 3.0;
            let saturation =
                (((r - mean).powi(2) + (g - mean).powi(2) + (b - mean).powi(2)) / 3.0).sqrt();
            let well_exposed = [r, g, b]
                .iter()
                .map(|v| (-(v - 0.5).powi(2) / two_sigma_sq).exp())
                .product::<f32>();

            lap.abs().powf(weights.contrast)
                * saturation.powf(weights.saturation)
                * well_exposed.powf(weights.exposure)
                + WEIGHT_EPSILON
        })
        .collect();

    FloatImage::from_data(w, h, 1, data)
}

/// Number of pyramid levels below full resolution.
fn pyramid_levels(width: usize, height: usize) -> usize {
    let min_side = width.min(height).max(1);
    min_side.ilog2() as usize
}

/// Fuse `frames` (all the same size, at least one) into an RGB float
/// image min-max normalised to `[0, 1]`.
pub fn fuse(frames: &[PixelBuffer], weights: &MertensWeights) -> FloatImage {
    let (w, h) = (frames[0].width() as usize, frames[0].height() as usize);
    let levels = pyramid_levels(w, h);

    let mut quality: Vec<FloatImage> = frames.iter().map(|f| quality_weight(f, weights)).collect();

    let mut weight_sum = vec![0.0f32; w * h];
    for q in &quality {
        for (s, v) in weight_sum.iter_mut().zip(&q.data) {
            *s += v;
        }
    }
    for q in &mut quality {
        for (v, s) in q.data.iter_mut().zip(&weight_sum) {
            *v /= s;
        }
    }

    let mut blended: Vec<FloatImage> = Vec::new();
    for (frame, weight) in frames.iter().zip(&quality) {
        let img = FloatImage::from_data(w, h, CHANNELS, frame.to_unit_f32());
        let img_pyr = laplacian_pyramid(&img, levels);
        let weight_pyr = gaussian_pyramid(weight, levels);

        if blended.is_empty() {
            blended = img_pyr
                .iter()
                .map(|lvl| FloatImage::zeros(lvl.width, lvl.height, CHANNELS))
                .collect();
        }
        for ((acc, band), wgt) in blended.iter_mut().zip(&img_pyr).zip(&weight_pyr) {
            acc.add_weighted(wgt, band);
        }
    }

    let mut fused = collapse(blended).unwrap_or_else(|| FloatImage::zeros(w, h, CHANNELS));
    normalize_min_max(&mut fused.data);
    fused
}

/// Stretch `data` linearly onto `[0, 1]`. Constant input is left as is.
pub(crate) fn normalize_min_max(data: &mut [f32]) {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return;
    }
    for v in data.iter_mut() {
        *v = (*v - min) / range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32, offset: u8) -> PixelBuffer {
        let mut data = Vec::with_capacity((w * h) as usize * CHANNELS);
        for y in 0..h {
            for x in 0..w {
                let v = ((x + y) * 8) as u8;
                data.extend_from_slice(&[
                    v.saturating_add(offset),
                    v.saturating_add(offset / 2),
                    v,
                ]);
            }
        }
        PixelBuffer::new(w, h, data).unwrap()
    }

    #[test]
    fn levels_follow_smallest_side() {
        assert_eq!(pyramid_levels(1, 1), 0);
        assert_eq!(pyramid_levels(2, 5), 1);
        assert_eq!(pyramid_levels(640, 480), 8);
    }

    #[test]
    fn weights_prefer_mid_grey() {
        let mid = PixelBuffer::new(1, 1, vec![140, 128, 116]).unwrap();
        let dark = PixelBuffer::new(1, 1, vec![14, 8, 2]).unwrap();
        let weights = MertensWeights {
            contrast: 0.0,
            ..Default::default()
        };
        let wm = quality_weight(&mid, &weights).data[0];
        let wd = quality_weight(&dark, &weights).data[0];
        assert!(wm > wd);
    }

    #[test]
    fn fused_output_is_unit_range() {
        let frames = vec![gradient(12, 10, 0), gradient(12, 10, 60), gradient(12, 10, 120)];
        let fused = fuse(&frames, &MertensWeights::default());
        assert_eq!((fused.width, fused.height, fused.channels), (12, 10, 3));
        let min = fused.data.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = fused.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!((min - 0.0).abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_constant_data() {
        let mut data = vec![0.4; 6];
        normalize_min_max(&mut data);
        assert!(data.iter().all(|&v| v == 0.4));
    }
}
