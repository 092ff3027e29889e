//! Reinhard global tone reproduction.
//!
//! Fixed parameters: gamma 1, intensity 0, full light adaptation, no
//! colour adaptation. With those, every channel is compressed as
//! `c / (c + L^m)` where `L` is the pixel luminance and `m` a key derived
//! from the log-luminance distribution of the whole frame.

use super::pyramid::FloatImage;
use crate::frame::CHANNELS;

/// Floor applied before taking log luminance.
const LOG_FLOOR: f32 = 1e-4;

/// Compress an RGB radiance map into `[0, 1]`.
pub fn reinhard(radiance: &FloatImage) -> FloatImage {
    debug_assert_eq!(radiance.channels, CHANNELS);
    let mut img = radiance.clone();
    super::mertens::normalize_min_max(&mut img.data);

    let gray: Vec<f32> = img
        .data
        .chunks_exact(CHANNELS)
        .map(|p| 0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2])
        .collect();

    let mut log_sum = 0.0f64;
    let (mut log_min, mut log_max) = (f32::INFINITY, f32::NEG_INFINITY);
    for &g in &gray {
        let l = g.max(LOG_FLOOR).ln();
        log_sum += l as f64;
        log_min = log_min.min(l);
        log_max = log_max.max(l);
    }
    let log_mean = (log_sum / gray.len().max(1) as f64) as f32;

    // A flat frame has no key to speak of; fall back to the darkest map.
    let log_range = log_max - log_min;
    let key = if log_range > f32::EPSILON {
        (log_max - log_mean) / log_range
    } else {
        0.0
    };
    let map_key = 0.3 + 0.7 * key.powf(1.4);

    for (px, &g) in img.data.chunks_exact_mut(CHANNELS).zip(&gray) {
        let adapt = g.powf(map_key);
        for c in px.iter_mut() {
            let denom = adapt + *c;
            *c = if denom > 0.0 { *c / denom } else { 0.0 };
        }
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_in_unit_range() {
        let data: Vec<f32> = (0..48).map(|i| (i as f32 * 0.37).exp()).collect();
        let radiance = FloatImage::from_data(4, 4, 3, data);
        let mapped = reinhard(&radiance);
        assert!(mapped.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn brighter_radiance_maps_brighter() {
        let mut data = vec![1.0f32; 6];
        data[3..].fill(50.0);
        let mapped = reinhard(&FloatImage::from_data(2, 1, 3, data));
        assert!(mapped.data[3] > mapped.data[0]);
    }

    #[test]
    fn flat_frame_is_finite() {
        let mapped = reinhard(&FloatImage::from_data(2, 2, 3, vec![0.0; 12]));
        assert!(mapped.data.iter().all(|v| v.is_finite()));
    }
}
