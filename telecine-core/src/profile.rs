//! Lens profiler: horizontal, vertical and diagonal cross-sections of a
//! single frame, used to judge focus and vignetting.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationTable;
use crate::error::CaptureError;
use crate::frame::{CHANNELS, PixelBuffer};

/// Per-channel traces through one frame. Each array holds the R, G and B
/// curves in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LensProfile {
    /// Row at half height; `width` samples.
    pub horizontal: [Vec<u8>; CHANNELS],
    /// Column at half width; `height` samples.
    pub vertical: [Vec<u8>; CHANNELS],
    /// Top-left to bottom-right, one sample per column.
    pub diagonal: [Vec<u8>; CHANNELS],
}

/// Sample the three traces from `frame`, correcting it with `table` first
/// when one is given.
pub fn profile(
    frame: &PixelBuffer,
    table: Option<&CalibrationTable>,
) -> Result<LensProfile, CaptureError> {
    let corrected;
    let frame = match table {
        Some(table) => {
            corrected = table.apply(frame)?;
            &corrected
        }
        None => frame,
    };

    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return Err(CaptureError::ProtocolViolation(format!(
            "cannot profile an empty {w}x{h} frame"
        )));
    }
    let (mid_x, mid_y) = (w / 2, h / 2);

    let horizontal = trace((0..w).map(|x| frame.pixel(x, mid_y)));
    let vertical = trace((0..h).map(|y| frame.pixel(mid_x, y)));
    let diagonal = trace((0..w).map(|x| frame.pixel(x, diagonal_row(x, w, h))));

    Ok(LensProfile {
        horizontal,
        vertical,
        diagonal,
    })
}

/// Row hit by the diagonal at column `x`, scaled to the aspect ratio.
fn diagonal_row(x: u32, w: u32, h: u32) -> u32 {
    let y = (x as f64 * h as f64 / w as f64).round() as u32;
    y.min(h.saturating_sub(1))
}

fn trace(pixels: impl Iterator<Item = [u8; CHANNELS]>) -> [Vec<u8>; CHANNELS] {
    let mut out: [Vec<u8>; CHANNELS] = Default::default();
    for px in pixels {
        for (curve, v) in out.iter_mut().zip(px) {
            curve.push(v);
        }
    }
    out
}
