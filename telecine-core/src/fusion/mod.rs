//! Exposure fusion engine: turns a complete [`BracketSet`] into one
//! 8-bit frame.
//!
//! | Mode      | Pipeline                                              |
//! |-----------|-------------------------------------------------------|
//! | `Mertens` | quality-weighted pyramid blend → min-max normalise    |
//! | `Debevec` | linear-response radiance merge → Reinhard tone map    |
//!
//! An active calibration table multiplies the merged float result, and
//! only then is it quantised with `clamp(x · 255, 0, 255)`. The output is
//! a computed buffer: it has no original encoded form and must be
//! re-encoded to be saved.

pub mod debevec;
pub mod mertens;
pub mod pyramid;
pub mod tonemap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bracket::BracketSet;
use crate::calibration::CalibrationTable;
use crate::error::CaptureError;
use crate::frame::PixelBuffer;

pub use mertens::MertensWeights;

/// How (and whether) bracket sets are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Brackets are passed through as individual frames.
    #[default]
    None,
    /// Weighted exposure fusion.
    Mertens,
    /// Radiance merge plus tone compression.
    Debevec,
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeMode::None => write!(f, "none"),
            MergeMode::Mertens => write!(f, "mertens"),
            MergeMode::Debevec => write!(f, "debevec"),
        }
    }
}

/// Fuses bracket sets with the mode chosen before the capture run.
#[derive(Debug, Clone, Default)]
pub struct ExposureFusion {
    mode: MergeMode,
    weights: MertensWeights,
}

impl ExposureFusion {
    pub fn new(mode: MergeMode, weights: MertensWeights) -> Self {
        Self { mode, weights }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Whether bracketed frames should be accumulated at all.
    pub fn is_enabled(&self) -> bool {
        self.mode != MergeMode::None
    }

    /// Fuse `set`, consuming it.
    pub fn fuse(
        &self,
        set: BracketSet,
        table: Option<&CalibrationTable>,
    ) -> Result<PixelBuffer, CaptureError> {
        let first = set.frames.first().ok_or(CaptureError::Fusion("empty bracket set"))?;
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::Fusion("empty frame in bracket set"));
        }
        if let Some(other) = set.frames.iter().find(|f| f.dimensions() != (width, height)) {
            return Err(CaptureError::ShapeMismatch {
                expected: (width, height),
                actual: other.dimensions(),
            });
        }

        let merged = match self.mode {
            MergeMode::None => return Err(CaptureError::Fusion("merging is disabled")),
            MergeMode::Mertens => mertens::fuse(&set.frames, &self.weights),
            MergeMode::Debevec => {
                if set.shutter_micros.contains(&0) {
                    return Err(CaptureError::Fusion("bracket with zero exposure time"));
                }
                let radiance = debevec::merge(&set.frames, &set.exposure_seconds());
                tonemap::reinhard(&radiance)
            }
        };
        debug!(mode = %self.mode, frames = set.len(), "fused bracket set");

        let mut samples = merged.data;
        if let Some(table) = table {
            table.multiply(&mut samples, (width, height))?;
        }
        for v in &mut samples {
            *v *= 255.0;
        }
        PixelBuffer::from_f32(width, height, &samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::BracketAccumulator;

    fn ramp(w: u32, h: u32, scale: f32) -> PixelBuffer {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let base = (x * 255 / w.max(1) + y * 3) as f32 * scale;
                let v = base.min(255.0) as u8;
                data.extend_from_slice(&[v, v / 2 + 10, 255 - v]);
            }
        }
        PixelBuffer::new(w, h, data).unwrap()
    }

    fn bracket(w: u32, h: u32) -> BracketSet {
        let mut acc = BracketAccumulator::new();
        acc.push(3, ramp(w, h, 0.3), 2_000);
        acc.push(2, ramp(w, h, 0.7), 8_000);
        acc.push(1, ramp(w, h, 1.4), 32_000).unwrap()
    }

    #[test]
    fn mertens_output_has_input_shape() {
        let engine = ExposureFusion::new(MergeMode::Mertens, MertensWeights::default());
        let out = engine.fuse(bracket(16, 12), None).unwrap();
        assert_eq!(out.dimensions(), (16, 12));
        // Min-max normalisation spans the full 8-bit range.
        assert_eq!(out.as_bytes().iter().min(), Some(&0));
        assert_eq!(out.as_bytes().iter().max(), Some(&255));
    }

    #[test]
    fn debevec_output_has_input_shape() {
        let engine = ExposureFusion::new(MergeMode::Debevec, MertensWeights::default());
        let out = engine.fuse(bracket(10, 7), None).unwrap();
        assert_eq!(out.dimensions(), (10, 7));
        assert!(out.as_bytes().iter().any(|&v| v > 0));
    }

    #[test]
    fn calibration_scales_merged_result() {
        let engine = ExposureFusion::new(MergeMode::Mertens, MertensWeights::default());
        let plain = engine.fuse(bracket(8, 8), None).unwrap();
        let half = CalibrationTable::uniform(8, 8, 0.5).unwrap();
        let scaled = engine.fuse(bracket(8, 8), Some(&half)).unwrap();
        for (p, s) in plain.as_bytes().iter().zip(scaled.as_bytes()) {
            assert!((*p as i32 / 2 - *s as i32).abs() <= 1);
        }
    }

    #[test]
    fn mismatched_shapes_rejected() {
        let engine = ExposureFusion::new(MergeMode::Mertens, MertensWeights::default());
        let set = BracketSet {
            frames: vec![ramp(4, 4, 1.0), ramp(5, 4, 1.0)],
            shutter_micros: vec![100, 200],
        };
        assert!(matches!(
            engine.fuse(set, None),
            Err(CaptureError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn empty_set_rejected() {
        let engine = ExposureFusion::new(MergeMode::Debevec, MertensWeights::default());
        assert!(engine.fuse(BracketSet::default(), None).is_err());
    }

    #[test]
    fn merge_mode_config_names() {
        assert_eq!(MergeMode::Debevec.to_string(), "debevec");
        assert!(!ExposureFusion::default().is_enabled());
    }
}
