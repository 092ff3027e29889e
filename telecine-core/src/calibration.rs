//! Incremental flat-field calibration.
//!
//! A calibration run is `count` raw captures of an evenly lit target.
//! For every frame the engine computes the gain that would flatten it
//! (`channel mean / sample`) and multiplies it into the run's table;
//! frames after the first are corrected by the run so far before their
//! own gain is measured. When the last frame lands the run's table
//! replaces the active one and is written to disk.
//!
//! Gains are not clamped: dark corners legitimately end up above 1.0.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::frame::{CHANNELS, PixelBuffer, sample_count};

/// zstd level for the persisted table.
const COMPRESSION_LEVEL: i32 = 3;

// ── CalibrationTable ─────────────────────────────────────────────

/// Per-pixel, per-channel multiplicative gains with the shape of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    width: u32,
    height: u32,
    gains: Vec<f32>,
}

impl CalibrationTable {
    /// Wrap `gains` (interleaved RGB, row-major).
    pub fn new(width: u32, height: u32, gains: Vec<f32>) -> Result<Self, CaptureError> {
        let expected = sample_count(width, height)?;
        if gains.len() != expected {
            return Err(CaptureError::InvalidArrayLength {
                expected,
                actual: gains.len(),
            });
        }
        Ok(Self {
            width,
            height,
            gains,
        })
    }

    /// Every gain set to `value`.
    pub fn uniform(width: u32, height: u32, value: f32) -> Result<Self, CaptureError> {
        let len = sample_count(width, height)?;
        Ok(Self {
            width,
            height,
            gains: vec![value; len],
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn gains(&self) -> &[f32] {
        &self.gains
    }

    fn check_shape(&self, dims: (u32, u32)) -> Result<(), CaptureError> {
        if dims != self.dimensions() {
            return Err(CaptureError::ShapeMismatch {
                expected: self.dimensions(),
                actual: dims,
            });
        }
        Ok(())
    }

    /// Multiply float samples of a `dims`-sized frame in place.
    pub fn multiply(&self, samples: &mut [f32], dims: (u32, u32)) -> Result<(), CaptureError> {
        self.check_shape(dims)?;
        for (v, g) in samples.iter_mut().zip(&self.gains) {
            *v *= g;
        }
        Ok(())
    }

    /// Corrected samples of `frame` as floats, without quantising.
    pub fn corrected(&self, frame: &PixelBuffer) -> Result<Vec<f32>, CaptureError> {
        let mut samples = frame.to_f32();
        self.multiply(&mut samples, frame.dimensions())?;
        Ok(samples)
    }

    /// Correct `frame`, saturating to 8 bits.
    pub fn apply(&self, frame: &PixelBuffer) -> Result<PixelBuffer, CaptureError> {
        let samples = self.corrected(frame)?;
        PixelBuffer::from_f32(frame.width(), frame.height(), &samples)
    }

    /// Write the table, replacing any previous file.
    ///
    /// The bytes go to a sibling temporary file first so a failed write
    /// never leaves a truncated table behind.
    pub fn save(&self, path: &Path) -> Result<(), CaptureError> {
        let encoded = bincode::serialize(self)?;
        let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| CaptureError::persist(path, e))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, compressed).map_err(|e| CaptureError::persist(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| CaptureError::persist(path, e))?;
        Ok(())
    }

    /// Read a table written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        let compressed = std::fs::read(path).map_err(|e| CaptureError::persist(path, e))?;
        let encoded =
            zstd::decode_all(compressed.as_slice()).map_err(|e| CaptureError::persist(path, e))?;
        let table: CalibrationTable = bincode::deserialize(&encoded)?;
        // Re-validate: the file may come from anywhere.
        Self::new(table.width, table.height, table.gains)
    }
}

// ── CalibrationEngine ────────────────────────────────────────────

/// Result of feeding one calibration frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    /// More frames are expected.
    Accumulating { num: u32, count: u32 },
    /// The run finished and its table is now active.
    Complete,
}

/// Owns the active table and any run in progress.
#[derive(Debug)]
pub struct CalibrationEngine {
    path: PathBuf,
    apply: bool,
    active: Option<CalibrationTable>,
    run: Option<CalibrationTable>,
}

impl CalibrationEngine {
    /// An engine with an explicit starting table.
    pub fn new(path: impl Into<PathBuf>, apply: bool, table: Option<CalibrationTable>) -> Self {
        Self {
            path: path.into(),
            apply,
            active: table,
            run: None,
        }
    }

    /// Load the table stored at `path`, if any.
    ///
    /// A missing or unreadable file is not an error: the engine simply
    /// starts with no table.
    pub fn open(path: impl Into<PathBuf>, apply: bool) -> Self {
        let path = path.into();
        let table = if path.exists() {
            match CalibrationTable::load(&path) {
                Ok(table) => {
                    info!(path = %path.display(), dims = ?table.dimensions(), "loaded calibration table");
                    Some(table)
                }
                Err(e) => {
                    warn!("ignoring calibration table: {e}");
                    None
                }
            }
        } else {
            debug!(path = %path.display(), "no calibration table on disk");
            None
        };
        Self::new(path, apply, table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active table, regardless of whether correction is enabled.
    pub fn table(&self) -> Option<&CalibrationTable> {
        self.active.as_ref()
    }

    /// Enable or disable correction of captures.
    pub fn set_apply(&mut self, apply: bool) {
        self.apply = apply;
    }

    /// The table to correct a `dims`-sized capture with, if correction
    /// is enabled and a matching table exists.
    pub fn table_for(&self, dims: (u32, u32)) -> Option<&CalibrationTable> {
        if !self.apply {
            return None;
        }
        let table = self.active.as_ref()?;
        if table.dimensions() != dims {
            warn!(
                table = ?table.dimensions(),
                frame = ?dims,
                "calibration table does not match frame size; skipping correction"
            );
            return None;
        }
        Some(table)
    }

    /// Whether a run has started and not yet completed.
    pub fn run_in_progress(&self) -> bool {
        self.run.is_some()
    }

    /// Feed frame `num` of a `count`-frame run.
    pub fn ingest(
        &mut self,
        frame: &PixelBuffer,
        num: u32,
        count: u32,
    ) -> Result<CalibrationStep, CaptureError> {
        if num >= count {
            warn!(num, count, "calibration frame index outside its run");
        }

        let (width, height) = frame.dimensions();
        let samples = match (&self.run, num) {
            (Some(run), n) if n != 0 => run.corrected(frame)?,
            (None, n) if n != 0 => {
                warn!(num, "calibration run joined mid-way; starting from identity");
                frame.to_f32()
            }
            _ => frame.to_f32(),
        };

        let gains = flat_field_gains(&samples, frame.pixel_count());
        let table = match self.run.take() {
            Some(mut run) if num != 0 => {
                for (t, g) in run.gains.iter_mut().zip(&gains) {
                    *t *= g;
                }
                run
            }
            _ => CalibrationTable::new(width, height, gains)?,
        };

        if count.checked_sub(1) == Some(num) {
            info!(frames = count, "calibration run complete");
            self.active = Some(table);
            return Ok(CalibrationStep::Complete);
        }

        self.run = Some(table);
        Ok(CalibrationStep::Accumulating { num, count })
    }

    /// Write the active table to the engine's path.
    pub fn persist(&self) -> Result<(), CaptureError> {
        match &self.active {
            Some(table) => {
                table.save(&self.path)?;
                info!(path = %self.path.display(), "calibration table saved");
                Ok(())
            }
            None => Err(CaptureError::Other("no calibration table to persist".into())),
        }
    }
}

/// `channel mean / sample` for every sample. A zero sample carries no
/// information and gets a neutral gain.
fn flat_field_gains(samples: &[f32], pixel_count: usize) -> Vec<f32> {
    let mut sums = [0.0f64; CHANNELS];
    for px in samples.chunks_exact(CHANNELS) {
        for c in 0..CHANNELS {
            sums[c] += px[c] as f64;
        }
    }
    let n = pixel_count.max(1) as f64;
    let centre = sums.map(|s| (s / n) as f32);

    samples
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v > 0.0 {
                centre[i % CHANNELS] / v
            } else {
                1.0
            }
        })
        .collect()
}
