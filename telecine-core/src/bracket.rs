//! Collects the exposures of one bracket set.
//!
//! The scanner sends brackets counting down (`3, 2, 1`); the exposure
//! with index 1 closes the set.
//!
//! ```text
//!  Empty ──push(n>1)──► Collecting ──push(n>1)──► Collecting
//!    ▲                      │
//!    └──────── push(1) ─────┘  (set handed out, accumulator emptied)
//! ```

use crate::frame::PixelBuffer;

/// A complete, ordered bracket set ready for fusion.
#[derive(Debug, Default)]
pub struct BracketSet {
    pub frames: Vec<PixelBuffer>,
    pub shutter_micros: Vec<u32>,
}

impl BracketSet {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Exposure times in seconds.
    pub fn exposure_seconds(&self) -> Vec<f32> {
        self.shutter_micros
            .iter()
            .map(|&us| us as f32 / 1_000_000.0)
            .collect()
    }
}

/// Buffers exposures until the closing bracket arrives.
#[derive(Debug, Default)]
pub struct BracketAccumulator {
    pending: BracketSet,
}

impl BracketAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exposure with a non-zero `bracket_index`.
    ///
    /// Returns the finished set when `bracket_index == 1`, leaving the
    /// accumulator empty; otherwise `None`. Callers must route
    /// `bracket_index == 0` frames around the accumulator.
    pub fn push(
        &mut self,
        bracket_index: u32,
        frame: PixelBuffer,
        shutter_micros: u32,
    ) -> Option<BracketSet> {
        debug_assert_ne!(bracket_index, 0, "unbracketed frames bypass the accumulator");

        self.pending.frames.push(frame);
        self.pending.shutter_micros.push(shutter_micros);

        if bracket_index == 1 {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Number of exposures waiting for the closing bracket.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
