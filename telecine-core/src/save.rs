//! Save-to-file of produced frames.
//!
//! Files are named after the scanner's frame counter shifted by the
//! configured start frame:
//!
//! ```text
//! image_00042.jpg       single or fused frame
//! image_00042_03.jpg    bracket 3 of frame 42, saved unfused
//! ```
//!
//! Untouched `Image` payloads are written byte for byte. Anything the
//! engine computed (fused, calibrated, raw) is JPEG-encoded first.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CaptureError;
use crate::frame::PixelBuffer;

/// Default JPEG quality for re-encoded frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Where and whether to write frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Added to the scanner's 1-based counter to number output files.
    pub start_frame: u32,
    pub jpeg_quality: u8,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("captures"),
            start_frame: 1,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// The bytes to write for one frame.
#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
    /// The original compressed payload, written verbatim.
    Encoded(&'a [u8]),
    /// A computed buffer, re-encoded on save.
    Pixels(&'a PixelBuffer),
}

/// Output frame number for a scanner counter.
pub fn frame_number(sequence_count: u32, start_frame: u32) -> u64 {
    (sequence_count as u64 + start_frame as u64).saturating_sub(1)
}

/// File name for `frame`, with a bracket suffix for unfused exposures.
pub fn file_name(frame: u64, bracket: Option<u32>) -> String {
    match bracket {
        Some(b) => format!("image_{frame:05}_{b:02}.jpg"),
        None => format!("image_{frame:05}.jpg"),
    }
}

/// Writes frames according to [`SaveOptions`].
#[derive(Debug, Clone, Default)]
pub struct FrameSaver {
    options: SaveOptions,
}

impl FrameSaver {
    pub fn new(options: SaveOptions) -> Self {
        Self { options }
    }

    pub fn start_frame(&self) -> u32 {
        self.options.start_frame
    }

    /// Write one frame. Returns the path written, or `None` when saving is
    /// disabled.
    pub fn save(
        &self,
        sequence_count: u32,
        bracket: Option<u32>,
        source: FrameSource<'_>,
    ) -> Result<Option<PathBuf>, CaptureError> {
        if !self.options.enabled {
            return Ok(None);
        }

        let dir = &self.options.directory;
        std::fs::create_dir_all(dir).map_err(|e| CaptureError::persist(dir, e))?;

        let frame = frame_number(sequence_count, self.options.start_frame);
        let path = dir.join(file_name(frame, bracket));

        let encoded;
        let bytes = match source {
            FrameSource::Encoded(bytes) => bytes,
            FrameSource::Pixels(buffer) => {
                encoded = buffer.encode_jpeg(self.options.jpeg_quality)?;
                encoded.as_slice()
            }
        };
        std::fs::write(&path, bytes).map_err(|e| CaptureError::persist(&path, e))?;

        debug!(path = %path.display(), bytes = bytes.len(), "saved frame");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn options(dir: &Path) -> SaveOptions {
        SaveOptions {
            enabled: true,
            directory: dir.to_path_buf(),
            start_frame: 10,
            jpeg_quality: 90,
        }
    }

    #[test]
    fn names_follow_counter_and_bracket() {
        assert_eq!(frame_number(1, 0), 0);
        assert_eq!(frame_number(5, 10), 14);
        assert_eq!(frame_number(0, 0), 0);
        assert_eq!(file_name(14, None), "image_00014.jpg");
        assert_eq!(file_name(14, Some(3)), "image_00014_03.jpg");
    }

    #[test]
    fn default_numbering_matches_scanner_counter() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::new(SaveOptions {
            enabled: true,
            directory: dir.path().to_path_buf(),
            ..Default::default()
        });
        assert_eq!(saver.start_frame(), 1);
        let path = saver.save(1, None, FrameSource::Encoded(b"jpeg")).unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "image_00001.jpg");
    }

    #[test]
    fn disabled_saver_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::new(SaveOptions {
            enabled: false,
            ..options(dir.path())
        });
        let out = saver.save(1, None, FrameSource::Encoded(b"jpeg")).unwrap();
        assert!(out.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn encoded_payload_is_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let saver = FrameSaver::new(options(dir.path()));
        let path = saver
            .save(3, Some(2), FrameSource::Encoded(b"original bytes"))
            .unwrap()
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "image_00012_02.jpg");
        assert_eq!(std::fs::read(path).unwrap(), b"original bytes");
    }

    #[test]
    fn computed_frame_is_reencoded() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("roll-1");
        let saver = FrameSaver::new(options(&nested));
        let frame = PixelBuffer::filled(8, 8, 128).unwrap();
        let path = saver
            .save(1, None, FrameSource::Pixels(&frame))
            .unwrap()
            .unwrap();
        let decoded = PixelBuffer::decode(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
    }

    #[test]
    fn unwritable_directory_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let saver = FrameSaver::new(options(&blocker.join("sub")));
        let err = saver.save(1, None, FrameSource::Encoded(b"x")).unwrap_err();
        assert!(err.is_recoverable());
    }
}
