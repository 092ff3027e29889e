//! Domain-specific error types for the capture engine.
//!
//! All fallible operations return `Result<T, CaptureError>`.
//! Corrupt input never panics: every failure is typed and the receive
//! loop decides whether it is fatal or reportable.

use thiserror::Error;

/// The canonical error type for frame ingestion and processing.
#[derive(Debug, Error)]
pub enum CaptureError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the `TLC0` magic sequence.
    #[error("invalid magic bytes: expected TLC0")]
    InvalidMagic,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The packet body failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A message arrived where the protocol expected something else.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    // ── Packet Errors ────────────────────────────────────────────
    /// The body exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A pixel array body does not match its declared dimensions.
    #[error("invalid pixel array: expected {expected} bytes, got {actual}")]
    InvalidArrayLength { expected: usize, actual: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The stream ended in the middle of a header/payload pair.
    #[error("connection closed before payload of {0} header")]
    MissingPayload(&'static str),

    // ── Decoding Errors ──────────────────────────────────────────
    /// Encoding or decoding of a structured record failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Compressed image bytes could not be decoded or encoded.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    // ── Processing Errors ────────────────────────────────────────
    /// Two buffers that must share a shape do not.
    #[error("shape mismatch: {expected:?} vs {actual:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A bracket set could not be fused.
    #[error("fusion failed: {0}")]
    Fusion(&'static str),

    // ── Persistence Errors ───────────────────────────────────────
    /// Reading or writing the calibration table or a frame file failed.
    #[error("i/o error on {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CaptureError {
    /// Wrap a filesystem error with the path it happened on.
    pub fn persist(path: &std::path::Path, source: std::io::Error) -> Self {
        CaptureError::Persist {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether the receive loop may keep running after this error.
    ///
    /// Only filesystem side effects are recoverable; everything else
    /// means the stream can no longer be trusted.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::Persist { .. })
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl From<Box<bincode::ErrorKind>> for CaptureError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        CaptureError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_errors_name_the_failure() {
        let e = CaptureError::MissingPayload("raw");
        assert_eq!(e.to_string(), "connection closed before payload of raw header");

        let e = CaptureError::ShapeMismatch {
            expected: (4, 3),
            actual: (3, 4),
        };
        assert_eq!(e.to_string(), "shape mismatch: (4, 3) vs (3, 4)");

        let e = CaptureError::Fusion("bracket with zero exposure time");
        assert_eq!(e.to_string(), "fusion failed: bracket with zero exposure time");
        assert!(!e.is_recoverable());
    }

    #[test]
    fn truncated_record_is_an_encoding_error() {
        let e: CaptureError = bincode::deserialize::<(u32, u32)>(&[1, 2])
            .unwrap_err()
            .into();
        assert!(matches!(e, CaptureError::Encoding(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: CaptureError = io_err.into();
        assert!(matches!(e, CaptureError::Connection(_)));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn persist_is_recoverable() {
        let e = CaptureError::Persist {
            path: "calibrate.bin".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.is_recoverable());
        assert!(e.to_string().contains("calibrate.bin"));
    }
}
