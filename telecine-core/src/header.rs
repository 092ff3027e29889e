//! Frame header record sent by the scanner ahead of every payload.
//!
//! The header is a small structured record (kind tag + exposure
//! metadata) serialized with `bincode` inside a [`PacketKind::Header`]
//! packet. Decoding is pure and stateless.
//!
//! [`PacketKind::Header`]: crate::packet::PacketKind::Header

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

// ── HeaderKind ───────────────────────────────────────────────────

/// What the scanner is announcing with a header.
///
/// Unknown wire values are kept as [`HeaderKind::Unknown`] rather than
/// rejected: such headers are still forwarded to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum HeaderKind {
    /// An encoded (JPEG) capture follows.
    Image,
    /// A raw RGB pixel array capture follows.
    Raw,
    /// A raw frame belonging to a flat-field calibration run follows.
    Calibrate,
    /// A raw frame to be lens-profiled follows.
    Analyze,
    /// The scanner is ending the session.
    Stop,
    /// Status text only, no payload.
    Message,
    /// Any other discriminant.
    Unknown(u32),
}

impl HeaderKind {
    /// Whether a payload packet follows a header of this kind.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            HeaderKind::Image | HeaderKind::Raw | HeaderKind::Calibrate | HeaderKind::Analyze
        )
    }

    /// Static name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            HeaderKind::Image => "image",
            HeaderKind::Raw => "raw",
            HeaderKind::Calibrate => "calibrate",
            HeaderKind::Analyze => "analyze",
            HeaderKind::Stop => "stop",
            HeaderKind::Message => "message",
            HeaderKind::Unknown(_) => "unknown",
        }
    }
}

impl From<u32> for HeaderKind {
    fn from(value: u32) -> Self {
        match value {
            0x1 => HeaderKind::Image,
            0x2 => HeaderKind::Raw,
            0x3 => HeaderKind::Calibrate,
            0x4 => HeaderKind::Analyze,
            0x5 => HeaderKind::Stop,
            0x6 => HeaderKind::Message,
            other => HeaderKind::Unknown(other),
        }
    }
}

impl From<HeaderKind> for u32 {
    fn from(kind: HeaderKind) -> Self {
        match kind {
            HeaderKind::Image => 0x1,
            HeaderKind::Raw => 0x2,
            HeaderKind::Calibrate => 0x3,
            HeaderKind::Analyze => 0x4,
            HeaderKind::Stop => 0x5,
            HeaderKind::Message => 0x6,
            HeaderKind::Unknown(other) => other,
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderKind::Unknown(v) => write!(f, "unknown({v:#x})"),
            other => f.write_str(other.name()),
        }
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Metadata describing the payload that follows (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub kind: HeaderKind,
    /// Position within a bracket set, counted down to 1. Zero means the
    /// frame is not bracketed.
    pub bracket_index: u32,
    /// Frame counter for images; run length for calibration frames.
    pub sequence_count: u32,
    /// 0-based index within a calibration run.
    pub run_index: u32,
    pub shutter_micros: u32,
    /// Red and blue auto-white-balance gains.
    pub awb_gains: (f32, f32),
    pub analog_gain: f32,
    pub digital_gain: f32,
    pub text: Option<String>,
}

impl FrameHeader {
    /// A header of `kind` with every metadata field zeroed.
    pub fn new(kind: HeaderKind) -> Self {
        Self {
            kind,
            bracket_index: 0,
            sequence_count: 0,
            run_index: 0,
            shutter_micros: 0,
            awb_gains: (1.0, 1.0),
            analog_gain: 1.0,
            digital_gain: 1.0,
            text: None,
        }
    }

    /// An image header for one exposure.
    pub fn image(sequence_count: u32, bracket_index: u32, shutter_micros: u32) -> Self {
        Self {
            bracket_index,
            sequence_count,
            shutter_micros,
            ..Self::new(HeaderKind::Image)
        }
    }

    /// A calibration header for frame `run_index` of a `count`-frame run.
    pub fn calibrate(run_index: u32, count: u32) -> Self {
        Self {
            run_index,
            sequence_count: count,
            ..Self::new(HeaderKind::Calibrate)
        }
    }

    /// A status message header.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(HeaderKind::Message)
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
