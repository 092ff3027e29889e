//! # telecine-core
//!
//! Capture-side engine for a film-scanning telecine.
//!
//! This crate contains:
//! - **Wire types**: `FrameHeader`, `HeaderKind`, `Packet`, `PacketKind`
//! - **Codec**: `PacketCodec` for framed TCP I/O via `tokio_util`
//! - **Receiver**: `ProtocolReceiver`, the worker loop that dispatches frames
//! - **Processing**: bracket accumulation, exposure fusion (Mertens and
//!   Debevec + Reinhard), flat-field calibration, lens profiling,
//!   sharpness/histogram/resize post-processing
//! - **Output**: `FrameSaver` for save-to-file, `Notifier` for events
//! - **Error**: `CaptureError`, a typed `thiserror`-based error enum

pub mod bracket;
pub mod calibration;
pub mod codec;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod header;
pub mod network;
pub mod notify;
pub mod packet;
pub mod postprocess;
pub mod profile;
pub mod receiver;
pub mod save;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bracket::{BracketAccumulator, BracketSet};
pub use calibration::{CalibrationEngine, CalibrationStep, CalibrationTable};
pub use codec::PacketCodec;
pub use error::CaptureError;
pub use frame::PixelBuffer;
pub use fusion::{ExposureFusion, MergeMode, MertensWeights};
pub use header::{FrameHeader, HeaderKind};
pub use network::ScannerAddress;
pub use notify::{CaptureEvent, CaptureStatus, EventReceiver, Notifier, Phase, ProcessedFrame};
pub use packet::{MAX_PAYLOAD_SIZE, Packet, PacketKind};
pub use postprocess::Histogram;
pub use profile::LensProfile;
pub use receiver::{CALIBRATION_DONE, ProcessingOptions, ProtocolReceiver};
pub use save::{FrameSaver, SaveOptions};
