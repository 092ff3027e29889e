//! The capture worker's receive loop.
//!
//! Every message from the scanner is a header packet, followed by exactly
//! one payload packet for the kinds that carry one:
//!
//! ```text
//! Scanner ──[Header: Image]────► Receiver
//! Scanner ──[Encoded: JPEG]────► Receiver   → bracket / fuse / publish
//!
//! Scanner ──[Header: Raw | Calibrate | Analyze]──► Receiver
//! Scanner ──[Array: w, h, RGB]───────────────────► Receiver
//!
//! Scanner ──[Header: Stop]─────► Receiver   → loop ends
//! ```
//!
//! Headers are published before their payload is read, so the consumer
//! sees them even if processing fails afterwards. All processing runs
//! inline; the only await point is the socket read.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::bracket::BracketAccumulator;
use crate::calibration::{CalibrationEngine, CalibrationStep};
use crate::codec::PacketCodec;
use crate::error::CaptureError;
use crate::frame::PixelBuffer;
use crate::fusion::{ExposureFusion, MergeMode, MertensWeights};
use crate::header::{FrameHeader, HeaderKind};
use crate::notify::{CaptureStatus, Notifier, Phase, ProcessedFrame};
use crate::packet::{Packet, PacketKind};
use crate::postprocess::{self, Histogram};
use crate::profile;
use crate::save::{self, FrameSaver, FrameSource};

/// Text of the message header published when a calibration run ends.
pub const CALIBRATION_DONE: &str = "Local Calibration done";

/// Processing switches fixed for a capture run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub merge_mode: MergeMode,
    /// Correct captures with the active calibration table.
    pub apply_calibration: bool,
    /// Compute the focus metric for untouched, unbracketed `Image` frames.
    pub sharpness: bool,
    /// Publish a histogram with every image.
    pub histograms: bool,
    /// Integer downscale before publishing; 1 keeps full size.
    pub reduce_factor: u32,
    /// Exponents of the Mertens quality measures.
    pub mertens: MertensWeights,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            merge_mode: MergeMode::None,
            apply_calibration: true,
            sharpness: false,
            histograms: false,
            reduce_factor: 1,
            mertens: MertensWeights::default(),
        }
    }
}

// ── ProtocolReceiver ─────────────────────────────────────────────

/// Owns all per-session processing state. Only the worker mutates it.
pub struct ProtocolReceiver {
    options: ProcessingOptions,
    fusion: ExposureFusion,
    brackets: BracketAccumulator,
    calibration: CalibrationEngine,
    saver: FrameSaver,
    notifier: Notifier,
    status: CaptureStatus,
}

impl ProtocolReceiver {
    pub fn new(
        options: ProcessingOptions,
        mut calibration: CalibrationEngine,
        saver: FrameSaver,
        notifier: Notifier,
    ) -> Self {
        calibration.set_apply(options.apply_calibration);
        Self {
            fusion: ExposureFusion::new(options.merge_mode, options.mertens),
            options,
            brackets: BracketAccumulator::new(),
            calibration,
            saver,
            notifier,
            status: CaptureStatus::new(),
        }
    }

    /// Shared status handle for the consumer.
    pub fn status(&self) -> CaptureStatus {
        self.status.clone()
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    /// Exposures held for an incomplete bracket set.
    pub fn pending_brackets(&self) -> usize {
        self.brackets.pending()
    }

    /// Read and process messages until the peer closes the stream or
    /// sends `Stop`.
    ///
    /// Decode and processing failures end the loop with an error.
    /// Failed file writes are published as error events instead.
    pub async fn run<R>(&mut self, reader: R) -> Result<(), CaptureError>
    where
        R: AsyncRead + Unpin,
    {
        let mut packets = FramedRead::new(reader, PacketCodec);
        info!(merge = %self.fusion.mode(), "capture worker started");

        loop {
            let Some(packet) = packets.next().await.transpose()? else {
                info!("scanner closed the connection");
                break;
            };

            let header = packet.to_frame_header()?;
            debug!(
                kind = %header.kind,
                bracket = header.bracket_index,
                seq = header.sequence_count,
                "header received"
            );
            self.notifier.header(header.clone());

            match header.kind {
                HeaderKind::Stop => {
                    info!("scanner requested stop");
                    break;
                }
                kind if !kind.has_payload() => continue,
                _ => {}
            }

            let payload = packets
                .next()
                .await
                .transpose()?
                .ok_or(CaptureError::MissingPayload(header.kind.name()))?;

            self.set_phase(Phase::Processing);
            let result = self.process(&header, payload);
            self.set_phase(Phase::Ready);
            result?;
        }

        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        self.status.set_phase(phase);
        self.notifier.status_changed();
    }

    fn process(&mut self, header: &FrameHeader, payload: Packet) -> Result<(), CaptureError> {
        match header.kind {
            HeaderKind::Image => {
                if payload.kind() != PacketKind::Encoded {
                    return Err(CaptureError::ProtocolViolation(format!(
                        "image header followed by {:?} packet",
                        payload.kind()
                    )));
                }
                let encoded = payload.into_payload();
                let frame = PixelBuffer::decode(&encoded)?;
                self.process_capture(header, frame, Some(encoded))
            }
            HeaderKind::Raw => self.process_capture(header, payload.into_pixel_buffer()?, None),
            HeaderKind::Calibrate => self.process_calibration(header, payload.into_pixel_buffer()?),
            HeaderKind::Analyze => self.process_analysis(payload.into_pixel_buffer()?),
            _ => Ok(()),
        }
    }

    /// `Image` and `Raw` frames. `encoded` holds the original payload
    /// while the frame is still untouched.
    fn process_capture(
        &mut self,
        header: &FrameHeader,
        frame: PixelBuffer,
        encoded: Option<Vec<u8>>,
    ) -> Result<(), CaptureError> {
        self.status.set_current_frame(save::frame_number(
            header.sequence_count,
            self.saver.start_frame(),
        ));

        if header.bracket_index != 0 && self.fusion.is_enabled() {
            let Some(set) = self
                .brackets
                .push(header.bracket_index, frame, header.shutter_micros)
            else {
                return Ok(());
            };

            let frames = set.len();
            let table = set
                .frames
                .first()
                .and_then(|f| self.calibration.table_for(f.dimensions()));
            let fused = self.fusion.fuse(set, table)?;
            info!(frames, seq = header.sequence_count, "bracket set fused");

            self.save(header.sequence_count, None, FrameSource::Pixels(&fused))?;
            self.publish(header, fused, true, None);
            return Ok(());
        }

        let (frame, encoded) = match self.calibration.table_for(frame.dimensions()) {
            Some(table) => (table.apply(&frame)?, None),
            None => (frame, encoded),
        };

        let bracket = (header.bracket_index != 0).then_some(header.bracket_index);
        let source = match &encoded {
            Some(bytes) => FrameSource::Encoded(bytes),
            None => FrameSource::Pixels(&frame),
        };
        self.save(header.sequence_count, bracket, source)?;

        let sharpness = (self.options.sharpness && bracket.is_none() && encoded.is_some())
            .then(|| postprocess::sharpness(&frame));
        self.publish(header, frame, false, sharpness);
        Ok(())
    }

    fn process_calibration(
        &mut self,
        header: &FrameHeader,
        frame: PixelBuffer,
    ) -> Result<(), CaptureError> {
        let (num, count) = (header.run_index, header.sequence_count);
        match self.calibration.ingest(&frame, num, count)? {
            CalibrationStep::Accumulating { .. } => {
                debug!(num, count, "calibration frame accumulated");
            }
            CalibrationStep::Complete => {
                if let Err(e) = self.calibration.persist() {
                    self.report(e)?;
                }
                self.notifier.header(FrameHeader::message(CALIBRATION_DONE));
            }
        }
        Ok(())
    }

    fn process_analysis(&mut self, frame: PixelBuffer) -> Result<(), CaptureError> {
        let table = self.calibration.table_for(frame.dimensions());
        let profile = profile::profile(&frame, table)?;
        debug!(width = frame.width(), height = frame.height(), "lens profile computed");
        self.notifier.plot(profile);
        Ok(())
    }

    fn save(
        &self,
        sequence_count: u32,
        bracket: Option<u32>,
        source: FrameSource<'_>,
    ) -> Result<(), CaptureError> {
        match self.saver.save(sequence_count, bracket, source) {
            Ok(_) => Ok(()),
            Err(e) => self.report(e),
        }
    }

    /// Publish recoverable errors and swallow them; return the rest.
    fn report(&self, error: CaptureError) -> Result<(), CaptureError> {
        if !error.is_recoverable() {
            return Err(error);
        }
        warn!("{error}");
        self.notifier.error(error.to_string());
        Ok(())
    }

    fn publish(
        &self,
        header: &FrameHeader,
        frame: PixelBuffer,
        fused: bool,
        sharpness: Option<f64>,
    ) {
        if self.options.histograms {
            self.notifier.histogram(Histogram::of(&frame));
        }
        let buffer = postprocess::reduce(frame, self.options.reduce_factor);
        self.notifier.image(ProcessedFrame {
            header: header.clone(),
            buffer,
            fused,
            sharpness,
        });
    }
}
