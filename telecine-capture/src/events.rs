//! Consumer side of the capture worker's event channel.
//!
//! The client has no display of its own; events are logged and tallied
//! so a session ends with a summary line.

use tracing::{debug, info, warn};

use telecine_core::{CaptureEvent, CaptureStatus, HeaderKind, Phase};

/// Counts of what a session produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub headers: u64,
    pub images: u64,
    pub fused: u64,
    pub plots: u64,
    pub histograms: u64,
    pub errors: u64,
}

/// Logs and counts events in the order the worker published them.
#[derive(Debug)]
pub struct EventLog {
    status: CaptureStatus,
    summary: SessionSummary,
}

impl EventLog {
    pub fn new(status: CaptureStatus) -> Self {
        Self {
            status,
            summary: SessionSummary::default(),
        }
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn handle(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Header(header) => {
                self.summary.headers += 1;
                match (header.kind, header.text) {
                    (HeaderKind::Message, Some(text)) => info!("scanner: {text}"),
                    (kind, _) => debug!(%kind, seq = header.sequence_count, "header"),
                }
            }
            CaptureEvent::Image(frame) => {
                self.summary.images += 1;
                if frame.fused {
                    self.summary.fused += 1;
                }
                let (w, h) = frame.buffer.dimensions();
                match frame.sharpness {
                    Some(s) => info!(
                        frame = self.status.current_frame(),
                        fused = frame.fused,
                        "image {w}x{h}, sharpness {s:.1}"
                    ),
                    None => info!(
                        frame = self.status.current_frame(),
                        fused = frame.fused,
                        "image {w}x{h}"
                    ),
                }
            }
            CaptureEvent::Plot(profile) => {
                self.summary.plots += 1;
                let peak = profile.horizontal.iter().flatten().max().copied().unwrap_or(0);
                info!(
                    width = profile.horizontal[0].len(),
                    height = profile.vertical[0].len(),
                    peak,
                    "lens profile"
                );
            }
            CaptureEvent::Histogram(histogram) => {
                self.summary.histograms += 1;
                let clipped = histogram
                    .channels
                    .iter()
                    .map(|bins| bins.last().copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                debug!(samples = histogram.total(), clipped, "histogram");
            }
            CaptureEvent::StatusChanged => {
                if self.status.phase() == Phase::Processing {
                    debug!(frame = self.status.current_frame(), "processing");
                }
            }
            CaptureEvent::Error(message) => {
                self.summary.errors += 1;
                warn!("capture error: {message}");
            }
        }
    }
}
