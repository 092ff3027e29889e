//! One-way event publication from the capture worker to its consumer.
//!
//! The worker never waits on the consumer: events go into an unbounded
//! channel and a closed channel is silently ignored. Events arrive in
//! the order they were published.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::frame::PixelBuffer;
use crate::header::FrameHeader;
use crate::postprocess::Histogram;
use crate::profile::LensProfile;

// ── Events ───────────────────────────────────────────────────────

/// A frame ready for display.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Header of the capture that produced the frame (the closing bracket
    /// for fused output).
    pub header: FrameHeader,
    pub buffer: PixelBuffer,
    /// Whether the buffer was fused from a bracket set.
    pub fused: bool,
    /// Focus metric, when it was computed.
    pub sharpness: Option<f64>,
}

/// Everything the worker reports.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A header arrived. Published before its payload is processed.
    Header(FrameHeader),
    Image(ProcessedFrame),
    Plot(LensProfile),
    Histogram(Histogram),
    /// [`CaptureStatus`] changed; read it for the new values.
    StatusChanged,
    /// A side effect failed but the worker kept going.
    Error(String),
}

pub type EventReceiver = mpsc::UnboundedReceiver<CaptureEvent>;

/// Publishing half of the event channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<CaptureEvent>,
}

impl Notifier {
    /// A notifier and the receiver its events go to.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish without waiting. Dropped if no one is listening.
    pub fn publish(&self, event: CaptureEvent) {
        let _ = self.tx.send(event);
    }

    pub fn header(&self, header: FrameHeader) {
        self.publish(CaptureEvent::Header(header));
    }

    pub fn image(&self, frame: ProcessedFrame) {
        self.publish(CaptureEvent::Image(frame));
    }

    pub fn plot(&self, profile: LensProfile) {
        self.publish(CaptureEvent::Plot(profile));
    }

    pub fn histogram(&self, histogram: Histogram) {
        self.publish(CaptureEvent::Histogram(histogram));
    }

    pub fn status_changed(&self) {
        self.publish(CaptureEvent::StatusChanged);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(CaptureEvent::Error(message.into()));
    }
}

// ── Status ───────────────────────────────────────────────────────

/// What the worker is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Ready = 0,
    Processing = 1,
}

/// Status shared between the worker (writer) and the consumer (reader).
///
/// Cloning shares the same underlying values. Reads may be stale.
#[derive(Debug, Clone, Default)]
pub struct CaptureStatus {
    inner: Arc<StatusInner>,
}

#[derive(Debug, Default)]
struct StatusInner {
    phase: AtomicU8,
    current_frame: AtomicU64,
}

impl CaptureStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.inner.phase.load(Ordering::Relaxed) {
            1 => Phase::Processing,
            _ => Phase::Ready,
        }
    }

    pub fn set_phase(&self, phase: Phase) {
        self.inner.phase.store(phase as u8, Ordering::Relaxed);
    }

    pub fn current_frame(&self) -> u64 {
        self.inner.current_frame.load(Ordering::Relaxed)
    }

    pub fn set_current_frame(&self, frame: u64) {
        self.inner.current_frame.store(frame, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderKind;

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.header(FrameHeader::new(HeaderKind::Message));
        notifier.status_changed();
        notifier.error("disk full");

        assert!(matches!(rx.recv().await, Some(CaptureEvent::Header(_))));
        assert!(matches!(rx.recv().await, Some(CaptureEvent::StatusChanged)));
        match rx.recv().await {
            Some(CaptureEvent::Error(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn publishing_without_consumer_is_harmless() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.status_changed();
        notifier.error("nobody listening");
    }

    #[test]
    fn status_is_shared_between_clones() {
        let status = CaptureStatus::new();
        let view = status.clone();
        assert_eq!(view.phase(), Phase::Ready);

        status.set_phase(Phase::Processing);
        status.set_current_frame(41);
        assert_eq!(view.phase(), Phase::Processing);
        assert_eq!(view.current_frame(), 41);
    }
}
