//! Integration tests: full capture sessions over a real TCP connection
//! on localhost, in-memory duplex pipes and scripted mock streams.

use std::time::Duration;

use futures::SinkExt;
use telecine_core::network::{self, ScannerAddress};
use telecine_core::{
    CALIBRATION_DONE, CalibrationEngine, CaptureError, CaptureEvent, EventReceiver, FrameHeader,
    FrameSaver, HeaderKind, MergeMode, Notifier, Packet, PacketCodec, Phase, PixelBuffer,
    ProcessingOptions, ProtocolReceiver, SaveOptions,
};
use tokio::net::TcpListener;
use tokio_util::codec::FramedWrite;

// ── Helpers ──────────────────────────────────────────────────────

fn exposure(width: u32, height: u32, level: u8) -> PixelBuffer {
    let mut data = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let v = level.saturating_add(((x + y) % 16) as u8 * 4);
            data.extend_from_slice(&[v, v / 2, 255 - v]);
        }
    }
    PixelBuffer::new(width, height, data).unwrap()
}

fn raw_header(seq: u32, bracket: u32, shutter: u32) -> FrameHeader {
    let mut header = FrameHeader::image(seq, bracket, shutter);
    header.kind = HeaderKind::Raw;
    header
}

/// A three-exposure bracket set for frame `seq`, longest exposure first.
fn bracket_session(seq: u32) -> Vec<Packet> {
    let mut packets = Vec::new();
    for (bracket, level, shutter) in [(3, 200, 32_000), (2, 110, 8_000), (1, 30, 2_000)] {
        packets.push(Packet::header(&raw_header(seq, bracket, shutter)).unwrap());
        packets.push(Packet::array(&exposure(32, 24, level)).unwrap());
    }
    packets
}

fn encode(packets: Vec<Packet>) -> Vec<u8> {
    packets.iter().flat_map(Packet::to_bytes).collect()
}

fn receiver(options: ProcessingOptions, saver: FrameSaver) -> (ProtocolReceiver, EventReceiver) {
    let (notifier, rx) = Notifier::channel();
    let calibration = CalibrationEngine::new("unused-calibration.bin", true, None);
    (ProtocolReceiver::new(options, calibration, saver, notifier), rx)
}

fn drain(rx: &mut EventReceiver) -> Vec<CaptureEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn image_count(events: &[CaptureEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CaptureEvent::Image(_)))
        .count()
}

// ── TCP sessions ─────────────────────────────────────────────────

#[tokio::test]
async fn test_fused_session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();
    let addr = ScannerAddress::new(local.ip().to_string(), local.port());

    let scanner = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut sink = FramedWrite::new(stream, PacketCodec);
        for seq in 1..=2 {
            for packet in bracket_session(seq) {
                sink.send(packet).await.unwrap();
            }
        }
        sink.send(Packet::header(&FrameHeader::new(HeaderKind::Stop)).unwrap())
            .await
            .unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let saver = FrameSaver::new(SaveOptions {
        enabled: true,
        directory: dir.path().to_path_buf(),
        start_frame: 100,
        ..Default::default()
    });
    let options = ProcessingOptions {
        merge_mode: MergeMode::Mertens,
        ..Default::default()
    };
    let (mut worker, mut rx) = receiver(options, saver);
    let status = worker.status();

    let stream = network::connect(&addr, Duration::from_secs(5)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(30), network::receive(stream, &mut worker))
        .await
        .expect("timeout")
        .unwrap();
    scanner.await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(image_count(&events), 2);
    // 6 exposure headers + stop
    let headers = events
        .iter()
        .filter(|e| matches!(e, CaptureEvent::Header(_)))
        .count();
    assert_eq!(headers, 7);

    assert!(dir.path().join("image_00100.jpg").exists());
    assert!(dir.path().join("image_00101.jpg").exists());
    assert_eq!(status.current_frame(), 101);
    assert_eq!(status.phase(), Phase::Ready);
}

#[tokio::test]
async fn test_peer_close_ends_session_cleanly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local = listener.local_addr().unwrap();
    let addr = ScannerAddress::new("127.0.0.1", local.port());

    let scanner = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut sink = FramedWrite::new(stream, PacketCodec);
        sink.send(Packet::header(&FrameHeader::message("lamp on")).unwrap())
            .await
            .unwrap();
        // dropped: connection closes without Stop
    });

    let (mut worker, mut rx) = receiver(ProcessingOptions::default(), FrameSaver::default());
    let stream = network::connect(&addr, Duration::from_secs(5)).await.unwrap();
    network::receive(stream, &mut worker).await.unwrap();
    scanner.await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(CaptureEvent::Header(h)) if h.text.as_deref() == Some("lamp on")
    ));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = network::connect(&ScannerAddress::new("127.0.0.1", port), Duration::from_secs(5)).await;
    assert!(matches!(result, Err(CaptureError::Connection(_))));
}

// ── In-memory sessions ───────────────────────────────────────────

#[tokio::test]
async fn test_calibration_over_duplex_then_corrected_capture() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("calibrate.bin");

    let (client, server) = tokio::io::duplex(64 * 1024);
    let scanner = tokio::spawn(async move {
        let mut sink = FramedWrite::new(server, PacketCodec);
        let frame = exposure(16, 12, 60);
        for num in 0..3 {
            sink.send(Packet::header(&FrameHeader::calibrate(num, 3)).unwrap())
                .await
                .unwrap();
            sink.send(Packet::array(&frame).unwrap()).await.unwrap();
        }
        sink.send(Packet::header(&raw_header(1, 0, 1_000)).unwrap())
            .await
            .unwrap();
        sink.send(Packet::array(&frame).unwrap()).await.unwrap();
        sink.send(Packet::header(&FrameHeader::new(HeaderKind::Stop)).unwrap())
            .await
            .unwrap();
    });

    let (notifier, mut rx) = Notifier::channel();
    let mut worker = ProtocolReceiver::new(
        ProcessingOptions::default(),
        CalibrationEngine::open(&table_path, true),
        FrameSaver::default(),
        notifier,
    );
    assert!(worker.calibration().table().is_none());

    worker.run(client).await.unwrap();
    scanner.await.unwrap();

    let events = drain(&mut rx);
    let announced = events.iter().any(|e| {
        matches!(e, CaptureEvent::Header(h)
            if h.kind == HeaderKind::Message && h.text.as_deref() == Some(CALIBRATION_DONE))
    });
    assert!(announced);

    // The corrected capture of the calibration target is flat per channel.
    let frame = events
        .iter()
        .find_map(|e| match e {
            CaptureEvent::Image(f) => Some(&f.buffer),
            _ => None,
        })
        .unwrap();
    let first = frame.pixel(0, 0);
    for y in 0..12 {
        for x in 0..16 {
            let px = frame.pixel(x, y);
            for c in 0..3 {
                assert!((px[c] as i32 - first[c] as i32).abs() <= 1);
            }
        }
    }

    // A fresh worker picks up the persisted table.
    let reopened = CalibrationEngine::open(&table_path, true);
    assert_eq!(reopened.table().unwrap().dimensions(), (16, 12));
}

#[tokio::test]
async fn test_debevec_session_from_fragmented_stream() {
    let bytes = encode(bracket_session(5));
    let (head, tail) = bytes.split_at(bytes.len() / 3);
    let (middle, rest) = tail.split_at(37);
    let mock = tokio_test::io::Builder::new()
        .read(head)
        .read(middle)
        .read(rest)
        .build();

    let options = ProcessingOptions {
        merge_mode: MergeMode::Debevec,
        histograms: true,
        ..Default::default()
    };
    let (mut worker, mut rx) = receiver(options, FrameSaver::default());
    worker.run(mock).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(image_count(&events), 1);
    assert!(events.iter().any(|e| matches!(e, CaptureEvent::Histogram(_))));
    assert_eq!(worker.pending_brackets(), 0);
}

#[tokio::test]
async fn test_corrupted_packet_terminates_session() {
    let mut bytes = encode(bracket_session(1));
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let (mut worker, mut rx) = receiver(
        ProcessingOptions {
            merge_mode: MergeMode::Mertens,
            ..Default::default()
        },
        FrameSaver::default(),
    );
    let err = worker.run(bytes.as_slice()).await.unwrap_err();
    assert!(matches!(err, CaptureError::ChecksumMismatch));
    assert_eq!(image_count(&drain(&mut rx)), 0);
}

#[tokio::test]
async fn test_payload_where_header_expected_is_rejected() {
    let bytes = encode(vec![Packet::array(&exposure(4, 4, 10)).unwrap()]);
    let (mut worker, _rx) = receiver(ProcessingOptions::default(), FrameSaver::default());
    let err = worker.run(bytes.as_slice()).await.unwrap_err();
    assert!(matches!(err, CaptureError::ProtocolViolation(_)));
}
