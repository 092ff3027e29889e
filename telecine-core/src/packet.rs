//! Packet framing for the scanner → controller stream.
//!
//! ## Wire format
//!
//! ```text
//! magic:           u32  (4)   "TLC0"
//! checksum:        u32  (4)   first 4 bytes of blake3(body), 0 if empty
//! kind:            u32  (4)   PacketKind
//! payload_length:  u64  (8)
//! body:            [u8] (payload_length)
//! ```
//!
//! A frame header travels as a [`PacketKind::Header`] packet and, when its
//! kind declares one, is followed by exactly one payload packet.

use crate::error::CaptureError;
use crate::frame::PixelBuffer;
use crate::header::FrameHeader;

/// Size of the fixed packet header.
pub const HEADER_LENGTH: usize = 20;

/// Largest body accepted by the codec (a full-resolution raw RGB frame
/// with headroom).
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

const MAGIC: [u8; 4] = *b"TLC0";

// ── PacketKind ───────────────────────────────────────────────────

/// What the body of a packet contains.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// A bincode-encoded [`FrameHeader`].
    Header = 0x1,
    /// Compressed image bytes (JPEG).
    Encoded = 0x2,
    /// `width: u32, height: u32` followed by raw RGB samples.
    Array = 0x3,
}

impl TryFrom<u32> for PacketKind {
    type Error = CaptureError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(PacketKind::Header),
            0x2 => Ok(PacketKind::Encoded),
            0x3 => Ok(PacketKind::Array),
            _ => Err(CaptureError::UnknownVariant {
                type_name: "PacketKind",
                value: value as u64,
            }),
        }
    }
}

// ── PacketHeader ─────────────────────────────────────────────────

/// Fixed-size prefix of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    checksum: u32,
    kind: PacketKind,
    payload_length: u64,
}

impl PacketHeader {
    /// Serialize to bytes (little-endian).
    pub fn to_bytes(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.kind as u32).to_le_bytes());
        buf[12..20].copy_from_slice(&self.payload_length.to_le_bytes());
        buf
    }

    /// Deserialize from bytes, validating magic and kind.
    pub fn from_bytes(bytes: &[u8; HEADER_LENGTH]) -> Result<Self, CaptureError> {
        if bytes[0..4] != MAGIC {
            return Err(CaptureError::InvalidMagic);
        }
        let [c0, c1, c2, c3, k0, k1, k2, k3, l @ ..] = {
            let mut rest = [0u8; 16];
            rest.copy_from_slice(&bytes[4..20]);
            rest
        };
        Ok(Self {
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
            kind: PacketKind::try_from(u32::from_le_bytes([k0, k1, k2, k3]))?,
            payload_length: u64::from_le_bytes(l),
        })
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn payload_length(&self) -> u64 {
        self.payload_length
    }
}

/// First four bytes of the BLAKE3 hash, or zero for an empty body.
fn checksum(body: &[u8]) -> u32 {
    if body.is_empty() {
        return 0;
    }
    let hash = blake3::hash(body);
    let b = hash.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ── Packet ───────────────────────────────────────────────────────

/// One framed message.
#[derive(Clone)]
pub struct Packet {
    header: PacketHeader,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, computing its checksum.
    pub fn new(kind: PacketKind, payload: Vec<u8>) -> Result<Self, CaptureError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CaptureError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            header: PacketHeader {
                checksum: checksum(&payload),
                kind,
                payload_length: payload.len() as u64,
            },
            payload,
        })
    }

    /// A frame header packet.
    pub fn header(header: &FrameHeader) -> Result<Self, CaptureError> {
        Self::new(PacketKind::Header, header.to_bytes()?)
    }

    /// A compressed image packet.
    pub fn encoded(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        Self::new(PacketKind::Encoded, bytes)
    }

    /// A raw pixel array packet.
    pub fn array(buffer: &PixelBuffer) -> Result<Self, CaptureError> {
        let mut body = Vec::with_capacity(8 + buffer.as_bytes().len());
        body.extend_from_slice(&buffer.width().to_le_bytes());
        body.extend_from_slice(&buffer.height().to_le_bytes());
        body.extend_from_slice(buffer.as_bytes());
        Self::new(PacketKind::Array, body)
    }

    pub fn kind(&self) -> PacketKind {
        self.header.kind
    }

    pub fn packet_header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Whether the stored checksum matches the body.
    pub fn validate(&self) -> bool {
        self.header.checksum == checksum(&self.payload)
    }

    /// Decode the body as a [`FrameHeader`].
    pub fn to_frame_header(&self) -> Result<FrameHeader, CaptureError> {
        if self.kind() != PacketKind::Header {
            return Err(CaptureError::ProtocolViolation(format!(
                "expected header packet, got {:?}",
                self.kind()
            )));
        }
        FrameHeader::from_bytes(&self.payload)
    }

    /// Decode the body as a raw [`PixelBuffer`].
    pub fn into_pixel_buffer(self) -> Result<PixelBuffer, CaptureError> {
        if self.kind() != PacketKind::Array {
            return Err(CaptureError::ProtocolViolation(format!(
                "expected array packet, got {:?}",
                self.kind()
            )));
        }
        if self.payload.len() < 8 {
            return Err(CaptureError::InvalidArrayLength {
                expected: 8,
                actual: self.payload.len(),
            });
        }
        let width = u32::from_le_bytes([
            self.payload[0],
            self.payload[1],
            self.payload[2],
            self.payload[3],
        ]);
        let height = u32::from_le_bytes([
            self.payload[4],
            self.payload[5],
            self.payload[6],
            self.payload[7],
        ]);
        let mut data = self.payload;
        data.drain(..8);
        PixelBuffer::new(width, height, data)
    }

    /// Header bytes followed by the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut packet = self.header.to_bytes().to_vec();
        packet.extend_from_slice(&self.payload);
        packet
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("kind", &self.header.kind)
            .field("payload_length", &self.header.payload_length)
            .field("checksum", &self.header.checksum)
            .finish()
    }
}

impl From<(PacketHeader, Vec<u8>)> for Packet {
    fn from((header, payload): (PacketHeader, Vec<u8>)) -> Self {
        Self { header, payload }
    }
}
