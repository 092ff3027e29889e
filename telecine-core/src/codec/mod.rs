//! `tokio_util` codec that frames [`Packet`]s on the scanner stream.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CaptureError;
use crate::packet::{HEADER_LENGTH, MAX_PAYLOAD_SIZE, Packet, PacketHeader};

/// Stateless packet codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CaptureError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_LENGTH];
        raw.copy_from_slice(&src[..HEADER_LENGTH]);
        let header = PacketHeader::from_bytes(&raw)?;

        let payload_length = header.payload_length() as usize;
        if payload_length > MAX_PAYLOAD_SIZE {
            return Err(CaptureError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let frame_length = HEADER_LENGTH + payload_length;
        if src.len() < frame_length {
            src.reserve(frame_length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let payload = src.split_to(payload_length).to_vec();
        let packet = Packet::from((header, payload));

        if !packet.validate() {
            return Err(CaptureError::ChecksumMismatch);
        }

        Ok(Some(packet))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CaptureError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_LENGTH + item.payload().len());
        dst.extend_from_slice(&item.packet_header().to_bytes());
        dst.extend_from_slice(item.payload());
        Ok(())
    }
}
