//! Protocol codec for encoding frames
//!
//! Builds complete wire frames (preamble, header, payload, integrity byte)
//! for either protocol version. Decoding lives in [`super::Decoder`].

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::checksum::{crc8_dvb_s2_slice, xor_slice};
use super::{Direction, Version, JUMBO_FRAME_MIN_SIZE, MSP_START, V2_OVERHEAD};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Checksum mismatch for code {code:#06x}: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { code: u16, expected: u8, actual: u8 },

    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes frames into the wire format
///
/// Payloads must fit the 16-bit length field, and v1 codes must fit in one
/// byte. Larger values are a caller error and are truncated on the wire.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    version: Version,
    direction: Direction,
}

impl Encoder {
    pub fn new(version: Version, direction: Direction) -> Self {
        Self { version, direction }
    }

    /// Encoder for requests sent to the flight controller (v2, `<`)
    pub fn request() -> Self {
        Self::new(Version::V2, Direction::ToFc)
    }

    /// Encoder for frames as the flight controller sends them
    pub fn reply(version: Version) -> Self {
        Self::new(version, Direction::FromFc)
    }

    /// Encode a frame into a buffer
    pub fn encode(&self, code: u16, payload: &[u8], buf: &mut BytesMut) {
        debug_assert!(payload.len() <= u16::MAX as usize);

        match self.version {
            Version::V1 => self.encode_v1(code as u8, payload, buf),
            Version::V2 => self.encode_v2(code, payload, buf),
        }
    }

    /// Encode a frame into a freshly allocated buffer
    pub fn to_bytes(&self, code: u16, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(V2_OVERHEAD + 2 + payload.len());
        self.encode(code, payload, &mut buf);
        buf.freeze()
    }

    fn encode_v2(&self, code: u16, payload: &[u8], buf: &mut BytesMut) {
        buf.reserve(V2_OVERHEAD + payload.len());
        buf.put_u8(MSP_START);
        buf.put_u8(Version::V2.marker());
        buf.put_u8(self.direction.marker());

        // CRC covers everything from the flag byte to the end of the payload
        let start = buf.len();
        buf.put_u8(0);
        buf.put_u16_le(code);
        buf.put_u16_le(payload.len() as u16);
        buf.put_slice(payload);

        let crc = crc8_dvb_s2_slice(&buf[start..]);
        buf.put_u8(crc);
    }

    fn encode_v1(&self, code: u8, payload: &[u8], buf: &mut BytesMut) {
        buf.reserve(8 + payload.len());
        buf.put_u8(MSP_START);
        buf.put_u8(Version::V1.marker());
        buf.put_u8(self.direction.marker());

        let start = buf.len();
        if payload.len() >= JUMBO_FRAME_MIN_SIZE as usize {
            buf.put_u8(JUMBO_FRAME_MIN_SIZE);
            buf.put_u8(code);
            buf.put_u16_le(payload.len() as u16);
        } else {
            buf.put_u8(payload.len() as u8);
            buf.put_u8(code);
        }
        buf.put_slice(payload);

        let checksum = xor_slice(0, &buf[start..]);
        buf.put_u8(checksum);
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::request()
    }
}

/// Encode a v2 request for the flight controller
pub fn encode_request(code: u16, payload: &[u8]) -> Bytes {
    Encoder::request().to_bytes(code, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_fc_variant_request() {
        let frame = encode_request(0x0002, &[]);
        assert_eq!(
            &frame[..],
            &[0x24, 0x58, 0x3C, 0x00, 0x02, 0x00, 0x00, 0x00, 0x8A]
        );
    }

    #[test]
    fn test_encode_request_with_payload() {
        let frame = encode_request(182, &[0xAA, 0xBB, 0xCC]);

        assert_eq!(frame.len(), V2_OVERHEAD + 3);
        assert_eq!(&frame[..3], b"$X<");
        assert_eq!(frame[3], 0); // flag
        assert_eq!(&frame[4..6], &[182, 0]); // code
        assert_eq!(&frame[6..8], &[3, 0]); // length
        assert_eq!(&frame[8..11], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(frame[11], 0x86);
    }

    #[test]
    fn test_encode_v2_wide_code() {
        let frame = encode_request(0x2016, &[]);
        assert_eq!(&frame[4..6], &[0x16, 0x20]);
        assert_eq!(frame[8], 0xD7);
    }

    #[test]
    fn test_encode_v1_reply() {
        let frame = Encoder::reply(Version::V1).to_bytes(2, &[0xAA, 0xBB, 0xCC]);
        assert_eq!(
            &frame[..],
            &[0x24, 0x4D, 0x3E, 0x03, 0x02, 0xAA, 0xBB, 0xCC, 0xDC]
        );
    }

    #[test]
    fn test_encode_v1_jumbo() {
        let payload = vec![0x11; 300];
        let frame = Encoder::reply(Version::V1).to_bytes(7, &payload);

        assert_eq!(frame[3], JUMBO_FRAME_MIN_SIZE);
        assert_eq!(frame[4], 7);
        assert_eq!(u16::from_le_bytes([frame[5], frame[6]]), 300);
        assert_eq!(frame.len(), 7 + 300 + 1);

        // 300 identical bytes cancel out
        let expected = JUMBO_FRAME_MIN_SIZE ^ 7 ^ 0x2C ^ 0x01;
        assert_eq!(frame[frame.len() - 1], expected);
    }

    #[test]
    fn test_encoder_appends_to_buffer() {
        let mut buf = BytesMut::new();
        let encoder = Encoder::request();
        encoder.encode(1, &[], &mut buf);
        encoder.encode(2, &[9], &mut buf);
        assert_eq!(buf.len(), V2_OVERHEAD * 2 + 1);
        assert_eq!(buf[V2_OVERHEAD + 4], 2);
    }
}
