//! Byte-level frame decoder
//!
//! A forward-only state machine fed one byte at a time. Parse state survives
//! between calls, so frames may be split across any number of reads and a
//! single read may carry several frames. Every evaluated checksum, matching
//! or not, returns the decoder to `Idle`.

use bytes::{BufMut, BytesMut};

use super::checksum::Checksum;
use super::codec::{CodecError, CodecResult};
use super::{
    Direction, MspMessage, Version, JUMBO_FRAME_MIN_SIZE, MSP_FROM_FC, MSP_START, MSP_TO_FC,
    MSP_UNSUPPORTED,
};

/// Largest payload accepted by default: anything the 16-bit length can express
pub const DEFAULT_MAX_PAYLOAD: usize = u16::MAX as usize;

/// Position in the frame grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Stage {
    /// Waiting for `$`
    #[default]
    Idle,
    /// Got `$`, waiting for `M` or `X`
    ProtocolIdentifier,
    Direction,
    FlagV2,
    LengthV1,
    CodeV1,
    CodeJumboV1,
    JumboLengthLow,
    JumboLengthHigh,
    CodeV2Low,
    CodeV2High,
    LengthV2Low,
    LengthV2High,
    Payload,
    Checksum,
}

/// Incremental MSP frame decoder
#[derive(Debug)]
pub struct Decoder {
    stage: Stage,
    version: Version,
    direction: Direction,
    unsupported: bool,
    code: u16,
    expected_length: usize,
    payload: BytesMut,
    checksum: Checksum,
    max_payload: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a decoder that rejects frames declaring more than `max_payload` bytes
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            stage: Stage::Idle,
            version: Version::V2,
            direction: Direction::default(),
            unsupported: false,
            code: 0,
            expected_length: 0,
            payload: BytesMut::new(),
            checksum: Checksum::crc8(),
            max_payload,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Drop any partial frame and wait for the next `$`
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.code = 0;
        self.expected_length = 0;
        self.payload = BytesMut::new();
    }

    /// True when no frame is partially parsed
    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Feed all bytes of a read, returning every valid frame they complete.
    ///
    /// Corrupt and oversized frames are logged and dropped.
    pub fn push(&mut self, data: &[u8]) -> Vec<MspMessage> {
        let mut messages = Vec::new();

        for &byte in data {
            match self.feed(byte) {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(e) => tracing::debug!("Dropping MSP frame: {}", e),
            }
        }

        messages
    }

    /// Feed a single byte.
    ///
    /// Returns `Ok(Some(message))` when the byte completes a valid frame,
    /// `Ok(None)` when more bytes are needed, and `Err` when a frame was
    /// rejected. The decoder is back in `Idle` after any `Err`.
    pub fn feed(&mut self, byte: u8) -> CodecResult<Option<MspMessage>> {
        match self.stage {
            Stage::Idle => {
                if byte == MSP_START {
                    self.stage = Stage::ProtocolIdentifier;
                }
            }
            Stage::ProtocolIdentifier => match Version::from_marker(byte) {
                Some(version) => {
                    self.version = version;
                    self.stage = Stage::Direction;
                }
                None => self.stage = Stage::Idle,
            },
            Stage::Direction => {
                self.unsupported = false;
                match byte {
                    MSP_FROM_FC => self.direction = Direction::FromFc,
                    MSP_TO_FC => self.direction = Direction::ToFc,
                    MSP_UNSUPPORTED => self.unsupported = true,
                    _ => {}
                }
                match self.version {
                    Version::V1 => {
                        self.checksum = Checksum::xor();
                        self.stage = Stage::LengthV1;
                    }
                    Version::V2 => {
                        self.checksum = Checksum::crc8();
                        self.stage = Stage::FlagV2;
                    }
                }
            }
            Stage::FlagV2 => {
                self.checksum.update(byte);
                self.stage = Stage::CodeV2Low;
            }
            Stage::LengthV1 => {
                self.checksum.update(byte);
                if byte == JUMBO_FRAME_MIN_SIZE {
                    self.stage = Stage::CodeJumboV1;
                } else {
                    self.expected_length = byte as usize;
                    self.begin_payload()?;
                    self.stage = Stage::CodeV1;
                }
            }
            Stage::CodeV1 => {
                self.checksum.update(byte);
                self.code = byte as u16;
                self.stage = self.after_header();
            }
            Stage::CodeJumboV1 => {
                self.checksum.update(byte);
                self.code = byte as u16;
                self.stage = Stage::JumboLengthLow;
            }
            Stage::JumboLengthLow => {
                self.checksum.update(byte);
                self.expected_length = byte as usize;
                self.stage = Stage::JumboLengthHigh;
            }
            Stage::JumboLengthHigh => {
                self.checksum.update(byte);
                self.expected_length |= (byte as usize) << 8;
                self.begin_payload()?;
                self.stage = self.after_header();
            }
            Stage::CodeV2Low => {
                self.checksum.update(byte);
                self.code = byte as u16;
                self.stage = Stage::CodeV2High;
            }
            Stage::CodeV2High => {
                self.checksum.update(byte);
                self.code |= (byte as u16) << 8;
                self.stage = Stage::LengthV2Low;
            }
            Stage::LengthV2Low => {
                self.checksum.update(byte);
                self.expected_length = byte as usize;
                self.stage = Stage::LengthV2High;
            }
            Stage::LengthV2High => {
                self.checksum.update(byte);
                self.expected_length |= (byte as usize) << 8;
                self.begin_payload()?;
                self.stage = self.after_header();
            }
            Stage::Payload => {
                self.checksum.update(byte);
                self.payload.put_u8(byte);
                if self.payload.len() >= self.expected_length {
                    self.stage = Stage::Checksum;
                }
            }
            Stage::Checksum => return self.finish(byte).map(Some),
        }

        Ok(None)
    }

    /// Size the payload buffer once the declared length is known
    fn begin_payload(&mut self) -> CodecResult<()> {
        if self.expected_length > self.max_payload {
            let length = self.expected_length;
            self.reset();
            return Err(CodecError::PayloadTooLarge(length, self.max_payload));
        }
        self.payload = BytesMut::with_capacity(self.expected_length);
        Ok(())
    }

    fn after_header(&self) -> Stage {
        if self.expected_length > 0 {
            Stage::Payload
        } else {
            Stage::Checksum
        }
    }

    fn finish(&mut self, received: u8) -> CodecResult<MspMessage> {
        let expected = self.checksum.value();
        let code = self.code;
        let payload = std::mem::take(&mut self.payload).freeze();
        self.reset();

        if received != expected {
            return Err(CodecError::ChecksumMismatch {
                code,
                expected,
                actual: received,
            });
        }

        Ok(MspMessage {
            code,
            payload,
            version: self.version,
            direction: self.direction,
            unsupported: self.unsupported,
        })
    }

    #[cfg(test)]
    fn stage(&self) -> Stage {
        self.stage
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
