//! Protocol message definitions
//!
//! Wire constants and the decoded message type handed to the application.

use bytes::Bytes;

/// Frame start byte (`$`)
pub const MSP_START: u8 = b'$';

/// Version marker for v1 frames (`M`)
pub const MSP_V1: u8 = b'M';

/// Version marker for v2 frames (`X`)
pub const MSP_V2: u8 = b'X';

/// Direction marker for frames sent to the flight controller (`<`)
pub const MSP_TO_FC: u8 = b'<';

/// Direction marker for frames sent by the flight controller (`>`)
pub const MSP_FROM_FC: u8 = b'>';

/// Direction marker the flight controller uses for unsupported commands (`!`)
pub const MSP_UNSUPPORTED: u8 = b'!';

/// v1 length value announcing a jumbo frame with a 16-bit extended length
pub const JUMBO_FRAME_MIN_SIZE: u8 = 255;

/// v2 frame overhead: `$ X dir flag code(2) len(2) crc`
pub const V2_OVERHEAD: usize = 9;

/// Command codes used by the OSD client.
///
/// The link treats codes as opaque; these only matter to the application.
pub mod command {
    /// Flight-controller variant query, used as the keep-alive request
    pub const MSP_FC_VARIANT: u16 = 0x0002;
    /// Display-port (canvas OSD) stream
    pub const MSP_DISPLAYPORT: u16 = 182;
    /// INAV OSD preferences, first byte carries the video system
    pub const MSP2_INAV_OSD_PREFERENCES: u16 = 0x2016;
}

/// Frame format version, selected by the second preamble byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            MSP_V1 => Some(Version::V1),
            MSP_V2 => Some(Version::V2),
            _ => None,
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            Version::V1 => MSP_V1,
            Version::V2 => MSP_V2,
        }
    }
}

/// Direction of a frame relative to the flight controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    ToFc,
    #[default]
    FromFc,
}

impl Direction {
    pub fn marker(self) -> u8 {
        match self {
            Direction::ToFc => MSP_TO_FC,
            Direction::FromFc => MSP_FROM_FC,
        }
    }
}

/// A frame that passed its integrity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspMessage {
    /// Command code (8-bit codes from v1 frames are zero-extended)
    pub code: u16,
    /// Payload, exactly as long as the declared length
    pub payload: Bytes,
    /// Frame version it arrived in
    pub version: Version,
    /// Last recognised direction marker
    pub direction: Direction,
    /// Set when the direction byte was the `!` marker
    pub unsupported: bool,
}

impl MspMessage {
    pub fn new(code: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
            version: Version::V2,
            direction: Direction::FromFc,
            unsupported: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_markers() {
        assert_eq!(Version::from_marker(b'M'), Some(Version::V1));
        assert_eq!(Version::from_marker(b'X'), Some(Version::V2));
        assert_eq!(Version::from_marker(b'Q'), None);
        assert_eq!(Version::V2.marker(), b'X');
    }

    #[test]
    fn test_direction_markers() {
        assert_eq!(Direction::ToFc.marker(), b'<');
        assert_eq!(Direction::FromFc.marker(), b'>');
    }
}
