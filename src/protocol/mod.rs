//! Protocol module - MSP wire format for flight-controller communication
//!
//! Two frame versions share the same preamble:
//! - `$M` (v1): 8-bit length and code, XOR checksum, jumbo extension for
//!   payloads of 255 bytes or more
//! - `$X` (v2): flag byte, 16-bit little-endian code and length, CRC-8/DVB-S2
//!
//! Requests go out as v2 frames; the decoder accepts both versions.

mod checksum;
mod codec;
mod decoder;
mod message;

pub use checksum::*;
pub use codec::*;
pub use decoder::*;
pub use message::*;

/// Default TCP port of an INAV SITL MSP endpoint
pub const DEFAULT_PORT: u16 = 5760;
