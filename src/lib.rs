//! msp-osd - MSP link engine and display-port OSD client
//!
//! Talks to a flight controller (or an INAV SITL instance) over TCP using
//! the MSP protocol: requests go out as v2 frames, replies in either frame
//! version are decoded incrementally from the byte stream, and the link
//! keeps at most one request outstanding.

pub mod config;
pub mod network;
pub mod osd;
pub mod protocol;
