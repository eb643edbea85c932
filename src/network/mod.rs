//! Network module - Handles the TCP link to the flight controller
//!
//! Provides:
//! - A non-blocking byte transport over TCP
//! - The link controller enforcing one outstanding request at a time

mod link;
mod transport;

pub use link::*;
pub use transport::*;

use std::time::Duration;

use crate::protocol::DEFAULT_MAX_PAYLOAD;

/// Default time to wait for a response before dropping the link
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 2500;

/// Default polling cadence of the driver loop
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 125;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Interval between receive/send rounds in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum time a request may stay unanswered
    pub response_timeout_ms: u64,
    /// Largest payload the decoder accepts
    pub max_payload: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response_timeout(mut self, timeout_ms: u64) -> Self {
        self.response_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
