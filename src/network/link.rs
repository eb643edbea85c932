//! MSP link controller
//!
//! Owns the transport and the frame decoder, and enforces the request
//! discipline of the flight controller: a single outstanding request, a
//! response timeout, and disconnect on any transport failure. The link is
//! driven by an external polling loop calling [`Link::receive`] and
//! [`Link::send`]; neither call ever waits.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{Transport, TransportError};
use super::NetworkConfig;
use crate::protocol::{encode_request, Decoder, MspMessage};

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Failed to connect to {0}")]
    ConnectFailed(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Why the link went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Requested,
    /// No response within the response timeout
    Timeout,
    /// The transport refused or failed a write
    WriteFailed,
    /// The transport failed or the peer closed the connection
    TransportClosed,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DisconnectReason::Requested => "disconnect requested",
            DisconnectReason::Timeout => "response timeout",
            DisconnectReason::WriteFailed => "write failed",
            DisconnectReason::TransportClosed => "connection closed",
        };
        f.write_str(text)
    }
}

/// Receiver of link notifications
pub trait LinkEvents {
    /// Called once per valid frame, in arrival order
    fn on_message(&mut self, message: MspMessage);

    /// Called once per transition to disconnected
    fn on_disconnect(&mut self, reason: DisconnectReason);
}

/// Events published by the link when driven through a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A valid frame arrived
    MessageReceived { message: MspMessage },
    /// The link went down
    Disconnected { reason: DisconnectReason },
}

impl LinkEvents for mpsc::UnboundedSender<LinkEvent> {
    fn on_message(&mut self, message: MspMessage) {
        let _ = self.send(LinkEvent::MessageReceived { message });
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        let _ = self.send(LinkEvent::Disconnected { reason });
    }
}

/// Collects events in memory
impl LinkEvents for Vec<LinkEvent> {
    fn on_message(&mut self, message: MspMessage) {
        self.push(LinkEvent::MessageReceived { message });
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        self.push(LinkEvent::Disconnected { reason });
    }
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    /// Connected with no request outstanding
    Idle,
    /// Connected, a request is waiting for its response
    AwaitingResponse,
}

/// Outcome of [`Link::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// Dropped: the link is down
    NotConnected,
    /// Dropped: a previous request is still outstanding
    Busy,
    /// The write failed and the link was torn down
    Failed,
}

/// Link statistics
#[derive(Debug, Default, Clone)]
pub struct LinkStats {
    /// Requests written
    pub requests_sent: u64,
    /// Valid frames dispatched
    pub messages_received: u64,
    /// Bytes written
    pub bytes_sent: u64,
    /// Bytes read
    pub bytes_received: u64,
}

/// Request/response link to a flight controller
pub struct Link<T, E> {
    transport: T,
    decoder: Decoder,
    events: E,
    config: NetworkConfig,
    connected: bool,
    awaiting_response: bool,
    last_send: Option<Instant>,
    stats: LinkStats,
}

impl<T: Transport, E: LinkEvents> Link<T, E> {
    pub fn new(transport: T, events: E, config: NetworkConfig) -> Self {
        Self {
            transport,
            decoder: Decoder::with_max_payload(config.max_payload),
            events,
            config,
            connected: false,
            awaiting_response: false,
            last_send: None,
            stats: LinkStats::default(),
        }
    }

    /// Connect to a flight controller. Does not retry.
    ///
    /// Any partial frame left over from a previous session is discarded.
    pub async fn connect(&mut self, address: &str, port: u16) -> LinkResult<()> {
        if self.connected {
            return Err(LinkError::AlreadyConnected);
        }

        tracing::info!("Connecting to {}:{}", address, port);
        self.transport.open(address, port).await?;

        if !self.transport.is_open() {
            return Err(LinkError::ConnectFailed(format!("{}:{}", address, port)));
        }

        self.decoder.reset();
        self.connected = true;
        self.awaiting_response = false;
        self.last_send = None;
        tracing::info!("Connected to {}:{}", address, port);

        Ok(())
    }

    /// Close the link and notify the event receiver
    pub fn disconnect(&mut self) {
        self.teardown(DisconnectReason::Requested);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn state(&self) -> LinkState {
        match (self.connected, self.awaiting_response) {
            (false, _) => LinkState::Disconnected,
            (true, false) => LinkState::Idle,
            (true, true) => LinkState::AwaitingResponse,
        }
    }

    /// Send a request.
    ///
    /// Silently dropped while disconnected or while a previous request is
    /// outstanding. A failed write tears the link down.
    pub fn send(&mut self, code: u16, payload: &[u8]) -> SendStatus {
        if !self.connected {
            tracing::trace!("Dropping request {:#06x}: not connected", code);
            return SendStatus::NotConnected;
        }
        if self.awaiting_response {
            tracing::trace!("Dropping request {:#06x}: response pending", code);
            return SendStatus::Busy;
        }

        let frame = encode_request(code, payload);

        match self.transport.write(&frame) {
            Ok(n) if n > 0 => {
                if n < frame.len() {
                    tracing::debug!("Short write: {} of {} bytes", n, frame.len());
                }
                self.last_send = Some(Instant::now());
                self.awaiting_response = true;
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += n as u64;
                SendStatus::Sent
            }
            Ok(_) => {
                tracing::warn!("Unable to send request {:#06x}: nothing written", code);
                self.teardown(DisconnectReason::WriteFailed);
                SendStatus::Failed
            }
            Err(e) => {
                tracing::warn!("Unable to send request {:#06x}: {}", code, e);
                self.teardown(DisconnectReason::WriteFailed);
                SendStatus::Failed
            }
        }
    }

    /// Poll for incoming bytes and dispatch completed frames.
    ///
    /// Returns the number of messages dispatched during this call.
    pub fn receive(&mut self) -> usize {
        if !self.connected {
            return 0;
        }

        if self.response_overdue() {
            tracing::warn!(
                "MSP connection timed out after {} ms without response",
                self.config.response_timeout_ms
            );
            self.teardown(DisconnectReason::Timeout);
            return 0;
        }

        let bytes = match self.transport.read_available() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("MSP read failed: {}", e);
                self.teardown(DisconnectReason::TransportClosed);
                return 0;
            }
        };

        if bytes.is_empty() {
            return 0;
        }

        self.stats.bytes_received += bytes.len() as u64;
        self.awaiting_response = false;

        let messages = self.decoder.push(&bytes);
        let count = messages.len();
        for message in messages {
            tracing::trace!(
                "MSP message {:#06x} ({} bytes)",
                message.code,
                message.payload.len()
            );
            self.events.on_message(message);
        }
        self.stats.messages_received += count as u64;

        count
    }

    /// Discard any partially decoded frame
    pub fn reset_decoder(&mut self) {
        self.decoder.reset();
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    fn response_overdue(&self) -> bool {
        match self.last_send {
            Some(sent) if self.awaiting_response => {
                sent.elapsed() > self.config.response_timeout()
            }
            _ => false,
        }
    }

    fn teardown(&mut self, reason: DisconnectReason) {
        if !self.connected {
            return;
        }

        self.transport.close();
        self.connected = false;
        self.awaiting_response = false;
        self.last_send = None;

        tracing::info!("Disconnected: {}", reason);
        self.events.on_disconnect(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TransportResult;
    use crate::protocol::{command, Encoder, Version};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct MockTransport {
        open: bool,
        refuse_open: bool,
        fail_writes: bool,
        fail_reads: bool,
        written: Vec<Vec<u8>>,
        inbound: VecDeque<Vec<u8>>,
        reads: usize,
        closes: usize,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&mut self, _address: &str, _port: u16) -> TransportResult<()> {
            self.open = !self.refuse_open;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
            self.closes += 1;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, bytes: &[u8]) -> TransportResult<usize> {
            if self.fail_writes {
                return Ok(0);
            }
            self.written.push(bytes.to_vec());
            Ok(bytes.len())
        }

        fn read_available(&mut self) -> TransportResult<Bytes> {
            self.reads += 1;
            if self.fail_reads {
                return Err(TransportError::Closed);
            }
            Ok(self.inbound.pop_front().map(Bytes::from).unwrap_or_default())
        }
    }

    type TestLink = Link<MockTransport, Vec<LinkEvent>>;

    fn connected_link() -> TestLink {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());
        tokio_test::block_on(link.connect("127.0.0.1", 5760)).unwrap();
        link
    }

    fn reply(code: u16, payload: &[u8]) -> Vec<u8> {
        Encoder::reply(Version::V2).to_bytes(code, payload).to_vec()
    }

    fn disconnects(link: &TestLink) -> usize {
        link.events()
            .iter()
            .filter(|e| matches!(e, LinkEvent::Disconnected { .. }))
            .count()
    }

    #[test]
    fn test_connect() {
        let link = connected_link();
        assert!(link.is_connected());
        assert_eq!(link.state(), LinkState::Idle);
    }

    #[test]
    fn test_connect_refused() {
        let transport = MockTransport {
            refuse_open: true,
            ..Default::default()
        };
        let mut link = Link::new(transport, Vec::new(), NetworkConfig::default());

        let result = tokio_test::block_on(link.connect("10.0.0.1", 5760));

        assert!(matches!(result, Err(LinkError::ConnectFailed(_))));
        assert!(!link.is_connected());
        assert!(link.events().is_empty());
    }

    #[test]
    fn test_connect_twice_rejected() {
        let mut link = connected_link();
        let result = tokio_test::block_on(link.connect("127.0.0.1", 5760));
        assert!(matches!(result, Err(LinkError::AlreadyConnected)));
    }

    #[test]
    fn test_send_encodes_v2_request() {
        let mut link = connected_link();

        assert_eq!(link.send(command::MSP_FC_VARIANT, &[]), SendStatus::Sent);

        assert_eq!(
            link.transport().written,
            vec![vec![0x24, 0x58, 0x3C, 0x00, 0x02, 0x00, 0x00, 0x00, 0x8A]]
        );
        assert_eq!(link.state(), LinkState::AwaitingResponse);
    }

    #[test]
    fn test_send_while_disconnected_is_dropped() {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());

        assert_eq!(link.send(1, &[]), SendStatus::NotConnected);
        assert!(link.transport().written.is_empty());
    }

    #[test]
    fn test_single_request_in_flight() {
        let mut link = connected_link();

        assert_eq!(link.send(1, &[]), SendStatus::Sent);
        assert_eq!(link.send(2, &[]), SendStatus::Busy);

        assert_eq!(link.transport().written.len(), 1);
        assert_eq!(link.stats().requests_sent, 1);
    }

    #[test]
    fn test_connectivity_query_keeps_guard() {
        let mut link = connected_link();

        link.send(1, &[]);
        assert!(link.is_connected());
        assert!(link.is_awaiting_response());
        assert_eq!(link.send(1, &[]), SendStatus::Busy);
    }

    #[test]
    fn test_response_releases_guard() {
        let mut link = connected_link();
        link.send(command::MSP_FC_VARIANT, &[]);

        link.transport_mut().inbound.push_back(reply(command::MSP_FC_VARIANT, b"INAV"));
        assert_eq!(link.receive(), 1);

        assert!(!link.is_awaiting_response());
        assert_eq!(
            link.events()[0],
            LinkEvent::MessageReceived {
                message: MspMessage::new(command::MSP_FC_VARIANT, &b"INAV"[..]),
            }
        );

        assert_eq!(link.send(command::MSP_FC_VARIANT, &[]), SendStatus::Sent);
        assert_eq!(link.transport().written.len(), 2);
    }

    #[test]
    fn test_frame_split_across_receives() {
        let mut link = connected_link();
        let frame = reply(182, &[3, 1, 2, 0, b'A']);

        link.transport_mut().inbound.push_back(frame[..4].to_vec());
        link.transport_mut().inbound.push_back(frame[4..].to_vec());

        assert_eq!(link.receive(), 0);
        assert_eq!(link.receive(), 1);
        assert_eq!(link.events().len(), 1);
    }

    #[test]
    fn test_several_frames_in_one_read() {
        let mut link = connected_link();
        let mut data = reply(1, b"a");
        data.extend(reply(2, b"b"));
        data.extend(reply(3, b"c"));
        link.transport_mut().inbound.push_back(data);

        assert_eq!(link.receive(), 3);
        assert_eq!(link.stats().messages_received, 3);
    }

    #[test]
    fn test_corrupt_frame_dropped() {
        let mut link = connected_link();
        link.send(1, &[]);

        let mut frame = reply(1, b"data");
        frame[9] ^= 0x40;
        link.transport_mut().inbound.push_back(frame);

        assert_eq!(link.receive(), 0);
        assert!(link.events().is_empty());
        assert!(link.is_connected());
        // bytes arrived, so the request is no longer outstanding
        assert!(!link.is_awaiting_response());
    }

    #[test]
    fn test_write_failure_disconnects() {
        let mut link = connected_link();
        link.transport_mut().fail_writes = true;

        assert_eq!(link.send(1, &[]), SendStatus::Failed);

        assert!(!link.is_connected());
        assert!(!link.transport().open);
        assert_eq!(
            link.events(),
            &vec![LinkEvent::Disconnected {
                reason: DisconnectReason::WriteFailed
            }]
        );
    }

    #[test]
    fn test_read_failure_disconnects() {
        let mut link = connected_link();
        link.transport_mut().fail_reads = true;

        link.receive();

        assert!(!link.is_connected());
        assert_eq!(disconnects(&link), 1);
    }

    #[test]
    fn test_disconnect_notifies_once() {
        let mut link = connected_link();

        link.disconnect();
        link.disconnect();

        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.transport().closes, 1);
        assert_eq!(
            link.events(),
            &vec![LinkEvent::Disconnected {
                reason: DisconnectReason::Requested
            }]
        );
    }

    #[test]
    fn test_receive_while_disconnected_does_not_read() {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());
        assert_eq!(link.receive(), 0);
        assert_eq!(link.transport().reads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout_disconnects() {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());
        link.connect("127.0.0.1", 5760).await.unwrap();
        link.send(command::MSP_FC_VARIANT, &[]);
        link.transport_mut().inbound.push_back(reply(2, b"late"));

        tokio::time::advance(Duration::from_millis(2501)).await;
        assert_eq!(link.receive(), 0);

        assert!(!link.is_connected());
        assert_eq!(link.transport().reads, 0);
        assert_eq!(
            link.events(),
            &vec![LinkEvent::Disconnected {
                reason: DisconnectReason::Timeout
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_within_timeout() {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());
        link.connect("127.0.0.1", 5760).await.unwrap();
        link.send(command::MSP_FC_VARIANT, &[]);

        tokio::time::advance(Duration::from_millis(2400)).await;
        assert_eq!(link.receive(), 0);
        assert!(link.is_connected());
        assert!(link.is_awaiting_response());

        link.transport_mut().inbound.push_back(reply(2, b"INAV"));
        assert_eq!(link.receive(), 1);
        assert!(link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_link_never_times_out() {
        let mut link = Link::new(MockTransport::default(), Vec::new(), NetworkConfig::default());
        link.connect("127.0.0.1", 5760).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        link.receive();

        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_channel_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = Link::new(MockTransport::default(), tx, NetworkConfig::default());
        link.connect("127.0.0.1", 5760).await.unwrap();

        link.transport_mut().inbound.push_back(reply(7, &[1]));
        link.receive();
        link.disconnect();

        assert!(matches!(
            rx.recv().await,
            Some(LinkEvent::MessageReceived { message }) if message.code == 7
        ));
        assert_eq!(
            rx.recv().await,
            Some(LinkEvent::Disconnected {
                reason: DisconnectReason::Requested
            })
        );
    }
}
