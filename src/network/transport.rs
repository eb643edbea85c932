//! Byte transport to the flight controller
//!
//! Opening is async; writes and reads never wait. A read returns whatever
//! the socket currently holds, which may be nothing, part of a frame, or
//! several frames.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed by peer")]
    Closed,

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A connection-oriented, non-blocking byte channel
#[async_trait]
pub trait Transport: Send {
    /// Connect to `address:port`
    async fn open(&mut self, address: &str, port: u16) -> TransportResult<()>;

    /// Close the connection; a no-op when already closed
    fn close(&mut self);

    /// Whether a connection is currently open
    fn is_open(&self) -> bool;

    /// Write without waiting. `Ok(0)` means nothing could be written.
    fn write(&mut self, bytes: &[u8]) -> TransportResult<usize>;

    /// Take every byte currently available without waiting
    fn read_available(&mut self) -> TransportResult<Bytes>;
}

/// TCP transport backed by a tokio socket
pub struct TcpTransport {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    read_buf: BytesMut,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            connect_timeout,
            read_buf: BytesMut::with_capacity(4096),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, address: &str, port: u16) -> TransportResult<()> {
        self.close();

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;

        tracing::debug!("TCP connection open to {}:{}", address, port);
        self.read_buf.clear();
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("TCP connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> TransportResult<usize> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;

        match stream.try_write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read_available(&mut self) -> TransportResult<Bytes> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;

        loop {
            self.read_buf.reserve(4096);
            match stream.try_read_buf(&mut self.read_buf) {
                Ok(0) => {
                    // Hand out what arrived before EOF; the next read reports it
                    if self.read_buf.is_empty() {
                        return Err(TransportError::Closed);
                    }
                    break;
                }
                Ok(n) => tracing::trace!("Read {} bytes", n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.read_buf.split().freeze())
    }
}
