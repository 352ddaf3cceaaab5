//! # TCP Connection Abstraction
//!
//! Wraps a TCP stream with newline framing for the discovery protocol.
//!
//! ## Wire Protocol
//!
//! Each message is one JSON object followed by `\n`, with no length prefix:
//! ```text
//! [N bytes: JSON message data] [\n]
//! ```
//!
//! Bytes after the first `\n` stay buffered for the next read, so several
//! frames may travel over one connection.

use log::debug;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::error::TransportError;
use super::messages::Message;

/// Maximum accepted frame size (1MB); discovery traffic is tiny.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// TCP connection wrapper with line framing support.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: Option<SocketAddr>,
}

impl Connection {
    /// Create a new Connection from an established TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
        }
    }

    /// Remote address, when the socket could report it.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Read the next frame.
    ///
    /// # Returns
    /// - `Ok(Some(Message))`: a complete frame was read and parsed
    /// - `Ok(None)`: the peer closed the connection cleanly between frames
    /// - `Err(Closed)`: the peer closed the connection mid-frame
    /// - `Err(Malformed)`: the frame was not a valid message
    /// - `Err(FrameTooLarge)`: no `\n` within [`MAX_FRAME_SIZE`] bytes
    pub async fn read_message(&mut self) -> Result<Option<Message>, TransportError> {
        let mut line = String::new();

        let read = (&mut self.reader)
            .take(MAX_FRAME_SIZE as u64)
            .read_line(&mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if !line.ends_with('\n') {
            if read >= MAX_FRAME_SIZE {
                return Err(TransportError::FrameTooLarge {
                    limit: MAX_FRAME_SIZE,
                });
            }
            debug!("Peer {:?} closed mid-frame after {} bytes", self.peer, read);
            return Err(TransportError::Closed);
        }

        Ok(Some(Message::from_line(&line)?))
    }

    /// Write one message as a `\n`-terminated frame and flush it.
    pub async fn write_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let line = message.to_line()?;

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}
