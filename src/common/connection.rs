//! # TCP Connection Abstraction
//!
//! Wraps a TCP stream with the message framing used by the discovery protocol.
//!
//! ## Wire Protocol
//!
//! Messages are sent with a 4-byte length prefix (big-endian) followed by JSON data:
//! ```text
//! [4 bytes: message length] [N bytes: JSON message data]
//! ```

use log::{debug, error};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::error::{DiscoveryError, Result};
use super::messages::Message;

/// Maximum allowed frame size (1MB). Discovery replies are small.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// TCP connection wrapper with message framing support.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    /// Create a new Connection from an existing TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Read one message from the connection.
    ///
    /// # Returns
    /// - `Ok(Some(Message))`: A complete frame was read and decoded
    /// - `Ok(None)`: The peer closed the connection before sending a frame
    /// - `Err(MalformedReply)`: The frame was oversized or not a valid message
    /// - `Err(Transport)`: I/O failed mid-frame
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        let mut length_buf = [0u8; 4];

        if let Err(e) = self.stream.read_exact(&mut length_buf).await {
            debug!("Connection closed before frame header: {}", e);
            return Ok(None);
        }

        let length = u32::from_be_bytes(length_buf) as usize;
        if length > MAX_MESSAGE_SIZE {
            error!(
                "❌ Message too large: {} bytes (max: {} bytes)",
                length, MAX_MESSAGE_SIZE
            );
            return Err(DiscoveryError::MalformedReply(format!(
                "frame of {} bytes exceeds {} byte limit",
                length, MAX_MESSAGE_SIZE
            )));
        }

        let mut data = vec![0u8; length];
        self.stream.read_exact(&mut data).await?;

        Message::from_bytes(&data).map(Some).map_err(|e| {
            error!("❌ Failed to deserialize message: {}", e);
            DiscoveryError::MalformedReply(e.to_string())
        })
    }

    /// Write one framed message and flush it.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let data = message
            .to_bytes()
            .map_err(|e| DiscoveryError::InvalidRequest(e.to_string()))?;
        let length = data.len() as u32;

        self.stream.write_all(&length.to_be_bytes()).await?;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;

        Ok(())
    }

    /// Shut down the write half and drop the stream.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Ignoring shutdown error: {}", e);
        }
    }
}
