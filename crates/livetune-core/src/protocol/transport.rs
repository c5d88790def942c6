//! CAN transport abstraction
//!
//! The protocol client talks to the bus through [`CanTransport`], selected at
//! construction time: real SocketCAN hardware or the simulated ECU from
//! [`super::sim`].

use std::io;
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::time::Instant;

use super::RESPONSE_ID;

/// One CAN frame: 11-bit arbitration id plus up to 8 data bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanMessage {
    /// Arbitration id (standard, non-extended)
    pub id: u16,
    /// Frame payload
    pub data: Vec<u8>,
}

impl CanMessage {
    /// Create a new message
    pub fn new(id: u16, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Declared data length of the frame
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Blocking, exclusively-owned access to a CAN bus
///
/// Implementations must only surface frames carrying [`RESPONSE_ID`]: some
/// transports do not reliably suppress error frames at the hardware filter
/// level, so filtering is enforced in software as well.
pub trait CanTransport {
    /// Send one frame
    fn send(&mut self, msg: &CanMessage) -> io::Result<()>;

    /// Receive the next response frame, or `None` if the timeout elapses
    fn recv(&mut self, timeout: Duration) -> io::Result<Option<CanMessage>>;

    /// Release the bus handle
    fn close(&mut self);
}

/// Real CAN bus via Linux SocketCAN
#[cfg(target_os = "linux")]
pub struct SocketCanTransport {
    socket: socketcan::CanSocket,
    channel: String,
}

#[cfg(target_os = "linux")]
impl SocketCanTransport {
    /// Open the given channel (e.g. `can0`) with a kernel filter on the
    /// ECU's response id
    pub fn open(channel: &str) -> io::Result<Self> {
        use socketcan::{CanFilter, Socket, SocketOptions};

        let socket = socketcan::CanSocket::open(channel)?;
        socket.set_filters(&[CanFilter::new(RESPONSE_ID as u32, super::RESPONSE_MASK)])?;

        Ok(Self {
            socket,
            channel: channel.to_string(),
        })
    }

    /// Channel name this transport was opened on
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[cfg(target_os = "linux")]
impl CanTransport for SocketCanTransport {
    fn send(&mut self, msg: &CanMessage) -> io::Result<()> {
        use socketcan::{CanFrame, EmbeddedFrame, Socket, StandardId};

        let id = StandardId::new(msg.id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "arbitration id out of range")
        })?;
        let frame = CanFrame::new(id, &msg.data).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "frame payload exceeds 8 bytes")
        })?;
        self.socket.write_frame(&frame)
    }

    fn recv(&mut self, timeout: Duration) -> io::Result<Option<CanMessage>> {
        use socketcan::{CanFrame, EmbeddedFrame, Frame, Socket};

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.socket.read_frame_timeout(remaining) {
                Ok(CanFrame::Data(frame)) => {
                    let id = (frame.raw_id() & super::RESPONSE_MASK) as u16;
                    // The kernel filter does not catch error frames on every
                    // driver, and may be bypassed entirely; filter again here.
                    if id == RESPONSE_ID {
                        return Ok(Some(CanMessage::new(id, frame.data().to_vec())));
                    }
                }
                Ok(_) => {} // remote and error frames are never responses
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) {
        // Dropping the socket releases it; nothing to flush.
        tracing::debug!(channel = %self.channel, "SocketCAN transport closed");
    }
}
