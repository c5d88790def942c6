//! Protocol client
//!
//! [`EcuClient`] owns the bus handle for its whole open/close lifetime and
//! exchanges one blocking memory read or write at a time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::frame::{self, SizeClass};
use super::transport::{CanMessage, CanTransport};
use super::{ProtocolError, DEFAULT_TIMEOUT_MS};

/// Bus connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusState {
    /// No bus handle held
    Closed,
    /// Bus handle open and exclusively owned
    Open,
}

/// CAN connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanConfig {
    /// Transport backend name (`socketcan` is the only built-in)
    pub interface: String,
    /// Channel name, e.g. `can0`
    pub channel: String,
    /// Bus bitrate in bit/s. On SocketCAN the bitrate is fixed at the link
    /// level (`ip link`); it is recorded here for the operator's log only.
    pub bitrate: u32,
    /// Per-request response timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            interface: "socketcan".to_string(),
            channel: "can0".to_string(),
            bitrate: 1_000_000,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Client for the ECU memory-access protocol
///
/// All operations block the calling thread until the response arrives or the
/// configured timeout elapses. The protocol is half-duplex; a response is
/// assumed to belong to the immediately preceding request.
pub struct EcuClient {
    transport: Option<Box<dyn CanTransport>>,
    config: CanConfig,
    /// Cumulative bytes/frames sent and received
    tx_bytes: u64,
    rx_bytes: u64,
    tx_frames: u64,
    rx_frames: u64,
}

impl EcuClient {
    /// Create a client with the given configuration, not yet open
    pub fn new(config: CanConfig) -> Self {
        Self {
            transport: None,
            config,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_frames: 0,
            rx_frames: 0,
        }
    }

    /// Open the bus using the configured backend
    ///
    /// Opening while already open closes the existing handle first.
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        self.close();
        info!(
            "Open CAN {} {} @ {} kbit/s",
            self.config.interface,
            self.config.channel,
            self.config.bitrate / 1000
        );
        match self.config.interface.as_str() {
            #[cfg(target_os = "linux")]
            "socketcan" => {
                let transport = super::transport::SocketCanTransport::open(&self.config.channel)?;
                self.transport = Some(Box::new(transport));
                Ok(())
            }
            other => Err(ProtocolError::UnsupportedInterface(other.to_string())),
        }
    }

    /// Open the bus on an externally constructed transport (e.g. [`super::SimTransport`])
    pub fn open_with(&mut self, transport: Box<dyn CanTransport>) {
        self.close();
        info!(
            "Open CAN (custom transport) {} @ {} kbit/s",
            self.config.channel,
            self.config.bitrate / 1000
        );
        self.transport = Some(transport);
    }

    /// Close the bus; a no-op when already closed
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            info!("Close CAN");
            transport.close();
        }
    }

    /// Current connection state
    pub fn state(&self) -> BusState {
        if self.transport.is_some() {
            BusState::Open
        } else {
            BusState::Closed
        }
    }

    /// Whether the bus is open
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Connection configuration
    pub fn config(&self) -> &CanConfig {
        &self.config
    }

    /// Cumulative (tx_bytes, rx_bytes, tx_frames, rx_frames) counters
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.tx_frames, self.rx_frames)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn send(&mut self, msg: &CanMessage) -> Result<(), ProtocolError> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotOpen)?;
        transport.send(msg)?;
        self.tx_bytes += msg.dlc() as u64;
        self.tx_frames += 1;
        Ok(())
    }

    fn recv(&mut self, op: frame::MemoryOp, address: u32) -> Result<CanMessage, ProtocolError> {
        let timeout = self.timeout();
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotOpen)?;
        match transport.recv(timeout)? {
            Some(msg) => {
                self.rx_bytes += msg.dlc() as u64;
                self.rx_frames += 1;
                Ok(msg)
            }
            None => Err(ProtocolError::Timeout {
                op,
                address,
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    /// Read `size` bytes from `address`
    ///
    /// `size` must be 1, 2, 4 or 5..=255. The result is the raw big-endian
    /// byte sequence from the device; scaling is the caller's concern.
    pub fn read_memory(&mut self, address: u32, size: usize) -> Result<Vec<u8>, ProtocolError> {
        let class = SizeClass::from_size(size)?;
        let op = class.read_op();
        debug!(%op, address = format_args!("{address:#010x}"), size, "read");

        self.send(&frame::read_request(address, class))?;

        match class {
            SizeClass::Byte | SizeClass::Half | SizeClass::Word => {
                let msg = self.recv(op, address)?;
                if msg.dlc() != size {
                    return Err(ProtocolError::LengthMismatch {
                        op,
                        address,
                        expected: size,
                        actual: msg.dlc(),
                    });
                }
                Ok(msg.data)
            }
            SizeClass::Buffered(_) => {
                let mut data = Vec::with_capacity(size);
                let mut remaining = size;
                while remaining > 0 {
                    let expected = frame::buffered_chunk_len(remaining);
                    let msg = self.recv(op, address)?;
                    if msg.dlc() != expected {
                        return Err(ProtocolError::LengthMismatch {
                            op,
                            address,
                            expected,
                            actual: msg.dlc(),
                        });
                    }
                    data.extend_from_slice(&msg.data);
                    remaining -= expected;
                }
                Ok(data)
            }
        }
    }

    /// Write `data` to `address`
    ///
    /// Size classes mirror [`Self::read_memory`]. With `verify` set, the
    /// same range is read back immediately and compared byte for byte.
    pub fn write_memory(
        &mut self,
        address: u32,
        data: &[u8],
        verify: bool,
    ) -> Result<(), ProtocolError> {
        let class = SizeClass::from_size(data.len())?;
        debug!(
            op = %class.write_op(),
            address = format_args!("{address:#010x}"),
            size = data.len(),
            "write"
        );

        for msg in frame::write_request(address, data)? {
            self.send(&msg)?;
        }

        if verify && self.read_memory(address, data.len())? != data {
            return Err(ProtocolError::WriteVerify { address });
        }
        Ok(())
    }
}

impl Drop for EcuClient {
    fn drop(&mut self) {
        self.close();
    }
}
