//! CAN Memory-Access Protocol
//!
//! Implements the point-to-point diagnostic protocol used by T4e/T6 ECUs:
//! fixed-size request frames keyed by operation and payload size class,
//! responses on a single arbitration id, strict length checks.
//!
//! The protocol is half-duplex request/response with no transaction id, so
//! only one exchange may be in flight at a time.

mod client;
mod error;
pub mod frame;
pub mod sim;
mod transport;

pub use client::{BusState, CanConfig, EcuClient};
pub use error::ProtocolError;
pub use frame::{MemoryOp, SizeClass};
pub use sim::{SimEcu, SimTransport};
pub use transport::{CanMessage, CanTransport};
#[cfg(target_os = "linux")]
pub use transport::SocketCanTransport;

/// Arbitration id the ECU answers on; the host listens only for this id
pub const RESPONSE_ID: u16 = 0x7A0;

/// Mask used with [`RESPONSE_ID`] for 11-bit filtering
pub const RESPONSE_MASK: u32 = 0x7FF;

/// Default timeout for a single response in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Largest transfer the buffered size class can carry
pub const MAX_BUFFERED: usize = 255;

/// Maximum data bytes in one CAN frame
pub const FRAME_DATA_MAX: usize = 8;
