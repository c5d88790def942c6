//! Protocol errors

use thiserror::Error;

use super::frame::MemoryOp;

/// Errors that can occur while talking to the ECU over CAN
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("CAN bus is not open")]
    NotOpen,

    #[error("unsupported CAN interface '{0}'")]
    UnsupportedInterface(String),

    #[error("{op} at {address:#010x}: no response within {timeout_ms} ms")]
    Timeout {
        op: MemoryOp,
        address: u32,
        timeout_ms: u64,
    },

    #[error("{op} at {address:#010x}: expected {expected} data bytes, got {actual}")]
    LengthMismatch {
        op: MemoryOp,
        address: u32,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported transfer size {0} (must be 1, 2, 4 or 5..=255)")]
    UnsupportedSize(usize),

    #[error("write verify failed at {address:#010x}")]
    WriteVerify { address: u32 },

    #[error("unsupported firmware at {address:#010x}: expected {expected:02x?}, got {actual:02x?}")]
    UnsupportedFirmware {
        address: u32,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("CAN I/O error: {0}")]
    Io(#[from] std::io::Error),
}
