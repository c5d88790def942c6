//! Request framing
//!
//! Maps a memory operation and payload size onto the arbitration id and
//! payload layout the ECU expects. Addresses and data are big-endian on the
//! wire.

use byteorder::{BigEndian, ByteOrder};
use std::fmt;

use super::transport::CanMessage;
use super::{ProtocolError, FRAME_DATA_MAX, MAX_BUFFERED};

/// Read word (4 bytes) request id
pub const READ_WORD: u16 = 0x50;
/// Read half-word (2 bytes) request id
pub const READ_HALF: u16 = 0x51;
/// Read byte request id
pub const READ_BYTE: u16 = 0x52;
/// Buffered read (5..=255 bytes) request id
pub const READ_BUFFER: u16 = 0x53;
/// Write word request id
pub const WRITE_WORD: u16 = 0x54;
/// Write half-word request id
pub const WRITE_HALF: u16 = 0x55;
/// Write byte request id
pub const WRITE_BYTE: u16 = 0x56;
/// Buffered write header/payload id
pub const WRITE_BUFFER: u16 = 0x57;

/// The memory operation being performed, carried in protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOp {
    ReadWord,
    ReadHalf,
    ReadByte,
    ReadBuffer,
    WriteWord,
    WriteHalf,
    WriteByte,
    WriteBuffer,
}

impl fmt::Display for MemoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryOp::ReadWord => "read word",
            MemoryOp::ReadHalf => "read half",
            MemoryOp::ReadByte => "read byte",
            MemoryOp::ReadBuffer => "read buffer",
            MemoryOp::WriteWord => "write word",
            MemoryOp::WriteHalf => "write half",
            MemoryOp::WriteByte => "write byte",
            MemoryOp::WriteBuffer => "write buffer",
        };
        f.write_str(s)
    }
}

/// Payload-size class of a memory access
///
/// 1, 2 and 4 bytes are single-shot exchanges; 5..=255 bytes use the
/// buffered class, split into frames of at most 8 data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Byte,
    Half,
    Word,
    Buffered(u8),
}

impl SizeClass {
    /// Classify a transfer size, rejecting anything the protocol cannot carry
    pub fn from_size(size: usize) -> Result<Self, ProtocolError> {
        match size {
            1 => Ok(SizeClass::Byte),
            2 => Ok(SizeClass::Half),
            4 => Ok(SizeClass::Word),
            5..=MAX_BUFFERED => Ok(SizeClass::Buffered(size as u8)),
            _ => Err(ProtocolError::UnsupportedSize(size)),
        }
    }

    /// Number of payload bytes this class moves
    pub fn len(&self) -> usize {
        match self {
            SizeClass::Byte => 1,
            SizeClass::Half => 2,
            SizeClass::Word => 4,
            SizeClass::Buffered(n) => *n as usize,
        }
    }

    /// Arbitration id of the read request for this class
    pub fn read_id(&self) -> u16 {
        match self {
            SizeClass::Byte => READ_BYTE,
            SizeClass::Half => READ_HALF,
            SizeClass::Word => READ_WORD,
            SizeClass::Buffered(_) => READ_BUFFER,
        }
    }

    /// Arbitration id of the write request for this class
    pub fn write_id(&self) -> u16 {
        match self {
            SizeClass::Byte => WRITE_BYTE,
            SizeClass::Half => WRITE_HALF,
            SizeClass::Word => WRITE_WORD,
            SizeClass::Buffered(_) => WRITE_BUFFER,
        }
    }

    /// Operation tag for read errors
    pub fn read_op(&self) -> MemoryOp {
        match self {
            SizeClass::Byte => MemoryOp::ReadByte,
            SizeClass::Half => MemoryOp::ReadHalf,
            SizeClass::Word => MemoryOp::ReadWord,
            SizeClass::Buffered(_) => MemoryOp::ReadBuffer,
        }
    }

    /// Operation tag for write errors
    pub fn write_op(&self) -> MemoryOp {
        match self {
            SizeClass::Byte => MemoryOp::WriteByte,
            SizeClass::Half => MemoryOp::WriteHalf,
            SizeClass::Word => MemoryOp::WriteWord,
            SizeClass::Buffered(_) => MemoryOp::WriteBuffer,
        }
    }
}

fn address_bytes(address: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, address);
    buf
}

/// Build the single request frame of a read
pub fn read_request(address: u32, class: SizeClass) -> CanMessage {
    let mut data = address_bytes(address).to_vec();
    if let SizeClass::Buffered(n) = class {
        data.push(n);
    }
    CanMessage::new(class.read_id(), data)
}

/// Build the request frame sequence of a write
///
/// Single-shot classes produce one frame carrying address + data. The
/// buffered class produces a header frame (address + size) followed by
/// payload frames of at most 8 bytes each, all on the same id.
pub fn write_request(address: u32, data: &[u8]) -> Result<Vec<CanMessage>, ProtocolError> {
    let class = SizeClass::from_size(data.len())?;
    let addr = address_bytes(address);

    match class {
        SizeClass::Byte | SizeClass::Half | SizeClass::Word => {
            let mut payload = addr.to_vec();
            payload.extend_from_slice(data);
            Ok(vec![CanMessage::new(class.write_id(), payload)])
        }
        SizeClass::Buffered(n) => {
            let mut header = addr.to_vec();
            header.push(n);
            let mut frames = vec![CanMessage::new(WRITE_BUFFER, header)];
            for chunk in data.chunks(FRAME_DATA_MAX) {
                frames.push(CanMessage::new(WRITE_BUFFER, chunk.to_vec()));
            }
            Ok(frames)
        }
    }
}

/// Declared length of the next response frame of a buffered read
pub fn buffered_chunk_len(remaining: usize) -> usize {
    remaining.min(FRAME_DATA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        assert_eq!(SizeClass::from_size(1).unwrap(), SizeClass::Byte);
        assert_eq!(SizeClass::from_size(2).unwrap(), SizeClass::Half);
        assert_eq!(SizeClass::from_size(4).unwrap(), SizeClass::Word);
        assert_eq!(SizeClass::from_size(5).unwrap(), SizeClass::Buffered(5));
        assert_eq!(SizeClass::from_size(255).unwrap(), SizeClass::Buffered(255));

        assert!(SizeClass::from_size(0).is_err());
        assert!(SizeClass::from_size(3).is_err());
        assert!(SizeClass::from_size(256).is_err());
    }

    #[test]
    fn test_read_request_framing() {
        let msg = read_request(0x40001234, SizeClass::Word);
        assert_eq!(msg.id, READ_WORD);
        assert_eq!(msg.data, vec![0x40, 0x00, 0x12, 0x34]);

        let msg = read_request(0x00020000, SizeClass::Buffered(130));
        assert_eq!(msg.id, READ_BUFFER);
        assert_eq!(msg.data, vec![0x00, 0x02, 0x00, 0x00, 130]);
    }

    #[test]
    fn test_write_request_single_shot() {
        let frames = write_request(0x10, &[0xAB, 0xCD]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, WRITE_HALF);
        assert_eq!(frames[0].data, vec![0x00, 0x00, 0x00, 0x10, 0xAB, 0xCD]);
    }

    #[test]
    fn test_write_request_buffered_split() {
        let data: Vec<u8> = (0..20).collect();
        let frames = write_request(0x200, &data).unwrap();
        // header + ceil(20/8) payload frames
        assert_eq!(frames.len(), 1 + 3);
        assert_eq!(frames[0].data, vec![0x00, 0x00, 0x02, 0x00, 20]);
        assert_eq!(frames[1].data.len(), 8);
        assert_eq!(frames[2].data.len(), 8);
        assert_eq!(frames[3].data.len(), 4);
        let rebuilt: Vec<u8> = frames[1..].iter().flat_map(|f| f.data.clone()).collect();
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_buffered_chunk_len() {
        assert_eq!(buffered_chunk_len(130), 8);
        assert_eq!(buffered_chunk_len(8), 8);
        assert_eq!(buffered_chunk_len(2), 2);
    }
}
