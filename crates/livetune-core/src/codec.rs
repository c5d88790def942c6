//! Raw <-> display value conversion
//!
//! Every tunable cell, axis entry and gauge in the reference ECUs is a
//! big-endian integer with a linear display mapping. [`ValueCodec`] captures
//! the storage width, signedness and `display = raw * scale + offset` pair
//! once, so map layouts and gauge specs stay declarative.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

/// Linear codec for one stored quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueCodec {
    /// Storage width in bytes (1..=4)
    pub width: usize,
    /// Whether the raw integer is two's-complement signed
    pub signed: bool,
    /// Multiplier applied to the raw value
    pub scale: f64,
    /// Offset added after scaling
    pub offset: f64,
}

impl ValueCodec {
    /// Create a codec
    pub const fn new(width: usize, signed: bool, scale: f64, offset: f64) -> Self {
        Self {
            width,
            signed,
            scale,
            offset,
        }
    }

    /// Unsigned byte-wide codec, the layout of all observed map cells
    pub const fn u8_scaled(scale: f64, offset: f64) -> Self {
        Self::new(1, false, scale, offset)
    }

    /// Raw identity codec of the given width
    pub const fn raw(width: usize) -> Self {
        Self::new(width, false, 1.0, 0.0)
    }

    /// Decode one value from the first `width` bytes
    pub fn decode(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.width || !(1..=4).contains(&self.width) {
            return None;
        }
        let raw = if self.signed {
            BigEndian::read_int(bytes, self.width) as f64
        } else {
            BigEndian::read_uint(bytes, self.width) as f64
        };
        Some(raw * self.scale + self.offset)
    }

    /// Whether the storage width is one the wire can carry
    pub fn width_is_valid(&self) -> bool {
        (1..=4).contains(&self.width)
    }

    /// Decode a packed run of values
    pub fn decode_all(&self, bytes: &[u8]) -> Vec<f64> {
        if !self.width_is_valid() {
            return Vec::new();
        }
        bytes
            .chunks_exact(self.width)
            .filter_map(|chunk| self.decode(chunk))
            .collect()
    }

    /// Encode a display value back to raw storage bytes
    ///
    /// The raw integer is rounded to nearest and clamped to the range the
    /// storage width can hold. A codec with an unsupported width encodes to
    /// an empty sequence, mirroring [`Self::decode`] returning `None`.
    pub fn encode(&self, value: f64) -> Vec<u8> {
        if !self.width_is_valid() {
            return Vec::new();
        }
        let bits = (self.width * 8) as u32;
        let raw = if self.scale != 0.0 {
            ((value - self.offset) / self.scale).round()
        } else {
            0.0
        };

        let mut buf = vec![0u8; self.width];
        if self.signed {
            let min = -(2i64.pow(bits - 1)) as f64;
            let max = (2i64.pow(bits - 1) - 1) as f64;
            BigEndian::write_int(&mut buf, raw.clamp(min, max) as i64, self.width);
        } else {
            let max = (2u64.pow(bits) - 1) as f64;
            BigEndian::write_uint(&mut buf, raw.clamp(0.0, max) as u64, self.width);
        }
        buf
    }
}
