//! ECU memory layout
//!
//! The fixed memory zones of the T6 (MPC5534: 1 MB flash, 64 KB RAM) and the
//! firmware identification check performed before any tuning session.

use serde::Serialize;

use crate::protocol::{EcuClient, ProtocolError};

/// A named contiguous memory region with a suggested dump filename
///
/// Zones are independent and non-overlapping by convention; a binary dump of
/// a zone must be exactly `size` bytes for round-trip fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryZone {
    /// Human-readable zone name
    pub name: &'static str,
    /// First address of the zone
    pub base: u32,
    /// Zone size in bytes
    pub size: u32,
    /// Suggested filename for dumps of this zone
    pub default_file: &'static str,
}

/// The seven T6 memory zones
pub const ZONES: [MemoryZone; 7] = [
    MemoryZone {
        name: "T6: L0-L1 (Bootloader)",
        base: 0x0000_0000,
        size: 0x01_0000,
        default_file: "bootldr.bin",
    },
    MemoryZone {
        name: "T6: L2 (Learned)",
        base: 0x0001_0000,
        size: 0x00_C000,
        default_file: "decram.bin",
    },
    MemoryZone {
        name: "T6: L3 (Coding)",
        base: 0x0001_C000,
        size: 0x00_4000,
        default_file: "coding.bin",
    },
    MemoryZone {
        name: "T6: L4 (Calibration)",
        base: 0x0002_0000,
        size: 0x01_0000,
        default_file: "calrom.bin",
    },
    MemoryZone {
        name: "T6: M0-H3 (Program)",
        base: 0x0004_0000,
        size: 0x0C_0000,
        default_file: "prog.bin",
    },
    MemoryZone {
        name: "T6: RAM (Main RAM)",
        base: 0x4000_0000,
        size: 0x01_0000,
        default_file: "calram.bin",
    },
    MemoryZone {
        name: "T6: L0-H3 (Full ROM)",
        base: 0x0000_0000,
        size: 0x10_0000,
        default_file: "dump.bin",
    },
];

/// Find a zone by its exact name
pub fn zone_by_name(name: &str) -> Option<&'static MemoryZone> {
    ZONES.iter().find(|z| z.name == name)
}

/// Check the firmware identification bytes before a tuning session
///
/// Reads `expected.len()` bytes at `address` and fails with a domain error
/// when they differ, so unsupported firmware is rejected before any bulk
/// operation or live edit begins.
pub fn check_firmware(
    client: &mut EcuClient,
    address: u32,
    expected: &[u8],
) -> Result<(), ProtocolError> {
    let actual = client.read_memory(address, expected.len())?;
    if actual != expected {
        return Err(ProtocolError::UnsupportedFirmware {
            address,
            expected: expected.to_vec(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_table() {
        assert_eq!(ZONES.len(), 7);
        let cal = zone_by_name("T6: L4 (Calibration)").unwrap();
        assert_eq!(cal.base, 0x20000);
        assert_eq!(cal.size, 0x10000);
        assert_eq!(cal.default_file, "calrom.bin");
        assert!(zone_by_name("nope").is_none());
    }

    #[test]
    fn test_full_rom_covers_flash() {
        let full = zone_by_name("T6: L0-H3 (Full ROM)").unwrap();
        assert_eq!(full.size, 0x10_0000); // 1 MB flash
    }
}
