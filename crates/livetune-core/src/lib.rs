//! # LiveTune Core Library
//!
//! Core functionality for live tuning of T4e/T6 engine ECUs over CAN.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - CAN memory-access protocol client (reads, verified writes)
//! - Bulk region transfers with byte-exact verification
//! - Calibration map engine with bilinear interpolation and live edits
//! - Firmware symbol table parsing (`.sym` files)
//! - Live sampling of speed, load and gauges
//!
//! ## Supported ECUs
//!
//! - Lotus T4e (MPC563)
//! - Lotus T6 (MPC5534)
//!
//! ## Example
//!
//! ```rust,ignore
//! use livetune_core::{protocol::{CanConfig, EcuClient}, symbols::SymbolTable};
//!
//! // Resolve firmware symbols
//! let symbols = SymbolTable::from_file("t6.sym")?;
//!
//! // Connect to the ECU
//! let mut client = EcuClient::new(CanConfig::default());
//! client.open()?;
//!
//! // Read the firmware identification bytes
//! let id = client.read_memory(symbols.address("CAL_base")? + 0x3C8E, 5)?;
//! println!("Firmware: {id:02x?}");
//! ```

pub mod codec;
pub mod ecu;
pub mod map;
pub mod protocol;
pub mod sampler;
pub mod symbols;
pub mod transfer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::ValueCodec;
    pub use crate::ecu::{zone_by_name, MemoryZone, ZONES};
    pub use crate::map::{
        EditAlgorithm, Interpolation, LinearMapLayout, MapError, MapLayout, MapSpec, MapState,
        MapTable, Selection,
    };
    pub use crate::protocol::{
        BusState, CanConfig, CanTransport, EcuClient, ProtocolError, SimEcu, SimTransport,
    };
    pub use crate::sampler::{GaugeSpec, LiveSampler, SamplerState};
    pub use crate::symbols::{SymbolError, SymbolTable};
    pub use crate::transfer::{NullObserver, TransferError, TransferObserver, TransferOptions};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
