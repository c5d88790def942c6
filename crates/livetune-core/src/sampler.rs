//! Live sampler
//!
//! Periodic readout of running-engine values. Engine speed and load are
//! sampled once per tick and cached in [`SamplerState`] so the map engine
//! and every gauge share the same coordinates for that tick; each gauge is
//! a declarative [`GaugeSpec`] read through its [`ValueCodec`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::ValueCodec;
use crate::protocol::{EcuClient, ProtocolError};
use crate::symbols::{SymbolError, SymbolTable};

/// One live gauge: where it lives, how to decode it, its display range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeSpec {
    /// Display name
    pub name: String,
    /// Display unit suffix
    pub unit: String,
    /// Address of the live value
    pub address: u32,
    /// Storage codec
    pub codec: ValueCodec,
    /// Lower end of the expected display range
    pub low: f64,
    /// Upper end of the expected display range
    pub high: f64,
}

/// Values captured by the most recent tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerState {
    /// Engine speed in rpm
    pub speed: u16,
    /// Engine load in mg/stroke
    pub load: u32,
    /// Decoded gauge values, index-aligned with the sampler's gauge list
    pub gauges: Vec<f64>,
}

/// Reads speed, load and every gauge once per tick
#[derive(Debug, Clone)]
pub struct LiveSampler {
    speed_addr: u32,
    load_addr: u32,
    gauges: Vec<GaugeSpec>,
    state: SamplerState,
}

impl LiveSampler {
    /// Build a sampler from explicit addresses and gauges
    pub fn new(speed_addr: u32, load_addr: u32, gauges: Vec<GaugeSpec>) -> Self {
        let state = SamplerState {
            gauges: vec![0.0; gauges.len()],
            ..Default::default()
        };
        Self {
            speed_addr,
            load_addr,
            gauges,
            state,
        }
    }

    /// The reference T4e gauge set, resolved against a firmware symbol table
    ///
    /// Covers the sensors and fuel/ignition corrections a live tuning
    /// session watches. Two entries read fixed RAM addresses with no symbol
    /// (the injection TPU parameter and the lambda ADC value).
    pub fn t4e(symbols: &SymbolTable) -> Result<Self, SymbolError> {
        let gauges = vec![
            GaugeSpec {
                name: "Coolant".to_string(),
                unit: "\u{b0}C".to_string(),
                address: symbols.address("temp_coolant")?,
                codec: ValueCodec::new(1, false, 0.625, -40.0),
                low: 20.0,
                high: 110.0,
            },
            GaugeSpec {
                name: "Engine air".to_string(),
                unit: "\u{b0}C".to_string(),
                address: symbols.address("temp_engine_air")?,
                codec: ValueCodec::new(1, false, 0.625, -40.0),
                low: 20.0,
                high: 70.0,
            },
            GaugeSpec {
                name: "MAF Accumulated".to_string(),
                unit: "g".to_string(),
                address: symbols.address("maf_accumulated_1")?,
                codec: ValueCodec::new(4, false, 0.001, 0.0),
                low: 0.0,
                high: 1000.0,
            },
            GaugeSpec {
                name: "TPS".to_string(),
                unit: "%".to_string(),
                address: symbols.address("sensor_adc_tps1")?,
                codec: ValueCodec::new(2, false, 100.0 / 1023.0, 0.0),
                low: 0.0,
                high: 100.0,
            },
            GaugeSpec {
                name: "Tip In".to_string(),
                unit: "us".to_string(),
                address: symbols.address("injtip_tip_in")?,
                codec: ValueCodec::raw(4),
                low: 0.0,
                high: 900.0,
            },
            GaugeSpec {
                name: "Tip Out".to_string(),
                unit: "us".to_string(),
                address: symbols.address("injtip_tip_out")?,
                codec: ValueCodec::raw(4),
                low: 0.0,
                high: 900.0,
            },
            GaugeSpec {
                name: "Injection Time".to_string(),
                unit: "us".to_string(),
                // TPU parameter, read directly.
                address: 0x0030_4512,
                codec: ValueCodec::raw(2),
                low: 0.0,
                high: 14285.0,
            },
            GaugeSpec {
                name: "Learn Dead Time".to_string(),
                unit: "us".to_string(),
                address: symbols.address("LEA_ltft_idle_adj")?,
                codec: ValueCodec::new(2, true, 1.0, 0.0),
                low: -100.0,
                high: 100.0,
            },
            GaugeSpec {
                name: "STFT".to_string(),
                unit: "%".to_string(),
                address: symbols.address("inj_time_adj_by_stft")?,
                codec: ValueCodec::new(2, true, 0.05, 0.0),
                low: -10.0,
                high: 10.0,
            },
            GaugeSpec {
                name: "LTFT".to_string(),
                unit: "%".to_string(),
                address: symbols.address("inj_time_adj_by_ltft")?,
                codec: ValueCodec::new(2, true, 0.05, 0.0),
                low: -10.0,
                high: 10.0,
            },
            GaugeSpec {
                name: "Target AFR".to_string(),
                unit: "AFR".to_string(),
                address: symbols.address("afr_target")?,
                codec: ValueCodec::new(2, false, 0.01, 0.0),
                low: 10.0,
                high: 20.0,
            },
            GaugeSpec {
                name: "Measured AFR".to_string(),
                unit: "AFR".to_string(),
                // Lambda ADC value, read directly.
                address: 0x0030_4E86,
                codec: ValueCodec::new(2, false, 10.0 / 1023.0, 10.0),
                low: 10.0,
                high: 20.0,
            },
            GaugeSpec {
                name: "Adv. Ign".to_string(),
                unit: "\u{b0}".to_string(),
                address: symbols.address("ign_adv_final")?,
                codec: ValueCodec::new(2, true, 0.25, 0.0),
                low: -10.0,
                high: 50.0,
            },
        ];

        let mut gauges = gauges;
        let octane_base = symbols.address("LEA_knock_retard2")?;
        for i in 0..4u32 {
            gauges.push(GaugeSpec {
                name: format!("Octane Scaler #{}", i + 1),
                unit: "%".to_string(),
                address: octane_base + i * 2,
                codec: ValueCodec::new(2, false, 1.0 / 655.36, 0.0),
                low: 0.0,
                high: 100.0,
            });
        }

        Ok(Self::new(
            symbols.address("engine_speed_2")?,
            symbols.address("load_1")?,
            gauges,
        ))
    }

    /// The gauge list, index-aligned with [`SamplerState::gauges`]
    pub fn gauges(&self) -> &[GaugeSpec] {
        &self.gauges
    }

    /// The values captured by the most recent tick
    pub fn state(&self) -> &SamplerState {
        &self.state
    }

    /// Read speed, load and every gauge once
    ///
    /// Each address is read exactly once per call. On error the previous
    /// state is kept intact.
    pub fn sample(&mut self, client: &mut EcuClient) -> Result<&SamplerState, ProtocolError> {
        let speed_raw = client.read_memory(self.speed_addr, 2)?;
        let load_raw = client.read_memory(self.load_addr, 4)?;

        let mut gauges = Vec::with_capacity(self.gauges.len());
        for gauge in &self.gauges {
            let raw = client.read_memory(gauge.address, gauge.codec.width)?;
            let value = gauge
                .codec
                .decode(&raw)
                .ok_or(ProtocolError::UnsupportedSize(gauge.codec.width))?;
            gauges.push(value);
        }

        self.state = SamplerState {
            speed: u16::from_be_bytes([speed_raw[0], speed_raw[1]]),
            load: u32::from_be_bytes([load_raw[0], load_raw[1], load_raw[2], load_raw[3]]),
            gauges,
        };
        debug!(speed = self.state.speed, load = self.state.load, "sampled");
        Ok(&self.state)
    }
}
