//! Calibration map layouts
//!
//! A [`MapLayout`] knows where a table's axes and cells live in ECU memory
//! and how to convert between raw storage and display units. The engine in
//! [`super::table`] only ever goes through this trait, so one implementation
//! per distinct table layout replaces per-map ad hoc closures.

use serde::{Deserialize, Serialize};

use crate::codec::ValueCodec;
use crate::protocol::{EcuClient, MAX_BUFFERED};
use crate::symbols::{SymbolError, SymbolTable};

use super::MapError;

/// Device access for one calibration map layout
pub trait MapLayout {
    /// Table name, for logs and errors
    fn name(&self) -> &str;

    /// Number of columns
    fn xsize(&self) -> usize;

    /// Number of rows
    fn ysize(&self) -> usize;

    /// Read the X axis from the device, decoded to display units
    fn read_axis_x(&self, client: &mut EcuClient) -> Result<Vec<f64>, MapError>;

    /// Read the Y axis from the device, decoded to display units
    fn read_axis_y(&self, client: &mut EcuClient) -> Result<Vec<f64>, MapError>;

    /// Read the full grid from the device, row-major, decoded
    fn read_cells(&self, client: &mut EcuClient) -> Result<Vec<Vec<f64>>, MapError>;

    /// Encode and write one cell back to the device
    fn write_cell(
        &self,
        client: &mut EcuClient,
        row: usize,
        col: usize,
        value: f64,
    ) -> Result<(), MapError>;
}

/// Declarative description of a linear table layout
///
/// Cell address is `base + row * row_stride + col * cell.width`; axes are
/// packed runs at their own addresses. Cell width is table-defined (1 byte
/// in every observed map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    /// Table name
    pub name: String,
    /// First cell address
    pub base: u32,
    /// Bytes from one row to the next
    pub row_stride: u32,
    /// Columns
    pub xsize: usize,
    /// Rows
    pub ysize: usize,
    /// X axis array address
    pub x_axis_addr: u32,
    /// Y axis array address
    pub y_axis_addr: u32,
    /// Cell storage codec
    pub cell: ValueCodec,
    /// X axis storage codec
    pub x_axis: ValueCodec,
    /// Y axis storage codec
    pub y_axis: ValueCodec,
}

impl MapSpec {
    /// Parse a spec from its JSON form, rejecting unusable codec widths
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let spec: MapSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check that every codec carries a width the protocol can move
    pub fn validate(&self) -> Result<(), MapError> {
        for codec in [&self.cell, &self.x_axis, &self.y_axis] {
            if !codec.width_is_valid() {
                return Err(MapError::InvalidCodec {
                    name: self.name.clone(),
                    width: codec.width,
                });
            }
        }
        Ok(())
    }

    /// The three tunable maps of the reference T4e calibration, resolved
    /// against a firmware symbol table
    ///
    /// Efficiency and Ignition Low Cam are 32x32, Ignition High Cam 8x8.
    /// All share the rpm/load axis pair; ignition cells store quarter
    /// degrees offset by -10.
    pub fn t4e_maps(symbols: &SymbolTable) -> Result<[MapSpec; 3], SymbolError> {
        let rpm_axis = ValueCodec::u8_scaled(31.25, 500.0);
        let load_axis = ValueCodec::u8_scaled(4.0, 0.0);
        let ignition = ValueCodec::u8_scaled(0.25, -10.0);

        Ok([
            MapSpec {
                name: "Efficiency".to_string(),
                base: symbols.address("CAL_inj_efficiency")?,
                row_stride: 32,
                xsize: 32,
                ysize: 32,
                x_axis_addr: symbols.address("CAL_inj_efficiency_X_engine_speed")?,
                y_axis_addr: symbols.address("CAL_inj_efficiency_Y_engine_load")?,
                cell: ValueCodec::u8_scaled(0.5, 0.0),
                x_axis: rpm_axis,
                y_axis: load_axis,
            },
            MapSpec {
                name: "Ignition Low Cam".to_string(),
                base: symbols.address("CAL_ign_advance_low_cam_base")?,
                row_stride: 32,
                xsize: 32,
                ysize: 32,
                x_axis_addr: symbols.address("CAL_ign_advance_low_cam_base_X_engine_speed")?,
                y_axis_addr: symbols.address("CAL_ign_advance_low_cam_base_Y_engine_load")?,
                cell: ignition,
                x_axis: rpm_axis,
                y_axis: load_axis,
            },
            MapSpec {
                name: "Ignition High Cam".to_string(),
                base: symbols.address("CAL_ign_advance_high_cam_base")?,
                row_stride: 8,
                xsize: 8,
                ysize: 8,
                x_axis_addr: symbols.address("CAL_ign_advance_high_cam_base_X_engine_speed")?,
                y_axis_addr: symbols.address("CAL_ign_advance_high_cam_base_Y_engine_load")?,
                cell: ignition,
                x_axis: rpm_axis,
                y_axis: load_axis,
            },
        ])
    }
}

/// [`MapLayout`] for any [`MapSpec`]
#[derive(Debug, Clone)]
pub struct LinearMapLayout {
    spec: MapSpec,
}

impl LinearMapLayout {
    /// Build a layout from its spec
    pub fn new(spec: MapSpec) -> Self {
        Self { spec }
    }

    /// The underlying spec
    pub fn spec(&self) -> &MapSpec {
        &self.spec
    }

    /// Read a packed run of `count` values, chunking to the protocol limit
    fn read_run(
        &self,
        client: &mut EcuClient,
        address: u32,
        codec: &ValueCodec,
        count: usize,
    ) -> Result<Vec<f64>, MapError> {
        let total = count * codec.width;
        let mut raw = Vec::with_capacity(total);
        while raw.len() < total {
            let mut len = (total - raw.len()).min(MAX_BUFFERED - MAX_BUFFERED % codec.width);
            // No 3-byte size class on the wire.
            if len == 3 {
                len = 2;
            }
            raw.extend(client.read_memory(address + raw.len() as u32, len)?);
        }
        let values = codec.decode_all(&raw);
        if values.len() != count {
            return Err(MapError::ShapeMismatch {
                name: self.spec.name.clone(),
                expected: count,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

impl MapLayout for LinearMapLayout {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn xsize(&self) -> usize {
        self.spec.xsize
    }

    fn ysize(&self) -> usize {
        self.spec.ysize
    }

    fn read_axis_x(&self, client: &mut EcuClient) -> Result<Vec<f64>, MapError> {
        self.read_run(client, self.spec.x_axis_addr, &self.spec.x_axis, self.spec.xsize)
    }

    fn read_axis_y(&self, client: &mut EcuClient) -> Result<Vec<f64>, MapError> {
        self.read_run(client, self.spec.y_axis_addr, &self.spec.y_axis, self.spec.ysize)
    }

    fn read_cells(&self, client: &mut EcuClient) -> Result<Vec<Vec<f64>>, MapError> {
        let mut rows = Vec::with_capacity(self.spec.ysize);
        for row in 0..self.spec.ysize {
            let address = self.spec.base + row as u32 * self.spec.row_stride;
            rows.push(self.read_run(client, address, &self.spec.cell, self.spec.xsize)?);
        }
        Ok(rows)
    }

    fn write_cell(
        &self,
        client: &mut EcuClient,
        row: usize,
        col: usize,
        value: f64,
    ) -> Result<(), MapError> {
        let address = self.spec.base
            + row as u32 * self.spec.row_stride
            + (col * self.spec.cell.width) as u32;
        let raw = self.spec.cell.encode(value);
        client.write_memory(address, &raw, false)?;
        Ok(())
    }
}
