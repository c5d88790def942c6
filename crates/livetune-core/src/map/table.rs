//! Device-backed map table
//!
//! Holds the in-memory mirror of one calibration map and applies edits
//! through its [`MapLayout`]. Cell contents always track ECU memory: the
//! decoded value is updated first so redisplay stays consistent, then the
//! cell is written back immediately; edits are never batched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::protocol::EcuClient;

use super::{MapError, MapLayout};

/// Lifecycle of a map instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapState {
    /// Created, nothing read from the device yet
    Unloaded,
    /// Axes and grid mirrored from the device
    Loaded,
    /// Terminal; no further operation permitted
    Closed,
}

/// Cursor edit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditAlgorithm {
    /// Apply `delta * weight` to each neighbor cell
    Distribute,
    /// Apply the full `delta` to every neighbor cell
    AllCells,
    /// Apply the full `delta` to the single highest-weighted cell only
    StrongestCell,
}

/// Result of locating a live (x, y) sample on the grid
///
/// Weights sum to 1.0; a weight of exactly zero marks a neighbor that must
/// not be touched (it may lie past the grid edge).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    /// Column of the top-left neighbor
    pub cell_x: usize,
    /// Row of the top-left neighbor
    pub cell_y: usize,
    /// Fractional X position inside the cell, 0.0..1.0
    pub x_ratio: f64,
    /// Fractional Y position inside the cell, 0.0..1.0
    pub y_ratio: f64,
    /// Bilinear weights, `weights[row][col]` for the 2x2 neighborhood
    pub weights: [[f64; 2]; 2],
    /// Weighted blend of the neighborhood
    pub value: f64,
}

impl Default for Interpolation {
    fn default() -> Self {
        Self {
            cell_x: 0,
            cell_y: 0,
            x_ratio: 0.0,
            y_ratio: 0.0,
            weights: [[1.0, 0.0], [0.0, 0.0]],
            value: 0.0,
        }
    }
}

/// Half-open cell rectangle `[x0, x1) x [y0, y1)` selected for bulk edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    /// First selected column
    pub x0: usize,
    /// First selected row
    pub y0: usize,
    /// One past the last selected column
    pub x1: usize,
    /// One past the last selected row
    pub y1: usize,
}

impl Selection {
    /// A selection is empty when either span collapses
    pub fn is_empty(&self) -> bool {
        self.x0 == self.x1 || self.y0 == self.y1
    }
}

/// One open calibration map
pub struct MapTable<L: MapLayout> {
    layout: L,
    axis_x: Vec<f64>,
    axis_y: Vec<f64>,
    cells: Vec<Vec<f64>>,
    state: MapState,
    interpolation: Interpolation,
    selection: Selection,
}

impl<L: MapLayout> MapTable<L> {
    /// Create an unloaded table for the given layout
    pub fn new(layout: L) -> Self {
        Self {
            layout,
            axis_x: Vec::new(),
            axis_y: Vec::new(),
            cells: Vec::new(),
            state: MapState::Unloaded,
            interpolation: Interpolation::default(),
            selection: Selection::default(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> MapState {
        self.state
    }

    /// The layout this table reads and writes through
    pub fn layout(&self) -> &L {
        &self.layout
    }

    /// X axis in display units (empty before load)
    pub fn axis_x(&self) -> &[f64] {
        &self.axis_x
    }

    /// Y axis in display units (empty before load)
    pub fn axis_y(&self) -> &[f64] {
        &self.axis_y
    }

    /// Decoded cell value
    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Current selection rectangle
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Read axes and the full grid fresh from the device
    ///
    /// Valid from `Unloaded` (first load) and `Loaded` (reload after an
    /// axis-affecting write or to discard the mirror).
    pub fn load(&mut self, client: &mut EcuClient) -> Result<(), MapError> {
        self.check_not_closed()?;
        let axis_x = self.layout.read_axis_x(client)?;
        let axis_y = self.layout.read_axis_y(client)?;
        let cells = self.layout.read_cells(client)?;

        debug!(
            map = self.layout.name(),
            xsize = axis_x.len(),
            ysize = axis_y.len(),
            "map loaded"
        );
        self.axis_x = axis_x;
        self.axis_y = axis_y;
        self.cells = cells;
        self.state = MapState::Loaded;
        Ok(())
    }

    /// Alias for [`Self::load`] on an already loaded map
    pub fn reload(&mut self, client: &mut EcuClient) -> Result<(), MapError> {
        self.load(client)
    }

    /// Drop the device mirror; the table accepts no further operations
    pub fn close(&mut self) {
        self.axis_x.clear();
        self.axis_y.clear();
        self.cells.clear();
        self.state = MapState::Closed;
    }

    fn check_not_closed(&self) -> Result<(), MapError> {
        if self.state == MapState::Closed {
            Err(MapError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_loaded(&self) -> Result<(), MapError> {
        match self.state {
            MapState::Loaded => Ok(()),
            MapState::Closed => Err(MapError::Closed),
            MapState::Unloaded => Err(MapError::NotLoaded),
        }
    }

    /// Locate `(x, y)` on the grid and compute bilinear weights
    ///
    /// Recomputed on every sample tick, never cached across ticks. The
    /// search lands on the last of a run of equal axis entries; coordinates
    /// outside the axis range clamp to the boundary cell with the outer
    /// weight forced to zero, so a missing neighbor is never read.
    pub fn interpolate(&mut self, x: f64, y: f64) -> Result<Interpolation, MapError> {
        self.check_loaded()?;

        let (cell_x, x_ratio) = locate(&self.axis_x, x);
        let (cell_y, y_ratio) = locate(&self.axis_y, y);

        let x1r = 1.0 - x_ratio;
        let y1r = 1.0 - y_ratio;
        let weights = [
            [y1r * x1r, y1r * x_ratio],
            [y_ratio * x1r, y_ratio * x_ratio],
        ];

        let mut value = 0.0;
        for (row, row_weights) in weights.iter().enumerate() {
            for (col, w) in row_weights.iter().enumerate() {
                // A zero weight can mark a neighbor past the grid edge.
                if *w != 0.0 {
                    value += self.cells[cell_y + row][cell_x + col] * w;
                }
            }
        }

        self.interpolation = Interpolation {
            cell_x,
            cell_y,
            x_ratio,
            y_ratio,
            weights,
            value,
        };
        Ok(self.interpolation)
    }

    /// Most recent interpolation result
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Apply `delta` to the cells under the current cursor neighborhood
    ///
    /// Every affected cell is written back through the client immediately; a
    /// write failure aborts the remaining cells without rolling back.
    pub fn edit_cursor(
        &mut self,
        client: &mut EcuClient,
        delta: f64,
        algorithm: EditAlgorithm,
    ) -> Result<(), MapError> {
        self.check_loaded()?;
        let Interpolation {
            cell_x,
            cell_y,
            weights,
            ..
        } = self.interpolation;

        match algorithm {
            EditAlgorithm::Distribute => {
                for row in 0..2 {
                    for col in 0..2 {
                        self.edit_cell(client, cell_x + col, cell_y + row, delta * weights[row][col])?;
                    }
                }
            }
            EditAlgorithm::AllCells => {
                for row in 0..2 {
                    for col in 0..2 {
                        self.edit_cell(client, cell_x + col, cell_y + row, delta)?;
                    }
                }
            }
            EditAlgorithm::StrongestCell => {
                let mut best = 0.0;
                let (mut bx, mut by) = (0, 0);
                for row in 0..2 {
                    for col in 0..2 {
                        if weights[row][col] > best {
                            best = weights[row][col];
                            bx = col;
                            by = row;
                        }
                    }
                }
                self.edit_cell(client, cell_x + bx, cell_y + by, delta)?;
            }
        }
        Ok(())
    }

    /// Apply `delta` uniformly to every cell in the selection, row-major
    pub fn edit_selection(&mut self, client: &mut EcuClient, delta: f64) -> Result<(), MapError> {
        self.check_loaded()?;
        let sel = self.selection;
        for row in sel.y0..sel.y1 {
            for col in sel.x0..sel.x1 {
                self.edit_cell(client, col, row, delta)?;
            }
        }
        Ok(())
    }

    /// Set the selection rectangle, clamped to the grid
    pub fn set_selection(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        self.selection = Selection {
            x0: x0.min(self.layout.xsize()),
            y0: y0.min(self.layout.ysize()),
            x1: x1.min(self.layout.xsize()),
            y1: y1.min(self.layout.ysize()),
        };
    }

    /// Collapse the selection to empty
    pub fn clear_selection(&mut self) {
        self.selection = Selection::default();
    }

    /// Add `delta` to one cell and write it back; out-of-grid cells are
    /// silently skipped (the cursor neighborhood may overhang the edge)
    fn edit_cell(
        &mut self,
        client: &mut EcuClient,
        col: usize,
        row: usize,
        delta: f64,
    ) -> Result<(), MapError> {
        if col >= self.layout.xsize() || row >= self.layout.ysize() {
            return Ok(());
        }
        let value = self.cells[row][col] + delta;
        // Mirror first so redisplay is right even if the write fails.
        self.cells[row][col] = value;
        self.layout.write_cell(client, row, col, value)
    }
}

/// Find the axis cell for `value` plus the fractional position toward the
/// next entry
///
/// Leading runs of equal entries are skipped forward so the search starts on
/// the last of the run; the ratio stays 0.0 at the array bounds and across
/// zero-width steps. A length-1 axis therefore yields cell 0 with ratio 0,
/// forcing the missing neighbor's weight to zero.
fn locate(axis: &[f64], value: f64) -> (usize, f64) {
    let mut cell = 0;
    while cell + 1 < axis.len() && axis[cell] == axis[cell + 1] {
        cell += 1;
    }
    for i in cell..axis.len() {
        if value >= axis[i] {
            cell = i;
        } else {
            break;
        }
    }

    let mut ratio = 0.0;
    if cell + 1 < axis.len() {
        let step = axis[cell + 1] - axis[cell];
        let diff = value - axis[cell];
        if diff > 0.0 && step > 0.0 {
            ratio = diff / step;
        }
    }
    (cell, ratio)
}
