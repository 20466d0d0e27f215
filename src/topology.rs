//! Grid topology for the weight-stationary array
//!
//! Every PE has six signal directions. Weights, the weight handshake and
//! partial sums travel downward; activations, the activation handshake and
//! the weight switch travel rightward. A cell's inbound endpoints read the
//! outbound endpoints of its upper or left neighbor, or an external port when
//! it sits on the top row or left column.
//!
//! Nets are identified by [`Signal`] values, never by matching names. The
//! textual names are only produced when rendering.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GridDims;
use crate::error::{SystolicError, SystolicResult};

/// A single net in the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signal {
    /// Global switch input, feeds cell (0, 0)
    Switch,
    /// Weight switch entering cell (row, col)
    SwitchBus { row: usize, col: usize },
    /// Per-column external weight fetch strobe
    WeightFetch { col: usize },
    /// Per-column external weight data
    WeightInput { col: usize },
    /// Weight handshake out of cell (row, col)
    WeightReady { row: usize, col: usize },
    /// Weight data out of cell (row, col)
    WeightBus { row: usize, col: usize },
    /// External bias feeding the top row's partial-sum input
    Bias,
    /// Partial sum out of cell (row, col)
    PartialSum { row: usize, col: usize },
    /// Per-column external result output
    Output { col: usize },
    /// Per-row external activation enable
    InterfaceEnable { row: usize },
    /// Per-row external activation data
    InterfaceData { row: usize },
    /// Activation handshake out of cell (row, col)
    ActivationReady { row: usize, col: usize },
    /// Activation data out of cell (row, col)
    ActivationBus { row: usize, col: usize },
}

impl Signal {
    /// Ports that cross the array boundary
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Signal::Switch
                | Signal::WeightFetch { .. }
                | Signal::WeightInput { .. }
                | Signal::Bias
                | Signal::Output { .. }
                | Signal::InterfaceEnable { .. }
                | Signal::InterfaceData { .. }
        )
    }

    /// Signals a cell may read without any cell driving them.
    ///
    /// Besides the external ports this covers the leading switch bus of rows
    /// below the first: column 0 has no left neighbor and only (0, 0) is tied
    /// to the global switch.
    pub fn is_boundary(&self) -> bool {
        self.is_external() || matches!(self, Signal::SwitchBus { col: 0, .. })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Switch => write!(f, "switch"),
            Signal::SwitchBus { row, col } => write!(f, "W_switch[{}][{}]", row, col),
            Signal::WeightFetch { col } => write!(f, "wfetch[{}]", col),
            Signal::WeightInput { col } => write!(f, "i_wdata[{}]", col),
            Signal::WeightReady { row, col } => write!(f, "W_ready[{}][{}]", row, col),
            Signal::WeightBus { row, col } => write!(f, "W_data[{}][{}]", row, col),
            Signal::Bias => write!(f, "bias"),
            Signal::PartialSum { row, col } => write!(f, "P_data[{}][{}]", row, col),
            Signal::Output { col } => write!(f, "of_data[{}]", col),
            Signal::InterfaceEnable { row } => write!(f, "if_en[{}]", row),
            Signal::InterfaceData { row } => write!(f, "if_data[{}]", row),
            Signal::ActivationReady { row, col } => write!(f, "A_ready[{}][{}]", row, col),
            Signal::ActivationBus { row, col } => write!(f, "A_data[{}][{}]", row, col),
        }
    }
}

/// What a port is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    /// Terminal endpoint, left open
    Unconnected,
    Wire(Signal),
    /// Conjunction of two nets (neighbor ready gated by column fetch)
    And(Signal, Signal),
}

impl Binding {
    pub fn is_connected(&self) -> bool {
        !matches!(self, Binding::Unconnected)
    }

    /// Nets referenced by this binding
    pub fn signals(&self) -> impl Iterator<Item = Signal> {
        let (first, second) = match *self {
            Binding::Unconnected => (None, None),
            Binding::Wire(s) => (Some(s), None),
            Binding::And(a, b) => (Some(a), Some(b)),
        };
        first.into_iter().chain(second)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Unconnected => Ok(()),
            Binding::Wire(s) => write!(f, "{}", s),
            Binding::And(a, b) => write!(f, "{} & {}", a, b),
        }
    }
}

/// Named ports of a PE, in instantiation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    SwitchIn,
    SwitchOut,
    ActivationEnable,
    ActivationReady,
    ActivationIn,
    ActivationOut,
    WeightEnable,
    WeightReady,
    WeightIn,
    WeightOut,
    PartialIn,
    PartialOut,
}

impl Port {
    pub const ALL: [Port; 12] = [
        Port::SwitchIn,
        Port::SwitchOut,
        Port::ActivationEnable,
        Port::ActivationReady,
        Port::ActivationIn,
        Port::ActivationOut,
        Port::WeightEnable,
        Port::WeightReady,
        Port::WeightIn,
        Port::WeightOut,
        Port::PartialIn,
        Port::PartialOut,
    ];

    /// Port name on the PE module
    pub fn name(&self) -> &'static str {
        match self {
            Port::SwitchIn => "switch_in",
            Port::SwitchOut => "switch_out",
            Port::ActivationEnable => "A_en",
            Port::ActivationReady => "A_ready",
            Port::ActivationIn => "A_in",
            Port::ActivationOut => "A_out",
            Port::WeightEnable => "W_en",
            Port::WeightReady => "W_ready",
            Port::WeightIn => "W_in",
            Port::WeightOut => "W_out",
            Port::PartialIn => "P_in",
            Port::PartialOut => "P_out",
        }
    }

    /// True for ports the PE reads
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Port::SwitchIn
                | Port::ActivationEnable
                | Port::ActivationIn
                | Port::WeightEnable
                | Port::WeightIn
                | Port::PartialIn
        )
    }
}

/// Position flags of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRole {
    pub first_row: bool,
    pub last_row: bool,
    pub first_col: bool,
    pub last_col: bool,
}

/// One PE and the bindings of all its ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub role: CellRole,
    pub switch_in: Binding,
    pub switch_out: Binding,
    pub a_en: Binding,
    pub a_ready: Binding,
    pub a_in: Binding,
    pub a_out: Binding,
    pub w_en: Binding,
    pub w_ready: Binding,
    pub w_in: Binding,
    pub w_out: Binding,
    pub p_in: Binding,
    pub p_out: Binding,
}

impl Cell {
    /// Bind every port of the cell at (row, col).
    ///
    /// Inbound endpoints follow the first row / first column rule whenever it
    /// applies; outbound endpoints follow the last row / last column rule.
    /// On a single-row or single-column array both apply to the same cell.
    fn wire(row: usize, col: usize, dims: GridDims) -> Self {
        let role = CellRole {
            first_row: row == 0,
            last_row: row == dims.rows - 1,
            first_col: col == 0,
            last_col: col == dims.cols - 1,
        };

        let (w_en, w_in, p_in) = if role.first_row {
            (
                Binding::Wire(Signal::WeightFetch { col }),
                Binding::Wire(Signal::WeightInput { col }),
                Binding::Wire(Signal::Bias),
            )
        } else {
            (
                Binding::And(
                    Signal::WeightReady { row: row - 1, col },
                    Signal::WeightFetch { col },
                ),
                Binding::Wire(Signal::WeightBus { row: row - 1, col }),
                Binding::Wire(Signal::PartialSum { row: row - 1, col }),
            )
        };

        let (w_ready, w_out, p_out) = if role.last_row {
            (
                Binding::Unconnected,
                Binding::Unconnected,
                Binding::Wire(Signal::Output { col }),
            )
        } else {
            (
                Binding::Wire(Signal::WeightReady { row, col }),
                Binding::Wire(Signal::WeightBus { row, col }),
                Binding::Wire(Signal::PartialSum { row, col }),
            )
        };

        let switch_in = if row == 0 && col == 0 {
            Binding::Wire(Signal::Switch)
        } else {
            Binding::Wire(Signal::SwitchBus { row, col })
        };

        let (a_en, a_in) = if role.first_col {
            (
                Binding::Wire(Signal::InterfaceEnable { row }),
                Binding::Wire(Signal::InterfaceData { row }),
            )
        } else {
            (
                Binding::Wire(Signal::ActivationReady { row, col: col - 1 }),
                Binding::Wire(Signal::ActivationBus { row, col: col - 1 }),
            )
        };

        let (switch_out, a_ready, a_out) = if role.last_col {
            (Binding::Unconnected, Binding::Unconnected, Binding::Unconnected)
        } else {
            (
                Binding::Wire(Signal::SwitchBus { row, col: col + 1 }),
                Binding::Wire(Signal::ActivationReady { row, col }),
                Binding::Wire(Signal::ActivationBus { row, col }),
            )
        };

        Self {
            row,
            col,
            role,
            switch_in,
            switch_out,
            a_en,
            a_ready,
            a_in,
            a_out,
            w_en,
            w_ready,
            w_in,
            w_out,
            p_in,
            p_out,
        }
    }

    pub fn binding(&self, port: Port) -> &Binding {
        match port {
            Port::SwitchIn => &self.switch_in,
            Port::SwitchOut => &self.switch_out,
            Port::ActivationEnable => &self.a_en,
            Port::ActivationReady => &self.a_ready,
            Port::ActivationIn => &self.a_in,
            Port::ActivationOut => &self.a_out,
            Port::WeightEnable => &self.w_en,
            Port::WeightReady => &self.w_ready,
            Port::WeightIn => &self.w_in,
            Port::WeightOut => &self.w_out,
            Port::PartialIn => &self.p_in,
            Port::PartialOut => &self.p_out,
        }
    }

    /// All ports with their bindings, in instantiation order
    pub fn ports(&self) -> impl Iterator<Item = (Port, &Binding)> + '_ {
        Port::ALL.into_iter().map(move |port| (port, self.binding(port)))
    }

    /// Nets this cell reads
    pub fn inputs(&self) -> impl Iterator<Item = Signal> + '_ {
        self.ports()
            .filter(|(port, _)| port.is_input())
            .flat_map(|(_, binding)| binding.signals())
    }

    /// Nets this cell drives
    pub fn outputs(&self) -> impl Iterator<Item = Signal> + '_ {
        self.ports()
            .filter(|(port, _)| !port.is_input())
            .flat_map(|(_, binding)| binding.signals())
    }
}

/// An R x C array of wired cells, stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    dims: GridDims,
    cells: Vec<Cell>,
}

impl Grid {
    /// Wire up a rows x cols array and verify its connectivity
    pub fn compute(rows: usize, cols: usize) -> SystolicResult<Self> {
        Self::from_dims(GridDims::new(rows, cols))
    }

    pub fn from_dims(dims: GridDims) -> SystolicResult<Self> {
        dims.validate()?;
        log::debug!("wiring {}x{} systolic grid", dims.rows, dims.cols);

        let cells = (0..dims.rows)
            .flat_map(|row| (0..dims.cols).map(move |col| Cell::wire(row, col, dims)))
            .collect();
        let grid = Self { dims, cells };
        grid.check_connectivity()?;
        Ok(grid)
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn rows(&self) -> usize {
        self.dims.rows
    }

    pub fn cols(&self) -> usize {
        self.dims.cols
    }

    /// Cells in row-major order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row < self.dims.rows && col < self.dims.cols {
            self.cells.get(row * self.dims.cols + col)
        } else {
            None
        }
    }

    /// Map every internally driven net to the cell driving it
    pub fn drivers(&self) -> SystolicResult<HashMap<Signal, (usize, usize)>> {
        let mut drivers = HashMap::new();
        for cell in &self.cells {
            for signal in cell.outputs().filter(|s| !s.is_external()) {
                if let Some(&(row, col)) = drivers.get(&signal) {
                    return Err(SystolicError::ConflictingDrivers {
                        signal: signal.to_string(),
                        first_row: row,
                        first_col: col,
                        second_row: cell.row,
                        second_col: cell.col,
                    });
                }
                drivers.insert(signal, (cell.row, cell.col));
            }
        }
        Ok(drivers)
    }

    /// The cell driving `signal`, if any
    pub fn driver_of(&self, signal: Signal) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|cell| cell.outputs().any(|s| s == signal))
    }

    /// Verify that every net a cell reads is either a boundary signal or
    /// driven by exactly one cell
    pub fn check_connectivity(&self) -> SystolicResult<()> {
        let drivers = self.drivers()?;
        for cell in &self.cells {
            for signal in cell.inputs() {
                if signal.is_boundary() {
                    continue;
                }
                match drivers.get(&signal) {
                    Some(&(row, col)) => {
                        log::trace!(
                            "({}, {}) reads {} from ({}, {})",
                            cell.row,
                            cell.col,
                            signal,
                            row,
                            col
                        );
                    }
                    None => return Err(SystolicError::disconnected(cell.row, cell.col, signal)),
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
