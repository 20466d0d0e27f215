//! Structural description emitter
//!
//! Renders a [`Grid`] as one PE instantiation per cell, row-major. Unconnected
//! endpoints are emitted as empty bindings, which downstream HDL tooling
//! treats as open ports.

use std::fmt::Write as _;
use std::io;

use serde::{Deserialize, Serialize};

use crate::error::SystolicResult;
use crate::topology::{Cell, Grid};

/// Names used in the generated instantiations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmitOptions {
    /// PE module being instantiated
    pub module: String,
    /// Instance names are `<prefix>_<row>_<col>`
    pub instance_prefix: String,
    pub clock: String,
    pub reset: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            module: "mac".to_string(),
            instance_prefix: "mac_instance".to_string(),
            clock: "clk".to_string(),
            reset: "rst".to_string(),
        }
    }
}

/// Emitter for the array's structural description
#[derive(Debug, Clone, Default)]
pub struct ArrayEmitter {
    options: EmitOptions,
}

impl ArrayEmitter {
    pub fn new(options: EmitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    pub fn instance_name(&self, cell: &Cell) -> String {
        format!("{}_{}_{}", self.options.instance_prefix, cell.row, cell.col)
    }

    /// Render every cell of the grid
    pub fn emit(&self, grid: &Grid) -> String {
        let mut output = String::new();
        for cell in grid.cells() {
            self.emit_cell(cell, &mut output);
        }
        log::debug!(
            "emitted {} instances of '{}'",
            grid.cells().len(),
            self.options.module
        );
        output
    }

    /// Render the grid into `writer`
    pub fn emit_to<W: io::Write>(&self, grid: &Grid, writer: &mut W) -> SystolicResult<()> {
        writer.write_all(self.emit(grid).as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn emit_cell(&self, cell: &Cell, output: &mut String) {
        // Writing into a String cannot fail
        let _ = writeln!(output, "{} {} (", self.options.module, self.instance_name(cell));
        let _ = writeln!(output, "      .clk({}),", self.options.clock);
        let _ = write!(output, "      .rst({})", self.options.reset);
        for (port, binding) in cell.ports() {
            let _ = write!(output, ",\n      .{}({})", port.name(), binding);
        }
        output.push_str("\n  );\n");
    }
}
