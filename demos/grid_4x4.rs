//! Example: 4x4 Array Description
//!
//! Wires a 4x4 weight-stationary array and prints its PE instantiations,
//! then shows how the handshake chain of one column is connected.
//!
//! Run with: cargo run --example grid_4x4

use systolic_mesh::{ArrayEmitter, Grid, Port, Signal};

fn main() {
    println!("=== 4x4 Systolic Array ===\n");

    let grid = Grid::compute(4, 4).unwrap();
    let emitter = ArrayEmitter::default();
    print!("{}", emitter.emit(&grid));
    println!();

    println!("Weight handshake chain of column 2:");
    for row in 0..grid.rows() {
        let cell = grid.cell(row, 2).unwrap();
        println!(
            "  {:<18} W_en <= {}",
            emitter.instance_name(cell),
            cell.binding(Port::WeightEnable)
        );
    }
    println!();

    let driver = grid
        .driver_of(Signal::ActivationBus { row: 1, col: 0 })
        .unwrap();
    println!(
        "{} is driven by {}",
        Signal::ActivationBus { row: 1, col: 0 },
        emitter.instance_name(driver)
    );
}
