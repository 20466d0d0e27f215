//! Systolic Array Generator and Feeder
//!
//! This library wires up an R x C weight-stationary systolic array of MAC
//! processing elements and schedules tiled matrix products onto it.
//!
//! The structural side ([`Grid`], [`ArrayEmitter`]) produces one PE
//! instantiation per cell. The dataflow side ([`MatrixTiler`],
//! [`StreamFeeder`]) splits `A @ B` into tile-sized passes, accumulates the
//! partial products and lays out per-lane activation and weight streams in
//! the order the array consumes them.
//!
//! # Example
//!
//! ```rust
//! use systolic_mesh::{feed_streams, generate_array, Matrix, SystolicConfig};
//!
//! let config = SystolicConfig::square(2);
//! let text = generate_array(&config).unwrap();
//! assert_eq!(text.matches("mac mac_instance").count(), 4);
//!
//! let a: Matrix = "[[1, 2], [3, 4]]".parse().unwrap();
//! let b: Matrix = "[[5, 6], [7, 8]]".parse().unwrap();
//! let (product, streams) = feed_streams(&a, &b, &config).unwrap();
//! assert_eq!(product.to_rows(), vec![vec![19, 22], vec![43, 50]]);
//! assert_eq!(streams.weights[0], vec![7, 5]);
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod feeder;
pub mod lexer;
pub mod matrix;
pub mod parser;
pub mod tiling;
pub mod topology;

pub use config::{GridDims, SystolicConfig, TileDims};
pub use emitter::{ArrayEmitter, EmitOptions};
pub use error::{SystolicError, SystolicResult};
pub use feeder::{Lane, LaneFiles, LaneSink, LaneStreams, StreamFeeder};
pub use matrix::{Matrix, Tile};
pub use parser::Parser;
pub use tiling::{Accumulator, MatrixTiler, TileSchedule, TileStep};
pub use topology::{Binding, Cell, CellRole, Grid, Port, Signal};

/// Structural description of the configured array
pub fn generate_array(config: &SystolicConfig) -> SystolicResult<String> {
    config.validate()?;
    let grid = Grid::from_dims(config.grid)?;
    Ok(ArrayEmitter::default().emit(&grid))
}

/// Tiled product of `a @ b` together with the lane streams that feed it
pub fn feed_streams(
    a: &Matrix,
    b: &Matrix,
    config: &SystolicConfig,
) -> SystolicResult<(Matrix, LaneStreams)> {
    config.validate()?;
    let tile = config.tile_dims();
    MatrixTiler::new(tile)?.run(a, b, LaneStreams::new(tile))
}
