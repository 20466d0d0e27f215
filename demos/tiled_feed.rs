//! Example: Tiled Product and Lane Streams
//!
//! Multiplies a 3x4 matrix by a 4x4 matrix on a 2x2 array, printing every
//! pass, the accumulated result after it, and the final lane streams.
//!
//! Run with: cargo run --example tiled_feed

use systolic_mesh::{Accumulator, LaneStreams, Matrix, MatrixTiler, TileDims};

fn main() {
    println!("=== Tiled Feed Example ===\n");

    let a: Matrix = "[[9, 8, 7, 6], [5, 4, 3, 2], [1, 9, 8, 7]]".parse().unwrap();
    let b: Matrix = "[[1, 2, 3, 2], [4, 5, 6, 3], [7, 8, 9, 6], [1, 2, 3, 1]]"
        .parse()
        .unwrap();
    let tile = TileDims::new(2, 2);
    let tiler = MatrixTiler::new(tile).unwrap();

    let mut accumulator = Accumulator::new(a.rows(), b.cols());
    for step in tiler.schedule(&a, &b).unwrap() {
        let tile_a = step.tile_a(&a);
        let tile_b = step.tile_b(&b);
        let partial = tile_a.matmul(&tile_b).unwrap();
        accumulator
            .absorb(&partial, step.ci, step.is_first_k)
            .unwrap();

        println!(
            "Pass {}: A[:, {:?}] @ B[{:?}, {:?}]",
            step.index, step.k_range, step.k_range, step.n_range
        );
        println!("  A tile:  {}", tile_a.to_matrix());
        println!("  B tile:  {}", tile_b.to_matrix());
        println!("  partial: {}", partial);
        println!("  C:       {}", accumulator.current());
    }
    println!();

    let (product, streams) = tiler.run(&a, &b, LaneStreams::new(tile)).unwrap();
    println!("Result:    {}", product);
    println!("Reference: {}", a.matmul(&b).unwrap());
    println!();

    println!("Lane streams (JSON):");
    println!("{}", streams.to_json().unwrap());
}
