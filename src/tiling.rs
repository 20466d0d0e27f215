//! Tiled matrix multiplication for the systolic array
//!
//! For C = A @ B where A is MxK and B is KxN the tiler walks
//! - outer: column blocks `ci`, stepping by the tile width across max(K, N)
//! - inner: contraction blocks `rj`, stepping by the tile depth across K
//!
//! Each step multiplies `A[:, rj..]` by `B[rj.., ci..]` and folds the partial
//! product into columns `ci..` of the result. The first step of a column
//! block writes the block, later steps add to it. Blocks past N carry an
//! empty slice of B but still feed their activations. The step order is also
//! the order in which lane streams are fed, so it must not be rearranged.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::TileDims;
use crate::error::{SystolicError, SystolicResult};
use crate::feeder::{LaneSink, StreamFeeder};
use crate::matrix::{Matrix, Tile};

/// One pass of the tiled multiplication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileStep {
    /// Position in the overall pass sequence
    pub index: usize,
    /// First output column of this block
    pub ci: usize,
    /// First contraction index of this block
    pub rj: usize,
    /// Columns of A (and rows of B) contracted in this pass
    pub k_range: Range<usize>,
    /// Columns of B (and of the result) produced in this pass, empty once
    /// `ci` runs past N
    pub n_range: Range<usize>,
    /// First contribution to this column block
    pub is_first_k: bool,
    /// Last contribution to this column block
    pub is_last_k: bool,
}

impl TileStep {
    /// `A[:, k_range]`
    pub fn tile_a<'a>(&self, a: &'a Matrix) -> Tile<'a> {
        a.tile(0..a.rows(), self.k_range.clone())
    }

    /// `B[k_range, n_range]`
    pub fn tile_b<'a>(&self, b: &'a Matrix) -> Tile<'a> {
        b.tile(self.k_range.clone(), self.n_range.clone())
    }
}

/// Iterator over the passes of an MxK @ KxN product
#[derive(Debug, Clone)]
pub struct TileSchedule {
    k: usize,
    n: usize,
    tile: TileDims,
    ci: usize,
    rj: usize,
    index: usize,
}

impl TileSchedule {
    pub fn new(k: usize, n: usize, tile: TileDims) -> SystolicResult<Self> {
        tile.validate()?;
        Ok(Self {
            k,
            n,
            tile,
            ci: 0,
            rj: 0,
            index: 0,
        })
    }

    /// Extent of the outer loop
    fn outer(&self) -> usize {
        self.k.max(self.n)
    }

    /// Total number of passes
    pub fn pass_count(&self) -> usize {
        self.outer().div_ceil(self.tile.cols) * self.k.div_ceil(self.tile.rows)
    }
}

impl Iterator for TileSchedule {
    type Item = TileStep;

    fn next(&mut self) -> Option<TileStep> {
        if self.ci >= self.outer() || self.k == 0 {
            return None;
        }

        let k_end = (self.rj + self.tile.rows).min(self.k);
        let step = TileStep {
            index: self.index,
            ci: self.ci,
            rj: self.rj,
            k_range: self.rj..k_end,
            n_range: self.ci.min(self.n)..(self.ci + self.tile.cols).min(self.n),
            is_first_k: self.rj == 0,
            is_last_k: k_end == self.k,
        };

        self.index += 1;
        if step.is_last_k {
            self.rj = 0;
            self.ci += self.tile.cols;
        } else {
            self.rj = k_end;
        }
        Some(step)
    }
}

/// Result matrix accumulated block by block
#[derive(Debug, Clone)]
pub struct Accumulator {
    result: Matrix,
}

impl Accumulator {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            result: Matrix::zeros(rows, cols),
        }
    }

    /// Fold a partial product into the columns starting at `col_offset`.
    ///
    /// `replace` overwrites the block instead of adding to it.
    pub fn absorb(&mut self, partial: &Matrix, col_offset: usize, replace: bool) -> SystolicResult<()> {
        for row in 0..partial.rows() {
            for col in 0..partial.cols() {
                let value = partial.get(row, col).unwrap_or_default();
                let slot = self.result.get_mut(row, col_offset + col);
                *slot = if replace {
                    value
                } else {
                    slot.checked_add(value).ok_or(SystolicError::Overflow {
                        row,
                        col: col_offset + col,
                    })?
                };
            }
        }
        Ok(())
    }

    pub fn current(&self) -> &Matrix {
        &self.result
    }

    pub fn finish(self) -> Matrix {
        self.result
    }
}

/// Tiled multiplier for a given tile shape
#[derive(Debug, Clone)]
pub struct MatrixTiler {
    tile: TileDims,
}

impl MatrixTiler {
    pub fn new(tile: TileDims) -> SystolicResult<Self> {
        tile.validate()?;
        Ok(Self { tile })
    }

    pub fn tile_dims(&self) -> TileDims {
        self.tile
    }

    /// Pass sequence for `a @ b`, after checking the operand shapes
    pub fn schedule(&self, a: &Matrix, b: &Matrix) -> SystolicResult<TileSchedule> {
        if a.cols() != b.rows() {
            return Err(SystolicError::shape_mismatch(a.shape(), b.shape()));
        }
        TileSchedule::new(a.cols(), b.cols(), self.tile)
    }

    /// Compute `a @ b` pass by pass
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> SystolicResult<Matrix> {
        self.fold(a, b, (), |_, _, _| Ok(()))
            .map(|(product, ())| product)
    }

    /// Compute `a @ b` while feeding every pass's lane streams into `sink`.
    ///
    /// The sink is threaded through the passes and handed back alongside the
    /// product.
    pub fn run<S: LaneSink>(&self, a: &Matrix, b: &Matrix, sink: S) -> SystolicResult<(Matrix, S)> {
        let feeder = StreamFeeder::new(self.tile);
        self.fold(a, b, sink, |mut sink, tile_a, tile_b| {
            feeder.feed(&mut sink, &tile_a, &tile_b)?;
            Ok(sink)
        })
    }

    /// Walk every pass, accumulating the product and threading `state`
    /// through `visit`
    fn fold<T, F>(&self, a: &Matrix, b: &Matrix, state: T, mut visit: F) -> SystolicResult<(Matrix, T)>
    where
        F: FnMut(T, Tile<'_>, Tile<'_>) -> SystolicResult<T>,
    {
        let mut schedule = self.schedule(a, b)?;
        log::debug!(
            "tiling {:?} @ {:?} into {} passes of {}x{}",
            a.shape(),
            b.shape(),
            schedule.pass_count(),
            self.tile.rows,
            self.tile.cols
        );

        let (accumulator, state) = schedule.try_fold(
            (Accumulator::new(a.rows(), b.cols()), state),
            |(mut accumulator, state), step| -> SystolicResult<_> {
                let tile_a = step.tile_a(a);
                let tile_b = step.tile_b(b);
                log::trace!(
                    "pass {}: A[:, {:?}] @ B[{:?}, {:?}]",
                    step.index,
                    step.k_range,
                    step.k_range,
                    step.n_range
                );

                let partial = tile_a.matmul(&tile_b).map_err(|err| match err {
                    SystolicError::Overflow { row, col } => SystolicError::Overflow {
                        row,
                        col: step.ci + col,
                    },
                    other => other,
                })?;
                accumulator.absorb(&partial, step.ci, step.is_first_k)?;
                let state = visit(state, tile_a, tile_b)?;
                Ok((accumulator, state))
            },
        )?;

        Ok((accumulator.finish(), state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matrix(rows: Vec<Vec<i64>>) -> Matrix {
        Matrix::from_rows(rows).unwrap()
    }

    fn sample_a() -> Matrix {
        matrix(vec![vec![9, 8, 7, 6], vec![5, 4, 3, 2], vec![1, 9, 8, 7]])
    }

    fn sample_b() -> Matrix {
        matrix(vec![
            vec![1, 2, 3, 2],
            vec![4, 5, 6, 3],
            vec![7, 8, 9, 6],
            vec![1, 2, 3, 1],
        ])
    }

    /// Deterministic pseudo-random matrix with small signed entries
    fn generated(rows: usize, cols: usize, seed: i64) -> Matrix {
        let data = (0..rows * cols)
            .map(|i| ((i as i64 * 7919 + seed * 104729) % 19) - 9)
            .collect();
        Matrix::new(rows, cols, data).unwrap()
    }

    #[test]
    fn test_reference_scenario() {
        let (a, b) = (sample_a(), sample_b());
        let tiler = MatrixTiler::new(TileDims::new(2, 2)).unwrap();
        let product = tiler.multiply(&a, &b).unwrap();
        assert_eq!(
            product.to_rows(),
            vec![
                vec![96, 126, 156, 90],
                vec![44, 58, 72, 42],
                vec![100, 125, 150, 84],
            ]
        );
        assert_eq!(product, a.matmul(&b).unwrap());
    }

    #[test]
    fn test_scenario_tile_by_tile() {
        let (a, b) = (sample_a(), sample_b());
        let tiler = MatrixTiler::new(TileDims::new(2, 2)).unwrap();
        let mut accumulator = Accumulator::new(3, 4);
        let mut snapshots = Vec::new();
        for step in tiler.schedule(&a, &b).unwrap() {
            let partial = step.tile_a(&a).matmul(&step.tile_b(&b)).unwrap();
            accumulator.absorb(&partial, step.ci, step.is_first_k).unwrap();
            snapshots.push(accumulator.current().to_rows());
        }

        assert_eq!(snapshots.len(), 4);
        // A[:, 0..2] @ B[0..2, 0..2]
        assert_eq!(
            snapshots[0],
            vec![vec![41, 58, 0, 0], vec![21, 30, 0, 0], vec![37, 47, 0, 0]]
        );
        // + A[:, 2..4] @ B[2..4, 0..2]
        assert_eq!(
            snapshots[1],
            vec![vec![96, 126, 0, 0], vec![44, 58, 0, 0], vec![100, 125, 0, 0]]
        );
        assert_eq!(snapshots[3], a.matmul(&b).unwrap().to_rows());
    }

    #[test]
    fn test_schedule_order() {
        let schedule = TileSchedule::new(5, 3, TileDims::new(2, 2)).unwrap();
        assert_eq!(schedule.pass_count(), 9);
        let steps: Vec<(usize, usize, Range<usize>, Range<usize>)> = schedule
            .map(|s| (s.ci, s.rj, s.k_range, s.n_range))
            .collect();
        assert_eq!(
            steps,
            vec![
                (0, 0, 0..2, 0..2),
                (0, 2, 2..4, 0..2),
                (0, 4, 4..5, 0..2),
                (2, 0, 0..2, 2..3),
                (2, 2, 2..4, 2..3),
                (2, 4, 4..5, 2..3),
                (4, 0, 0..2, 3..3),
                (4, 2, 2..4, 3..3),
                (4, 4, 4..5, 3..3),
            ]
        );
    }

    #[test]
    fn test_schedule_wider_than_deep() {
        // N > K: the outer loop follows N so every output column is covered
        let steps: Vec<(usize, Range<usize>, Range<usize>)> =
            TileSchedule::new(2, 5, TileDims::new(2, 2))
                .unwrap()
                .map(|s| (s.ci, s.k_range, s.n_range))
                .collect();
        assert_eq!(
            steps,
            vec![(0, 0..2, 0..2), (2, 0..2, 2..4), (4, 0..2, 4..5)]
        );
    }

    #[test]
    fn test_schedule_rejects_empty_tile() {
        assert!(matches!(
            TileSchedule::new(4, 4, TileDims::new(0, 2)),
            Err(SystolicError::InvalidDimension { what: "tile", .. })
        ));
        assert!(TileSchedule::new(4, 4, TileDims::new(2, 0)).is_err());
    }

    #[test]
    fn test_deep_contraction_keeps_trailing_passes() {
        let a = matrix(vec![vec![1, 2, 3, 4]]);
        let b = matrix(vec![vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8]]);
        let tiler = MatrixTiler::new(TileDims::new(2, 2)).unwrap();
        let steps: Vec<TileStep> = tiler.schedule(&a, &b).unwrap().collect();
        assert_eq!(steps.len(), 4);
        assert!(steps[2..].iter().all(|s| s.n_range.is_empty()));
        assert_eq!(tiler.multiply(&a, &b).unwrap().to_rows(), vec![vec![50, 60]]);
    }

    #[test]
    fn test_schedule_flags() {
        let steps: Vec<TileStep> = TileSchedule::new(4, 4, TileDims::new(2, 2)).unwrap().collect();
        assert_eq!(steps.len(), 4);
        assert!(steps[0].is_first_k && !steps[0].is_last_k);
        assert!(!steps[1].is_first_k && steps[1].is_last_k);
        assert!(steps[2].is_first_k && steps[2].ci == 2);
        assert_eq!(steps[3].index, 3);
    }

    #[test]
    fn test_shape_mismatch() {
        let tiler = MatrixTiler::new(TileDims::new(2, 2)).unwrap();
        let err = tiler.multiply(&sample_a(), &sample_a()).unwrap_err();
        assert!(matches!(
            err,
            SystolicError::ShapeMismatch { left: (3, 4), right: (3, 4) }
        ));
    }

    #[test]
    fn test_invalid_tile() {
        assert!(matches!(
            MatrixTiler::new(TileDims::new(0, 2)),
            Err(SystolicError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn test_matches_reference_for_many_shapes() {
        for m in 1..=4 {
            for k in 1..=5 {
                for n in 1..=5 {
                    let a = generated(m, k, (m * 31 + k) as i64);
                    let b = generated(k, n, (k * 17 + n) as i64);
                    let expected = a.matmul(&b).unwrap();
                    for tile_rows in 1..=3 {
                        for tile_cols in 1..=3 {
                            let tiler = MatrixTiler::new(TileDims::new(tile_rows, tile_cols)).unwrap();
                            assert_eq!(
                                tiler.multiply(&a, &b).unwrap(),
                                expected,
                                "{}x{} @ {}x{} with {}x{} tiles",
                                m,
                                k,
                                k,
                                n,
                                tile_rows,
                                tile_cols
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_tile_larger_than_operands() {
        let a = matrix(vec![vec![1, 2], vec![3, 4]]);
        let b = matrix(vec![vec![5, 6], vec![7, 8]]);
        let tiler = MatrixTiler::new(TileDims::new(8, 8)).unwrap();
        assert_eq!(tiler.schedule(&a, &b).unwrap().count(), 1);
        assert_eq!(tiler.multiply(&a, &b).unwrap().to_rows(), vec![vec![19, 22], vec![43, 50]]);
    }

    #[test]
    fn test_empty_contraction() {
        let a = Matrix::zeros(2, 0);
        let b = Matrix::zeros(0, 3);
        let tiler = MatrixTiler::new(TileDims::new(2, 2)).unwrap();
        assert_eq!(tiler.multiply(&a, &b).unwrap(), Matrix::zeros(2, 3));
    }

    #[test]
    fn test_accumulation_overflow() {
        let a = matrix(vec![vec![i64::MAX, i64::MAX]]);
        let b = matrix(vec![vec![1], vec![1]]);
        let tiler = MatrixTiler::new(TileDims::new(1, 1)).unwrap();
        assert!(matches!(
            tiler.multiply(&a, &b),
            Err(SystolicError::Overflow { row: 0, col: 0 })
        ));
    }
}
