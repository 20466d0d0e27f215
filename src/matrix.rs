//! Dense integer matrices and borrowed tile views

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SystolicError, SystolicResult};
use crate::parser::Parser;

/// Row-major matrix of exact integers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i64>,
}

/// Unchecked wire form, validated through [`Matrix::new`]
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<i64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = SystolicError;

    fn try_from(raw: RawMatrix) -> SystolicResult<Self> {
        Matrix::new(raw.rows, raw.cols, raw.data)
    }
}

impl Matrix {
    /// Build from row-major data; `data.len()` must equal `rows * cols`
    pub fn new(rows: usize, cols: usize, data: Vec<i64>) -> SystolicResult<Self> {
        if data.len() != rows * cols {
            return Err(SystolicError::parse_error(format!(
                "{} values cannot fill a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Build from nested rows, rejecting ragged input
    pub fn from_rows(rows: Vec<Vec<i64>>) -> SystolicResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(SystolicError::RaggedMatrix {
                    row: idx,
                    expected: cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<i64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub(crate) fn get_mut(&mut self, row: usize, col: usize) -> &mut i64 {
        &mut self.data[row * self.cols + col]
    }

    /// Row-major values
    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<i64>> {
        (0..self.rows)
            .map(|row| self.data[row * self.cols..(row + 1) * self.cols].to_vec())
            .collect()
    }

    /// Whole-matrix view
    pub fn view(&self) -> Tile<'_> {
        self.tile(0..self.rows, 0..self.cols)
    }

    /// Sub-view clipped to the matrix bounds
    pub fn tile(&self, rows: Range<usize>, cols: Range<usize>) -> Tile<'_> {
        let row_end = rows.end.min(self.rows);
        let col_end = cols.end.min(self.cols);
        Tile {
            matrix: self,
            row_offset: rows.start.min(row_end),
            col_offset: cols.start.min(col_end),
            rows: row_end.saturating_sub(rows.start),
            cols: col_end.saturating_sub(cols.start),
        }
    }

    /// Untiled reference product
    pub fn matmul(&self, other: &Matrix) -> SystolicResult<Matrix> {
        if self.cols != other.rows {
            return Err(SystolicError::shape_mismatch(self.shape(), other.shape()));
        }
        self.view().matmul(&other.view())
    }
}

impl FromStr for Matrix {
    type Err = SystolicError;

    /// Parse a literal such as `[[1, 2], [3, 4]]`
    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Parser::new(source).parse_matrix()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, row) in self.to_rows().iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", value)?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

/// Borrowed rectangular window into a [`Matrix`]
///
/// Edge tiles are narrower than requested when the matrix dimensions are not
/// a multiple of the tile shape.
#[derive(Debug, Clone, Copy)]
pub struct Tile<'a> {
    matrix: &'a Matrix,
    row_offset: usize,
    col_offset: usize,
    rows: usize,
    cols: usize,
}

impl<'a> Tile<'a> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Origin in the parent matrix
    pub fn offset(&self) -> (usize, usize) {
        (self.row_offset, self.col_offset)
    }

    pub fn get(&self, row: usize, col: usize) -> i64 {
        self.matrix.data[(self.row_offset + row) * self.matrix.cols + self.col_offset + col]
    }

    /// Column `col`, top to bottom
    pub fn column(&self, col: usize) -> impl DoubleEndedIterator<Item = i64> + 'a {
        let tile = *self;
        (0..tile.rows).map(move |row| tile.get(row, col))
    }

    /// Product of two tiles contracted over `self.cols == other.rows`
    pub fn matmul(&self, other: &Tile<'_>) -> SystolicResult<Matrix> {
        if self.cols != other.rows {
            return Err(SystolicError::shape_mismatch(self.shape(), other.shape()));
        }
        let mut product = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for j in 0..other.cols {
                let mut sum = 0i64;
                for k in 0..self.cols {
                    sum = self
                        .get(i, k)
                        .checked_mul(other.get(k, j))
                        .and_then(|p| sum.checked_add(p))
                        .ok_or(SystolicError::Overflow { row: i, col: j })?;
                }
                *product.get_mut(i, j) = sum;
            }
        }
        Ok(product)
    }

    pub fn to_matrix(&self) -> Matrix {
        let data = (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| (row, col)))
            .map(|(row, col)| self.get(row, col))
            .collect();
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        }
    }
}
