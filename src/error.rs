//! Error types for the systolic array generator and feeder

use thiserror::Error;

/// Result type for generator and feeder operations
pub type SystolicResult<T> = Result<T, SystolicError>;

/// Generator, tiler and sink errors
#[derive(Debug, Error)]
pub enum SystolicError {
    #[error("Invalid {what} dimensions: {rows}x{cols} (both must be at least 1)")]
    InvalidDimension {
        what: &'static str,
        rows: usize,
        cols: usize,
    },

    #[error("Shape mismatch: left operand is {}x{}, right operand is {}x{}", left.0, left.1, right.0, right.1)]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("Cell ({row}, {col}) reads {signal}, which no cell drives")]
    Disconnected {
        row: usize,
        col: usize,
        signal: String,
    },

    #[error("{signal} is driven by both ({first_row}, {first_col}) and ({second_row}, {second_col})")]
    ConflictingDrivers {
        signal: String,
        first_row: usize,
        first_col: usize,
        second_row: usize,
        second_col: usize,
    },

    #[error("Ragged matrix: row {row} has {got} values, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("Integer overflow while accumulating result element ({row}, {col})")]
    Overflow { row: usize, col: usize },

    #[error("Lexer error at position {position}: {message}")]
    LexerError { position: usize, message: String },

    #[error("Parser error: {message}")]
    ParseError { message: String },

    #[error("No {kind} lane {index} (sink has {available})")]
    UnknownLane {
        kind: &'static str,
        index: usize,
        available: usize,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sink failure: {0}")]
    Sink(#[from] std::io::Error),
}

impl SystolicError {
    pub fn invalid_dimension(what: &'static str, rows: usize, cols: usize) -> Self {
        SystolicError::InvalidDimension { what, rows, cols }
    }

    pub fn shape_mismatch(left: (usize, usize), right: (usize, usize)) -> Self {
        SystolicError::ShapeMismatch { left, right }
    }

    pub fn disconnected(row: usize, col: usize, signal: impl ToString) -> Self {
        SystolicError::Disconnected {
            row,
            col,
            signal: signal.to_string(),
        }
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        SystolicError::ParseError { message: msg.into() }
    }
}
