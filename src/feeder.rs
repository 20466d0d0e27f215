//! Lane streams feeding the array
//!
//! Every pass appends, per lane:
//! - activation lane `c + 1`: column `c` of the A tile, top to bottom
//! - weight lane `c + 1`: column `c` of the B tile, bottom to top
//!
//! Weights enter the top of a column and shift down one row per cycle, so
//! the last row's weight has to go in first. Reversing the column lines each
//! weight up with the activation that reaches its row in the same cycle.
//!
//! Sinks are opened (and truncated) once before the first pass. After that
//! they are only ever appended to.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::TileDims;
use crate::error::{SystolicError, SystolicResult};
use crate::matrix::Tile;

/// A single input stream of the array, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lane {
    Activation(usize),
    Weight(usize),
}

impl Lane {
    pub fn index(&self) -> usize {
        match self {
            Lane::Activation(n) | Lane::Weight(n) => *n,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Lane::Activation(_) => "activation",
            Lane::Weight(_) => "weight",
        }
    }

    /// File name used by [`LaneFiles`]
    pub fn file_name(&self) -> String {
        match self {
            Lane::Activation(n) => format!("activations_{}.txt", n),
            Lane::Weight(n) => format!("w{}.txt", n),
        }
    }

    /// Every lane of a tile shape, activations first
    pub fn all(tile: TileDims) -> impl Iterator<Item = Lane> {
        (1..=tile.rows)
            .map(Lane::Activation)
            .chain((1..=tile.cols).map(Lane::Weight))
    }
}

/// Destination for lane values
pub trait LaneSink {
    /// Append `values` to the end of `lane`
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()>;
}

impl<S: LaneSink + ?Sized> LaneSink for &mut S {
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()> {
        (**self).append(lane, values)
    }
}

/// Disabled sinks swallow every append
impl<S: LaneSink> LaneSink for Option<S> {
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()> {
        match self {
            Some(sink) => sink.append(lane, values),
            None => Ok(()),
        }
    }
}

/// Tee: both sinks receive every append, first one first
impl<A: LaneSink, B: LaneSink> LaneSink for (A, B) {
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()> {
        self.0.append(lane, values)?;
        self.1.append(lane, values)
    }
}

/// Turns tile pairs into lane appends
#[derive(Debug, Clone, Copy)]
pub struct StreamFeeder {
    tile: TileDims,
}

impl StreamFeeder {
    pub fn new(tile: TileDims) -> Self {
        Self { tile }
    }

    /// Append one pass worth of activations and weights to `sink`
    pub fn feed<S: LaneSink + ?Sized>(
        &self,
        sink: &mut S,
        tile_a: &Tile<'_>,
        tile_b: &Tile<'_>,
    ) -> SystolicResult<()> {
        if tile_a.cols() > self.tile.rows || tile_b.cols() > self.tile.cols {
            return Err(SystolicError::invalid_dimension("tile", tile_a.cols(), tile_b.cols()));
        }

        for c in 0..tile_a.cols() {
            let values: Vec<i64> = tile_a.column(c).collect();
            sink.append(Lane::Activation(c + 1), &values)?;
        }
        for c in 0..tile_b.cols() {
            let values: Vec<i64> = tile_b.column(c).rev().collect();
            sink.append(Lane::Weight(c + 1), &values)?;
        }
        Ok(())
    }
}

/// In-memory lane streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStreams {
    pub activations: Vec<Vec<i64>>,
    pub weights: Vec<Vec<i64>>,
}

impl LaneStreams {
    /// Empty streams for every lane of `tile`
    pub fn new(tile: TileDims) -> Self {
        Self {
            activations: vec![Vec::new(); tile.rows],
            weights: vec![Vec::new(); tile.cols],
        }
    }

    pub fn lane(&self, lane: Lane) -> Option<&[i64]> {
        let lanes = match lane {
            Lane::Activation(_) => &self.activations,
            Lane::Weight(_) => &self.weights,
        };
        lane.index()
            .checked_sub(1)
            .and_then(|idx| lanes.get(idx))
            .map(Vec::as_slice)
    }

    /// Append every buffered lane to `sink`, activations first
    pub fn replay<S: LaneSink + ?Sized>(&self, sink: &mut S) -> SystolicResult<()> {
        for (idx, values) in self.activations.iter().enumerate() {
            sink.append(Lane::Activation(idx + 1), values)?;
        }
        for (idx, values) in self.weights.iter().enumerate() {
            sink.append(Lane::Weight(idx + 1), values)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl LaneSink for LaneStreams {
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()> {
        let lanes = match lane {
            Lane::Activation(_) => &mut self.activations,
            Lane::Weight(_) => &mut self.weights,
        };
        let available = lanes.len();
        let stream = lane
            .index()
            .checked_sub(1)
            .and_then(|idx| lanes.get_mut(idx))
            .ok_or(SystolicError::UnknownLane {
                kind: lane.kind(),
                index: lane.index(),
                available,
            })?;
        stream.extend_from_slice(values);
        Ok(())
    }
}

/// One text file per lane, one decimal value per line
#[derive(Debug)]
pub struct LaneFiles {
    dir: PathBuf,
    activations: Vec<BufWriter<File>>,
    weights: Vec<BufWriter<File>>,
}

impl LaneFiles {
    /// Create (or truncate) every lane file of `tile` inside `dir`
    pub fn create(dir: impl AsRef<Path>, tile: TileDims) -> SystolicResult<Self> {
        tile.validate()?;
        let dir = dir.as_ref().to_path_buf();
        let open = |lane: Lane| -> SystolicResult<BufWriter<File>> {
            let path = dir.join(lane.file_name());
            log::debug!("opening {} lane {} at {}", lane.kind(), lane.index(), path.display());
            Ok(BufWriter::new(File::create(path)?))
        };

        let activations = (1..=tile.rows)
            .map(|n| open(Lane::Activation(n)))
            .collect::<SystolicResult<Vec<_>>>()?;
        let weights = (1..=tile.cols)
            .map(|n| open(Lane::Weight(n)))
            .collect::<SystolicResult<Vec<_>>>()?;

        Ok(Self {
            dir,
            activations,
            weights,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flush every lane to disk
    pub fn finish(mut self) -> SystolicResult<()> {
        for writer in self.activations.iter_mut().chain(self.weights.iter_mut()) {
            writer.flush()?;
        }
        Ok(())
    }
}

impl LaneSink for LaneFiles {
    fn append(&mut self, lane: Lane, values: &[i64]) -> SystolicResult<()> {
        let lanes = match lane {
            Lane::Activation(_) => &mut self.activations,
            Lane::Weight(_) => &mut self.weights,
        };
        let available = lanes.len();
        let writer = lane
            .index()
            .checked_sub(1)
            .and_then(|idx| lanes.get_mut(idx))
            .ok_or(SystolicError::UnknownLane {
                kind: lane.kind(),
                index: lane.index(),
                available,
            })?;
        for value in values {
            writeln!(writer, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::tiling::MatrixTiler;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn sample_a() -> Matrix {
        "[[9, 8, 7, 6], [5, 4, 3, 2], [1, 9, 8, 7]]".parse().unwrap()
    }

    fn sample_b() -> Matrix {
        "[[1, 2, 3, 2], [4, 5, 6, 3], [7, 8, 9, 6], [1, 2, 3, 1]]".parse().unwrap()
    }

    #[test]
    fn test_feed_single_pass() {
        let a: Matrix = "[[1, 2], [3, 4], [5, 6]]".parse().unwrap();
        let b: Matrix = "[[7, 8], [9, 10]]".parse().unwrap();
        let tile = TileDims::new(2, 2);
        let mut streams = LaneStreams::new(tile);
        StreamFeeder::new(tile)
            .feed(&mut streams, &a.view(), &b.view())
            .unwrap();

        assert_eq!(streams.activations, vec![vec![1, 3, 5], vec![2, 4, 6]]);
        assert_eq!(streams.weights, vec![vec![9, 7], vec![10, 8]]);
    }

    #[test]
    fn test_reference_scenario_streams() {
        let tile = TileDims::new(2, 2);
        let tiler = MatrixTiler::new(tile).unwrap();
        let (product, streams) = tiler
            .run(&sample_a(), &sample_b(), LaneStreams::new(tile))
            .unwrap();

        assert_eq!(product, sample_a().matmul(&sample_b()).unwrap());
        assert_eq!(
            streams.activations,
            vec![
                vec![9, 5, 1, 7, 3, 8, 9, 5, 1, 7, 3, 8],
                vec![8, 4, 9, 6, 2, 7, 8, 4, 9, 6, 2, 7],
            ]
        );
        assert_eq!(
            streams.weights,
            vec![vec![4, 1, 1, 7, 6, 3, 3, 9], vec![5, 2, 2, 8, 3, 2, 1, 6]]
        );
    }

    #[test]
    fn test_narrow_edge_tiles_use_leading_lanes() {
        // K = 3 and N = 3 with 2x2 tiles: the second contraction block and
        // the second column block are one wide
        let a: Matrix = "[[1, 2, 3]]".parse().unwrap();
        let b: Matrix = "[[1, 2, 3], [4, 5, 6], [7, 8, 9]]".parse().unwrap();
        let tile = TileDims::new(2, 2);
        let (_, streams) = MatrixTiler::new(tile)
            .unwrap()
            .run(&a, &b, LaneStreams::new(tile))
            .unwrap();

        assert_eq!(streams.lane(Lane::Activation(1)).unwrap(), &[1, 3, 1, 3]);
        assert_eq!(streams.lane(Lane::Activation(2)).unwrap(), &[2, 2]);
        assert_eq!(streams.lane(Lane::Weight(1)).unwrap(), &[4, 1, 7, 6, 3, 9]);
        assert_eq!(streams.lane(Lane::Weight(2)).unwrap(), &[5, 2, 8]);
    }

    #[test]
    fn test_deep_contraction_repeats_activations() {
        // K = 4 > N = 2: the column blocks past N carry no weights but still
        // replay the activation tiles
        let a: Matrix = "[[1, 2, 3, 4]]".parse().unwrap();
        let b: Matrix = "[[1, 2], [3, 4], [5, 6], [7, 8]]".parse().unwrap();
        let tile = TileDims::new(2, 2);
        let (product, streams) = MatrixTiler::new(tile)
            .unwrap()
            .run(&a, &b, LaneStreams::new(tile))
            .unwrap();

        assert_eq!(product.to_rows(), vec![vec![50, 60]]);
        assert_eq!(streams.activations, vec![vec![1, 3, 1, 3], vec![2, 4, 2, 4]]);
        assert_eq!(streams.weights, vec![vec![3, 1, 7, 5], vec![4, 2, 8, 6]]);
    }

    #[test]
    fn test_tee_and_optional_sinks() {
        let tile = TileDims::new(2, 2);
        let tiler = MatrixTiler::new(tile).unwrap();
        let sink = (LaneStreams::new(tile), Some(LaneStreams::new(tile)));
        let (_, (first, second)) = tiler.run(&sample_a(), &sample_b(), sink).unwrap();
        assert_eq!(Some(first), second);

        let sink: (LaneStreams, Option<LaneStreams>) = (LaneStreams::new(tile), None);
        let (_, (streams, disabled)) = tiler.run(&sample_a(), &sample_b(), sink).unwrap();
        assert!(disabled.is_none());
        assert_eq!(streams.weights[0].len(), 8);
    }

    #[test]
    fn test_unknown_lane() {
        let mut streams = LaneStreams::new(TileDims::new(1, 1));
        assert!(matches!(
            streams.append(Lane::Weight(2), &[1]),
            Err(SystolicError::UnknownLane { kind: "weight", index: 2, available: 1 })
        ));
        assert!(streams.append(Lane::Activation(0), &[1]).is_err());
        assert!(streams.lane(Lane::Activation(0)).is_none());
    }

    #[test]
    fn test_lane_files_truncate_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let tile = TileDims::new(2, 2);
        fs::write(dir.path().join("activations_1.txt"), "stale\n").unwrap();

        let files = LaneFiles::create(dir.path(), tile).unwrap();
        let (_, files) = MatrixTiler::new(tile)
            .unwrap()
            .run(&sample_a(), &sample_b(), files)
            .unwrap();
        files.finish().unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("activations_1.txt"), "9\n5\n1\n7\n3\n8\n9\n5\n1\n7\n3\n8\n");
        assert_eq!(read("w1.txt"), "4\n1\n1\n7\n6\n3\n3\n9\n");
        assert_eq!(read("w2.txt"), "5\n2\n2\n8\n3\n2\n1\n6\n");
    }

    #[test]
    fn test_replayed_streams_match_direct_files() {
        let tile = TileDims::new(2, 2);
        let tiler = MatrixTiler::new(tile).unwrap();
        let direct = tempfile::tempdir().unwrap();
        let (_, files) = tiler
            .run(&sample_a(), &sample_b(), LaneFiles::create(direct.path(), tile).unwrap())
            .unwrap();
        files.finish().unwrap();

        let (_, streams) = tiler
            .run(&sample_a(), &sample_b(), LaneStreams::new(tile))
            .unwrap();
        let replayed = tempfile::tempdir().unwrap();
        let mut files = LaneFiles::create(replayed.path(), tile).unwrap();
        streams.replay(&mut files).unwrap();
        files.finish().unwrap();

        for lane in Lane::all(tile) {
            assert_eq!(
                fs::read_to_string(replayed.path().join(lane.file_name())).unwrap(),
                fs::read_to_string(direct.path().join(lane.file_name())).unwrap(),
                "{:?}",
                lane
            );
        }
    }

    #[test]
    fn test_lane_files_opened_even_when_unused() {
        let dir = tempfile::tempdir().unwrap();
        let tile = TileDims::new(3, 2);
        let files = LaneFiles::create(dir.path(), tile).unwrap();
        files.finish().unwrap();
        for lane in Lane::all(tile) {
            assert_eq!(fs::read_to_string(dir.path().join(lane.file_name())).unwrap(), "");
        }
    }

    #[test]
    fn test_lane_files_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            LaneFiles::create(&missing, TileDims::new(1, 1)),
            Err(SystolicError::Sink(_))
        ));
    }
}
