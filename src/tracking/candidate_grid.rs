//! CandidateGrid - per-frame candidate points addressed by pixel row/column.
//!
//! The feature stage fills the grid; the tracker drains it. Every candidate
//! leaves the grid exactly once, either through [`CandidateGrid::take`] when
//! it is matched to a previous point or through [`CandidateGrid::drain`] when
//! it is admitted as a new point.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::map::{FramePoint, GridCell};

/// Sparse pixel grid of candidate points, at most one per cell.
#[derive(Debug, Clone, Default)]
pub struct CandidateGrid {
    rows: usize,
    cols: usize,
    cells: BTreeMap<GridCell, FramePoint>,
}

impl CandidateGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Insert a candidate at its image location.
    ///
    /// The point's cell is stamped from the rounded left image coordinates.
    /// Returns the candidate it displaced, or the point itself if it falls
    /// outside the grid.
    pub fn insert(&mut self, mut point: FramePoint) -> Option<FramePoint> {
        let row = point.image_row();
        let col = point.image_col();
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return Some(point);
        }
        let cell = GridCell::new(row as usize, col as usize);
        point.cell = cell;
        self.cells.insert(cell, point)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&FramePoint> {
        self.cells.get(&GridCell::new(row, col))
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.cells.contains_key(&GridCell::new(row, col))
    }

    /// Remove the candidate at `(row, col)` and hand over ownership.
    pub fn take(&mut self, row: usize, col: usize) -> Option<FramePoint> {
        self.cells.remove(&GridCell::new(row, col))
    }

    /// Candidates inside an inclusive pixel window, in row-major order.
    pub fn window(
        &self,
        rows: RangeInclusive<usize>,
        cols: RangeInclusive<usize>,
    ) -> impl Iterator<Item = (&GridCell, &FramePoint)> + '_ {
        let (col_start, col_end) = (*cols.start(), *cols.end());
        rows.flat_map(move |row| {
            self.cells
                .range(GridCell::new(row, col_start)..=GridCell::new(row, col_end))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GridCell, &FramePoint)> + '_ {
        self.cells.iter()
    }

    /// Remove every remaining candidate, in row-major order.
    pub fn drain(&mut self) -> impl Iterator<Item = FramePoint> {
        std::mem::take(&mut self.cells).into_values()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
