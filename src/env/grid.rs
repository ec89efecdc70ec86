use serde::{Deserialize, Serialize};

/// Row-major occupancy bits of the layout grid.
///
/// There is no way to clear a cell: once occupied it stays occupied until the
/// grid is dropped at the end of the episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridState {
    rows: usize,
    cols: usize,
    cells: Vec<bool>,
}

impl GridState {
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// `action -> (action / cols, action % cols)`; the result may be out of bounds
    pub fn decode(&self, action: usize) -> (usize, usize) {
        (action / self.cols.max(1), action % self.cols.max(1))
    }

    /// Inverse of `decode` for in-bounds cells
    pub fn encode(&self, row: usize, col: usize) -> Option<usize> {
        self.in_bounds(row, col).then(|| row * self.cols + col)
    }

    pub fn is_occupied(&self, row: usize, col: usize) -> bool {
        self.encode(row, col).is_some_and(|idx| self.cells[idx])
    }

    /// Mark a cell occupied. Returns false if it was out of bounds or already taken.
    pub fn occupy(&mut self, row: usize, col: usize) -> bool {
        match self.encode(row, col) {
            Some(idx) if !self.cells[idx] => {
                self.cells[idx] = true;
                true
            }
            _ => false,
        }
    }

    /// Returns indices of all empty cells
    pub fn available_actions(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, occupied)| if *occupied { None } else { Some(i) })
            .collect()
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|c| *c)
    }

    /// Flattened grid as 0.0 / 1.0
    pub fn features(&self) -> impl Iterator<Item = f32> + '_ {
        self.cells.iter().map(|c| if *c { 1.0 } else { 0.0 })
    }
}
