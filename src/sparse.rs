//! Sparse matrix of probabilities.
//!
//! Rows are written once each, in any order (`set_row`, repeated
//! `add_column_value_to_current_row`, `finish_row`), then the matrix is
//! compacted by [`optimize_and_seal`] into compressed-row form, after which it
//! is read-only.
//!
//! [`optimize_and_seal`]: SparseMatrix::optimize_and_seal

use log::debug;

use crate::error::ModelError;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColumnValue {
    pub column: usize,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct SparseMatrix {
    /// Start of each row in `entries`. After sealing, row `r` spans `row_start[r]..row_start[r + 1]`.
    row_start: Vec<usize>,
    /// Length of each row; only used before sealing.
    row_length: Vec<usize>,
    entries: Vec<ColumnValue>,
    row_capacity: usize,
    entry_capacity: usize,
    current_row: Option<usize>,
    sealed: bool,
}

impl SparseMatrix {
    const UNSET: usize = usize::MAX;

    pub fn new(row_capacity: usize, entry_capacity: usize) -> Self {
        Self {
            row_start: Vec::new(),
            row_length: Vec::new(),
            entries: Vec::new(),
            row_capacity,
            entry_capacity,
            current_row: None,
            sealed: false,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of rows (the highest row written plus one).
    pub fn row_count(&self) -> usize {
        if self.sealed {
            self.row_start.len() - 1
        } else {
            self.row_length.len()
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Starts writing row `row`.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is sealed, another row is being written, or `row` was already written.
    pub fn set_row(&mut self, row: usize) -> Result<(), ModelError> {
        assert!(!self.sealed, "Matrix is sealed");
        assert!(self.current_row.is_none(), "Row {:?} is not finished", self.current_row);
        if row >= self.row_capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "matrix rows",
                capacity: self.row_capacity,
            });
        }
        if row >= self.row_start.len() {
            self.row_start.resize(row + 1, Self::UNSET);
            self.row_length.resize(row + 1, 0);
        }
        assert_eq!(self.row_start[row], Self::UNSET, "Row {} was already written", row);
        self.row_start[row] = self.entries.len();
        self.current_row = Some(row);
        Ok(())
    }

    pub fn add_column_value_to_current_row(&mut self, column: usize, value: f64) -> Result<(), ModelError> {
        assert!(self.current_row.is_some(), "No row is being written");
        if self.entries.len() >= self.entry_capacity {
            return Err(ModelError::CapacityExceeded {
                resource: "matrix entries",
                capacity: self.entry_capacity,
            });
        }
        self.entries.push(ColumnValue { column, value });
        Ok(())
    }

    /// Finishes the current row. Its entries are sorted by column and duplicate columns are summed.
    pub fn finish_row(&mut self) {
        let Some(row) = self.current_row.take() else {
            panic!("No row is being written");
        };
        let start = self.row_start[row];
        let current = &mut self.entries[start..];
        current.sort_by_key(|e| e.column);

        let mut merged = start;
        for i in start..self.entries.len() {
            if merged > start && self.entries[merged - 1].column == self.entries[i].column {
                self.entries[merged - 1].value += self.entries[i].value;
            } else {
                self.entries[merged] = self.entries[i];
                merged += 1;
            }
        }
        self.entries.truncate(merged);
        self.row_length[row] = merged - start;
    }

    /// Compacts the storage so that rows are stored in order, then forbids further writes.
    pub fn optimize_and_seal(&mut self) {
        assert!(self.current_row.is_none(), "Row {:?} is not finished", self.current_row);
        if self.sealed {
            return;
        }
        let rows = self.row_length.len();
        let mut entries = Vec::with_capacity(self.entries.len());
        let mut row_start = Vec::with_capacity(rows + 1);
        for row in 0..rows {
            row_start.push(entries.len());
            let start = self.row_start[row];
            if start != Self::UNSET {
                entries.extend_from_slice(&self.entries[start..start + self.row_length[row]]);
            }
        }
        row_start.push(entries.len());
        debug!("sealed matrix with {} rows and {} entries", rows, entries.len());

        self.entries = entries;
        self.row_start = row_start;
        self.row_length = Vec::new();
        self.sealed = true;
    }

    /// Entries of `row`, sorted by column.
    pub fn row(&self, row: usize) -> &[ColumnValue] {
        if self.sealed {
            return &self.entries[self.row_start[row]..self.row_start[row + 1]];
        }
        match self.row_start.get(row) {
            Some(&start) if start != Self::UNSET => &self.entries[start..start + self.row_length[row]],
            _ => &[],
        }
    }

    /// Rows with their index.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[ColumnValue])> {
        (0..self.row_count()).map(move |r| (r, self.row(r)))
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        let entries = self.row(row);
        entries
            .binary_search_by_key(&column, |e| e.column)
            .map_or(0.0, |i| entries[i].value)
    }

    /// Computes `M * x`.
    ///
    /// # Panics
    ///
    /// Panics if the matrix is not sealed.
    pub fn multiply_with_vector(&self, x: &[f64]) -> Vec<f64> {
        assert!(self.sealed, "Matrix must be sealed");
        (0..self.row_count())
            .map(|r| self.row(r).iter().map(|e| e.value * x[e.column]).sum())
            .collect()
    }
}
