use crate::defs::{MAX_COLUMNS, MAX_ROWS};

/// Location of one device in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
  pub column: u8,
  pub row: u8,
}

/// Logical `columns x rows` grid of devices of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Matrix {
  columns: u8,
  rows: u8,
}

impl Matrix {
  /// `None` unless both dimensions are in `1..=6`.
  pub const fn new(columns: u8, rows: u8) -> Option<Self> {
    if columns == 0 || rows == 0 || columns as usize > MAX_COLUMNS || rows as usize > MAX_ROWS {
      return None;
    }
    Some(Self { columns, rows })
  }

  pub const fn columns(&self) -> u8 {
    self.columns
  }

  pub const fn rows(&self) -> u8 {
    self.rows
  }

  /// Number of devices.
  pub const fn len(&self) -> usize {
    self.columns as usize * self.rows as usize
  }

  pub const fn contains(&self, index: u8) -> bool {
    (index as usize) < self.len()
  }

  /// Map a linear device index to its column and row.
  pub const fn locate(&self, index: u8) -> Option<Position> {
    if !self.contains(index) {
      return None;
    }
    Some(Position { column: index / self.rows, row: index % self.rows })
  }

  /// Every position, columns outer and rows inner.
  pub fn positions(&self) -> impl Iterator<Item = Position> {
    let rows = self.rows;
    (0..self.columns).flat_map(move |column| (0..rows).map(move |row| Position { column, row }))
  }
}

/// Devices a matrix-addressed operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Target {
  /// One device, by linear index.
  Device(u8),
  /// Every device, columns outer and rows inner.
  All,
}
