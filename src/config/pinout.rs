use crate::lines::LineMask;

/// GPIO line masks for the reference carrier board, one entry per column or row.
mod reference {
  use crate::lines::LineMask;

  pub(super) const C0: [LineMask; 5] = [
    1 << 16, // GPIO 16
    1 << 17, // GPIO 17
    1 << 22, // GPIO 22
    1 << 26, // GPIO 26
    1 << 27, // GPIO 27
  ];
  pub(super) const R0: [LineMask; 4] = [1 << 0, 1 << 4, 1 << 8, 1 << 12];
  pub(super) const R1: [LineMask; 4] = [1 << 1, 1 << 5, 1 << 9, 1 << 13];
  pub(super) const R2: [LineMask; 4] = [1 << 2, 1 << 6, 1 << 10, 1 << 14];
  pub(super) const R3: [LineMask; 4] = [1 << 3, 1 << 7, 1 << 11, 1 << 15];

  pub(super) const S0: [LineMask; 4] = [1 << 12, 1 << 14, 1 << 16, 1 << 22];
  pub(super) const S1: [LineMask; 4] = [1 << 13, 1 << 15, 1 << 17, 1 << 26];
  pub(super) const D0: [LineMask; 6] = [1 << 0, 1 << 2, 1 << 4, 1 << 6, 1 << 8, 1 << 10];
  pub(super) const D1: [LineMask; 6] = [1 << 1, 1 << 3, 1 << 5, 1 << 7, 1 << 9, 1 << 11];
}

/// Lines of the row-select matrix (IQS9320 key-scan interface).
#[derive(Debug, Clone, Copy)]
pub struct RowSelectPins {
  /// One C0 line per column.
  pub c0: &'static [LineMask],
  /// R0..R3 lines, one entry per row in each table.
  pub r: [&'static [LineMask]; 4],
}

impl RowSelectPins {
  pub const fn new(c0: &'static [LineMask], r: [&'static [LineMask]; 4]) -> Self {
    Self { c0, r }
  }

  pub const fn max_columns(&self) -> usize {
    self.c0.len()
  }

  pub const fn max_rows(&self) -> usize {
    let mut rows = self.r[0].len();
    let mut i = 1;
    while i < 4 {
      if self.r[i].len() < rows {
        rows = self.r[i].len();
      }
      i += 1;
    }
    rows
  }

  pub fn is_well_formed(&self) -> bool {
    disjoint(self.c0) && self.r.iter().all(|role| disjoint(role))
  }
}

/// Lines of the select-pair matrix (IQS7220A / IQS7320A).
#[derive(Debug, Clone, Copy)]
pub struct SelectPairPins {
  /// S0 and S1 select lines, one entry per column.
  pub s0: &'static [LineMask],
  pub s1: &'static [LineMask],
  /// D0 and D1 data lines, one entry per row.
  pub d0: &'static [LineMask],
  pub d1: &'static [LineMask],
}

impl SelectPairPins {
  pub const fn new(
    s0: &'static [LineMask],
    s1: &'static [LineMask],
    d0: &'static [LineMask],
    d1: &'static [LineMask],
  ) -> Self {
    Self { s0, s1, d0, d1 }
  }

  pub const fn max_columns(&self) -> usize {
    if self.s0.len() < self.s1.len() {
      self.s0.len()
    } else {
      self.s1.len()
    }
  }

  pub const fn max_rows(&self) -> usize {
    if self.d0.len() < self.d1.len() {
      self.d0.len()
    } else {
      self.d1.len()
    }
  }

  pub fn is_well_formed(&self) -> bool {
    disjoint(self.s0) && disjoint(self.s1) && disjoint(self.d0) && disjoint(self.d1)
  }
}

/// Line tables for every supported matrix wiring.
#[derive(Debug, Clone, Copy)]
pub struct PinSettings {
  pub row_select: RowSelectPins,
  pub select_pair: SelectPairPins,
}

impl PinSettings {
  /// Tables for the reference carrier board.
  pub const fn new() -> Self {
    Self {
      row_select: RowSelectPins::new(&reference::C0, [&reference::R0, &reference::R1, &reference::R2, &reference::R3]),
      select_pair: SelectPairPins::new(&reference::S0, &reference::S1, &reference::D0, &reference::D1),
    }
  }

  pub const fn with_row_select(mut self, pins: RowSelectPins) -> Self {
    self.row_select = pins;
    self
  }

  pub const fn with_select_pair(mut self, pins: SelectPairPins) -> Self {
    self.select_pair = pins;
    self
  }
}

impl Default for PinSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// Masks within one role must not share a line.
fn disjoint(masks: &[LineMask]) -> bool {
  let mut seen: LineMask = 0;
  for &mask in masks {
    if seen & mask != 0 {
      return false;
    }
    seen |= mask;
  }
  true
}
