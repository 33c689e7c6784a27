use heapless::Vec;

use crate::defs::{MAX_COLUMNS, MAX_ROWS, ROW_SELECT_PHASES, SELECT_PAIR_PHASES};
use crate::matrix::Matrix;

/// Largest key-scan report: three bytes for each of 36 devices.
pub const MAX_REPORT_LEN: usize = 3 * MAX_COLUMNS * MAX_ROWS;

/// Per-device encoding of a key-scan report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportFormat {
  /// One byte per device carrying the five select-pair phases.
  SelectPair,
  /// Three bytes per device, LSB first, carrying `2 + channels` phases.
  RowSelect { channels: u8 },
}

impl ReportFormat {
  fn phases(self) -> u32 {
    match self {
      ReportFormat::SelectPair => SELECT_PAIR_PHASES as u32,
      ReportFormat::RowSelect { channels } => (2 + channels as u32).min(ROW_SELECT_PHASES as u32),
    }
  }

  fn width(self) -> usize {
    match self {
      ReportFormat::SelectPair => 1,
      ReportFormat::RowSelect { .. } => 3,
    }
  }
}

/// Line levels sampled during one key-scan, one bit per phase.
#[derive(Debug, Clone, Default)]
pub struct ScanResults {
  samples: [[u32; MAX_ROWS]; MAX_COLUMNS],
}

impl ScanResults {
  pub fn clear(&mut self) {
    self.samples = [[0; MAX_ROWS]; MAX_COLUMNS];
  }

  /// Store the level of one line observed during `phase`.
  pub fn record(&mut self, column: u8, row: u8, phase: usize, high: bool) {
    let Some(device) = self.samples.get_mut(column as usize).and_then(|c| c.get_mut(row as usize)) else {
      return;
    };
    let bit = 1u32 << phase;
    if high {
      *device |= bit;
    } else {
      *device &= !bit;
    }
  }

  pub fn device(&self, column: u8, row: u8) -> u32 {
    self.samples.get(column as usize).and_then(|c| c.get(row as usize)).copied().unwrap_or(0)
  }

  /// Encode every device of `matrix`, columns outer and rows inner.
  pub fn report(&self, matrix: Matrix, format: ReportFormat) -> Vec<u8, MAX_REPORT_LEN> {
    let mask = (1u32 << format.phases()) - 1;
    let width = format.width();

    let mut out = Vec::new();
    for pos in matrix.positions() {
      let bytes = (self.device(pos.column, pos.row) & mask).to_le_bytes();
      // At most 36 devices of 3 bytes each.
      out.extend_from_slice(&bytes[..width]).ok();
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn select_pair_report_is_one_byte_per_device() {
    let matrix = Matrix::new(2, 2).expect("valid dimensions");
    let mut results = ScanResults::default();
    results.record(0, 1, 0, true);
    results.record(1, 0, 4, true);
    results.record(1, 1, 2, true);
    // Phases past the fifth are not reported.
    results.record(1, 1, 6, true);

    let report = results.report(matrix, ReportFormat::SelectPair);
    assert_eq!(report.as_slice(), &[0x00, 0x01, 0x10, 0x04]);
  }

  #[test]
  fn row_select_report_is_three_bytes_lsb_first() {
    let matrix = Matrix::new(1, 2).expect("valid dimensions");
    let mut results = ScanResults::default();
    results.record(0, 0, 0, true);
    results.record(0, 0, 9, true);
    results.record(0, 1, 21, true);

    let report = results.report(matrix, ReportFormat::RowSelect { channels: 20 });
    assert_eq!(report.as_slice(), &[0x01, 0x02, 0x00, 0x00, 0x00, 0x20]);

    let narrow = results.report(matrix, ReportFormat::RowSelect { channels: 4 });
    assert_eq!(narrow.as_slice(), &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
  }

  #[test]
  fn record_low_clears_previous_sample() {
    let mut results = ScanResults::default();
    results.record(2, 3, 1, true);
    results.record(2, 3, 1, false);
    assert_eq!(results.device(2, 3), 0);
  }

  #[test]
  fn row_select_report_never_exceeds_twenty_channels() {
    let matrix = Matrix::new(1, 1).expect("valid dimensions");
    let mut results = ScanResults::default();
    results.record(0, 0, 21, true);
    results.record(0, 0, 22, true);

    let report = results.report(matrix, ReportFormat::RowSelect { channels: 40 });
    assert_eq!(report.as_slice(), &[0x00, 0x00, 0x20]);
  }

  #[test]
  fn out_of_range_positions_are_ignored() {
    let mut results = ScanResults::default();
    results.record(6, 0, 0, true);
    assert_eq!(results.device(6, 0), 0);
  }
}
