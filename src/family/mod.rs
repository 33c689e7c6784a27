//! Per-family device addressing.
//!
//! Each family isolates one device on the shared bus lines by walking the
//! matrix select lines through an enter/exit handshake, and can sample a whole
//! column of devices for a key-scan. Only one device is ever entered at a time.

mod row_select;
mod select_pair;

pub use row_select::RowSelect;
pub use select_pair::SelectPair;

use embedded_hal::delay::DelayNs;

use crate::command::DecodeError;
use crate::config::PinSettings;
use crate::defs::{Device, STANDBY_EXIT_HOLD_US};
use crate::lines::{HandshakeTimeout, LineMask, Lines, Signals};
use crate::matrix::Matrix;
use crate::scan::{ReportFormat, ScanResults};

/// Requested power-mode transition, as sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeChange {
  Exit,
  Enter,
  /// Any other value: acknowledged without touching the lines.
  Unchanged,
}

impl From<u8> for ModeChange {
  fn from(value: u8) -> Self {
    match value {
      1 => ModeChange::Exit,
      2 => ModeChange::Enter,
      _ => ModeChange::Unchanged,
    }
  }
}

/// Line protocol that isolates one device of a matrix.
pub trait Addressing {
  /// Hand every line the matrix uses to software control, released.
  fn configure<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>);

  /// Arm every device of `column` for addressing.
  fn enter_column<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, column: u8);

  /// Put the device at `column`/`row` on the bus. `enter_column` must have run
  /// for families that arm whole columns.
  fn enter_row<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    row: u8,
  ) -> Result<(), HandshakeTimeout>;

  /// Take the device in `row` off the bus.
  fn exit_row<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, row: u8) -> Result<(), HandshakeTimeout>;

  /// Sample every device of `column` into `results`.
  fn scan_column<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    channels: u8,
    results: &mut ScanResults,
  );

  /// Stop driving every matrix line.
  fn release<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>);

  fn standby<L: Lines, D: DelayNs>(&self, _signals: &mut Signals<L, D>, _change: ModeChange) {}

  fn autonomous<L: Lines, D: DelayNs>(&self, _signals: &mut Signals<L, D>, _change: ModeChange) {}
}

/// Addressing protocol selected by the setup command.
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
  SelectPair(SelectPair),
  RowSelect(RowSelect),
  /// Devices sit directly on the bus with unique addresses.
  Direct,
}

impl Addressing for Protocol {
  fn configure<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    match self {
      Protocol::SelectPair(p) => p.configure(signals),
      Protocol::RowSelect(p) => p.configure(signals),
      Protocol::Direct => {}
    }
  }

  fn enter_column<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, column: u8) {
    match self {
      Protocol::SelectPair(p) => p.enter_column(signals, column),
      Protocol::RowSelect(p) => p.enter_column(signals, column),
      Protocol::Direct => {}
    }
  }

  fn enter_row<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    row: u8,
  ) -> Result<(), HandshakeTimeout> {
    match self {
      Protocol::SelectPair(p) => p.enter_row(signals, column, row),
      Protocol::RowSelect(p) => p.enter_row(signals, column, row),
      Protocol::Direct => Ok(()),
    }
  }

  fn exit_row<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, row: u8) -> Result<(), HandshakeTimeout> {
    match self {
      Protocol::SelectPair(p) => p.exit_row(signals, row),
      Protocol::RowSelect(p) => p.exit_row(signals, row),
      Protocol::Direct => Ok(()),
    }
  }

  fn scan_column<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    channels: u8,
    results: &mut ScanResults,
  ) {
    match self {
      Protocol::SelectPair(p) => p.scan_column(signals, column, channels, results),
      Protocol::RowSelect(p) => p.scan_column(signals, column, channels, results),
      Protocol::Direct => {}
    }
  }

  fn release<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    match self {
      Protocol::SelectPair(p) => p.release(signals),
      Protocol::RowSelect(p) => p.release(signals),
      Protocol::Direct => {}
    }
  }

  fn standby<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, change: ModeChange) {
    match self {
      Protocol::SelectPair(p) => p.standby(signals, change),
      Protocol::RowSelect(p) => p.standby(signals, change),
      Protocol::Direct => {}
    }
  }

  fn autonomous<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, change: ModeChange) {
    match self {
      Protocol::SelectPair(p) => p.autonomous(signals, change),
      Protocol::RowSelect(p) => p.autonomous(signals, change),
      Protocol::Direct => {}
    }
  }
}

/// Device kind, matrix shape and addressing protocol fixed by a setup command.
#[derive(Debug, Clone, Copy)]
pub struct Setup {
  device: Device,
  matrix: Matrix,
  protocol: Protocol,
}

impl Setup {
  /// Bind `device` to `matrix`, checking the matrix fits the line tables.
  pub fn new(device: Device, matrix: Matrix, pins: &PinSettings) -> Result<Self, DecodeError> {
    let (max_columns, max_rows, protocol) = match device {
      Device::Iqs7220a | Device::Iqs7320a => {
        let pins = pins.select_pair;
        (pins.max_columns(), pins.max_rows(), Protocol::SelectPair(SelectPair::new(pins, matrix)))
      }
      Device::Iqs9320KeyScan => {
        let pins = pins.row_select;
        (pins.max_columns(), pins.max_rows(), Protocol::RowSelect(RowSelect::new(pins, matrix)))
      }
      Device::Iqs9320Direct => (usize::MAX, usize::MAX, Protocol::Direct),
    };

    if matrix.columns() as usize > max_columns || matrix.rows() as usize > max_rows {
      return Err(DecodeError::InvalidMatrix { columns: matrix.columns(), rows: matrix.rows() });
    }
    Ok(Self { device, matrix, protocol })
  }

  pub fn device(&self) -> Device {
    self.device
  }

  pub fn matrix(&self) -> Matrix {
    self.matrix
  }

  pub fn protocol(&self) -> &Protocol {
    &self.protocol
  }

  pub fn report_format(&self, channels: u8) -> ReportFormat {
    match self.protocol {
      Protocol::RowSelect(_) => ReportFormat::RowSelect { channels },
      Protocol::SelectPair(_) | Protocol::Direct => ReportFormat::SelectPair,
    }
  }
}

/// Mask for entry `index` of a role table, empty past its end.
fn mask(table: &[LineMask], index: u8) -> LineMask {
  table.get(index as usize).copied().unwrap_or(0)
}

/// Union of the first `count` entries of a role table.
fn union(table: &[LineMask], count: u8) -> LineMask {
  table.iter().take(count as usize).fold(0, |acc, m| acc | m)
}

/// Broadcast power-mode sequence shared by the families that support one:
/// `data` acts as the mode line and `select` as the strobe.
fn mode_sequence<L: Lines, D: DelayNs>(
  signals: &mut Signals<L, D>,
  data: LineMask,
  select: LineMask,
  change: ModeChange,
) {
  match change {
    ModeChange::Enter => {
      signals.drive_low(data);
      signals.settle();
      signals.drive_low(select);
      signals.settle();
      signals.release(data);
      signals.settle();
      signals.release(select);
      signals.settle();
    }
    ModeChange::Exit => {
      signals.drive_low(data);
      signals.settle();
      signals.drive_low(select);
      signals.hold_us(STANDBY_EXIT_HOLD_US);
      signals.release(select);
      signals.settle();
      signals.release(data);
      signals.settle();
    }
    ModeChange::Unchanged => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mode_change_decodes_host_values() {
    assert_eq!(ModeChange::from(1), ModeChange::Exit);
    assert_eq!(ModeChange::from(2), ModeChange::Enter);
    assert_eq!(ModeChange::from(0), ModeChange::Unchanged);
    assert_eq!(ModeChange::from(3), ModeChange::Unchanged);
  }

  #[test]
  fn setup_rejects_matrix_wider_than_pin_tables() {
    let pins = PinSettings::default();
    let wide = Matrix::new(6, 4).expect("valid dimensions");
    assert!(matches!(
      Setup::new(Device::Iqs9320KeyScan, wide, &pins),
      Err(DecodeError::InvalidMatrix { columns: 6, rows: 4 })
    ));
    assert!(Setup::new(Device::Iqs7220a, Matrix::new(4, 6).expect("valid dimensions"), &pins).is_ok());
    assert!(Setup::new(Device::Iqs9320Direct, Matrix::new(6, 6).expect("valid dimensions"), &pins).is_ok());
  }

  #[test]
  fn report_format_follows_protocol() {
    let pins = PinSettings::default();
    let matrix = Matrix::new(2, 2).expect("valid dimensions");
    let a = Setup::new(Device::Iqs7320a, matrix, &pins).expect("fits");
    let c = Setup::new(Device::Iqs9320KeyScan, matrix, &pins).expect("fits");
    assert_eq!(a.report_format(9), ReportFormat::SelectPair);
    assert_eq!(c.report_format(9), ReportFormat::RowSelect { channels: 9 });
  }

  #[test]
  fn union_stops_at_count() {
    assert_eq!(union(&[0b001, 0b010, 0b100], 2), 0b011);
    assert_eq!(mask(&[0b001], 3), 0);
  }
}
