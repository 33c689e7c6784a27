use embedded_hal::delay::DelayNs;

use super::{mask, mode_sequence, union, Addressing, ModeChange};
use crate::config::SelectPairPins;
use crate::lines::{HandshakeTimeout, Level, LineMask, Lines, Signals};
use crate::log::trace;
use crate::matrix::Matrix;
use crate::scan::ScanResults;

/// IQS7220A / IQS7320A matrix: an S0/S1 select pair per column and a D0/D1
/// data pair per row.
///
/// Pulsing S0 and S1 of a column arms its devices; a rising edge on D1 then
/// moves the device in that row onto the bus, which it confirms by pulling D0
/// low. Pulling D1 low again ends the session and the device lets D0 rise.
#[derive(Debug, Clone, Copy)]
pub struct SelectPair {
  pins: SelectPairPins,
  matrix: Matrix,
}

impl SelectPair {
  pub fn new(pins: SelectPairPins, matrix: Matrix) -> Self {
    Self { pins, matrix }
  }

  fn select(&self, column: u8) -> LineMask {
    mask(self.pins.s0, column) | mask(self.pins.s1, column)
  }

  fn all_select(&self) -> LineMask {
    union(self.pins.s0, self.matrix.columns()) | union(self.pins.s1, self.matrix.columns())
  }

  fn all_d0(&self) -> LineMask {
    union(self.pins.d0, self.matrix.rows())
  }

  fn all_d1(&self) -> LineMask {
    union(self.pins.d1, self.matrix.rows())
  }

  fn sample_rows<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    results: &mut ScanResults,
    phases: &[(usize, &[LineMask])],
  ) {
    let levels = signals.sample();
    for row in 0..self.matrix.rows() {
      for &(phase, table) in phases {
        results.record(column, row, phase, levels & mask(table, row) != 0);
      }
    }
  }
}

impl Addressing for SelectPair {
  fn configure<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    signals.prepare(self.all_select() | self.all_d0() | self.all_d1());
  }

  fn enter_column<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, column: u8) {
    let select = self.select(column);
    signals.drive_low(select);
    signals.settle();
    signals.release(select);
    signals.settle();
  }

  fn enter_row<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    row: u8,
  ) -> Result<(), HandshakeTimeout> {
    trace!("select-pair: enter {}/{}", column, row);
    let d1 = mask(self.pins.d1, row);
    signals.drive_low(d1);
    signals.settle();
    signals.release(d1);
    signals.settle();
    signals.await_level(mask(self.pins.d0, row), Level::Low)?;
    Ok(())
  }

  fn exit_row<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, row: u8) -> Result<(), HandshakeTimeout> {
    let d1 = mask(self.pins.d1, row);
    signals.drive_low(d1);
    signals.settle();
    let done = signals.await_level(mask(self.pins.d0, row), Level::High);
    signals.release(d1);
    signals.settle();
    done.map(|_| ())
  }

  fn scan_column<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    _channels: u8,
    results: &mut ScanResults,
  ) {
    let s0 = mask(self.pins.s0, column);
    let s1 = mask(self.pins.s1, column);
    let (d0, d1) = (self.pins.d0, self.pins.d1);

    // Reset state
    signals.drive_low(s0 | s1);
    signals.settle();
    self.sample_rows(signals, column, results, &[(0, d0)]);

    // Channels 0 and 1
    signals.release(s0);
    signals.settle();
    self.sample_rows(signals, column, results, &[(1, d0), (2, d1)]);

    // Channels 2 and 3
    signals.drive_low(s0);
    signals.release(s1);
    signals.settle();
    self.sample_rows(signals, column, results, &[(3, d0), (4, d1)]);

    signals.release(s0);
    signals.settle();
  }

  fn release<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    signals.release(self.all_select() | self.all_d0() | self.all_d1());
  }

  fn standby<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, change: ModeChange) {
    mode_sequence(signals, self.all_d1(), self.all_select(), change);
  }

  fn autonomous<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, change: ModeChange) {
    mode_sequence(signals, self.all_d0(), self.all_select(), change);
  }
}
