use embedded_hal::delay::DelayNs;

use super::{mask, mode_sequence, union, Addressing, ModeChange};
use crate::config::RowSelectPins;
use crate::defs::MAX_KEY_SCAN_CHANNELS;
use crate::lines::{HandshakeTimeout, Level, LineMask, Lines, Signals};
use crate::log::trace;
use crate::matrix::Matrix;
use crate::scan::ScanResults;

/// IQS9320 key-scan matrix: one C0 strobe per column and R0..R3 per row.
///
/// A device is addressed by strobing its column while its own R0 and every
/// other row's R3 are held low; once released it answers on R1.
#[derive(Debug, Clone, Copy)]
pub struct RowSelect {
  pins: RowSelectPins,
  matrix: Matrix,
}

impl RowSelect {
  pub fn new(pins: RowSelectPins, matrix: Matrix) -> Self {
    Self { pins, matrix }
  }

  fn all_c0(&self) -> LineMask {
    union(self.pins.c0, self.matrix.columns())
  }

  fn all_r(&self, role: usize) -> LineMask {
    union(self.pins.r[role], self.matrix.rows())
  }

  fn every_line(&self) -> LineMask {
    self.all_c0() | (0..4).fold(0, |acc, role| acc | self.all_r(role))
  }
}

impl Addressing for RowSelect {
  fn configure<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    signals.prepare(self.every_line());
  }

  /// Columns are strobed as part of [`Addressing::enter_row`].
  fn enter_column<L: Lines, D: DelayNs>(&self, _signals: &mut Signals<L, D>, _column: u8) {}

  fn enter_row<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    row: u8,
  ) -> Result<(), HandshakeTimeout> {
    trace!("row-select: enter {}/{}", column, row);
    let c0 = mask(self.pins.c0, column);
    let r3 = self.all_r(3);

    signals.drive_low(mask(self.pins.r[0], row));
    signals.drive_low(r3 & !mask(self.pins.r[3], row));
    signals.drive_low(c0);
    signals.settle();
    signals.release(c0);
    signals.settle();
    signals.release(self.all_r(0) | r3);
    signals.settle();

    signals.await_level(mask(self.pins.r[1], row), Level::Low)?;
    Ok(())
  }

  fn exit_row<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, row: u8) -> Result<(), HandshakeTimeout> {
    let r0 = mask(self.pins.r[0], row);
    signals.drive_low(r0);
    signals.settle();
    let done = signals.await_level(mask(self.pins.r[1], row), Level::High);
    signals.release(r0);
    done.map(|_| ())
  }

  fn scan_column<L: Lines, D: DelayNs>(
    &self,
    signals: &mut Signals<L, D>,
    column: u8,
    channels: u8,
    results: &mut ScanResults,
  ) {
    let c0 = mask(self.pins.c0, column);
    let r = self.pins.r;
    let rows = self.matrix.rows();

    signals.drive_low(c0);
    signals.settle();

    // Reset state on R1 and R2
    let levels = signals.sample();
    for row in 0..rows {
      results.record(column, row, 0, levels & mask(r[1], row) != 0);
      results.record(column, row, 1, levels & mask(r[2], row) != 0);
    }

    // Each C0 edge presents the next four channels on R0..R3.
    let cycles = channels.min(MAX_KEY_SCAN_CHANNELS).div_ceil(4) as usize;
    let mut strobe_low = true;
    for cycle in 0..cycles {
      toggle(signals, c0, &mut strobe_low);
      signals.settle();
      let levels = signals.sample();
      for row in 0..rows {
        for (role, table) in r.iter().enumerate() {
          results.record(column, row, 2 + 4 * cycle + role, levels & mask(table, row) != 0);
        }
      }
    }

    toggle(signals, c0, &mut strobe_low);
    signals.settle();
    if strobe_low {
      signals.release(c0);
      signals.settle();
    }
  }

  fn release<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>) {
    signals.release(self.every_line());
  }

  fn standby<L: Lines, D: DelayNs>(&self, signals: &mut Signals<L, D>, change: ModeChange) {
    mode_sequence(signals, self.all_r(0), self.all_c0(), change);
  }
}

fn toggle<L: Lines, D: DelayNs>(signals: &mut Signals<L, D>, c0: LineMask, low: &mut bool) {
  if *low {
    signals.release(c0);
  } else {
    signals.drive_low(c0);
  }
  *low = !*low;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{Handshake, PinSettings, TimeoutPolicy};
  use crate::sim::{Edge, Op, SimDelay, SimLines};

  fn pins() -> RowSelectPins {
    PinSettings::default().row_select
  }

  fn every_line(pins: &RowSelectPins) -> LineMask {
    pins.c0.iter().chain(pins.r.iter().flat_map(|t| t.iter())).fold(0, |acc, m| acc | m)
  }

  fn signals(lines: SimLines) -> Signals<SimLines, SimDelay> {
    let handshake = Handshake::default().with_policy(TimeoutPolicy::Abort);
    Signals::new(lines, SimDelay::default(), handshake, 20)
  }

  /// Row 0 device: joins the bus on a column strobe and leaves when R0 falls.
  fn cooperative(pins: RowSelectPins) -> SimLines {
    let c0 = pins.c0.iter().fold(0, |acc, m| acc | m);
    let (r0, r1) = (pins.r[0][0], pins.r[1][0]);
    SimLines::pulled_up(every_line(&pins)).with_responder(move |edge: Edge, forced: &mut LineMask| {
      if !edge.falling && edge.mask & c0 != 0 {
        *forced |= r1;
      } else if edge.falling && edge.mask & r0 != 0 {
        *forced &= !r1;
      }
    })
  }

  #[test]
  fn enter_holds_other_rows_deselected_during_the_strobe() {
    let pins = pins();
    let family = RowSelect::new(pins, Matrix::new(2, 3).expect("valid dimensions"));
    let mut signals = signals(cooperative(pins));

    assert_eq!(family.enter_row(&mut signals, 1, 0), Ok(()));
    let lines = signals.lines();
    assert_eq!(lines.enabled(), [pins.r[0][0], pins.r[3][1] | pins.r[3][2], pins.c0[1]]);
    assert_eq!(lines.driven(), 0);

    assert_eq!(family.exit_row(&mut signals, 0), Ok(()));
    assert!(signals.is_high(pins.r[1][0]));
  }

  #[test]
  fn silent_device_times_out_on_r1() {
    let pins = pins();
    let family = RowSelect::new(pins, Matrix::new(1, 2).expect("valid dimensions"));
    let mut signals = signals(SimLines::pulled_up(every_line(&pins)));
    assert_eq!(family.enter_row(&mut signals, 0, 1), Err(HandshakeTimeout { mask: pins.r[1][1], awaited: Level::Low }));
  }

  #[test]
  fn scan_samples_reset_state_then_four_channels_per_strobe() {
    let pins = pins();
    let family = RowSelect::new(pins, Matrix::new(1, 1).expect("valid dimensions"));
    let mut lines = SimLines::pulled_up(every_line(&pins));
    lines.force_low(pins.r[2][0]);
    let mut signals = signals(lines);
    let mut results = ScanResults::default();

    family.scan_column(&mut signals, 0, 5, &mut results);

    assert_eq!(results.device(0, 0), 0x2ED);
    let lines = signals.lines();
    assert_eq!(lines.enabled(), [pins.c0[0], pins.c0[0]]);
    assert_eq!(lines.driven(), 0);
  }

  #[test]
  fn scan_always_leaves_the_strobe_high() {
    let pins = pins();
    let family = RowSelect::new(pins, Matrix::new(1, 1).expect("valid dimensions"));
    for channels in [0, 4, 5, 20] {
      let mut signals = signals(SimLines::pulled_up(every_line(&pins)));
      family.scan_column(&mut signals, 0, channels, &mut ScanResults::default());
      let lines = signals.lines();
      assert_eq!(lines.driven(), 0);
      assert_eq!(lines.ops().last(), Some(&Op::Disable(pins.c0[0])));
    }
  }

  #[test]
  fn standby_enter_strobes_every_column() {
    let pins = pins();
    let family = RowSelect::new(pins, Matrix::new(2, 2).expect("valid dimensions"));
    let mut signals = signals(SimLines::pulled_up(every_line(&pins)));

    family.standby(&mut signals, ModeChange::Enter);
    let (lines, delay) = signals.release_parts();
    assert_eq!(lines.enabled(), [pins.r[0][0] | pins.r[0][1], pins.c0[0] | pins.c0[1]]);
    assert_eq!(lines.driven(), 0);
    assert_eq!(delay.total_us(), 4 * 20);
  }
}
