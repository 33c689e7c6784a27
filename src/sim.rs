//! Simulated board used by the unit tests.

use std::boxed::Box;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use embedded_hal_nb::{nb, serial};

use crate::lines::{LineMask, Lines};
use crate::transport::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Enable(LineMask),
  Disable(LineMask),
  Read,
}

/// Edge produced by the bridge on a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
  pub mask: LineMask,
  pub falling: bool,
}

type Responder = Box<dyn FnMut(Edge, &mut LineMask)>;

/// GPIO port with pull-ups on `pulled_up` lines and an optional device model
/// that reacts to edges by forcing lines low.
pub struct SimLines {
  pulled_up: LineMask,
  driven: LineMask,
  output_high: LineMask,
  prepared: LineMask,
  forced_low: LineMask,
  delayed: Option<(LineMask, usize)>,
  responder: Option<Responder>,
  reads: usize,
  ops: Vec<Op>,
}

impl SimLines {
  pub fn pulled_up(mask: LineMask) -> Self {
    Self {
      pulled_up: mask,
      driven: 0,
      output_high: 0,
      prepared: 0,
      forced_low: 0,
      delayed: None,
      responder: None,
      reads: 0,
      ops: Vec::new(),
    }
  }

  pub fn with_responder<F: FnMut(Edge, &mut LineMask) + 'static>(mut self, responder: F) -> Self {
    self.responder = Some(Box::new(responder));
    self
  }

  pub fn force_low(&mut self, mask: LineMask) {
    self.forced_low |= mask;
  }

  /// Force `mask` low once `reads` reads have returned it high.
  pub fn force_low_after_reads(&mut self, mask: LineMask, reads: usize) {
    self.delayed = Some((mask, reads));
  }

  pub fn reads(&self) -> usize {
    self.reads
  }

  pub fn driven(&self) -> LineMask {
    self.driven
  }

  pub fn prepared(&self) -> LineMask {
    self.prepared
  }

  pub fn ops(&self) -> &[Op] {
    &self.ops
  }

  /// Masks passed to `enable`, in order.
  pub fn enabled(&self) -> Vec<LineMask> {
    self.ops.iter().filter_map(|op| if let Op::Enable(m) = op { Some(*m) } else { None }).collect()
  }

  fn level(&self) -> LineMask {
    let pulled_low = self.driven & !self.output_high;
    self.pulled_up & !pulled_low & !self.forced_low
  }

  fn edge(&mut self, mask: LineMask, falling: bool) {
    if let Some(responder) = self.responder.as_mut() {
      responder(Edge { mask, falling }, &mut self.forced_low);
    }
  }
}

impl Lines for SimLines {
  fn set(&mut self, mask: LineMask) {
    self.output_high |= mask;
  }

  fn clear(&mut self, mask: LineMask) {
    self.output_high &= !mask;
  }

  fn read(&mut self) -> LineMask {
    if let Some((mask, remaining)) = self.delayed {
      if remaining == 0 {
        self.forced_low |= mask;
        self.delayed = None;
      } else {
        self.delayed = Some((mask, remaining - 1));
      }
    }
    self.reads += 1;
    self.ops.push(Op::Read);
    self.level()
  }

  fn enable(&mut self, mask: LineMask) {
    self.ops.push(Op::Enable(mask));
    let newly = mask & !self.driven;
    self.driven |= mask;
    if newly != 0 {
      self.edge(newly, true);
    }
  }

  fn disable(&mut self, mask: LineMask) {
    self.ops.push(Op::Disable(mask));
    let newly = mask & self.driven;
    self.driven &= !mask;
    if newly != 0 {
      self.edge(newly, false);
    }
  }

  fn prepare(&mut self, mask: LineMask) {
    self.prepared |= mask;
  }
}

#[derive(Debug, Default)]
pub struct SimDelay {
  total_ns: u64,
}

impl SimDelay {
  pub fn total_us(&self) -> u64 {
    self.total_ns / 1_000
  }
}

impl DelayNs for SimDelay {
  fn delay_ns(&mut self, ns: u32) {
    self.total_ns += ns as u64;
  }
}

/// Shared millisecond counter; clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<u32>>);

impl SimClock {
  pub fn set(&self, ms: u32) {
    self.0.set(ms);
  }
}

impl Clock for SimClock {
  fn now_ms(&self) -> u32 {
    self.0.get()
  }
}

/// Loopback serial port: `feed` queues received bytes, `take_tx` drains
/// everything written.
#[derive(Debug, Default)]
pub struct SimSerial {
  rx: VecDeque<u8>,
  tx: Vec<u8>,
}

impl SimSerial {
  pub fn feed(&mut self, bytes: &[u8]) {
    self.rx.extend(bytes.iter().copied());
  }

  pub fn take_tx(&mut self) -> Vec<u8> {
    core::mem::take(&mut self.tx)
  }
}

impl serial::ErrorType for SimSerial {
  type Error = Infallible;
}

impl serial::Read for SimSerial {
  fn read(&mut self) -> nb::Result<u8, Infallible> {
    self.rx.pop_front().ok_or(nb::Error::WouldBlock)
  }
}

impl serial::Write for SimSerial {
  fn write(&mut self, byte: u8) -> nb::Result<(), Infallible> {
    self.tx.push(byte);
    Ok(())
  }

  fn flush(&mut self) -> nb::Result<(), Infallible> {
    Ok(())
  }
}
