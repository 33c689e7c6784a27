//! Shared select/data line access.
//!
//! Matrix lines are open-drain: a line is pulled low by enabling its output
//! driver with the output value held low, and returns high through its pull-up
//! when the driver is disabled.

use embedded_hal::delay::DelayNs;

use crate::config::{Handshake, TimeoutPolicy};
use crate::log::warning;

/// One bit per GPIO line.
pub type LineMask = u32;

/// Raw GPIO port capability, implemented by the board support layer.
pub trait Lines {
  /// Set the output value of `mask` high.
  fn set(&mut self, mask: LineMask);
  /// Set the output value of `mask` low.
  fn clear(&mut self, mask: LineMask);
  /// Current input level of every line.
  fn read(&mut self) -> LineMask;
  /// Enable the output driver of `mask`.
  fn enable(&mut self, mask: LineMask);
  /// Disable the output driver of `mask`, leaving the lines as inputs.
  fn disable(&mut self, mask: LineMask);
  /// Hand `mask` to software control with pull-ups enabled.
  fn prepare(&mut self, _mask: LineMask) {}
}

impl<T: Lines + ?Sized> Lines for &mut T {
  fn set(&mut self, mask: LineMask) {
    T::set(self, mask)
  }

  fn clear(&mut self, mask: LineMask) {
    T::clear(self, mask)
  }

  fn read(&mut self) -> LineMask {
    T::read(self)
  }

  fn enable(&mut self, mask: LineMask) {
    T::enable(self, mask)
  }

  fn disable(&mut self, mask: LineMask) {
    T::disable(self, mask)
  }

  fn prepare(&mut self, mask: LineMask) {
    T::prepare(self, mask)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
  Low,
  High,
}

impl Level {
  fn matches(self, high: bool) -> bool {
    match self {
      Level::Low => !high,
      Level::High => high,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
  Reached,
  /// Budget exhausted; only returned under [`TimeoutPolicy::Proceed`].
  TimedOut,
}

/// A handshake ran out of attempts under [`TimeoutPolicy::Abort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandshakeTimeout {
  pub mask: LineMask,
  pub awaited: Level,
}

/// Line port plus the timing needed to drive the addressing protocols.
pub struct Signals<L, D> {
  lines: L,
  delay: D,
  handshake: Handshake,
  settle_us: u32,
}

impl<L: Lines, D: DelayNs> Signals<L, D> {
  pub fn new(lines: L, delay: D, handshake: Handshake, settle_us: u32) -> Self {
    Self { lines, delay, handshake, settle_us }
  }

  pub fn release_parts(self) -> (L, D) {
    (self.lines, self.delay)
  }

  pub fn lines(&mut self) -> &mut L {
    &mut self.lines
  }

  /// Software control, output value low, driver off.
  pub fn prepare(&mut self, mask: LineMask) {
    self.lines.prepare(mask);
    self.lines.clear(mask);
    self.lines.disable(mask);
  }

  pub fn drive_low(&mut self, mask: LineMask) {
    self.lines.enable(mask);
  }

  pub fn release(&mut self, mask: LineMask) {
    self.lines.disable(mask);
  }

  /// Wait out the settle time after a transition.
  pub fn settle(&mut self) {
    self.delay.delay_us(self.settle_us);
  }

  pub fn hold_us(&mut self, us: u32) {
    self.delay.delay_us(us);
  }

  pub fn is_high(&mut self, mask: LineMask) -> bool {
    self.lines.read() & mask != 0
  }

  /// Level of every line at once.
  pub fn sample(&mut self) -> LineMask {
    self.lines.read()
  }

  /// Sample `mask` until it reads `level`, then apply the timeout policy.
  pub fn await_level(&mut self, mask: LineMask, level: Level) -> Result<WaitOutcome, HandshakeTimeout> {
    let Handshake { attempts, step_us, on_timeout } = self.handshake;
    let outcome = self.poll_until(attempts, step_us, |lines| level.matches(lines.read() & mask != 0));

    match (outcome, on_timeout) {
      (WaitOutcome::Reached, _) => Ok(outcome),
      (WaitOutcome::TimedOut, TimeoutPolicy::Proceed) => {
        warning!("handshake: line {=u32:#x} never went {}, proceeding", mask, level);
        Ok(outcome)
      }
      (WaitOutcome::TimedOut, TimeoutPolicy::Abort) => Err(HandshakeTimeout { mask, awaited: level }),
    }
  }

  fn poll_until<F: FnMut(&mut L) -> bool>(&mut self, attempts: u8, step_us: u32, mut ready: F) -> WaitOutcome {
    for _ in 0..attempts {
      if ready(&mut self.lines) {
        return WaitOutcome::Reached;
      }
      self.delay.delay_us(step_us);
    }
    WaitOutcome::TimedOut
  }
}
