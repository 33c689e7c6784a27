use crate::defs::{HANDSHAKE_ATTEMPTS, HANDSHAKE_STEP_US};

/// What to do when a device never answers an addressing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutPolicy {
  /// Log the timeout and carry on with whatever line state is present.
  /// Matches the behaviour the host GUI was built against.
  Proceed,
  /// Abandon the transaction, release the lines and report a failure.
  Abort,
}

/// Bounded wait for a line transition during device addressing.
///
/// The line is sampled up to `attempts` times with a `step_us` delay after
/// each miss, so the worst-case wait is `attempts * step_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
  pub attempts: u8,
  pub step_us: u32,
  pub on_timeout: TimeoutPolicy,
}

impl Handshake {
  pub const fn new() -> Self {
    Self { attempts: HANDSHAKE_ATTEMPTS, step_us: HANDSHAKE_STEP_US, on_timeout: TimeoutPolicy::Proceed }
  }

  pub const fn with_budget(mut self, attempts: u8, step_us: u32) -> Self {
    self.attempts = attempts;
    self.step_us = step_us;
    self
  }

  pub const fn with_policy(mut self, on_timeout: TimeoutPolicy) -> Self {
    self.on_timeout = on_timeout;
    self
  }

  /// Worst-case time spent waiting before the policy applies.
  pub const fn budget_us(&self) -> u32 {
    self.attempts as u32 * self.step_us
  }
}

impl Default for Handshake {
  fn default() -> Self {
    Self::new()
  }
}
