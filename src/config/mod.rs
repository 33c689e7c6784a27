mod handshake;
mod pinout;

pub use handshake::*;
pub use pinout::*;

use crate::defs::SETTLE_DELAY_US;

/// Static bridge configuration, loaded once at start-up.
///
/// The serial and bus fields are not used by the protocol core itself; they
/// are carried here so the start-up wiring reads every board parameter from
/// one place.
///
/// # Example
/// ```no_run
/// use iqs_keyscan_bridge::{Config, Handshake, TimeoutPolicy};
///
/// let config = Config::default()
///   .with_serial_baud_rate(921_600)
///   .with_handshake(Handshake::default().with_policy(TimeoutPolicy::Abort));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub pins: PinSettings,
  pub handshake: Handshake,
  /// Delay after every line transition, in microseconds.
  pub settle_us: u32,
  pub serial_baud_rate: u32,
  pub i2c_clock_hz: u32,
  pub sda_pin: u8,
  pub scl_pin: u8,
}

impl Config {
  /// Reference carrier board settings.
  pub const fn new() -> Self {
    Self {
      pins: PinSettings::new(),
      handshake: Handshake::new(),
      settle_us: SETTLE_DELAY_US,
      serial_baud_rate: 115_200,
      i2c_clock_hz: 1_000_000,
      sda_pin: 20,
      scl_pin: 21,
    }
  }

  pub const fn with_pins(mut self, pins: PinSettings) -> Self {
    self.pins = pins;
    self
  }

  pub const fn with_handshake(mut self, handshake: Handshake) -> Self {
    self.handshake = handshake;
    self
  }

  pub const fn with_settle_us(mut self, settle_us: u32) -> Self {
    self.settle_us = settle_us;
    self
  }

  pub const fn with_serial_baud_rate(mut self, baud: u32) -> Self {
    self.serial_baud_rate = baud;
    self
  }

  pub const fn with_i2c(mut self, clock_hz: u32, sda_pin: u8, scl_pin: u8) -> Self {
    self.i2c_clock_hz = clock_hz;
    self.sda_pin = sda_pin;
    self.scl_pin = scl_pin;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}
