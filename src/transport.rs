//! Host link over an `embedded-hal-nb` serial port, and the loop clock.

use embedded_hal_nb::nb;
use embedded_hal_nb::serial::{self, Error as _};

use crate::log::warning;
use crate::Bridge;

/// Free-running millisecond counter. Wraps around; callers compare with
/// `wrapping_sub`.
pub trait Clock {
  fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
  fn now_ms(&self) -> u32 {
    T::now_ms(self)
  }
}

impl<S, I, L, D, C> Bridge<S, I, L, D, C>
where
  S: serial::Read + serial::Write,
{
  /// Next received byte, if one is waiting. Receive errors lose the byte and
  /// leave resynchronisation to the framer.
  pub(crate) fn receive(&mut self) -> Option<u8> {
    match self.serial.read() {
      Ok(byte) => Some(byte),
      Err(nb::Error::WouldBlock) => None,
      Err(nb::Error::Other(e)) => {
        warning!("serial: receive failed: {}", error_name(e.kind()));
        None
      }
    }
  }

  /// Write `bytes`, blocking until the port accepts each one.
  pub(crate) fn send(&mut self, bytes: &[u8]) {
    for &byte in bytes {
      if let Err(e) = nb::block!(self.serial.write(byte)) {
        warning!("serial: send failed: {}", error_name(e.kind()));
        return;
      }
    }
  }
}

fn error_name(kind: serial::ErrorKind) -> &'static str {
  match kind {
    serial::ErrorKind::Overrun => "overrun",
    serial::ErrorKind::FrameFormat => "frame format",
    serial::ErrorKind::Parity => "parity",
    serial::ErrorKind::Noise => "noise",
    _ => "other",
  }
}

#[cfg(test)]
mod tests {
  use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
  use embedded_hal_mock::eh1::serial::{Mock as SerialMock, Transaction};
  use embedded_hal_nb::nb;
  use embedded_hal_nb::serial::ErrorKind;

  use crate::config::Config;
  use crate::defs::{Opcode, HEADER_A, HEADER_B};
  use crate::frame::encode;
  use crate::sim::{SimClock, SimDelay, SimLines};
  use crate::{Activity, Bridge};

  type TestBridge = Bridge<SerialMock<u8>, I2cMock, SimLines, SimDelay, SimClock>;

  fn bridge(serial: &[Transaction<u8>], i2c: &[I2cTransaction]) -> TestBridge {
    Bridge::new(
      SerialMock::new(serial),
      I2cMock::new(i2c),
      SimLines::pulled_up(u32::MAX),
      SimDelay::default(),
      SimClock::default(),
      Config::default(),
    )
  }

  fn finish(bridge: TestBridge) {
    let (mut serial, mut i2c, ..) = bridge.release();
    serial.done();
    i2c.done();
  }

  #[test]
  fn setup_over_a_serial_port() {
    let frame = encode(&[0x05, 0x00, 0x02, 1, 1]).expect("payload fits");
    let expectations = [
      Transaction::read_many(frame.as_slice()),
      Transaction::read_error(nb::Error::WouldBlock),
      Transaction::write_many([HEADER_A, HEADER_B, 0x05, 0x00, HEADER_A, HEADER_B]),
      Transaction::read_error(nb::Error::WouldBlock),
    ];
    let mut bridge = bridge(&expectations, &[]);

    for _ in 0..frame.len() {
      assert!(matches!(bridge.poll(), Activity::Received | Activity::Dropped(_)));
    }
    assert_eq!(bridge.poll(), Activity::Executed(Opcode::Setup));
    assert_eq!(bridge.poll(), Activity::Idle);
    finish(bridge);
  }

  #[test]
  fn receive_error_is_not_a_byte() {
    let expectations = [
      Transaction::read_error(nb::Error::Other(ErrorKind::Overrun)),
      Transaction::read(HEADER_A),
      Transaction::read_error(nb::Error::WouldBlock),
    ];
    let mut bridge = bridge(&expectations, &[]);

    assert_eq!(bridge.poll(), Activity::Idle);
    assert_eq!(bridge.poll(), Activity::Received);
    assert_eq!(bridge.poll(), Activity::Idle);
    finish(bridge);
  }

  #[test]
  fn send_stops_at_the_first_failed_byte() {
    let expectations =
      [Transaction::write(0x01), Transaction::write_error(0x02, nb::Error::Other(ErrorKind::Other))];
    let mut bridge = bridge(&expectations, &[]);

    bridge.send(&[0x01, 0x02, 0x03]);
    finish(bridge);
  }
}
