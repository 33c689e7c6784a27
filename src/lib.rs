#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! `no_std` host bridge for matrices of Azoteq capacitive key sensors.
//!
//! A host talks to the bridge over a byte stream using checksummed frames. The
//! bridge addresses one device of a sensor matrix by walking the shared select
//! lines through the device family's enter/exit handshake, then runs a key-scan
//! or register transaction on the shared bus and forwards the result. Supported
//! parts:
//!
//! - IQS7220A and IQS7320A on a select-pair matrix (S0/S1 per column, D0/D1 per row)
//! - IQS9320 on a row-select matrix (C0 per column, R0..R3 per row)
//! - IQS9320 wired directly to the bus, addressed by bus address only
//!
//! Everything runs from one cooperative loop: [`Bridge::poll`] ingests a byte,
//! runs a completed command, or fires the active stream, and returns what it
//! did. Nothing is ever fatal to the loop.
//!
//! ```no_run
//! use embedded_hal::delay::DelayNs;
//! use embedded_hal::i2c::{I2c, SevenBitAddress};
//! use embedded_hal_nb::serial::{Read, Write};
//! use iqs_keyscan_bridge::{Bridge, Clock, Config, Lines};
//!
//! fn run<S, I, L, D, C>(serial: S, i2c: I, lines: L, delay: D, clock: C) -> !
//! where
//!   S: Read + Write,
//!   I: I2c<SevenBitAddress>,
//!   L: Lines,
//!   D: DelayNs,
//!   C: Clock,
//! {
//!   let mut bridge = Bridge::new(serial, i2c, lines, delay, clock, Config::default());
//!   loop {
//!     bridge.poll();
//!   }
//! }
//! ```
mod bus;
mod command;
mod config;
mod crc;
mod defs;
mod dispatch;
mod family;
mod frame;
mod lines;
mod log;
mod matrix;
mod scan;
#[cfg(test)]
mod sim;
mod stream;
mod transport;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_hal_nb::serial;

pub use bus::{Register, Transfer};
pub use command::{Command, DecodeError};
pub use config::*;
pub use crc::crc16;
pub use defs::{Device, Opcode, StreamMode, COMPLETION_MARKER, HEADER_A, HEADER_B, MAX_STREAM, PACKET_LEN};
pub use dispatch::Rejection;
pub use family::{Addressing, ModeChange, Protocol, RowSelect, SelectPair, Setup};
pub use frame::{encode, FrameError, Framer, Packet};
pub use lines::{HandshakeTimeout, Level, LineMask, Lines, Signals, WaitOutcome};
pub use matrix::{Matrix, Position, Target};
pub use scan::{ReportFormat, ScanResults};
pub use stream::{RegisterRead, Scheduler, StreamConfig, StreamJob};
pub use transport::Clock;

use crate::log::debug;

/// Errors raised while running a command or stream.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I²C bus transaction failed with the underlying driver error.
  I2c(E),
  /// A device never answered on the given line and the handshake policy is
  /// [`TimeoutPolicy::Abort`].
  Handshake(LineMask),
  /// An operation attempted to write a buffer larger than the protocol allows.
  BufferOverflow,
}

impl<E> From<HandshakeTimeout> for Error<E> {
  fn from(timeout: HandshakeTimeout) -> Self {
    Error::Handshake(timeout.mask)
  }
}

/// What one call to [`Bridge::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
  /// Nothing to do.
  Idle,
  /// A byte was taken from the serial port.
  Received,
  /// A byte completed a frame that failed validation.
  Dropped(FrameError),
  /// A validated packet was dropped without acknowledgement.
  Rejected(Rejection),
  /// A command was acknowledged and ran to completion.
  Executed(Opcode),
  /// A command was acknowledged but abandoned on a handshake timeout.
  Failed(Opcode),
  /// The active stream fired.
  Streamed(StreamMode),
  /// The active stream fired but was abandoned on a handshake timeout.
  StreamFailed(StreamMode),
}

/// Bridge between a host link and a matrix of sensor devices.
///
/// Owns the serial port, the shared bus, the matrix lines and the clock. Create
/// it with [`Bridge::new`] and call [`Bridge::poll`] from the main loop. The
/// host must send a setup command before any device command is accepted.
pub struct Bridge<S, I, L, D, C> {
  serial: S,
  i2c: I,
  signals: Signals<L, D>,
  clock: C,
  config: Config,
  framer: Framer,
  setup: Option<Setup>,
  scheduler: Scheduler,
  scan: ScanResults,
  comms_active: bool,
}

impl<S, I, E, L, D, C> Bridge<S, I, L, D, C>
where
  S: serial::Read + serial::Write,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  C: Clock,
{
  /// Create a bridge with the provided peripherals and configuration.
  ///
  /// No line is touched until the host sends a setup command.
  pub fn new(serial: S, i2c: I, lines: L, delay: D, clock: C, config: Config) -> Self {
    Self {
      serial,
      i2c,
      signals: Signals::new(lines, delay, config.handshake, config.settle_us),
      clock,
      config,
      framer: Framer::new(),
      setup: None,
      scheduler: Scheduler::new(),
      scan: ScanResults::default(),
      comms_active: false,
    }
  }

  /// Run one step of the loop: take one byte if available, otherwise run one
  /// received command, otherwise fire the stream if it is due.
  pub fn poll(&mut self) -> Activity {
    if let Some(byte) = self.receive() {
      return match self.framer.push(byte) {
        Ok(()) => Activity::Received,
        Err(e) => {
          debug!("frame: dropped {}", e);
          Activity::Dropped(e)
        }
      };
    }

    if let Some(packet) = self.framer.next_packet() {
      return self.dispatch(packet);
    }

    if !self.framer.is_receiving() {
      if let Some(activity) = self.service_stream() {
        return activity;
      }
    }
    Activity::Idle
  }

  /// Configuration the bridge was created with.
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Device kind and matrix from the last setup command.
  pub fn setup(&self) -> Option<&Setup> {
    self.setup.as_ref()
  }

  /// Whether a setup command has been accepted.
  pub fn is_setup(&self) -> bool {
    self.setup.is_some()
  }

  /// Set by every accepted packet, cleared by the stop-comms command.
  pub fn is_comms_active(&self) -> bool {
    self.comms_active
  }

  /// Kind of the active stream, [`StreamMode::Disabled`] when none runs.
  pub fn stream_mode(&self) -> StreamMode {
    self.scheduler.mode()
  }

  /// Give the peripherals back.
  pub fn release(self) -> (S, I, L, D, C) {
    let (lines, delay) = self.signals.release_parts();
    (self.serial, self.i2c, lines, delay, self.clock)
  }
}
