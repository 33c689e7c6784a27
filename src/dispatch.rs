use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_hal_nb::serial;

use crate::bus::Transfer;
use crate::command::{Command, DecodeError};
use crate::defs::{Device, Opcode, COMPLETION_MARKER};
use crate::family::{Addressing, Setup};
use crate::frame::Packet;
use crate::lines::Lines;
use crate::log::{debug, info, warning};
use crate::transport::Clock;
use crate::{Activity, Bridge, Error};

/// Why a validated packet was dropped without an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
  /// Payload shorter than the context and opcode bytes.
  Empty,
  UnknownOpcode(u8),
  /// Device command received before setup completed.
  NotSetUp(Opcode),
  /// Command for a device kind other than the configured one.
  WrongFamily(Opcode),
  Decode(Opcode, DecodeError),
}

enum Accepted {
  Setup(Setup),
  Command(Setup, Command),
}

impl<S, I, E, L, D, C> Bridge<S, I, L, D, C>
where
  S: serial::Read + serial::Write,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  C: Clock,
{
  /// Gate, decode, acknowledge and run one packet.
  pub(crate) fn dispatch(&mut self, packet: Packet) -> Activity {
    let opcode = match self.accept(&packet) {
      Ok((opcode, accepted)) => {
        self.comms_active = true;
        self.send(&packet.acknowledgement());
        match self.execute(accepted) {
          Ok(()) => opcode,
          Err(_) => {
            warning!("dispatch: {} failed", opcode);
            return Activity::Failed(opcode);
          }
        }
      }
      Err(rejection) => {
        debug!("dispatch: dropped {}", rejection);
        return Activity::Rejected(rejection);
      }
    };

    if opcode.reports_completion() {
      self.send(&COMPLETION_MARKER);
    }
    Activity::Executed(opcode)
  }

  fn accept(&self, packet: &Packet) -> Result<(Opcode, Accepted), Rejection> {
    let raw = packet.opcode().ok_or(Rejection::Empty)?;
    let opcode = Opcode::try_from(raw).map_err(Rejection::UnknownOpcode)?;
    let current = self.setup;

    if opcode != Opcode::Setup {
      let setup = current.ok_or(Rejection::NotSetUp(opcode))?;
      if let Some(family) = opcode.device() {
        if family != Device::Iqs9320Direct && family != setup.device() {
          return Err(Rejection::WrongFamily(opcode));
        }
      }
    }

    let decode_error = |e| Rejection::Decode(opcode, e);
    let command = Command::decode(opcode, packet.params(), current.map(|s| s.matrix())).map_err(decode_error)?;
    match (command, current) {
      (Command::Setup { device, matrix }, _) => {
        let setup = Setup::new(device, matrix, &self.config.pins).map_err(decode_error)?;
        Ok((opcode, Accepted::Setup(setup)))
      }
      (command, Some(setup)) => Ok((opcode, Accepted::Command(setup, command))),
      (_, None) => Err(Rejection::NotSetUp(opcode)),
    }
  }

  fn execute(&mut self, accepted: Accepted) -> Result<(), Error<E>> {
    let (setup, command) = match accepted {
      Accepted::Setup(setup) => {
        self.install(setup);
        return Ok(());
      }
      Accepted::Command(setup, command) => (setup, command),
    };

    match command {
      Command::Setup { .. } => {}
      Command::StopStreaming => self.scheduler.stop(),
      Command::StopComms => self.comms_active = false,
      Command::KeyScan { channels } => self.key_scan(&setup, channels),
      Command::Read { target, transfer } => self.matrix_read(&setup, target, transfer)?,
      Command::Write { target, transfer, data } => self.matrix_write(&setup, target, transfer, &data)?,
      Command::DirectRead { addresses, register, len } => {
        for &address in &addresses {
          self.direct_read(Transfer { address, register, len });
        }
      }
      Command::DirectWrite { addresses, register, data } => {
        for &address in &addresses {
          self.direct_write(Transfer { address, register, len: data.len() as u8 }, &data);
        }
      }
      Command::Standby(change) => setup.protocol().standby(&mut self.signals, change),
      Command::Autonomous(change) => setup.protocol().autonomous(&mut self.signals, change),
      Command::Stream(config) => {
        debug!("dispatch: stream {} every {=u8}ms", config.mode, config.interval_ms);
        self.scheduler.start(config, self.clock.now_ms());
      }
    }
    Ok(())
  }

  fn install(&mut self, setup: Setup) {
    info!(
      "setup: {} in {=u8}x{=u8}",
      setup.device(),
      setup.matrix().columns(),
      setup.matrix().rows()
    );
    self.scheduler.stop();
    setup.protocol().configure(&mut self.signals);
    self.setup = Some(setup);
  }

  /// Sample every column and forward one report for the whole matrix.
  pub(crate) fn key_scan(&mut self, setup: &Setup, channels: u8) {
    let matrix = setup.matrix();
    self.scan.clear();
    for column in 0..matrix.columns() {
      setup.protocol().scan_column(&mut self.signals, column, channels, &mut self.scan);
    }
    let report = self.scan.report(matrix, setup.report_format(channels));
    self.send(&report);
  }
}
