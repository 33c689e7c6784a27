use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_hal_nb::serial;
use heapless::Vec;

use crate::defs::{NO_REGISTER, PACKET_LEN};
use crate::family::{Addressing, Protocol, Setup};
use crate::lines::{HandshakeTimeout, Lines};
use crate::log::{trace, warning};
use crate::matrix::{Position, Target};
use crate::transport::Clock;
use crate::{Bridge, Error};

/// Register address as it travels on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
  /// One-byte address (IQS7220A, IQS7320A).
  Short(u8),
  /// Two-byte address, sent LSB first (IQS9320).
  Wide([u8; 2]),
}

impl Register {
  pub fn bytes(&self) -> &[u8] {
    match self {
      Register::Short(addr) => core::slice::from_ref(addr),
      Register::Wide(addr) => addr,
    }
  }

  /// Full-polling reads with this address skip the register phase.
  pub fn skips_register_phase(&self) -> bool {
    matches!(self, Register::Wide(addr) if *addr == NO_REGISTER)
  }
}

/// Parameters of one register transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer {
  /// 7-bit bus address.
  pub address: u8,
  pub register: Register,
  /// Bytes to read or write, at most [`PACKET_LEN`].
  pub len: u8,
}

impl<S, I, E, L, D, C> Bridge<S, I, L, D, C>
where
  S: serial::Read + serial::Write,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  C: Clock,
{
  /// Matrix-addressed read of one device or every device, results forwarded
  /// to the host in device order.
  pub(crate) fn matrix_read(&mut self, setup: &Setup, target: Target, transfer: Transfer) -> Result<(), Error<E>> {
    let protocol = setup.protocol();
    match target {
      Target::Device(index) => {
        let Some(pos) = setup.matrix().locate(index) else {
          return Ok(());
        };
        protocol.enter_column(&mut self.signals, pos.column);
        self.read_entered(protocol, pos, transfer)
      }
      Target::All => {
        let matrix = setup.matrix();
        for column in 0..matrix.columns() {
          protocol.enter_column(&mut self.signals, column);
          for row in 0..matrix.rows() {
            self.read_entered(protocol, Position { column, row }, transfer)?;
          }
        }
        Ok(())
      }
    }
  }

  /// Matrix-addressed write of the same data to one device or every device.
  pub(crate) fn matrix_write(
    &mut self,
    setup: &Setup,
    target: Target,
    transfer: Transfer,
    data: &[u8],
  ) -> Result<(), Error<E>> {
    let protocol = setup.protocol();
    match target {
      Target::Device(index) => {
        let Some(pos) = setup.matrix().locate(index) else {
          return Ok(());
        };
        protocol.enter_column(&mut self.signals, pos.column);
        self.write_entered(protocol, pos, transfer, data)
      }
      Target::All => {
        let matrix = setup.matrix();
        for column in 0..matrix.columns() {
          protocol.enter_column(&mut self.signals, column);
          for row in 0..matrix.rows() {
            self.write_entered(protocol, Position { column, row }, transfer, data)?;
          }
        }
        Ok(())
      }
    }
  }

  /// Full-polling read, forwarded to the host.
  pub(crate) fn direct_read(&mut self, transfer: Transfer) {
    let register = (!transfer.register.skips_register_phase()).then_some(transfer.register);
    let mut buf = [0u8; PACKET_LEN];
    let data = &mut buf[..(transfer.len as usize).min(PACKET_LEN)];
    self.read_or_zero(transfer.address, register, data);
    self.send(data);
  }

  /// Full-polling write.
  pub(crate) fn direct_write(&mut self, transfer: Transfer, data: &[u8]) {
    if self.write_bytes(transfer.address, transfer.register, data).is_err() {
      warning!("bus: write to {=u8:#x} failed", transfer.address);
    }
  }

  fn read_entered(&mut self, protocol: &Protocol, pos: Position, transfer: Transfer) -> Result<(), Error<E>> {
    let mut buf = [0u8; PACKET_LEN];
    let data = &mut buf[..(transfer.len as usize).min(PACKET_LEN)];

    self.enter(protocol, pos)?;
    self.read_or_zero(transfer.address, Some(transfer.register), data);
    self.exit(protocol, pos)?;

    self.send(data);
    Ok(())
  }

  fn write_entered(
    &mut self,
    protocol: &Protocol,
    pos: Position,
    transfer: Transfer,
    data: &[u8],
  ) -> Result<(), Error<E>> {
    self.enter(protocol, pos)?;
    if self.write_bytes(transfer.address, transfer.register, data).is_err() {
      warning!("bus: write to {}/{} failed", pos.column, pos.row);
    }
    self.exit(protocol, pos)
  }

  fn enter(&mut self, protocol: &Protocol, pos: Position) -> Result<(), Error<E>> {
    trace!("bus: enter {}/{}", pos.column, pos.row);
    protocol.enter_row(&mut self.signals, pos.column, pos.row).map_err(|timeout| self.abandon(protocol, timeout))
  }

  fn exit(&mut self, protocol: &Protocol, pos: Position) -> Result<(), Error<E>> {
    protocol.exit_row(&mut self.signals, pos.row).map_err(|timeout| self.abandon(protocol, timeout))
  }

  fn abandon(&mut self, protocol: &Protocol, timeout: HandshakeTimeout) -> Error<E> {
    warning!("bus: handshake on {=u32:#x} timed out, releasing matrix", timeout.mask);
    protocol.release(&mut self.signals);
    Error::Handshake(timeout.mask)
  }

  /// Read into `buf`, zero-filling it if the bus reports an error so the host
  /// still receives the length it asked for.
  fn read_or_zero(&mut self, address: u8, register: Option<Register>, buf: &mut [u8]) {
    if self.read_bytes(address, register, buf).is_err() {
      warning!("bus: read from {=u8:#x} failed", address);
      buf.fill(0);
    }
  }

  pub(crate) fn read_bytes(&mut self, address: u8, register: Option<Register>, buf: &mut [u8]) -> Result<(), Error<E>> {
    match register {
      Some(register) => self.i2c.write_read(address, register.bytes(), buf).map_err(Error::I2c),
      None => self.i2c.read(address, buf).map_err(Error::I2c),
    }
  }

  pub(crate) fn write_bytes(&mut self, address: u8, register: Register, data: &[u8]) -> Result<(), Error<E>> {
    let mut buf: Vec<u8, { PACKET_LEN + 2 }> = Vec::new();
    buf.extend_from_slice(register.bytes()).map_err(|_| Error::BufferOverflow)?;
    buf.extend_from_slice(data).map_err(|_| Error::BufferOverflow)?;
    self.i2c.write(address, &buf).map_err(Error::I2c)
  }
}
