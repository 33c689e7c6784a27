//! Host command decoding.
//!
//! Parameters are positional. Register-list commands carry a count byte
//! followed by the addresses (one or two bytes each) and then one length per
//! address. Every count and length is checked against the buffer it fills.

use heapless::Vec;

use crate::bus::{Register, Transfer};
use crate::defs::{Device, Opcode, StreamMode, MAX_KEY_SCAN_CHANNELS, MAX_STREAM, PACKET_LEN};
use crate::family::ModeChange;
use crate::matrix::{Matrix, Target};
use crate::stream::{AddressList, RegisterList, RegisterRead, StreamConfig, StreamJob};

/// Reasons a command's parameters were refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
  /// The packet ended before every parameter was read.
  Truncated,
  /// Setup named a device kind this bridge does not drive.
  UnknownDevice(u8),
  /// Matrix dimensions outside `1..=6` or larger than the line tables.
  InvalidMatrix { columns: u8, rows: u8 },
  /// Device index past the end of the matrix.
  DeviceOutOfRange(u8),
  /// Transfer length larger than a packet.
  LengthTooLarge(u8),
  /// Register or device list longer than a stream can hold.
  TooMany(u8),
  TooManyChannels(u8),
}

pub type WriteData = Vec<u8, PACKET_LEN>;

/// A decoded host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Setup { device: Device, matrix: Matrix },
  StopStreaming,
  StopComms,
  KeyScan { channels: u8 },
  Read { target: Target, transfer: Transfer },
  Write { target: Target, transfer: Transfer, data: WriteData },
  /// Full-polling read of each bus address in turn.
  DirectRead { addresses: AddressList, register: Register, len: u8 },
  DirectWrite { addresses: AddressList, register: Register, data: WriteData },
  Standby(ModeChange),
  Autonomous(ModeChange),
  Stream(StreamConfig),
}

impl Command {
  /// Decode the parameters of `opcode`. Device indices are checked against
  /// `matrix` when one is configured.
  pub fn decode(opcode: Opcode, params: &[u8], matrix: Option<Matrix>) -> Result<Self, DecodeError> {
    use Opcode::*;

    let width = opcode.device().map_or(1, Device::register_width);
    let mut p = Params { bytes: params, matrix };

    let command = match opcode {
      Setup => {
        let kind = p.byte()?;
        let device = Device::try_from(kind).map_err(DecodeError::UnknownDevice)?;
        let (columns, rows) = (p.byte()?, p.byte()?);
        let matrix = Matrix::new(columns, rows).ok_or(DecodeError::InvalidMatrix { columns, rows })?;
        Command::Setup { device, matrix }
      }
      StopStreaming => Command::StopStreaming,
      StopComms => Command::StopComms,

      Iqs7220aKeyScan | Iqs7320aKeyScan => Command::KeyScan { channels: 0 },
      Iqs9320KeyScan => Command::KeyScan { channels: p.channels()? },

      Iqs7220aReadSingle | Iqs7320aReadSingle | Iqs9320KsReadSingle => {
        let target = p.device()?;
        Command::Read { target, transfer: p.transfer(width)? }
      }
      Iqs7220aReadMulti | Iqs7320aReadMulti | Iqs9320KsReadMulti => {
        Command::Read { target: Target::All, transfer: p.transfer(width)? }
      }
      Iqs7220aWriteSingle | Iqs7320aWriteSingle | Iqs9320KsWriteSingle => {
        let target = p.device()?;
        let transfer = p.transfer(width)?;
        Command::Write { target, transfer, data: p.data(transfer.len)? }
      }
      Iqs7220aWriteMulti | Iqs7320aWriteMulti | Iqs9320KsWriteMulti => {
        let transfer = p.transfer(width)?;
        Command::Write { target: Target::All, transfer, data: p.data(transfer.len)? }
      }

      Iqs7320aAutonomous => Command::Autonomous(ModeChange::from(p.byte()?)),
      Iqs7320aStandby | Iqs9320KsStandby => Command::Standby(ModeChange::from(p.byte()?)),

      Iqs9320ReadSingle => {
        let addresses = p.list(1)?;
        let register = p.register(2)?;
        Command::DirectRead { addresses, register, len: p.len()? }
      }
      Iqs9320ReadMulti => {
        let count = p.count()?;
        let addresses = p.list(count)?;
        let register = p.register(2)?;
        Command::DirectRead { addresses, register, len: p.len()? }
      }
      Iqs9320WriteSingle => {
        let addresses = p.list(1)?;
        let register = p.register(2)?;
        let len = p.len()?;
        Command::DirectWrite { addresses, register, data: p.data(len)? }
      }
      Iqs9320WriteMulti => {
        let count = p.count()?;
        let addresses = p.list(count)?;
        let register = p.register(2)?;
        let len = p.len()?;
        Command::DirectWrite { addresses, register, data: p.data(len)? }
      }

      Iqs7220aStreamKeyScan => p.stream(StreamMode::Iqs7220aKeyScan, |_| Ok(StreamJob::KeyScan { channels: 0 }))?,
      Iqs7320aStreamKeyScan => p.stream(StreamMode::Iqs7320aKeyScan, |_| Ok(StreamJob::KeyScan { channels: 0 }))?,
      Iqs9320StreamKeyScan => {
        p.stream(StreamMode::Iqs9320KeyScan, |p| Ok(StreamJob::KeyScan { channels: p.channels()? }))?
      }

      Iqs7220aStreamReadSingle | Iqs7220aStreamReadMulti => p.stream(StreamMode::Iqs7220aRead, |p| {
        p.matrix_stream(opcode == Iqs7220aStreamReadSingle, width)
      })?,
      Iqs7320aStreamReadSingle | Iqs7320aStreamReadMulti => p.stream(StreamMode::Iqs7320aRead, |p| {
        p.matrix_stream(opcode == Iqs7320aStreamReadSingle, width)
      })?,
      Iqs9320KsStreamReadSingle | Iqs9320KsStreamReadMulti => p.stream(StreamMode::Iqs9320KsRead, |p| {
        p.matrix_stream(opcode == Iqs9320KsStreamReadSingle, width)
      })?,

      Iqs9320StreamReadSingle | Iqs9320StreamReadMulti => p.stream(StreamMode::Iqs9320Read, |p| {
        let count = if opcode == Iqs9320StreamReadSingle { 1 } else { p.count()? };
        let addresses = p.list(count)?;
        Ok(StreamJob::Direct { addresses, registers: p.registers(2)? })
      })?,
    };

    Ok(command)
  }
}

/// Bounds-checked cursor over a command's parameters.
struct Params<'a> {
  bytes: &'a [u8],
  matrix: Option<Matrix>,
}

impl<'a> Params<'a> {
  fn byte(&mut self) -> Result<u8, DecodeError> {
    let (&first, rest) = self.bytes.split_first().ok_or(DecodeError::Truncated)?;
    self.bytes = rest;
    Ok(first)
  }

  fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
    if n > self.bytes.len() {
      return Err(DecodeError::Truncated);
    }
    let (head, rest) = self.bytes.split_at(n);
    self.bytes = rest;
    Ok(head)
  }

  /// Device index, checked against the configured matrix.
  fn device(&mut self) -> Result<Target, DecodeError> {
    let index = self.byte()?;
    match self.matrix {
      Some(matrix) if !matrix.contains(index) => Err(DecodeError::DeviceOutOfRange(index)),
      _ => Ok(Target::Device(index)),
    }
  }

  fn register(&mut self, width: usize) -> Result<Register, DecodeError> {
    Ok(match width {
      1 => Register::Short(self.byte()?),
      _ => Register::Wide([self.byte()?, self.byte()?]),
    })
  }

  fn len(&mut self) -> Result<u8, DecodeError> {
    let len = self.byte()?;
    if len as usize > PACKET_LEN {
      return Err(DecodeError::LengthTooLarge(len));
    }
    Ok(len)
  }

  /// List count, at most [`MAX_STREAM`].
  fn count(&mut self) -> Result<u8, DecodeError> {
    let count = self.byte()?;
    if count as usize > MAX_STREAM {
      return Err(DecodeError::TooMany(count));
    }
    Ok(count)
  }

  fn channels(&mut self) -> Result<u8, DecodeError> {
    let channels = self.byte()?;
    if channels > MAX_KEY_SCAN_CHANNELS {
      return Err(DecodeError::TooManyChannels(channels));
    }
    Ok(channels)
  }

  fn list(&mut self, count: u8) -> Result<AddressList, DecodeError> {
    Vec::from_slice(self.take(count as usize)?).map_err(|_| DecodeError::TooMany(count))
  }

  /// Bus address, register and length of a single transaction.
  fn transfer(&mut self, width: usize) -> Result<Transfer, DecodeError> {
    let address = self.byte()?;
    let register = self.register(width)?;
    Ok(Transfer { address, register, len: self.len()? })
  }

  fn data(&mut self, len: u8) -> Result<Vec<u8, PACKET_LEN>, DecodeError> {
    Vec::from_slice(self.take(len as usize)?).map_err(|_| DecodeError::LengthTooLarge(len))
  }

  /// `n, reg[n * width], len[n]`
  fn registers(&mut self, width: usize) -> Result<RegisterList, DecodeError> {
    let count = self.count()?;
    let mut registers = RegisterList::new();
    for _ in 0..count {
      let register = self.register(width)?;
      // `count` is at most MAX_STREAM.
      registers.push(RegisterRead { register, len: 0 }).ok();
    }
    for read in registers.iter_mut() {
      read.len = self.len()?;
    }
    Ok(registers)
  }

  fn matrix_stream(&mut self, single: bool, width: usize) -> Result<StreamJob, DecodeError> {
    let target = if single { self.device()? } else { Target::All };
    let address = self.byte()?;
    Ok(StreamJob::Matrix { target, address, registers: self.registers(width)? })
  }

  /// Interval byte followed by the job's parameters.
  fn stream<F>(&mut self, mode: StreamMode, job: F) -> Result<Command, DecodeError>
  where
    F: FnOnce(&mut Self) -> Result<StreamJob, DecodeError>,
  {
    let interval_ms = self.byte()?;
    let job = job(self)?;
    Ok(Command::Stream(StreamConfig { mode, interval_ms, job }))
  }
}
