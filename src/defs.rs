/******************************************************************************
 * Host protocol definitions shared with the Azoteq keyboard interface GUI.   *
 * ========================================================================== *
 *                 Packet framing, opcode map & timing constants              *
*******************************************************************************/

pub const HEADER_A: u8 = 0xCC;
pub const HEADER_B: u8 = 0xEF;

/// Largest opcode + parameter payload a packet may carry.
pub const PACKET_LEN: usize = 128;
/// Inbound buffer: length byte, payload, CRC and trailer.
pub(crate) const FRAME_BUF_LEN: usize = PACKET_LEN + 6;
/// Encoded frame: headers, length byte, payload, CRC and trailer.
pub const MAX_FRAME_LEN: usize = PACKET_LEN + 7;

/// Maximum entries in a stream register list or direct device list.
pub const MAX_STREAM: usize = 20;

pub const MAX_COLUMNS: usize = 6;
pub const MAX_ROWS: usize = 6;

/// Written after write, mode-change and stream commands complete.
pub const COMPLETION_MARKER: [u8; 4] = [0xFF; 4];

pub(crate) const SETTLE_DELAY_US: u32 = 20;
pub(crate) const HANDSHAKE_ATTEMPTS: u8 = 50;
pub(crate) const HANDSHAKE_STEP_US: u32 = 20;
pub(crate) const STANDBY_EXIT_HOLD_US: u32 = 1_000;

/// Key-scan phases sampled per select-pair device.
pub(crate) const SELECT_PAIR_PHASES: usize = 5;
/// Key-scan phases sampled per row-select device: reset state plus up to 20 channels.
pub(crate) const ROW_SELECT_PHASES: usize = 22;
pub(crate) const MAX_KEY_SCAN_CHANNELS: u8 = 20;

/// Register address that skips the register phase of a full-polling read.
pub(crate) const NO_REGISTER: [u8; 2] = [0xFF, 0xFF];

/// Device kind selected by the setup command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Device {
  Iqs7220a = 0,
  Iqs7320a = 1,
  /// IQS9320 wired for its I²C interface, devices sit directly on the bus.
  Iqs9320Direct = 2,
  /// IQS9320 wired for its key-scan interface.
  Iqs9320KeyScan = 3,
}

impl Device {
  /// Width of a register address on the bus.
  pub const fn register_width(self) -> usize {
    match self {
      Device::Iqs7220a | Device::Iqs7320a => 1,
      Device::Iqs9320Direct | Device::Iqs9320KeyScan => 2,
    }
  }

  /// Whether the device is reached through the matrix select lines.
  pub const fn is_matrix(self) -> bool {
    !matches!(self, Device::Iqs9320Direct)
  }
}

impl TryFrom<u8> for Device {
  type Error = u8;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(Self::Iqs7220a),
      1 => Ok(Self::Iqs7320a),
      2 => Ok(Self::Iqs9320Direct),
      3 => Ok(Self::Iqs9320KeyScan),
      other => Err(other),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
  // General (0x00..0x02)
  Setup = 0x00,
  StopStreaming = 0x01,
  StopComms = 0x02,

  // IQS7220A (0x10..0x17)
  Iqs7220aKeyScan = 0x10,
  Iqs7220aReadSingle = 0x11,
  Iqs7220aWriteSingle = 0x12,
  Iqs7220aReadMulti = 0x13,
  Iqs7220aWriteMulti = 0x14,
  Iqs7220aStreamKeyScan = 0x15,
  Iqs7220aStreamReadSingle = 0x16,
  Iqs7220aStreamReadMulti = 0x17,

  // IQS7320A (0x20..0x29)
  Iqs7320aKeyScan = 0x20,
  Iqs7320aReadSingle = 0x21,
  Iqs7320aWriteSingle = 0x22,
  Iqs7320aReadMulti = 0x23,
  Iqs7320aWriteMulti = 0x24,
  Iqs7320aAutonomous = 0x25,
  Iqs7320aStandby = 0x26,
  Iqs7320aStreamKeyScan = 0x27,
  Iqs7320aStreamReadSingle = 0x28,
  Iqs7320aStreamReadMulti = 0x29,

  // IQS9320 I²C interface (0x30..0x35)
  Iqs9320ReadSingle = 0x30,
  Iqs9320WriteSingle = 0x31,
  Iqs9320ReadMulti = 0x32,
  Iqs9320WriteMulti = 0x33,
  Iqs9320StreamReadSingle = 0x34,
  Iqs9320StreamReadMulti = 0x35,

  // IQS9320 key-scan interface (0x40..0x48)
  Iqs9320KeyScan = 0x40,
  Iqs9320KsReadSingle = 0x41,
  Iqs9320KsWriteSingle = 0x42,
  Iqs9320KsReadMulti = 0x43,
  Iqs9320KsWriteMulti = 0x44,
  Iqs9320KsStandby = 0x45,
  Iqs9320StreamKeyScan = 0x46,
  Iqs9320KsStreamReadSingle = 0x47,
  Iqs9320KsStreamReadMulti = 0x48,
}

impl Opcode {
  /// Device kind an opcode is bound to, `None` for general commands.
  pub const fn device(self) -> Option<Device> {
    match (self as u8) >> 4 {
      0x1 => Some(Device::Iqs7220a),
      0x2 => Some(Device::Iqs7320a),
      0x3 => Some(Device::Iqs9320Direct),
      0x4 => Some(Device::Iqs9320KeyScan),
      _ => None,
    }
  }

  /// Whether a successful run is followed by [`COMPLETION_MARKER`].
  pub const fn reports_completion(self) -> bool {
    use Opcode::*;
    matches!(
      self,
      Iqs7220aWriteSingle
        | Iqs7220aWriteMulti
        | Iqs7220aStreamKeyScan
        | Iqs7220aStreamReadSingle
        | Iqs7220aStreamReadMulti
        | Iqs7320aWriteSingle
        | Iqs7320aWriteMulti
        | Iqs7320aAutonomous
        | Iqs7320aStandby
        | Iqs7320aStreamKeyScan
        | Iqs7320aStreamReadSingle
        | Iqs7320aStreamReadMulti
        | Iqs9320WriteSingle
        | Iqs9320WriteMulti
        | Iqs9320StreamReadSingle
        | Iqs9320StreamReadMulti
        | Iqs9320KsWriteSingle
        | Iqs9320KsWriteMulti
        | Iqs9320KsStandby
        | Iqs9320StreamKeyScan
        | Iqs9320KsStreamReadSingle
        | Iqs9320KsStreamReadMulti
    )
  }
}

impl From<Opcode> for u8 {
  #[inline]
  fn from(op: Opcode) -> Self {
    op as u8
  }
}

impl TryFrom<u8> for Opcode {
  type Error = u8;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    use Opcode::*;
    Ok(match value {
      0x00 => Setup,
      0x01 => StopStreaming,
      0x02 => StopComms,
      0x10 => Iqs7220aKeyScan,
      0x11 => Iqs7220aReadSingle,
      0x12 => Iqs7220aWriteSingle,
      0x13 => Iqs7220aReadMulti,
      0x14 => Iqs7220aWriteMulti,
      0x15 => Iqs7220aStreamKeyScan,
      0x16 => Iqs7220aStreamReadSingle,
      0x17 => Iqs7220aStreamReadMulti,
      0x20 => Iqs7320aKeyScan,
      0x21 => Iqs7320aReadSingle,
      0x22 => Iqs7320aWriteSingle,
      0x23 => Iqs7320aReadMulti,
      0x24 => Iqs7320aWriteMulti,
      0x25 => Iqs7320aAutonomous,
      0x26 => Iqs7320aStandby,
      0x27 => Iqs7320aStreamKeyScan,
      0x28 => Iqs7320aStreamReadSingle,
      0x29 => Iqs7320aStreamReadMulti,
      0x30 => Iqs9320ReadSingle,
      0x31 => Iqs9320WriteSingle,
      0x32 => Iqs9320ReadMulti,
      0x33 => Iqs9320WriteMulti,
      0x34 => Iqs9320StreamReadSingle,
      0x35 => Iqs9320StreamReadMulti,
      0x40 => Iqs9320KeyScan,
      0x41 => Iqs9320KsReadSingle,
      0x42 => Iqs9320KsWriteSingle,
      0x43 => Iqs9320KsReadMulti,
      0x44 => Iqs9320KsWriteMulti,
      0x45 => Iqs9320KsStandby,
      0x46 => Iqs9320StreamKeyScan,
      0x47 => Iqs9320KsStreamReadSingle,
      0x48 => Iqs9320KsStreamReadMulti,
      other => return Err(other),
    })
  }
}

/// Stream state tag as reported to the host GUI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StreamMode {
  Disabled = 0x00,
  Iqs7220aKeyScan = 0x10,
  Iqs7220aRead = 0x11,
  Iqs7320aKeyScan = 0x20,
  Iqs7320aRead = 0x21,
  Iqs9320Read = 0x30,
  Iqs9320KeyScan = 0x31,
  Iqs9320KsRead = 0x32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opcode_table_roundtrips_every_defined_value() {
    let mut defined = 0;
    for raw in 0..=u8::MAX {
      if let Ok(op) = Opcode::try_from(raw) {
        assert_eq!(u8::from(op), raw);
        defined += 1;
      }
    }
    assert_eq!(defined, 36);
  }

  #[test]
  fn opcode_family_follows_high_nibble() {
    assert_eq!(Opcode::Setup.device(), None);
    assert_eq!(Opcode::Iqs7220aReadMulti.device(), Some(Device::Iqs7220a));
    assert_eq!(Opcode::Iqs7320aStandby.device(), Some(Device::Iqs7320a));
    assert_eq!(Opcode::Iqs9320WriteMulti.device(), Some(Device::Iqs9320Direct));
    assert_eq!(Opcode::Iqs9320KsStreamReadMulti.device(), Some(Device::Iqs9320KeyScan));
  }

  #[test]
  fn reads_do_not_report_completion() {
    assert!(!Opcode::Iqs7220aReadSingle.reports_completion());
    assert!(!Opcode::Iqs9320KeyScan.reports_completion());
    assert!(Opcode::Iqs7220aWriteSingle.reports_completion());
    assert!(Opcode::Iqs9320StreamKeyScan.reports_completion());
  }

  #[test]
  fn unknown_device_kind_is_rejected() {
    assert_eq!(Device::try_from(3), Ok(Device::Iqs9320KeyScan));
    assert_eq!(Device::try_from(4), Err(4));
  }

  #[test]
  fn only_direct_kind_bypasses_the_matrix() {
    assert!(Device::Iqs7220a.is_matrix());
    assert!(Device::Iqs9320KeyScan.is_matrix());
    assert!(!Device::Iqs9320Direct.is_matrix());
    assert_eq!(Device::Iqs9320KeyScan.register_width(), 2);
  }
}
