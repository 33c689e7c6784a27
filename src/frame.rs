//! Packet framing for the host link.
//!
//! ```text
//! CC EF | N | payload[N] | crc_lo crc_hi | CC EF
//! ```
//!
//! The CRC covers the payload only. The [`Framer`] consumes one byte at a time
//! and queues validated payloads. Any validation failure discards the header
//! that started the candidate frame and re-scans the bytes received after it,
//! so a corrupted frame never stalls the bytes that follow it.

use heapless::{Deque, Vec};

use crate::crc::crc16;
use crate::defs::{FRAME_BUF_LEN, HEADER_A, HEADER_B, MAX_FRAME_LEN, PACKET_LEN};
use crate::log::{trace, warning};

/// Validated packets waiting for dispatch.
const READY_SLOTS: usize = 4;
const REPLAY_LEN: usize = 2 * FRAME_BUF_LEN;

/// Reasons a candidate frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
  /// Declared payload length exceeds [`PACKET_LEN`].
  Oversized(u8),
  /// The two bytes after the CRC were not the header pair.
  MissingTrailer,
  /// CRC over the payload did not match the transmitted value.
  BadCrc { computed: u16, received: u16 },
  /// A packet validated while the ready queue was full.
  Overrun,
}

/// Validated packet payload: context byte, opcode and parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
  payload: Vec<u8, PACKET_LEN>,
}

impl Packet {
  pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
    let payload = Vec::from_slice(payload).map_err(|_| FrameError::Oversized(payload.len() as u8))?;
    Ok(Self { payload })
  }

  pub fn payload(&self) -> &[u8] {
    &self.payload
  }

  /// Host context byte, echoed in the acknowledgement.
  pub fn context(&self) -> Option<u8> {
    self.payload.first().copied()
  }

  pub fn opcode(&self) -> Option<u8> {
    self.payload.get(1).copied()
  }

  pub fn params(&self) -> &[u8] {
    self.payload.get(2..).unwrap_or(&[])
  }

  /// Six byte response confirming receipt of this packet.
  pub fn acknowledgement(&self) -> [u8; 6] {
    [
      HEADER_A,
      HEADER_B,
      self.context().unwrap_or(0),
      self.opcode().unwrap_or(0),
      HEADER_A,
      HEADER_B,
    ]
  }
}

/// Wrap `payload` in headers, length, CRC and trailer.
pub fn encode(payload: &[u8]) -> Result<Vec<u8, MAX_FRAME_LEN>, FrameError> {
  if payload.len() > PACKET_LEN {
    return Err(FrameError::Oversized(payload.len().min(u8::MAX as usize) as u8));
  }

  let crc = crc16(payload).to_le_bytes();
  let mut frame = Vec::new();
  // Capacity is PACKET_LEN + 7, checked above.
  frame.extend_from_slice(&[HEADER_A, HEADER_B, payload.len() as u8]).ok();
  frame.extend_from_slice(payload).ok();
  frame.extend_from_slice(&[crc[0], crc[1], HEADER_A, HEADER_B]).ok();
  Ok(frame)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sync {
  /// Scanning for header byte A.
  Idle,
  /// Header A seen, expecting header B.
  HeaderA,
  /// Both headers seen, collecting length, payload, CRC and trailer.
  Receiving,
}

enum Step {
  Pending,
  Complete(Packet),
  Rejected(FrameError, Vec<u8, FRAME_BUF_LEN>),
}

/// Byte-at-a-time frame recovery.
pub struct Framer {
  sync: Sync,
  buf: Vec<u8, FRAME_BUF_LEN>,
  ready: Deque<Packet, READY_SLOTS>,
}

impl Default for Framer {
  fn default() -> Self {
    Self::new()
  }
}

impl Framer {
  pub const fn new() -> Self {
    Self { sync: Sync::Idle, buf: Vec::new(), ready: Deque::new() }
  }

  /// A frame's length byte has arrived and the rest of it has not. Header
  /// bytes alone do not count, so line noise cannot hold this up.
  pub fn is_receiving(&self) -> bool {
    !self.buf.is_empty()
  }

  pub fn has_packet(&self) -> bool {
    !self.ready.is_empty()
  }

  /// Next validated packet, oldest first.
  pub fn next_packet(&mut self) -> Option<Packet> {
    self.ready.pop_front()
  }

  /// Feed one received byte.
  ///
  /// Returns the last validation failure caused by this byte, if any. Failed
  /// bytes are re-scanned for a new header before this call returns.
  pub fn push(&mut self, byte: u8) -> Result<(), FrameError> {
    let mut queue: Deque<u8, REPLAY_LEN> = Deque::new();
    queue.push_back(byte).ok();
    let mut result = Ok(());

    while let Some(byte) = queue.pop_front() {
      match self.step(byte) {
        Step::Pending => {}
        Step::Complete(packet) => {
          trace!("frame: packet of {=usize} bytes", packet.payload().len());
          if self.ready.push_back(packet).is_err() {
            warning!("frame: ready queue full, packet dropped");
            result = Err(FrameError::Overrun);
          }
        }
        Step::Rejected(error, replay) => {
          warning!("frame: dropped candidate frame: {}", error);
          result = Err(error);
          // Bytes only move between `buf` and `queue`, so the total never exceeds the buffer.
          for &b in replay.iter().rev() {
            queue.push_front(b).ok();
          }
        }
      }
    }

    result
  }

  fn reset(&mut self) -> Vec<u8, FRAME_BUF_LEN> {
    self.sync = Sync::Idle;
    core::mem::take(&mut self.buf)
  }

  fn step(&mut self, byte: u8) -> Step {
    match self.sync {
      Sync::Idle => {
        if byte == HEADER_A {
          self.sync = Sync::HeaderA;
        }
        Step::Pending
      }

      Sync::HeaderA => {
        self.sync = match byte {
          HEADER_B => Sync::Receiving,
          HEADER_A => Sync::HeaderA,
          _ => Sync::Idle,
        };
        Step::Pending
      }

      Sync::Receiving => {
        if self.buf.is_empty() && byte as usize > PACKET_LEN {
          self.reset();
          let mut replay = Vec::new();
          replay.push(byte).ok();
          return Step::Rejected(FrameError::Oversized(byte), replay);
        }

        // The length check above bounds a frame to FRAME_BUF_LEN bytes.
        self.buf.push(byte).ok();

        let declared = self.buf[0] as usize;
        if self.buf.len() < declared + 5 {
          return Step::Pending;
        }

        match validate(&self.buf) {
          Ok(packet) => {
            self.reset();
            Step::Complete(packet)
          }
          Err(error) => Step::Rejected(error, self.reset()),
        }
      }
    }
  }
}

/// `frame` holds the length byte through the trailer.
fn validate(frame: &[u8]) -> Result<Packet, FrameError> {
  let n = frame[0] as usize;
  if frame[n + 3] != HEADER_A || frame[n + 4] != HEADER_B {
    return Err(FrameError::MissingTrailer);
  }

  let payload = &frame[1..=n];
  let received = u16::from_le_bytes([frame[n + 1], frame[n + 2]]);
  let computed = crc16(payload);
  if computed != received {
    return Err(FrameError::BadCrc { computed, received });
  }

  Packet::new(payload)
}
