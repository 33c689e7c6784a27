//! Periodic sampling.
//!
//! At most one stream is active. A new stream command replaces it wholesale,
//! stop clears it. The poll loop asks [`Scheduler::due`] whenever no frame is
//! partially received and runs the returned job to completion.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, SevenBitAddress};
use embedded_hal_nb::serial;
use heapless::Vec;

use crate::bus::{Register, Transfer};
use crate::defs::{StreamMode, MAX_STREAM};
use crate::family::Setup;
use crate::lines::Lines;
use crate::log::{debug, warning};
use crate::matrix::Target;
use crate::transport::Clock;
use crate::{Activity, Bridge, Error};

/// One register of a stream's read list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterRead {
  pub register: Register,
  pub len: u8,
}

pub type RegisterList = Vec<RegisterRead, MAX_STREAM>;
pub type AddressList = Vec<u8, MAX_STREAM>;

/// Work performed on every fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamJob {
  /// Key-scan of the whole matrix.
  KeyScan { channels: u8 },
  /// Matrix-addressed reads, registers outer and targeted devices inner.
  Matrix { target: Target, address: u8, registers: RegisterList },
  /// Full-polling reads, registers outer and bus addresses inner.
  Direct { addresses: AddressList, registers: RegisterList },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
  pub mode: StreamMode,
  pub interval_ms: u8,
  pub job: StreamJob,
}

#[derive(Debug)]
struct Active {
  config: StreamConfig,
  last_ms: u32,
}

/// Holds the active stream and decides when it fires.
#[derive(Debug, Default)]
pub struct Scheduler {
  active: Option<Active>,
}

impl Scheduler {
  pub const fn new() -> Self {
    Self { active: None }
  }

  /// Replace the active stream. The first fire comes one interval after `now_ms`.
  pub fn start(&mut self, config: StreamConfig, now_ms: u32) {
    self.active = Some(Active { config, last_ms: now_ms });
  }

  pub fn stop(&mut self) {
    self.active = None;
  }

  pub fn mode(&self) -> StreamMode {
    self.active.as_ref().map_or(StreamMode::Disabled, |a| a.config.mode)
  }

  /// Job to run if a full interval has passed since the previous fire.
  pub fn due(&mut self, now_ms: u32) -> Option<StreamJob> {
    let active = self.active.as_mut()?;
    if now_ms.wrapping_sub(active.last_ms) < active.config.interval_ms as u32 {
      return None;
    }
    active.last_ms = now_ms;
    Some(active.config.job.clone())
  }
}

impl<S, I, E, L, D, C> Bridge<S, I, L, D, C>
where
  S: serial::Read + serial::Write,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  C: Clock,
{
  /// Fire the active stream if it is due.
  pub(crate) fn service_stream(&mut self) -> Option<Activity> {
    let setup = self.setup?;
    let mode = self.scheduler.mode();
    let job = self.scheduler.due(self.clock.now_ms())?;

    debug!("stream: fire {}", mode);
    Some(match self.run_stream(&setup, job) {
      Ok(()) => Activity::Streamed(mode),
      Err(_) => {
        warning!("stream: {} abandoned", mode);
        Activity::StreamFailed(mode)
      }
    })
  }

  fn run_stream(&mut self, setup: &Setup, job: StreamJob) -> Result<(), Error<E>> {
    match job {
      StreamJob::KeyScan { channels } => {
        self.key_scan(setup, channels);
        Ok(())
      }
      StreamJob::Matrix { target, address, registers } => {
        for read in registers {
          self.matrix_read(setup, target, Transfer { address, register: read.register, len: read.len })?;
        }
        Ok(())
      }
      StreamJob::Direct { addresses, registers } => {
        for read in registers {
          for &address in &addresses {
            self.direct_read(Transfer { address, register: read.register, len: read.len });
          }
        }
        Ok(())
      }
    }
  }
}
