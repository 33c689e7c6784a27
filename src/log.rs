//! Logging shims. Forward to `defmt` when the `defmt` feature is enabled and
//! compile to nothing otherwise, so host builds need no global logger.

macro_rules! trace {
  ($fmt:literal $(, $arg:expr)* $(,)?) => {{
    #[cfg(feature = "defmt")]
    ::defmt::trace!($fmt $(, $arg)*);
    #[cfg(not(feature = "defmt"))]
    let _ = ($(&$arg,)*);
  }};
}

macro_rules! debug {
  ($fmt:literal $(, $arg:expr)* $(,)?) => {{
    #[cfg(feature = "defmt")]
    ::defmt::debug!($fmt $(, $arg)*);
    #[cfg(not(feature = "defmt"))]
    let _ = ($(&$arg,)*);
  }};
}

macro_rules! info {
  ($fmt:literal $(, $arg:expr)* $(,)?) => {{
    #[cfg(feature = "defmt")]
    ::defmt::info!($fmt $(, $arg)*);
    #[cfg(not(feature = "defmt"))]
    let _ = ($(&$arg,)*);
  }};
}

macro_rules! warning {
  ($fmt:literal $(, $arg:expr)* $(,)?) => {{
    #[cfg(feature = "defmt")]
    ::defmt::warn!($fmt $(, $arg)*);
    #[cfg(not(feature = "defmt"))]
    let _ = ($(&$arg,)*);
  }};
}

pub(crate) use {debug, info, trace, warning};

#[cfg(test)]
mod tests {
  #[test]
  fn every_level_accepts_format_arguments() {
    let mask: u32 = 0b1010;
    trace!("trace {=u32:#x}", mask);
    debug!("debug {}", 1u8);
    info!("info");
    warning!("warning {=u32} {=u8}", mask, 2u8,);
  }
}
