//! Range-checked configuration values consumed by the protocol engine.

use snafu::{ensure, OptionExt, Snafu};

use core::fmt;
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a line speed the devices support.
    #[snafu(display("Invalid baud rate"))]
    InvalidBaudRate,
    /// The value isn't a valid outlet number.
    #[snafu(display("Invalid outlet"))]
    InvalidOutlet,
}

const fn invalid_baud_rate() -> InvalidBaudRateSnafu {
    InvalidBaudRateSnafu
}

const fn invalid_outlet() -> InvalidOutletSnafu {
    InvalidOutletSnafu
}

/// Serial line speed supported by BCM/XCP devices.
///
/// ## Example
/// ```
/// use bcmxcp::BaudRate;
/// let rate = BaudRate::new(9600).unwrap();
/// assert_eq!(*rate, 9600);
/// assert!(BaudRate::new(115_200).is_err());
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct BaudRate(u32);

impl BaudRate {
    /// Rates tried during autodetection, fastest first.
    pub const CANDIDATES: [BaudRate; 5] = [
        BaudRate(19200),
        BaudRate(9600),
        BaudRate(4800),
        BaudRate(2400),
        BaudRate(1200),
    ];

    /// Create a new baud rate, checking that it is one of [`BaudRate::CANDIDATES`].
    /// # Errors
    /// Returns [`Error::InvalidBaudRate`] for any other value.
    pub fn new(rate: impl TryInto<u32>) -> Result<Self, Error> {
        let rate = rate.try_into().ok().with_context(invalid_baud_rate)?;
        ensure!(
            Self::CANDIDATES.iter().any(|c| c.0 == rate),
            invalid_baud_rate()
        );
        Ok(Self(rate))
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(9600)
    }
}

impl Deref for BaudRate {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Create a new [`BaudRate`], panics if it is not a supported rate.
pub const fn baud(rate: u32) -> BaudRate {
    match rate {
        19200 | 9600 | 4800 | 2400 | 1200 => BaudRate(rate),
        _ => panic!("Invalid baud rate."),
    }
}

/// Outlet (load segment) number, range-checked to \[1, 64\].
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Outlet(u8);

impl Outlet {
    /// Create a new outlet number.
    /// # Errors
    /// Returns [`Error::InvalidOutlet`] if `outlet` is outside \[1, 64\].
    pub fn new(outlet: impl TryInto<u8>) -> Result<Self, Error> {
        let outlet = outlet.try_into().ok().with_context(invalid_outlet)?;
        ensure!((1..=64).contains(&outlet), invalid_outlet());
        Ok(Self(outlet))
    }
}

impl Deref for Outlet {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rates() {
        for rate in [19200, 9600, 4800, 2400, 1200] {
            assert_eq!(*BaudRate::new(rate).unwrap(), rate);
        }
        assert_eq!(BaudRate::new(115_200), Err(Error::InvalidBaudRate));
        assert_eq!(BaudRate::new(-1), Err(Error::InvalidBaudRate));
        assert_eq!(baud(2400), BaudRate::new(2400u16).unwrap());
        assert_eq!(BaudRate::default().to_string(), "9600");
    }

    #[test]
    fn test_outlet() {
        assert_eq!(*Outlet::new(1).unwrap(), 1);
        assert_eq!(*Outlet::new(64).unwrap(), 64);
        assert!(Outlet::new(0).is_err());
        assert!(Outlet::new(65).is_err());
        assert!(Outlet::new(300).is_err());
    }
}
