//! Transport Driver Abstractions
//!
//! The lower-layer contract NPI consumes from the HAL. Each physical link
//! implements [`Transport`]; the I2C and SPI links additionally implement
//! [`Handshake`] to drive SRDY and sense MRDY. Implementations own the
//! peripheral and know nothing about framing. Slave-mode buses are driven
//! by [`slave::SlaveServer`].

use core::fmt;

use crate::config::{HANDSHAKE_MAX_PAYLOAD, MAX_PAYLOAD};

#[cfg(all(feature = "std", not(feature = "embedded")))]
pub mod sim;
pub mod slave;

/// Physical transport selected for the host link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Byte stream with SOF framing and FCS
    Uart,
    /// Host-polled SPI slave with SRDY/MRDY
    Spi,
    /// I2C slave with SRDY/MRDY
    I2c,
}

impl TransportKind {
    /// Largest payload one frame can carry on this transport
    #[must_use]
    pub const fn max_payload(self) -> usize {
        match self {
            Self::Uart => MAX_PAYLOAD,
            Self::Spi | Self::I2c => HANDSHAKE_MAX_PAYLOAD,
        }
    }

    /// Whether the link arbitrates with SRDY/MRDY
    #[must_use]
    pub const fn uses_handshake(self) -> bool {
        !matches!(self, Self::Uart)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for TransportKind {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Uart => defmt::write!(f, "UART"),
            Self::Spi => defmt::write!(f, "SPI"),
            Self::I2c => defmt::write!(f, "I2C"),
        }
    }
}

/// Parameters passed when opening a transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenParams {
    /// UART at the given baud rate
    Uart {
        /// Line rate in bits per second
        baud_rate: u32,
    },
    /// SPI slave; clocking is owned by the host
    Spi,
    /// I2C slave at the given 7-bit address
    I2c {
        /// Slave address
        address: u8,
    },
}

/// Transport driver failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// Peripheral could not be configured
    Config,
    /// Bus or line error reported by the peripheral
    Bus,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "transport configuration failed"),
            Self::Bus => write!(f, "transport bus error"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for TransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Config => defmt::write!(f, "Config"),
            Self::Bus => defmt::write!(f, "Bus"),
        }
    }
}

/// Non-blocking physical link
pub trait Transport {
    /// Configure the peripheral
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the peripheral rejects the
    /// parameters.
    fn open(&mut self, params: OpenParams) -> Result<(), TransportError>;

    /// Copy up to `buf.len()` received bytes into `buf`, returning the count
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Queue up to `data.len()` bytes for transmission, returning the count
    fn write(&mut self, data: &[u8]) -> usize;

    /// Whether a transfer is in progress and the peripheral must stay powered
    fn is_busy(&self) -> bool;

    /// Power the peripheral down ahead of sleep
    fn suspend(&mut self);

    /// Restore the peripheral after wake
    fn resume(&mut self);
}

/// SRDY/MRDY handshake lines
pub trait Handshake {
    /// Drive SRDY; `true` means asserted
    fn set_srdy(&mut self, asserted: bool);

    /// Current SRDY level
    fn srdy(&self) -> bool;

    /// Whether the host currently asserts MRDY
    fn mrdy(&self) -> bool;
}
