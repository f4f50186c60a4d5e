//! Hardware Abstraction Layer
//!
//! Adapters from STM32 peripherals to the NPI [`crate::transport`] traits.
//! The protocol layers never touch a peripheral directly.

pub mod gpio;
#[cfg(feature = "transport-i2c")]
pub mod i2c;
pub mod uart;

pub use gpio::{HandshakePins, SrdyLine};
#[cfg(feature = "transport-i2c")]
pub use i2c::{I2cAddress, I2cSlave};
pub use uart::IoUart;
