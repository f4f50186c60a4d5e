//! I2C Slave Bus
//!
//! Adapts embassy-stm32's async multimaster I2C (slave mode, DMA) to
//! [`SlaveBus`]. The peripheral stretches SCL on its own while an address
//! match is unanswered, so pausing is simply a short timer wait.

use embassy_stm32::i2c::{Error as I2cError, I2c, MultiMaster, SlaveCommandKind};
use embassy_stm32::mode::Async;
use embassy_time::Timer;

use crate::transport::slave::{BusCommand, SlaveBus};
use crate::transport::{OpenParams, TransportError};

/// Microseconds between retries while the engine holds a transaction
const PAUSE_US: u64 = 50;

/// I2C slave address wrapper
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct I2cAddress(u8);

impl I2cAddress {
    /// Create from 7-bit address
    #[must_use]
    pub const fn new(addr: u8) -> Self {
        Self(addr & 0x7F)
    }

    /// Get the 7-bit address
    #[must_use]
    pub const fn addr(self) -> u8 {
        self.0
    }
}

impl defmt::Format for I2cAddress {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "0x{:02X}", self.0);
    }
}

/// I2C peripheral already switched to slave mode at `address`
pub struct I2cSlave<'d> {
    i2c: I2c<'d, Async, MultiMaster>,
    address: I2cAddress,
}

impl<'d> I2cSlave<'d> {
    /// Wrap a peripheral built with `into_slave_multimaster` for `address`
    #[must_use]
    pub fn new(i2c: I2c<'d, Async, MultiMaster>, address: I2cAddress) -> Self {
        Self { i2c, address }
    }

    /// Own address
    #[must_use]
    pub const fn address(&self) -> I2cAddress {
        self.address
    }
}

fn bus_error(e: I2cError) -> TransportError {
    warn!("i2c: {}", defmt::Debug2Format(&e));
    TransportError::Bus
}

impl SlaveBus for I2cSlave<'_> {
    fn configure(&mut self, params: OpenParams) -> Result<(), TransportError> {
        match params {
            OpenParams::I2c { address } if address == self.address.addr() => Ok(()),
            _ => Err(TransportError::Config),
        }
    }

    async fn listen(&mut self) -> Result<BusCommand, TransportError> {
        let command = self.i2c.listen().await.map_err(bus_error)?;
        Ok(match command.kind {
            SlaveCommandKind::Write => BusCommand::Write,
            SlaveCommandKind::Read => BusCommand::Read,
        })
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.i2c.respond_to_write(buf).await.map_err(bus_error)
    }

    async fn respond(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.i2c.respond_to_read(data).await.map_err(bus_error)?;
        Ok(())
    }

    async fn pause(&mut self) {
        Timer::after_micros(PAUSE_US).await;
    }
}
