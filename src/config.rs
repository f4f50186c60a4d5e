//! System configuration and protocol constants
//!
//! This module defines compile-time constants for the network processor
//! interface. Frame markers, buffer capacities, transport parameters and
//! pin assignments are centralized here. [`NpiConfig`] bundles the subset
//! that can be chosen when the context is created.

use crate::transport::TransportKind;
use crate::types::SubsystemSet;

/// UART start-of-frame marker
pub const SOF: u8 = 0xFE;

/// Keep-alive byte the host sends to wake a sleeping UART link
pub const UART_WAKE_BYTE: u8 = 0x00;

/// Envelope payload capacity in bytes
pub const MAX_PAYLOAD: usize = 128;

/// Bytes preceding the payload in every frame (LEN, CMD0, CMD1)
pub const FRAME_HEADER_LEN: usize = 3;

/// Bytes added around a UART frame (SOF, LEN, CMD0, CMD1, FCS)
pub const UART_FRAME_OVERHEAD: usize = 5;

/// Largest encoded UART frame
pub const UART_MAX_FRAME: usize = MAX_PAYLOAD + UART_FRAME_OVERHEAD;

/// Size of the single I2C/SPI transaction buffer
pub const HANDSHAKE_FRAME_SIZE: usize = 128;

/// Largest payload carried by one I2C/SPI transaction
pub const HANDSHAKE_MAX_PAYLOAD: usize = HANDSHAKE_FRAME_SIZE - FRAME_HEADER_LEN;

/// Default UART baud rate
pub const UART_BAUD_RATE: u32 = 115_200;

/// UART receive idle time before buffered bytes are reported
pub const UART_IDLE_TIMEOUT_MS: u32 = 6;

/// UART driver ring buffer sizes
pub const UART_RX_BUFFER_SIZE: usize = 256;

/// UART driver transmit ring buffer size
pub const UART_TX_BUFFER_SIZE: usize = 256;

/// 7-bit I2C slave address of the network processor
pub const I2C_SLAVE_ADDR: u8 = 0x41;

/// I2C bus speed the slave is timed for
pub const I2C_FREQUENCY_HZ: u32 = 400_000;

/// Message memory available to the TX and RX queues, in bytes
pub const MESSAGE_POOL_BYTES: usize = 1024;

/// Per-message bookkeeping charged against the pool on top of the payload
pub const MESSAGE_OVERHEAD: usize = 8;

/// Pin assignments for the NPI link
pub mod pins {
    //! GPIO pin assignments for the host link

    /// UART TX to the application processor
    pub const UART_TX: &str = "PA9";

    /// UART RX from the application processor
    pub const UART_RX: &str = "PA10";

    /// SRDY output (active low)
    pub const SRDY: &str = "PB0";

    /// MRDY input (active low, edge triggered)
    pub const MRDY: &str = "PB1";

    /// I2C1 SCL
    pub const I2C_SCL: &str = "PB8";

    /// I2C1 SDA
    pub const I2C_SDA: &str = "PB9";
}

/// Runtime configuration for an [`crate::npi::NpiContext`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NpiConfig {
    /// Physical transport carrying the frames
    pub transport: TransportKind,
    /// UART baud rate
    pub baud_rate: u32,
    /// I2C slave address
    pub i2c_address: u8,
    /// UART wake byte
    pub wake_byte: u8,
    /// Subsystems the dispatcher routes; all others are dropped
    pub subsystems: SubsystemSet,
}

impl NpiConfig {
    /// Default configuration for the given transport
    #[must_use]
    pub const fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            baud_rate: UART_BAUD_RATE,
            i2c_address: I2C_SLAVE_ADDR,
            wake_byte: UART_WAKE_BYTE,
            subsystems: SubsystemSet::all_assigned(),
        }
    }

    /// Replace the enabled subsystem set
    #[must_use]
    pub const fn with_subsystems(mut self, subsystems: SubsystemSet) -> Self {
        self.subsystems = subsystems;
        self
    }

    /// Largest payload the configured transport can carry
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        self.transport.max_payload()
    }
}

impl Default for NpiConfig {
    fn default() -> Self {
        Self::new(TransportKind::Uart)
    }
}
