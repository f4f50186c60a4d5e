//! NPI Coprocessor Firmware Library
//!
//! This library implements the Network Processor Interface (NPI) of a
//! radio network processor: a framed request/response/notification
//! protocol between the network processor and an application processor,
//! carried over UART, SPI or I2C.
//!
//! # Architecture
//!
//! The firmware is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    UPPER LAYER (Handler)                     │
//! │      RF stack / profiles: on_async, on_sync, send_async      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        NPI TASK                              │
//! │  Dispatcher  │  TX/RX Queues  │  Power-Save Coordinator      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     FRAMING ENGINE                           │
//! │  UART SOF framer + FCS  │  I2C/SPI transactions + SRDY/MRDY  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    TRANSPORT DRIVER                          │
//! │      UART  │  SPI slave  │  I2C slave  │  GPIO handshake     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Fixed buffers**: every queue and frame lives in `heapless` storage
//! - **Interrupts only capture**: ISRs store data and raise an event flag
//! - **One task**: framing, dispatch and transmit run on a single loop
//! - **Explicit error handling**: outbound failures return `Result`,
//!   inbound failures drop the frame and log it

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(all(feature = "std", feature = "embedded"))]
compile_error!(
    "features `std` and `embedded` are mutually exclusive; build the firmware with \
     `--no-default-features --features embedded`"
);

// Must come first so the logging macros are visible to every module
#[macro_use]
mod fmt;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;

/// Hardware Abstraction Layer
///
/// Adapters from embassy/embedded-hal peripherals to the NPI transport
/// traits.
#[cfg(feature = "embedded")]
pub mod hal;

/// System configuration and constants
pub mod config;

/// Message envelope, frame types and subsystem ids
pub mod types;

/// Transport Drivers
///
/// Peripheral-facing traits plus a host simulation under `std`.
pub mod transport;

/// Task event flags raised from interrupt context
pub mod events;

/// Byte-budgeted message queues
pub mod queue;

pub mod protocol;

pub mod power;

pub mod link;

/// NPI task context and interrupt-side shared state
pub mod npi;

pub use npi::{NpiContext, NpiError, NpiShared};

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    pub use crate::link::{HandshakeLink, Link, UartLink};
    pub use crate::npi::{NpiContext, NpiError, NpiShared};
    pub use crate::power::{PowerState, PowerVote};
    pub use crate::protocol::dispatch::{Handler, SyncReply};
    pub use crate::transport::{Handshake, Transport, TransportKind};

    #[cfg(feature = "embedded")]
    pub use embassy_time::{Duration, Instant, Ticker, Timer};
}
