//! Slave Bus Driver
//!
//! Runs an I2C or SPI peripheral in slave mode and feeds every host
//! transaction to the [`HandshakeEngine`]. The peripheral sits behind
//! [`SlaveBus`]; the NPI task sees the bus only through [`SlaveControl`],
//! a [`Transport`] backed by [`SlaveState`] atomics.
//!
//! Stretching is done by not answering: while the engine stalls a write
//! or stretches a read, the server keeps the transaction open and calls
//! [`SlaveBus::pause`] until the task side has moved the reply slot on.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::HANDSHAKE_FRAME_SIZE;
use crate::protocol::handshake::{HandshakeEngine, ReadOutcome, TransactionBuf, WriteOutcome};
use crate::transport::{Handshake, OpenParams, Transport, TransportError, TransportKind};

/// Direction of the transaction the host addressed us with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusCommand {
    /// Host is about to write a frame
    Write,
    /// Host is about to read
    Read,
}

#[cfg(feature = "embedded")]
impl defmt::Format for BusCommand {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Write => defmt::write!(f, "Write"),
            Self::Read => defmt::write!(f, "Read"),
        }
    }
}

/// Slave-mode peripheral
#[allow(async_fn_in_trait)]
pub trait SlaveBus {
    /// Apply the parameters the NPI task opened the link with
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] if the peripheral cannot serve
    /// them, e.g. an address other than the one it was built for.
    fn configure(&mut self, params: OpenParams) -> Result<(), TransportError>;

    /// Wait until the host addresses the slave
    async fn listen(&mut self) -> Result<BusCommand, TransportError>;

    /// Take the bytes of a host write, returning the count
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Answer a host read with `data`
    async fn respond(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Hold the open transaction while the task side catches up
    async fn pause(&mut self);
}

/// Bus status shared between the server and the NPI task
pub struct SlaveState {
    open: AtomicBool,
    busy: AtomicBool,
    suspended: AtomicBool,
    // I2C address, or NO_ADDRESS for SPI
    address: AtomicU8,
}

const NO_ADDRESS: u8 = 0xFF;

impl SlaveState {
    /// Closed, idle bus
    #[must_use]
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            address: AtomicU8::new(NO_ADDRESS),
        }
    }

    /// Transport handle for a link of `kind`
    #[must_use]
    pub const fn control(&self, kind: TransportKind) -> SlaveControl<'_> {
        SlaveControl { state: self, kind }
    }

    /// Whether the NPI task has opened the link
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Whether a host transaction is in progress
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether the link is powered down for sleep
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn params(&self) -> OpenParams {
        match self.address.load(Ordering::Acquire) {
            NO_ADDRESS => OpenParams::Spi,
            address => OpenParams::I2c { address },
        }
    }
}

impl Default for SlaveState {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Transport`] view of a slave bus served by [`SlaveServer`]
///
/// The host pulls every byte through the engine, so `read` and `write`
/// move nothing.
pub struct SlaveControl<'a> {
    state: &'a SlaveState,
    kind: TransportKind,
}

impl Transport for SlaveControl<'_> {
    fn open(&mut self, params: OpenParams) -> Result<(), TransportError> {
        let address = match (self.kind, params) {
            (TransportKind::I2c, OpenParams::I2c { address }) if address <= 0x7F => address,
            (TransportKind::Spi, OpenParams::Spi) => NO_ADDRESS,
            _ => return Err(TransportError::Config),
        };
        self.state.address.store(address, Ordering::Release);
        self.state.open.store(true, Ordering::Release);
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }

    fn write(&mut self, _data: &[u8]) -> usize {
        0
    }

    fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    fn suspend(&mut self) {
        self.state.suspended.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        self.state.suspended.store(false, Ordering::Release);
    }
}

/// Serves host transactions on a [`SlaveBus`]
pub struct SlaveServer<'a, B, P> {
    bus: B,
    engine: &'a HandshakeEngine<'a, P>,
    state: &'a SlaveState,
    rx: TransactionBuf,
    tx: TransactionBuf,
    // Poll answer waiting for the host's read phase
    staged: Option<usize>,
}

impl<'a, B: SlaveBus, P: Handshake> SlaveServer<'a, B, P> {
    /// Server for `bus`, reporting status through `state`
    pub fn new(bus: B, engine: &'a HandshakeEngine<'a, P>, state: &'a SlaveState) -> Self {
        Self {
            bus,
            engine,
            state,
            rx: [0; HANDSHAKE_FRAME_SIZE],
            tx: [0; HANDSHAKE_FRAME_SIZE],
            staged: None,
        }
    }

    /// The peripheral
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The peripheral, mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Wait for the link to be opened, then configure the peripheral
    ///
    /// # Errors
    ///
    /// Propagates [`SlaveBus::configure`] failures.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        while !self.state.is_open() {
            self.bus.pause().await;
        }
        self.bus.configure(self.state.params())
    }

    /// Serve transactions until the peripheral fails to configure
    pub async fn run(&mut self) -> TransportError {
        if let Err(e) = self.start().await {
            return e;
        }
        info!("slave: serving host transactions");
        loop {
            if let Err(e) = self.serve_one().await {
                warn!("slave: transaction failed: {}", e);
            }
        }
    }

    /// Serve exactly one host transaction
    ///
    /// # Errors
    ///
    /// Returns the peripheral's error; a staged poll answer survives it.
    pub async fn serve_one(&mut self) -> Result<(), TransportError> {
        let command = self.bus.listen().await?;
        self.state.busy.store(true, Ordering::Release);
        let result = match command {
            BusCommand::Write => self.serve_write().await,
            BusCommand::Read => self.serve_read().await,
        };
        self.state.busy.store(false, Ordering::Release);
        result
    }

    async fn serve_write(&mut self) -> Result<(), TransportError> {
        let n = self.bus.receive(&mut self.rx).await?;
        loop {
            match self.engine.on_master_write(&self.rx[..n], &mut self.tx) {
                WriteOutcome::Stall => self.bus.pause().await,
                WriteOutcome::Accepted => return Ok(()),
                WriteOutcome::Respond(len) => {
                    self.staged = Some(len);
                    return Ok(());
                }
            }
        }
    }

    async fn serve_read(&mut self) -> Result<(), TransportError> {
        let len = match self.staged {
            Some(len) => len,
            None => loop {
                match self.engine.on_master_read(&mut self.tx) {
                    ReadOutcome::Stretch => self.bus.pause().await,
                    ReadOutcome::Ready(len) => break len,
                }
            },
        };
        self.bus.respond(&self.tx[..len]).await?;
        self.staged = None;
        Ok(())
    }
}
