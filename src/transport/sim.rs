//! Host-side simulated transport
//!
//! In-memory stand-ins for the UART byte pipe and the SRDY/MRDY lines,
//! used by the host test suite and by desktop tooling that wants to drive
//! the NPI stack without hardware.

use heapless::{Deque, Vec};

use super::{Handshake, OpenParams, Transport, TransportError};

/// Capacity of each simulated direction
pub const SIM_PIPE_SIZE: usize = 1024;

/// Simulated UART
#[derive(Debug, Default)]
pub struct SimUart {
    rx: Deque<u8, SIM_PIPE_SIZE>,
    tx: Vec<u8, SIM_PIPE_SIZE>,
    write_limit: Option<usize>,
    busy: bool,
    suspended: bool,
    opened: Option<OpenParams>,
}

impl SimUart {
    /// Create an idle, unopened UART
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes arriving from the host; returns how many fit
    pub fn inject(&mut self, bytes: &[u8]) -> usize {
        bytes
            .iter()
            .take_while(|&&b| self.rx.push_back(b).is_ok())
            .count()
    }

    /// Bytes written towards the host so far
    #[must_use]
    pub fn transmitted(&self) -> &[u8] {
        &self.tx
    }

    /// Drop the captured transmit bytes
    pub fn clear_transmitted(&mut self) {
        self.tx.clear();
    }

    /// Cap how many bytes each `write` call accepts
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    /// Force the busy indication
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Whether `suspend` was called more recently than `resume`
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Parameters of the last `open`
    #[must_use]
    pub const fn opened(&self) -> Option<OpenParams> {
        self.opened
    }

    /// Received bytes not yet read by the stack
    #[must_use]
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for SimUart {
    fn open(&mut self, params: OpenParams) -> Result<(), TransportError> {
        match params {
            OpenParams::Uart { baud_rate: 0 } => Err(TransportError::Config),
            _ => {
                self.opened = Some(params);
                Ok(())
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let allowed = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
        data[..allowed]
            .iter()
            .take_while(|&&b| self.tx.push(b).is_ok())
            .count()
    }

    fn is_busy(&self) -> bool {
        self.busy || !self.rx.is_empty()
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}

/// Simulated SRDY/MRDY lines plus a slave bus that is never busy
#[derive(Debug, Default)]
pub struct SimPins {
    srdy: bool,
    mrdy: bool,
    srdy_edges: u32,
}

impl SimPins {
    /// Both lines de-asserted
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host drives MRDY
    pub fn set_mrdy(&mut self, asserted: bool) {
        self.mrdy = asserted;
    }

    /// Number of SRDY assertions seen
    #[must_use]
    pub const fn srdy_edges(&self) -> u32 {
        self.srdy_edges
    }
}

impl Handshake for SimPins {
    fn set_srdy(&mut self, asserted: bool) {
        if asserted && !self.srdy {
            self.srdy_edges += 1;
        }
        self.srdy = asserted;
    }

    fn srdy(&self) -> bool {
        self.srdy
    }

    fn mrdy(&self) -> bool {
        self.mrdy
    }
}

/// Simulated slave bus peripheral for the I2C and SPI links
#[derive(Debug, Default)]
pub struct SimSlaveBus {
    busy: bool,
    suspended: bool,
    opened: Option<OpenParams>,
}

impl SimSlaveBus {
    /// Idle, unopened bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the busy indication
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Whether the bus is suspended
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Parameters of the last `open`
    #[must_use]
    pub const fn opened(&self) -> Option<OpenParams> {
        self.opened
    }
}

impl Transport for SimSlaveBus {
    fn open(&mut self, params: OpenParams) -> Result<(), TransportError> {
        self.opened = Some(params);
        Ok(())
    }

    // Slave transactions arrive through the handshake engine, not by polling.
    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }

    fn write(&mut self, data: &[u8]) -> usize {
        data.len()
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn suspend(&mut self) {
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
    }
}
