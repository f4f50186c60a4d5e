//! UART Transport
//!
//! Wraps any buffered `embedded-io` serial port (for example embassy's
//! `BufferedUart`) as a non-blocking [`Transport`]. The port's own
//! interrupt handler fills the ring buffer; this adapter only drains it.

use embedded_io::{Read, ReadReady, Write};

use crate::transport::{OpenParams, Transport, TransportError};

/// Buffered serial port driven through `embedded-io`
pub struct IoUart<U> {
    port: U,
    baud_rate: u32,
    rx_pending: bool,
    suspended: bool,
}

impl<U: Read + ReadReady + Write> IoUart<U> {
    /// Wrap a port already configured at its line rate
    #[must_use]
    pub fn new(port: U) -> Self {
        Self {
            port,
            baud_rate: 0,
            rx_pending: false,
            suspended: false,
        }
    }

    /// Rate accepted by the last successful `open`
    #[must_use]
    pub const fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Whether the port was powered down
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn poll_ready(&mut self) -> bool {
        self.port.read_ready().unwrap_or(false)
    }
}

impl<U: Read + ReadReady + Write> Transport for IoUart<U> {
    fn open(&mut self, params: OpenParams) -> Result<(), TransportError> {
        match params {
            OpenParams::Uart { baud_rate } if baud_rate > 0 => {
                self.baud_rate = baud_rate;
                self.rx_pending = self.poll_ready();
                Ok(())
            }
            _ => Err(TransportError::Config),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() || !self.poll_ready() {
            self.rx_pending = false;
            return 0;
        }
        let n = match self.port.read(buf) {
            Ok(n) => n,
            Err(_) => {
                warn!("uart: receive error");
                0
            }
        };
        self.rx_pending = self.poll_ready();
        n
    }

    fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        match self.port.write(data) {
            Ok(n) => n,
            Err(_) => {
                warn!("uart: transmit error");
                0
            }
        }
    }

    fn is_busy(&self) -> bool {
        self.rx_pending
    }

    fn suspend(&mut self) {
        // Let the ring buffer empty before the clocks stop
        if self.port.flush().is_err() {
            warn!("uart: flush before suspend failed");
        }
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
        self.rx_pending = self.poll_ready();
    }
}
