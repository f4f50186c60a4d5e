//! UART link: SOF framing over a byte stream

use crate::config::NpiConfig;
use crate::events::{Event, EventSet};
use crate::link::{Inbound, Link};
use crate::npi::NpiShared;
use crate::protocol::uart::{encode_frame, FramerOutput, FramerStats, TxFrame, UartFramer};
use crate::transport::{OpenParams, Transport, TransportError, TransportKind};
use crate::types::Envelope;

/// Bytes pulled from the driver per read
const RX_CHUNK: usize = 32;

/// UART transport plus framer and in-flight transmit frame
pub struct UartLink<T> {
    transport: T,
    framer: UartFramer,
    chunk: [u8; RX_CHUNK],
    chunk_len: usize,
    chunk_pos: usize,
    in_flight: Option<TxFrame>,
}

impl<T: Transport> UartLink<T> {
    /// Wrap an unopened transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            framer: UartFramer::new(),
            chunk: [0; RX_CHUNK],
            chunk_len: 0,
            chunk_pos: 0,
            in_flight: None,
        }
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Receive counters
    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Whether a frame is partially written
    pub fn is_transmitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Feed buffered bytes until one output appears
    fn drain_chunk(&mut self, sleep_pending: bool) -> Option<FramerOutput> {
        if self.chunk_pos >= self.chunk_len {
            return None;
        }
        let (used, output) = self
            .framer
            .push(&self.chunk[self.chunk_pos..self.chunk_len], sleep_pending);
        self.chunk_pos += used;
        output
    }
}

impl<T: Transport> Link for UartLink<T> {
    fn kind(&self) -> TransportKind {
        TransportKind::Uart
    }

    fn open(&mut self, config: &NpiConfig) -> Result<(), TransportError> {
        self.framer = UartFramer::with_wake_byte(config.wake_byte);
        self.transport.open(OpenParams::Uart {
            baud_rate: config.baud_rate,
        })
    }

    fn wants_rx(&self, events: EventSet) -> bool {
        events.any(&[Event::RxReady, Event::RxIdle]) || self.chunk_pos < self.chunk_len
    }

    fn next_inbound(&mut self, _shared: &NpiShared, sleep_pending: bool) -> Option<Inbound> {
        loop {
            while self.chunk_pos < self.chunk_len {
                if let Some(out) = self.drain_chunk(sleep_pending) {
                    return Some(match out {
                        FramerOutput::Frame(env) => Inbound::Frame(env),
                        FramerOutput::Wake => Inbound::Wake,
                    });
                }
            }
            self.chunk_len = self.transport.read(&mut self.chunk);
            self.chunk_pos = 0;
            if self.chunk_len == 0 {
                return None;
            }
        }
    }

    fn complete_sync(&mut self, shared: &NpiShared, reply: Option<Envelope>) {
        let Some(reply) = reply else { return };
        match shared.tx.enqueue(reply) {
            Ok(()) => shared.events.signal(Event::TxReady),
            Err(e) => warn!("uart: response dropped: {:?}", e),
        }
    }

    fn on_enqueued(&mut self, shared: &NpiShared) {
        shared.events.signal(Event::TxReady);
    }

    fn transmit(&mut self, shared: &NpiShared) -> bool {
        loop {
            if self.in_flight.is_none() {
                let Some(env) = shared.tx.dequeue() else {
                    return false;
                };
                match encode_frame(&env) {
                    Ok(bytes) => self.in_flight = Some(TxFrame::new(bytes)),
                    Err(e) => {
                        warn!("uart: outbound frame dropped: {:?}", e);
                        continue;
                    }
                }
            }
            if let Some(frame) = self.in_flight.as_mut() {
                let n = self.transport.write(frame.remaining());
                frame.advance(n);
                if !frame.is_done() {
                    return true;
                }
            }
            self.in_flight = None;
        }
    }

    fn is_idle(&self, shared: &NpiShared) -> bool {
        self.framer.is_idle()
            && self.in_flight.is_none()
            && self.chunk_pos >= self.chunk_len
            && shared.tx.is_empty()
            && !self.transport.is_busy()
    }

    fn suspend(&mut self) {
        self.transport.suspend();
    }

    fn resume(&mut self) {
        self.transport.resume();
    }
}
