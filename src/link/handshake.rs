//! I2C and SPI links: transaction framing with SRDY/MRDY arbitration

use crate::config::NpiConfig;
use crate::events::{Event, EventSet};
use crate::link::{Inbound, Link};
use crate::npi::NpiShared;
use crate::protocol::handshake::{HandshakeEngine, HandshakeMode, SlotState};
use crate::transport::{Handshake, OpenParams, Transport, TransportError, TransportKind};
use crate::types::Envelope;

/// Slave bus transport plus the shared handshake engine
///
/// The engine is also referenced by the bus interrupt handlers, so the
/// link only borrows it.
pub struct HandshakeLink<'a, T, P> {
    transport: T,
    engine: &'a HandshakeEngine<'a, P>,
}

impl<'a, T: Transport, P: Handshake> HandshakeLink<'a, T, P> {
    /// Pair a slave bus with its engine
    pub fn new(transport: T, engine: &'a HandshakeEngine<'a, P>) -> Self {
        Self { transport, engine }
    }

    /// The engine
    pub fn engine(&self) -> &'a HandshakeEngine<'a, P> {
        self.engine
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport, P: Handshake> Link for HandshakeLink<'_, T, P> {
    fn kind(&self) -> TransportKind {
        self.engine.mode().kind()
    }

    fn open(&mut self, config: &NpiConfig) -> Result<(), TransportError> {
        let params = match self.engine.mode() {
            HandshakeMode::I2c => OpenParams::I2c {
                address: config.i2c_address,
            },
            HandshakeMode::Spi => OpenParams::Spi,
        };
        self.transport.open(params)
    }

    fn wants_rx(&self, events: EventSet) -> bool {
        events.any(&[Event::RxQueued, Event::SreqPending])
    }

    // Asynchronous requests queued before the pending request arrived
    // earlier, since the slot stalls every write once it is occupied.
    fn next_inbound(&mut self, shared: &NpiShared, _sleep_pending: bool) -> Option<Inbound> {
        shared
            .rx
            .dequeue()
            .or_else(|| self.engine.take_request())
            .map(Inbound::Frame)
    }

    fn complete_sync(&mut self, _shared: &NpiShared, reply: Option<Envelope>) {
        self.engine.complete_request(reply);
    }

    fn on_enqueued(&mut self, _shared: &NpiShared) {
        self.engine.notify_enqueued();
    }

    // The host pulls data, so transmitting means keeping SRDY current.
    fn transmit(&mut self, _shared: &NpiShared) -> bool {
        self.engine.refresh_srdy();
        false
    }

    fn is_idle(&self, shared: &NpiShared) -> bool {
        self.engine.slot_state() == SlotState::Free
            && shared.tx.is_empty()
            && shared.rx.is_empty()
            && !self.engine.mrdy()
            && !self.transport.is_busy()
    }

    fn suspend(&mut self) {
        self.transport.suspend();
    }

    fn resume(&mut self) {
        self.transport.resume();
    }
}
