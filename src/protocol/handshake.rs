//! I2C/SPI Handshake Engine
//!
//! Each bus transaction carries one whole `LEN | CMD0 | CMD1 | DATA`
//! frame, so there is no SOF or FCS. Arbitration uses two lines: SRDY,
//! driven here, and MRDY, driven by the host.
//!
//! The engine owns the single reply slot. While a synchronous request sits
//! in the slot, further host writes are stalled, which is what keeps at
//! most one synchronous exchange outstanding. Interrupt handlers call
//! [`HandshakeEngine::on_master_write`], [`HandshakeEngine::on_master_read`]
//! and [`HandshakeEngine::on_mrdy`]; the task side takes the request and
//! writes the reply through [`HandshakeEngine::take_request`] and
//! [`HandshakeEngine::complete_request`].

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::{FRAME_HEADER_LEN, HANDSHAKE_FRAME_SIZE, HANDSHAKE_MAX_PAYLOAD};
use crate::events::Event;
use crate::npi::NpiShared;
use crate::transport::{Handshake, TransportKind};
use crate::types::{Envelope, FrameType};

/// One transaction's worth of bytes
pub type TransactionBuf = [u8; HANDSHAKE_FRAME_SIZE];

/// SRDY discipline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeMode {
    /// SRDY flags pending data; reads clock-stretch until a reply exists
    I2c,
    /// SRDY also answers MRDY and drops while a request is processed
    Spi,
}

impl HandshakeMode {
    /// Matching transport kind
    #[must_use]
    pub const fn kind(self) -> TransportKind {
        match self {
            Self::I2c => TransportKind::I2c,
            Self::Spi => TransportKind::Spi,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for HandshakeMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::I2c => defmt::write!(f, "I2C"),
            Self::Spi => defmt::write!(f, "SPI"),
        }
    }
}

/// Reply slot occupancy
#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    Free,
    /// Request received, waiting for the task
    Pending(Envelope),
    /// Task is running the synchronous callback
    InDispatch,
    /// Response ready for the next read or poll
    Reply(Envelope),
}

/// Coarse view of the reply slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing outstanding
    Free,
    /// A synchronous request is waiting for or inside dispatch
    Busy,
    /// A response waits for the host
    ReplyReady,
}

/// Outcome of a host write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Reply slot occupied; the driver must stretch or NAK
    Stall,
    /// Frame taken (or silently dropped as malformed)
    Accepted,
    /// Poll answered; the first `n` bytes of the response buffer are the read data
    Respond(usize),
}

/// Outcome of a read-only host transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Hold the bus until the pending reply is written
    Stretch,
    /// The first `n` bytes of the buffer are the read data
    Ready(usize),
}

/// Handshake counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandshakeStats {
    /// Polls answered
    pub polls: u32,
    /// Host writes stalled on an occupied slot
    pub stalls: u32,
    /// Malformed or undeliverable frames dropped
    pub dropped: u32,
}

struct Inner<P> {
    pins: P,
    slot: Slot,
    stats: HandshakeStats,
}

/// What a host write turned out to be, decided under the critical section
enum Classified {
    Stall,
    Poll(Option<Envelope>),
    Frame(Envelope),
    Malformed,
}

/// SRDY/MRDY protocol engine shared by interrupt and task context
pub struct HandshakeEngine<'a, P> {
    shared: &'a NpiShared,
    mode: HandshakeMode,
    inner: Mutex<RefCell<Inner<P>>>,
}

impl<'a, P: Handshake> HandshakeEngine<'a, P> {
    /// Engine with a free slot; SRDY is driven low
    pub fn new(shared: &'a NpiShared, mode: HandshakeMode, mut pins: P) -> Self {
        pins.set_srdy(false);
        Self {
            shared,
            mode,
            inner: Mutex::new(RefCell::new(Inner {
                pins,
                slot: Slot::Free,
                stats: HandshakeStats::default(),
            })),
        }
    }

    /// SRDY discipline in use
    #[must_use]
    pub const fn mode(&self) -> HandshakeMode {
        self.mode
    }

    /// Host wrote `data`; `response` receives the read data for a poll
    pub fn on_master_write(&self, data: &[u8], response: &mut TransactionBuf) -> WriteOutcome {
        if data.is_empty() {
            return match self.on_master_read(response) {
                ReadOutcome::Stretch => WriteOutcome::Stall,
                ReadOutcome::Ready(n) => WriteOutcome::Respond(n),
            };
        }

        // A poll is an all-zero CMD0; anything else is decoded before the
        // slot is inspected so the critical section only moves the slot.
        let is_poll = data.len() >= FRAME_HEADER_LEN && data[1] == 0;
        let frame = if is_poll { None } else { decode_transaction(data) };

        let classified = critical_section::with(|cs| {
            let mut guard = self.inner.borrow_ref_mut(cs);
            let inner = &mut *guard;
            let busy = matches!(inner.slot, Slot::Pending(_) | Slot::InDispatch);
            let reply_ready = matches!(inner.slot, Slot::Reply(_));
            if busy || (reply_ready && !is_poll) {
                inner.stats.stalls += 1;
                return Classified::Stall;
            }
            if is_poll {
                return match core::mem::replace(&mut inner.slot, Slot::Free) {
                    Slot::Reply(env) => Classified::Poll(Some(env)),
                    _ => Classified::Poll(None),
                };
            }
            match frame {
                Some(env) => Classified::Frame(env),
                None => {
                    inner.stats.dropped += 1;
                    Classified::Malformed
                }
            }
        });

        if matches!(classified, Classified::Stall) {
            debug!("handshake: host write stalled, reply slot occupied");
        }

        match classified {
            Classified::Stall => WriteOutcome::Stall,
            Classified::Malformed => WriteOutcome::Accepted,
            Classified::Poll(reply) => {
                let env = reply
                    .or_else(|| self.shared.tx.dequeue())
                    .unwrap_or_else(Envelope::poll_stub);
                let n = encode_transaction(&env, response);
                self.finish_poll();
                WriteOutcome::Respond(n)
            }
            Classified::Frame(env) => {
                self.accept_frame(env);
                WriteOutcome::Accepted
            }
        }
    }

    /// Host started a read without writing first
    ///
    /// A ready reply is returned and the slot freed. While a request is
    /// still being served the read is stretched. With nothing outstanding
    /// the read behaves like a poll.
    pub fn on_master_read(&self, out: &mut TransactionBuf) -> ReadOutcome {
        let slot = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if matches!(inner.slot, Slot::Pending(_) | Slot::InDispatch) {
                None
            } else {
                Some(core::mem::replace(&mut inner.slot, Slot::Free))
            }
        });
        let env = match slot {
            None => return ReadOutcome::Stretch,
            Some(Slot::Reply(env)) => env,
            Some(_) => self
                .shared
                .tx
                .dequeue()
                .unwrap_or_else(Envelope::poll_stub),
        };
        let n = encode_transaction(&env, out);
        self.finish_poll();
        ReadOutcome::Ready(n)
    }

    /// MRDY edge interrupt
    pub fn on_mrdy(&self) {
        let mode = self.mode;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if mode == HandshakeMode::Spi && inner.pins.mrdy() && inner.slot == Slot::Free {
                inner.pins.set_srdy(true);
            }
        });
        self.shared.events.signal(Event::MrdyEdge);
    }

    /// Take the pending synchronous request for dispatch
    pub fn take_request(&self) -> Option<Envelope> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            match core::mem::replace(&mut inner.slot, Slot::InDispatch) {
                Slot::Pending(env) => Some(env),
                other => {
                    inner.slot = other;
                    None
                }
            }
        })
    }

    /// Write the response for the request taken by [`Self::take_request`]
    ///
    /// `None` frees the slot without answering. Calls with no request in
    /// dispatch are ignored.
    pub fn complete_request(&self, reply: Option<Envelope>) {
        let completed = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.slot != Slot::InDispatch {
                return false;
            }
            match reply {
                Some(env) => {
                    inner.slot = Slot::Reply(env);
                    inner.pins.set_srdy(true);
                }
                None => inner.slot = Slot::Free,
            }
            true
        });
        if !completed {
            warn!("handshake: reply with no request in dispatch ignored");
        } else {
            self.refresh_srdy();
        }
    }

    /// Outbound data was queued; tell the host
    pub fn notify_enqueued(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).pins.set_srdy(true));
    }

    /// Assert SRDY while data waits, release it once everything is drained
    pub fn refresh_srdy(&self) {
        let tx_pending = !self.shared.tx.is_empty();
        let rx_pending = !self.shared.rx.is_empty();
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let reply_ready = matches!(inner.slot, Slot::Reply(_));
            if tx_pending || reply_ready {
                inner.pins.set_srdy(true);
            } else if !rx_pending && !inner.pins.mrdy() && inner.slot == Slot::Free {
                inner.pins.set_srdy(false);
            }
        });
    }

    /// Current SRDY level
    #[must_use]
    pub fn srdy(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pins.srdy())
    }

    /// Whether the host asserts MRDY
    #[must_use]
    pub fn mrdy(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pins.mrdy())
    }

    /// Coarse reply slot state
    #[must_use]
    pub fn slot_state(&self) -> SlotState {
        critical_section::with(|cs| match self.inner.borrow_ref(cs).slot {
            Slot::Free => SlotState::Free,
            Slot::Pending(_) | Slot::InDispatch => SlotState::Busy,
            Slot::Reply(_) => SlotState::ReplyReady,
        })
    }

    /// Handshake counters
    #[must_use]
    pub fn stats(&self) -> HandshakeStats {
        critical_section::with(|cs| self.inner.borrow_ref(cs).stats)
    }

    /// Run `f` with the pins, e.g. to sample or drive them from a test bench
    pub fn with_pins<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).pins))
    }

    fn accept_frame(&self, env: Envelope) {
        match env.frame_type() {
            FrameType::AsynchronousRequest => {
                if self.shared.rx.enqueue(env).is_ok() {
                    self.shared.events.signal(Event::RxQueued);
                } else {
                    self.count_drop();
                }
            }
            FrameType::SynchronousRequest => {
                let mode = self.mode;
                critical_section::with(|cs| {
                    let mut inner = self.inner.borrow_ref_mut(cs);
                    inner.slot = Slot::Pending(env);
                    if mode == HandshakeMode::Spi {
                        inner.pins.set_srdy(false);
                    }
                });
                self.shared.events.signal(Event::SreqPending);
            }
            FrameType::SynchronousResponse | FrameType::Poll => self.count_drop(),
        }
    }

    fn finish_poll(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).stats.polls += 1);
        self.refresh_srdy();
    }

    fn count_drop(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).stats.dropped += 1);
    }
}

/// Parse one `LEN | CMD0 | CMD1 | DATA` transaction
///
/// Returns `None` for short transactions, lengths past the transaction
/// buffer or the bytes actually written, and reserved type bits.
#[must_use]
pub fn decode_transaction(data: &[u8]) -> Option<Envelope> {
    let (&len, rest) = data.split_first()?;
    let len = usize::from(len);
    if rest.len() < 2 || len > HANDSHAKE_MAX_PAYLOAD || rest.len() - 2 < len {
        return None;
    }
    let mut env = Envelope::from_cmd(rest[0], rest[1]).ok()?;
    env.set_payload(&rest[2..2 + len]).ok()?;
    Some(env)
}

/// Write `env` as `LEN | CMD0 | CMD1 | DATA`, returning the byte count
///
/// Payloads beyond the transaction buffer are truncated to what fits;
/// callers validate lengths before queueing.
pub fn encode_transaction(env: &Envelope, out: &mut TransactionBuf) -> usize {
    let payload = env.payload();
    let len = payload.len().min(HANDSHAKE_MAX_PAYLOAD);
    out[0] = len as u8;
    out[1] = env.cmd0();
    out[2] = env.command_id();
    out[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].copy_from_slice(&payload[..len]);
    FRAME_HEADER_LEN + len
}
