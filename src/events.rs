//! Task Event Flags
//!
//! Interrupt handlers only capture data and raise one of these events;
//! everything else runs when the task loop drains them in
//! [`crate::npi::NpiContext::process`].

use core::cell::Cell;

use critical_section::Mutex;

/// Reasons for the NPI task to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// UART bytes are waiting in the driver
    RxReady = 0,
    /// UART line went idle with bytes buffered
    RxIdle = 1,
    /// Outbound data is queued or a partial write can resume
    TxReady = 2,
    /// A synchronous request sits in the I2C/SPI reply slot
    SreqPending = 3,
    /// Wake interrupt or wake byte from the host
    Wake = 4,
    /// MRDY changed level
    MrdyEdge = 5,
    /// Asynchronous requests are waiting in the RX queue
    RxQueued = 6,
}

impl Event {
    const fn mask(self) -> u16 {
        1 << self as u8
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Event {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::RxReady => defmt::write!(f, "RxReady"),
            Self::RxIdle => defmt::write!(f, "RxIdle"),
            Self::TxReady => defmt::write!(f, "TxReady"),
            Self::SreqPending => defmt::write!(f, "SreqPending"),
            Self::Wake => defmt::write!(f, "Wake"),
            Self::MrdyEdge => defmt::write!(f, "MrdyEdge"),
            Self::RxQueued => defmt::write!(f, "RxQueued"),
        }
    }
}

/// Snapshot of raised events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EventSet(u16);

impl EventSet {
    /// Whether `event` was raised
    #[must_use]
    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.mask() != 0
    }

    /// Whether any of `events` was raised
    #[must_use]
    pub fn any(self, events: &[Event]) -> bool {
        events.iter().any(|&e| self.contains(e))
    }

    /// Whether nothing was raised
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Event bitmask shared between interrupt and task context
pub struct EventFlags {
    bits: Mutex<Cell<u16>>,
}

impl EventFlags {
    /// No events raised
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new(Cell::new(0)),
        }
    }

    /// Raise an event; callable from interrupt context
    pub fn signal(&self, event: Event) {
        critical_section::with(|cs| {
            let bits = self.bits.borrow(cs);
            bits.set(bits.get() | event.mask());
        });
    }

    /// Take and clear every raised event
    pub fn take(&self) -> EventSet {
        EventSet(critical_section::with(|cs| self.bits.borrow(cs).replace(0)))
    }

    /// Raised events without clearing them
    #[must_use]
    pub fn peek(&self) -> EventSet {
        EventSet(critical_section::with(|cs| self.bits.borrow(cs).get()))
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}
