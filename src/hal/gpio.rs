//! GPIO Abstractions
//!
//! SRDY/MRDY handshake lines. Both are active low on the wire; the
//! [`Handshake`] trait speaks in asserted/deasserted terms.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::transport::Handshake;

/// SRDY output plus MRDY input
///
/// `InputPin` needs `&mut self`, so MRDY is sampled into a cached level
/// by [`HandshakePins::sample_mrdy`] from the edge interrupt.
pub struct HandshakePins<S, M> {
    srdy_pin: S,
    mrdy_pin: M,
    srdy: bool,
    mrdy: bool,
}

impl<S: OutputPin, M: InputPin> HandshakePins<S, M> {
    /// Take both pins; SRDY starts deasserted (high)
    pub fn new(mut srdy_pin: S, mrdy_pin: M) -> Self {
        if srdy_pin.set_high().is_err() {
            warn!("gpio: SRDY init failed");
        }
        Self {
            srdy_pin,
            mrdy_pin,
            srdy: false,
            mrdy: false,
        }
    }

    /// Refresh the cached MRDY level; returns the new level
    pub fn sample_mrdy(&mut self) -> bool {
        self.mrdy = self.mrdy_pin.is_low().unwrap_or(false);
        self.mrdy
    }

    /// MRDY pin, for awaiting edges on EXTI-capable inputs
    pub fn mrdy_pin_mut(&mut self) -> &mut M {
        &mut self.mrdy_pin
    }
}

impl<S: OutputPin, M: InputPin> Handshake for HandshakePins<S, M> {
    fn set_srdy(&mut self, asserted: bool) {
        if drive_srdy(&mut self.srdy_pin, asserted) {
            self.srdy = asserted;
        }
    }

    fn srdy(&self) -> bool {
        self.srdy
    }

    fn mrdy(&self) -> bool {
        self.mrdy
    }
}

/// SRDY output alone, for links whose MRDY pin is awaited by a task
///
/// The owner of the MRDY pin reports its level with
/// [`SrdyLine::set_mrdy`] before notifying the engine.
pub struct SrdyLine<S> {
    srdy_pin: S,
    srdy: bool,
    mrdy: bool,
}

impl<S: OutputPin> SrdyLine<S> {
    /// Take the pin; SRDY starts deasserted (high)
    pub fn new(mut srdy_pin: S) -> Self {
        if srdy_pin.set_high().is_err() {
            warn!("gpio: SRDY init failed");
        }
        Self {
            srdy_pin,
            srdy: false,
            mrdy: false,
        }
    }

    /// Record the MRDY level sampled by the pin owner
    pub fn set_mrdy(&mut self, asserted: bool) {
        self.mrdy = asserted;
    }
}

impl<S: OutputPin> Handshake for SrdyLine<S> {
    fn set_srdy(&mut self, asserted: bool) {
        if drive_srdy(&mut self.srdy_pin, asserted) {
            self.srdy = asserted;
        }
    }

    fn srdy(&self) -> bool {
        self.srdy
    }

    fn mrdy(&self) -> bool {
        self.mrdy
    }
}

/// SRDY is active low; returns whether the pin took the level
fn drive_srdy<S: OutputPin>(pin: &mut S, asserted: bool) -> bool {
    let result = if asserted { pin.set_low() } else { pin.set_high() };
    if result.is_err() {
        warn!("gpio: SRDY write failed");
    }
    result.is_ok()
}
