//! Transport Links
//!
//! A link pairs a [`crate::transport::Transport`] with its framing engine
//! and gives the task loop one view of all three transports: pull inbound
//! envelopes, return synchronous responses on the path the request came
//! from, and push queued outbound data.

pub mod handshake;
pub mod uart;

pub use handshake::HandshakeLink;
pub use uart::UartLink;

use crate::config::NpiConfig;
use crate::events::EventSet;
use crate::npi::NpiShared;
use crate::transport::{TransportError, TransportKind};
use crate::types::Envelope;

/// Work pulled from a link
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Complete, validated envelope
    Frame(Envelope),
    /// Host wake signal carried in-band
    Wake,
}

/// Transport-specific half of the NPI task
pub trait Link {
    /// Physical transport behind this link
    fn kind(&self) -> TransportKind;

    /// Open the underlying transport
    ///
    /// # Errors
    ///
    /// Propagates the driver's [`TransportError`].
    fn open(&mut self, config: &NpiConfig) -> Result<(), TransportError>;

    /// Whether `events` carry inbound work for this link
    fn wants_rx(&self, events: EventSet) -> bool;

    /// Next inbound item, or `None` once nothing more is buffered
    fn next_inbound(&mut self, shared: &NpiShared, sleep_pending: bool) -> Option<Inbound>;

    /// Finish a synchronous request; `None` means no response is sent
    fn complete_sync(&mut self, shared: &NpiShared, reply: Option<Envelope>);

    /// An envelope was added to the TX queue
    fn on_enqueued(&mut self, shared: &NpiShared);

    /// Move queued data towards the host; returns `true` if work remains
    fn transmit(&mut self, shared: &NpiShared) -> bool;

    /// Nothing in flight, nothing buffered, peripheral quiet
    fn is_idle(&self, shared: &NpiShared) -> bool;

    /// Power the transport down
    fn suspend(&mut self);

    /// Power the transport up
    fn resume(&mut self);
}
