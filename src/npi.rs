//! Network Processor Interface
//!
//! [`NpiShared`] is the state touched from interrupt context: the TX and
//! RX queues, the event flags and the sleep gate. It is typically a
//! `static`. [`NpiContext`] owns everything else and runs on the single
//! NPI task: it drains events, pulls inbound envelopes from the link,
//! dispatches them, pushes replies and notifications back out and votes
//! on sleep.

use core::fmt;

use crate::config::NpiConfig;
use crate::events::{Event, EventFlags};
use crate::link::{Inbound, Link};
use crate::power::{PowerAction, PowerCoordinator, PowerState, PowerVote, SleepGate};
use crate::protocol::dispatch::{Dispatch, DispatchStats, Dispatcher, Handler};
use crate::queue::{MsgQueue, QueueError};
use crate::transport::TransportError;
use crate::types::{Envelope, EnvelopeError, FrameType};

/// Failure reported to the upper layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NpiError {
    /// Envelope does not fit the transport
    Envelope(EnvelopeError),
    /// TX queue could not take the envelope
    Queue(QueueError),
    /// Transport driver failure
    Transport(TransportError),
    /// Subsystem is not enabled in this build
    SubsystemDisabled(u8),
}

impl fmt::Display for NpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope(e) => write!(f, "envelope: {e}"),
            Self::Queue(e) => write!(f, "queue: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::SubsystemDisabled(id) => write!(f, "subsystem {id} disabled"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for NpiError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Envelope(e) => defmt::write!(f, "Envelope({})", e),
            Self::Queue(e) => defmt::write!(f, "Queue({})", e),
            Self::Transport(e) => defmt::write!(f, "Transport({})", e),
            Self::SubsystemDisabled(id) => defmt::write!(f, "SubsystemDisabled({})", id),
        }
    }
}

impl From<EnvelopeError> for NpiError {
    fn from(e: EnvelopeError) -> Self {
        Self::Envelope(e)
    }
}

impl From<QueueError> for NpiError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl From<TransportError> for NpiError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// State shared between interrupt handlers and the NPI task
pub struct NpiShared {
    /// Outbound envelopes in submission order
    pub tx: MsgQueue,
    /// Inbound asynchronous requests captured in interrupt context
    pub rx: MsgQueue,
    /// Pending task events
    pub events: EventFlags,
    /// Prepare-for-sleep flag
    pub gate: SleepGate,
}

impl NpiShared {
    /// Empty queues with the default message budget
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tx: MsgQueue::new(),
            rx: MsgQueue::new(),
            events: EventFlags::new(),
            gate: SleepGate::new(),
        }
    }

    /// Empty queues with `bytes` of message memory each
    #[must_use]
    pub const fn with_pool_bytes(bytes: usize) -> Self {
        Self {
            tx: MsgQueue::with_budget(bytes),
            rx: MsgQueue::with_budget(bytes),
            events: EventFlags::new(),
            gate: SleepGate::new(),
        }
    }

    /// Wake interrupt from the host
    pub fn on_wake_interrupt(&self) {
        self.gate.clear();
        self.events.signal(Event::Wake);
    }

    /// UART receive interrupt captured bytes in the driver
    pub fn on_uart_rx(&self) {
        self.events.signal(Event::RxReady);
    }

    /// UART receive line stayed idle with bytes buffered
    pub fn on_uart_idle(&self) {
        self.events.signal(Event::RxIdle);
    }

    /// UART transmitter can take more bytes
    pub fn on_uart_tx_ready(&self) {
        self.events.signal(Event::TxReady);
    }

    /// Final check for the idle hook right before the sleep instruction
    ///
    /// Refused while any event is still waiting for the task.
    #[must_use]
    pub fn may_sleep(&self) -> bool {
        self.gate.is_armed() && self.events.peek().is_empty()
    }
}

impl Default for NpiShared {
    fn default() -> Self {
        Self::new()
    }
}

/// NPI task state
pub struct NpiContext<'a, L, H> {
    shared: &'a NpiShared,
    link: L,
    dispatcher: Dispatcher<H>,
    power: PowerCoordinator,
    config: NpiConfig,
}

impl<'a, L: Link, H: Handler> NpiContext<'a, L, H> {
    /// Assemble the task state; call [`Self::init`] before processing
    pub fn new(shared: &'a NpiShared, link: L, handler: H, config: NpiConfig) -> Self {
        let config = NpiConfig {
            transport: link.kind(),
            ..config
        };
        Self {
            shared,
            link,
            dispatcher: Dispatcher::new(handler, config.subsystems, config.max_payload()),
            power: PowerCoordinator::new(),
            config,
        }
    }

    /// Open the transport
    ///
    /// # Errors
    ///
    /// Returns [`NpiError::Transport`] if the driver cannot be configured.
    pub fn init(&mut self) -> Result<(), NpiError> {
        self.link.open(&self.config)?;
        info!("npi: {:?} link open", self.config.transport);
        Ok(())
    }

    /// Queue an asynchronous notification for the host
    ///
    /// # Errors
    ///
    /// Returns [`NpiError::SubsystemDisabled`] for a subsystem outside the
    /// configured set, [`NpiError::Envelope`] if the payload exceeds what the
    /// transport carries and [`NpiError::Queue`] if message memory is
    /// exhausted. Nothing is queued and SRDY is untouched on failure.
    pub fn send_async(&mut self, mut env: Envelope) -> Result<(), NpiError> {
        let subsystem = env.subsystem();
        if !self.config.subsystems.contains(subsystem) {
            return Err(NpiError::SubsystemDisabled(subsystem.id()));
        }
        if env.len() > self.config.max_payload() {
            return Err(EnvelopeError::PayloadTooLong(env.len()).into());
        }
        env.set_frame_type(FrameType::AsynchronousRequest);
        if let Err(e) = self.shared.tx.enqueue(env) {
            warn!("npi: notification not queued: {:?}", e);
            return Err(e.into());
        }
        self.link.on_enqueued(self.shared);
        Ok(())
    }

    /// Upper layer no longer needs the device awake
    pub fn request_sleep(&mut self) {
        self.power.request_sleep();
    }

    /// Run one task pass over the raised events and return the sleep vote
    pub fn process(&mut self) -> PowerVote {
        // Armed before the events are taken so that a wake landing anywhere
        // in this pass is seen by `PowerCoordinator::update`
        self.shared.gate.arm();
        let events = self.shared.events.take();

        if events.contains(Event::Wake) {
            self.wake();
        }

        if self.link.wants_rx(events) {
            while let Some(inbound) = self
                .link
                .next_inbound(self.shared, self.power.is_sleep_pending())
            {
                match inbound {
                    Inbound::Wake => self.wake(),
                    Inbound::Frame(env) => self.handle_frame(env),
                }
            }
        }

        if self.link.transmit(self.shared) {
            self.shared.events.signal(Event::TxReady);
        }

        let idle = self.link.is_idle(self.shared);
        match self.power.update(idle, &self.shared.gate) {
            PowerAction::Suspend => {
                debug!("npi: transport suspended");
                self.link.suspend();
            }
            PowerAction::Resume => {
                debug!("npi: transport resumed");
                self.link.resume();
            }
            PowerAction::None => {}
        }
        self.power.vote()
    }

    fn wake(&mut self) {
        info!("npi: wake");
        self.power.on_wake();
    }

    fn handle_frame(&mut self, env: Envelope) {
        let synchronous = env.frame_type() == FrameType::SynchronousRequest;
        match self.dispatcher.dispatch(env) {
            Dispatch::Reply(reply) => self.link.complete_sync(self.shared, Some(reply)),
            Dispatch::Dropped(_) if synchronous => self.link.complete_sync(self.shared, None),
            Dispatch::Consumed | Dispatch::Dropped(_) => {}
        }
    }

    /// Active configuration
    pub fn config(&self) -> &NpiConfig {
        &self.config
    }

    /// Shared interrupt-side state
    pub fn shared(&self) -> &'a NpiShared {
        self.shared
    }

    /// The link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// The link, mutably
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// The upper-layer handler
    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    /// The upper-layer handler, mutably
    pub fn handler_mut(&mut self) -> &mut H {
        self.dispatcher.handler_mut()
    }

    /// Dispatch counters
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Power coordinator state
    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    /// Current sleep vote
    pub fn vote(&self) -> PowerVote {
        self.power.vote()
    }
}
