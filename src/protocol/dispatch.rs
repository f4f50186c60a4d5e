//! Command Dispatcher
//!
//! Routes each complete inbound envelope to the upper layer by frame type.
//! Asynchronous requests are handed over by reference and forgotten.
//! Synchronous requests are rewritten in place by the handler and come
//! back re-tagged as the response. Everything else is dropped without a
//! reply; the host recovers by timing out.

use crate::types::{Envelope, FrameType, SubsystemSet};

/// Upper-layer callback contract
pub trait Handler {
    /// One received asynchronous request; the envelope is released on return
    fn on_async(&mut self, msg: &Envelope);

    /// One received synchronous request
    ///
    /// Overwrite `msg` with the response (subsystem, command, payload and
    /// length) and return [`SyncReply::Reply`]. Returning
    /// [`SyncReply::NoReply`] sends nothing.
    fn on_sync(&mut self, msg: &mut Envelope) -> SyncReply;
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn on_async(&mut self, msg: &Envelope) {
        (**self).on_async(msg);
    }

    fn on_sync(&mut self, msg: &mut Envelope) -> SyncReply {
        (**self).on_sync(msg)
    }
}

/// Whether a synchronous handler produced a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncReply {
    /// The envelope now holds the response
    Reply,
    /// No handler for this command
    NoReply,
}

/// Why an envelope was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Subsystem not enabled
    UnknownSubsystem,
    /// Frame type the NP never accepts (poll, response)
    UnexpectedType,
    /// Declared length exceeds the capacity
    Malformed,
    /// Synchronous handler declined to answer
    Unhandled,
    /// Response longer than the transport can carry
    OversizeReply,
}

#[cfg(feature = "embedded")]
impl defmt::Format for DropReason {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::UnknownSubsystem => defmt::write!(f, "UnknownSubsystem"),
            Self::UnexpectedType => defmt::write!(f, "UnexpectedType"),
            Self::Malformed => defmt::write!(f, "Malformed"),
            Self::Unhandled => defmt::write!(f, "Unhandled"),
            Self::OversizeReply => defmt::write!(f, "OversizeReply"),
        }
    }
}

/// Result of one dispatch
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Asynchronous request delivered
    Consumed,
    /// Synchronous response to send back on the same path
    Reply(Envelope),
    /// Frame lost
    Dropped(DropReason),
}

/// Dispatch counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Asynchronous requests delivered
    pub async_delivered: u32,
    /// Synchronous responses produced
    pub replies: u32,
    /// Frames dropped
    pub dropped: u32,
}

enum Routed {
    Delivered,
    Replied,
}

/// Frame-type router in front of a [`Handler`]
pub struct Dispatcher<H> {
    handler: H,
    subsystems: SubsystemSet,
    max_reply: usize,
    stats: DispatchStats,
}

impl<H: Handler> Dispatcher<H> {
    /// Route `subsystems` to `handler`; responses are capped at `max_reply` bytes
    pub fn new(handler: H, subsystems: SubsystemSet, max_reply: usize) -> Self {
        Self {
            handler,
            subsystems,
            max_reply,
            stats: DispatchStats::default(),
        }
    }

    /// Deliver one inbound envelope
    pub fn dispatch(&mut self, mut env: Envelope) -> Dispatch {
        let outcome = self.route(&mut env);
        match outcome {
            Ok(Routed::Replied) => {
                self.stats.replies += 1;
                Dispatch::Reply(env)
            }
            Ok(Routed::Delivered) => {
                self.stats.async_delivered += 1;
                Dispatch::Consumed
            }
            Err(reason) => {
                self.stats.dropped += 1;
                debug!(
                    "dispatch: {:?} for subsystem {} dropped: {:?}",
                    env.frame_type(),
                    env.subsystem().id(),
                    reason
                );
                Dispatch::Dropped(reason)
            }
        }
    }

    fn route(&mut self, env: &mut Envelope) -> Result<Routed, DropReason> {
        if !env.is_well_formed() {
            return Err(DropReason::Malformed);
        }
        if !self.subsystems.contains(env.subsystem()) {
            return Err(DropReason::UnknownSubsystem);
        }
        match env.frame_type() {
            FrameType::AsynchronousRequest => {
                self.handler.on_async(env);
                Ok(Routed::Delivered)
            }
            FrameType::SynchronousRequest => {
                if self.handler.on_sync(env) == SyncReply::NoReply {
                    return Err(DropReason::Unhandled);
                }
                if env.len() > self.max_reply {
                    warn!("dispatch: response of {} bytes exceeds {}", env.len(), self.max_reply);
                    return Err(DropReason::OversizeReply);
                }
                env.set_frame_type(FrameType::SynchronousResponse);
                Ok(Routed::Replied)
            }
            FrameType::Poll | FrameType::SynchronousResponse => Err(DropReason::UnexpectedType),
        }
    }

    /// The wrapped handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The wrapped handler, mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Subsystems currently routed
    pub fn subsystems(&self) -> SubsystemSet {
        self.subsystems
    }

    /// Change the routed subsystems
    pub fn set_subsystems(&mut self, subsystems: SubsystemSet) {
        self.subsystems = subsystems;
    }

    /// Dispatch counters
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}
