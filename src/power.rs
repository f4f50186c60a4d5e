//! Power Management
//!
//! Sleep voting for the NPI link. The coordinator allows low-power mode
//! only while the transport is idle and nothing is queued, and brings the
//! link back on a wake interrupt or renewed activity.
//!
//! ```text
//!  Hold ──idle──────────────────────────────► Conserve
//!  Hold ──idle + request_sleep──► EnterPending ──gate still armed──► Conserve (suspended)
//!  Conserve / EnterPending ──wake or activity──► ExitPending ──► Hold
//! ```
//!
//! A wake interrupt can land between the decision to sleep and the sleep
//! instruction. The task arms [`SleepGate`] before it collects a pass's
//! events, the interrupt handler clears it with one atomic store, and
//! [`PowerCoordinator::update`] only ever clears it afterwards. A wake
//! anywhere in the pass therefore leaves the gate cleared, and the idle
//! hook re-checks it immediately before entering low-power mode.

use core::sync::atomic::{AtomicBool, Ordering};

/// Coordinator state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Sleep blocked
    #[default]
    Hold,
    /// Sleep allowed
    Conserve,
    /// Sleep requested; the transport is about to be suspended
    EnterPending,
    /// Woken; the transport is about to be resumed
    ExitPending,
}

#[cfg(feature = "embedded")]
impl defmt::Format for PowerState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Hold => defmt::write!(f, "HOLD"),
            Self::Conserve => defmt::write!(f, "CONSERVE"),
            Self::EnterPending => defmt::write!(f, "ENTER"),
            Self::ExitPending => defmt::write!(f, "EXIT"),
        }
    }
}

/// Vote handed to the scheduler's power manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerVote {
    /// Keep the device awake
    Hold,
    /// The link does not need the device awake
    Conserve,
}

#[cfg(feature = "embedded")]
impl defmt::Format for PowerVote {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Hold => defmt::write!(f, "HOLD"),
            Self::Conserve => defmt::write!(f, "CONSERVE"),
        }
    }
}

/// Transport action requested by a state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    /// Nothing to do
    None,
    /// Power the transport down
    Suspend,
    /// Power the transport back up
    Resume,
}

/// Prepare-for-sleep flag cleared by the wake interrupt
pub struct SleepGate {
    armed: AtomicBool,
}

impl SleepGate {
    /// Gate closed
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    /// Start of a task pass: permit sleep until the next wake
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Revoke permission; safe from any interrupt without a critical section
    pub fn clear(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Whether sleep is still permitted; check right before sleeping
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl Default for SleepGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep vote state machine
#[derive(Clone, Debug, Default)]
pub struct PowerCoordinator {
    state: PowerState,
    sleep_requested: bool,
    suspended: bool,
}

impl PowerCoordinator {
    /// Start in [`PowerState::Hold`]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: PowerState::Hold,
            sleep_requested: false,
            suspended: false,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }

    /// Vote implied by the state
    #[must_use]
    pub const fn vote(&self) -> PowerVote {
        match self.state {
            PowerState::Conserve => PowerVote::Conserve,
            _ => PowerVote::Hold,
        }
    }

    /// Whether the transport is powered down
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the upper layer asked for sleep and it has not been revoked
    #[must_use]
    pub const fn is_sleep_pending(&self) -> bool {
        self.sleep_requested
            && matches!(self.state, PowerState::EnterPending | PowerState::Conserve)
    }

    /// Upper layer released its sleep-blocking vote
    pub fn request_sleep(&mut self) {
        self.sleep_requested = true;
    }

    /// Wake interrupt or wake byte handled by the task
    pub fn on_wake(&mut self) {
        self.sleep_requested = false;
        if matches!(self.state, PowerState::Conserve | PowerState::EnterPending) {
            self.transition(PowerState::ExitPending);
        }
    }

    /// Advance after a task pass; `idle` means transport idle and queues empty
    ///
    /// `gate` must have been armed before the pass collected its events.
    /// It is left armed only in [`PowerState::Conserve`].
    pub fn update(&mut self, idle: bool, gate: &SleepGate) -> PowerAction {
        let permitted = idle && gate.is_armed();
        let action = match self.state {
            PowerState::ExitPending => {
                self.transition(PowerState::Hold);
                self.resume_if_suspended()
            }
            PowerState::Hold if permitted => {
                if self.sleep_requested {
                    self.transition(PowerState::EnterPending);
                } else {
                    self.transition(PowerState::Conserve);
                }
                PowerAction::None
            }
            PowerState::Hold => PowerAction::None,
            PowerState::EnterPending if permitted => {
                self.suspended = true;
                self.transition(PowerState::Conserve);
                PowerAction::Suspend
            }
            PowerState::EnterPending => {
                // A wake or new traffic raced the decision to sleep
                self.sleep_requested = false;
                self.transition(PowerState::Hold);
                PowerAction::None
            }
            PowerState::Conserve if !permitted => {
                self.transition(PowerState::Hold);
                self.resume_if_suspended()
            }
            PowerState::Conserve => {
                if self.sleep_requested && !self.suspended {
                    self.transition(PowerState::EnterPending);
                }
                PowerAction::None
            }
        };
        if self.state != PowerState::Conserve {
            gate.clear();
        }
        action
    }

    fn resume_if_suspended(&mut self) -> PowerAction {
        if self.suspended {
            self.suspended = false;
            PowerAction::Resume
        } else {
            PowerAction::None
        }
    }

    fn transition(&mut self, next: PowerState) {
        if self.state != next {
            debug!("power: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
