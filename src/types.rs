//! Shared types used across the NPI firmware
//!
//! This module defines the wire-independent message envelope and the
//! small domain types that enforce its invariants: the frame type carried
//! in the top bits of `CMD0`, the 5-bit subsystem id, and the set of
//! subsystems the dispatcher will route.

use core::fmt;

use crate::config::MAX_PAYLOAD;

/// Mask selecting the frame type bits of `CMD0`
pub const CMD0_TYPE_MASK: u8 = 0xE0;

/// Mask selecting the subsystem bits of `CMD0`
pub const CMD0_SUBSYSTEM_MASK: u8 = 0x1F;

/// RPC semantics of a frame, encoded in bits [7:5] of `CMD0`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Host fetching queued data (I2C/SPI handshake only)
    Poll,
    /// Request that must be answered within the same dispatch
    SynchronousRequest,
    /// Fire-and-forget notification
    AsynchronousRequest,
    /// Answer to a synchronous request
    SynchronousResponse,
}

impl FrameType {
    /// Type bits as they appear in `CMD0`
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Poll => 0x00,
            Self::SynchronousRequest => 0x20,
            Self::AsynchronousRequest => 0x40,
            Self::SynchronousResponse => 0x60,
        }
    }

    /// Decode the type bits of a `CMD0` byte
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidFrameType`] for the reserved
    /// encodings `0x80..=0xE0`.
    pub const fn from_cmd0(cmd0: u8) -> Result<Self, EnvelopeError> {
        match cmd0 & CMD0_TYPE_MASK {
            0x00 => Ok(Self::Poll),
            0x20 => Ok(Self::SynchronousRequest),
            0x40 => Ok(Self::AsynchronousRequest),
            0x60 => Ok(Self::SynchronousResponse),
            other => Err(EnvelopeError::InvalidFrameType(other)),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for FrameType {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Poll => defmt::write!(f, "POLL"),
            Self::SynchronousRequest => defmt::write!(f, "SREQ"),
            Self::AsynchronousRequest => defmt::write!(f, "AREQ"),
            Self::SynchronousResponse => defmt::write!(f, "SRSP"),
        }
    }
}

/// 5-bit subsystem identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subsystem(u8);

impl Subsystem {
    /// Reserved id; a zero `CMD0` on I2C/SPI is a poll
    pub const RES0: Self = Self(0);
    /// System services
    pub const SYS: Self = Self(1);
    /// MAC layer
    pub const MAC: Self = Self(2);
    /// Network layer
    pub const NWK: Self = Self(3);
    /// Application framework
    pub const AF: Self = Self(4);
    /// Device object
    pub const ZDO: Self = Self(5);
    /// Simple API
    pub const SAPI: Self = Self(6);
    /// Utilities
    pub const UTIL: Self = Self(7);
    /// Debug output
    pub const DBG: Self = Self(8);
    /// Application
    pub const APP: Self = Self(9);
    /// Remote control application framework
    pub const RCAF: Self = Self(10);
    /// Remote control network layer
    pub const RCN: Self = Self(11);
    /// Remote control network client
    pub const RCN_CLIENT: Self = Self(12);
    /// Serial bootloader
    pub const BOOT: Self = Self(13);
    /// Protocol test harness
    pub const ZIPTEST: Self = Self(14);
    /// Target debug
    pub const DEBUG: Self = Self(15);
    /// Peripheral access
    pub const PERIPHERALS: Self = Self(16);
    /// One past the highest assigned id
    pub const MAX: Self = Self(17);

    /// Create from the low five bits of `raw`
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw & CMD0_SUBSYSTEM_MASK)
    }

    /// Numeric id
    #[must_use]
    pub const fn id(self) -> u8 {
        self.0
    }

    /// Whether this is the reserved poll marker
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subsystem({})", self.0)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Subsystem {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SS{}", self.0);
    }
}

/// Bitmask of subsystems accepted by the dispatcher
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SubsystemSet(u32);

impl SubsystemSet {
    /// No subsystem enabled
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every assigned id except the reserved one
    #[must_use]
    pub const fn all_assigned() -> Self {
        Self(((1u32 << Subsystem::MAX.0) - 1) & !1)
    }

    /// Add a subsystem
    #[must_use]
    pub const fn with(self, subsystem: Subsystem) -> Self {
        Self(self.0 | (1 << subsystem.0))
    }

    /// Remove a subsystem
    #[must_use]
    pub const fn without(self, subsystem: Subsystem) -> Self {
        Self(self.0 & !(1 << subsystem.0))
    }

    /// Check membership; the reserved id is never a member
    #[must_use]
    pub const fn contains(self, subsystem: Subsystem) -> bool {
        !subsystem.is_reserved() && self.0 & (1 << subsystem.0) != 0
    }
}

/// Envelope construction and decoding errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Declared or supplied payload exceeds the capacity
    PayloadTooLong(usize),
    /// `CMD0` carries a reserved type encoding
    InvalidFrameType(u8),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLong(len) => write!(f, "payload of {len} bytes exceeds {MAX_PAYLOAD}"),
            Self::InvalidFrameType(bits) => write!(f, "invalid frame type bits 0x{bits:02X}"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for EnvelopeError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::PayloadTooLong(len) => defmt::write!(f, "PayloadTooLong({})", len),
            Self::InvalidFrameType(bits) => defmt::write!(f, "InvalidFrameType({=u8:#x})", bits),
        }
    }
}

/// Transport-independent protocol message
///
/// `length` is stored separately from the payload array so that an
/// upper-layer callback rewriting the envelope in place can be checked
/// before the result reaches a transport. Use [`Envelope::is_well_formed`]
/// or [`Envelope::payload`], which never reads past the capacity.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    frame_type: FrameType,
    subsystem: Subsystem,
    command_id: u8,
    length: u8,
    payload: [u8; MAX_PAYLOAD],
}

impl Envelope {
    /// Create an envelope carrying `payload`
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::PayloadTooLong`] if `payload` exceeds
    /// [`MAX_PAYLOAD`].
    pub fn new(
        frame_type: FrameType,
        subsystem: Subsystem,
        command_id: u8,
        payload: &[u8],
    ) -> Result<Self, EnvelopeError> {
        let mut env = Self::empty(frame_type, subsystem, command_id);
        env.set_payload(payload)?;
        Ok(env)
    }

    /// Create an envelope with no payload
    #[must_use]
    pub const fn empty(frame_type: FrameType, subsystem: Subsystem, command_id: u8) -> Self {
        Self {
            frame_type,
            subsystem,
            command_id,
            length: 0,
            payload: [0; MAX_PAYLOAD],
        }
    }

    /// All-zero poll stub returned when nothing is queued
    #[must_use]
    pub const fn poll_stub() -> Self {
        Self::empty(FrameType::Poll, Subsystem::RES0, 0)
    }

    /// Build from the two command bytes of a received frame
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidFrameType`] when `cmd0` carries a
    /// reserved type encoding.
    pub const fn from_cmd(cmd0: u8, cmd1: u8) -> Result<Self, EnvelopeError> {
        match FrameType::from_cmd0(cmd0) {
            Ok(frame_type) => Ok(Self::empty(frame_type, Subsystem::new(cmd0), cmd1)),
            Err(e) => Err(e),
        }
    }

    /// Frame type
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Re-tag the frame type
    pub fn set_frame_type(&mut self, frame_type: FrameType) {
        self.frame_type = frame_type;
    }

    /// Subsystem with the type bits stripped
    #[must_use]
    pub const fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// Replace the subsystem
    pub fn set_subsystem(&mut self, subsystem: Subsystem) {
        self.subsystem = subsystem;
    }

    /// Command id (`CMD1`)
    #[must_use]
    pub const fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Replace the command id
    pub fn set_command_id(&mut self, command_id: u8) {
        self.command_id = command_id;
    }

    /// `CMD0` byte: type bits above the subsystem id
    #[must_use]
    pub const fn cmd0(&self) -> u8 {
        self.frame_type.bits() | self.subsystem.id()
    }

    /// Declared payload length
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length as usize
    }

    /// Whether the payload is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Set the declared length without touching the payload bytes
    ///
    /// Any value is stored; [`Envelope::is_well_formed`] reports whether it
    /// fits the capacity.
    pub fn set_len(&mut self, length: u8) {
        self.length = length;
    }

    /// Whether the declared length fits the payload capacity
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        (self.length as usize) <= MAX_PAYLOAD
    }

    /// Meaningful payload bytes, clamped to the capacity
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len().min(MAX_PAYLOAD)]
    }

    /// Whole payload buffer for in-place rewriting
    pub fn payload_mut(&mut self) -> &mut [u8; MAX_PAYLOAD] {
        &mut self.payload
    }

    /// Copy `data` into the payload and set the length
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::PayloadTooLong`] and leaves the envelope
    /// untouched if `data` does not fit.
    pub fn set_payload(&mut self, data: &[u8]) -> Result<(), EnvelopeError> {
        if data.len() > MAX_PAYLOAD {
            return Err(EnvelopeError::PayloadTooLong(data.len()));
        }
        self.payload[..data.len()].copy_from_slice(data);
        // MAX_PAYLOAD fits in a u8
        self.length = data.len() as u8;
        Ok(())
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("frame_type", &self.frame_type)
            .field("subsystem", &self.subsystem)
            .field("command_id", &self.command_id)
            .field("payload", &self.payload())
            .finish()
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for Envelope {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "{} {} cmd={=u8:#x} len={}",
            self.frame_type,
            self.subsystem,
            self.command_id,
            self.length
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd0_round_trips_type_and_subsystem() {
        let env = Envelope::empty(FrameType::AsynchronousRequest, Subsystem::RCAF, 3);
        assert_eq!(env.cmd0(), 0x4A);
        let back = Envelope::from_cmd(env.cmd0(), 3).unwrap();
        assert_eq!(back.frame_type(), FrameType::AsynchronousRequest);
        assert_eq!(back.subsystem(), Subsystem::RCAF);
    }

    #[test]
    fn reserved_type_bits_rejected() {
        assert_eq!(
            FrameType::from_cmd0(0x81),
            Err(EnvelopeError::InvalidFrameType(0x80))
        );
    }
}
