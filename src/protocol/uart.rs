//! UART Framing Engine
//!
//! Byte-stream parser for `SOF | LEN | CMD0 | CMD1 | DATA | FCS` frames
//! and the matching encoder for the transmit path.
//!
//! The parser keeps its state and the partial frame between calls, so the
//! driver may hand it bytes in chunks of any size. It never blocks:
//! waiting for more input is simply remaining in the current state.

use heapless::Vec;

use super::fcs::{compute_fcs, update_fcs};
use crate::config::{MAX_PAYLOAD, SOF, UART_MAX_FRAME, UART_WAKE_BYTE};
use crate::types::{Envelope, EnvelopeError};

/// Receive state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxState {
    /// Hunting for SOF
    WaitStart,
    /// Expecting the length byte
    Length,
    /// Expecting `CMD0`
    Cmd0,
    /// Expecting `CMD1`
    Cmd1,
    /// Collecting payload bytes
    Data,
    /// Expecting the checksum
    Fcs,
}

#[cfg(feature = "embedded")]
impl defmt::Format for RxState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::WaitStart => defmt::write!(f, "WaitStart"),
            Self::Length => defmt::write!(f, "Length"),
            Self::Cmd0 => defmt::write!(f, "Cmd0"),
            Self::Cmd1 => defmt::write!(f, "Cmd1"),
            Self::Data => defmt::write!(f, "Data"),
            Self::Fcs => defmt::write!(f, "Fcs"),
        }
    }
}

/// Result of feeding bytes to the parser
#[derive(Debug, PartialEq, Eq)]
pub enum FramerOutput {
    /// A frame passed its checksum
    Frame(Envelope),
    /// The host's keep-alive byte arrived while sleep was pending
    Wake,
}

/// Receive counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Frames delivered
    pub frames: u32,
    /// Frames discarded on checksum mismatch
    pub fcs_errors: u32,
    /// Frames discarded because the declared length exceeds the buffer
    pub oversize: u32,
    /// Frames discarded for reserved type bits
    pub invalid_type: u32,
    /// Bytes skipped while hunting for SOF
    pub discarded: u32,
    /// Wake bytes seen
    pub wakes: u32,
}

/// Byte-at-a-time UART frame parser
pub struct UartFramer {
    state: RxState,
    wake_byte: u8,
    cmd0: u8,
    cmd1: u8,
    len: usize,
    filled: usize,
    buf: [u8; MAX_PAYLOAD],
    stats: FramerStats,
}

impl UartFramer {
    /// Parser waiting for SOF, using the default wake byte
    #[must_use]
    pub const fn new() -> Self {
        Self::with_wake_byte(UART_WAKE_BYTE)
    }

    /// Parser with a custom wake byte
    #[must_use]
    pub const fn with_wake_byte(wake_byte: u8) -> Self {
        Self {
            state: RxState::WaitStart,
            wake_byte,
            cmd0: 0,
            cmd1: 0,
            len: 0,
            filled: 0,
            buf: [0; MAX_PAYLOAD],
            stats: FramerStats {
                frames: 0,
                fcs_errors: 0,
                oversize: 0,
                invalid_type: 0,
                discarded: 0,
                wakes: 0,
            },
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RxState {
        self.state
    }

    /// Whether no frame is partially assembled
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == RxState::WaitStart
    }

    /// Receive counters
    #[must_use]
    pub const fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Abandon any partial frame
    pub fn reset(&mut self) {
        self.state = RxState::WaitStart;
        self.len = 0;
        self.filled = 0;
    }

    /// Feed received bytes, reporting each completed frame or wake to `sink`
    ///
    /// `sleep_pending` enables recognition of the wake byte while hunting
    /// for SOF.
    pub fn feed<F>(&mut self, mut bytes: &[u8], sleep_pending: bool, mut sink: F)
    where
        F: FnMut(FramerOutput),
    {
        while !bytes.is_empty() {
            let (used, output) = self.push(bytes, sleep_pending);
            if let Some(out) = output {
                sink(out);
            }
            bytes = &bytes[used..];
        }
    }

    /// Consume bytes up to and including the first one that completes a
    /// frame or signals a wake
    ///
    /// Returns how many bytes were consumed and the output, if any. At
    /// least one byte is consumed whenever `bytes` is non-empty.
    pub fn push(&mut self, bytes: &[u8], sleep_pending: bool) -> (usize, Option<FramerOutput>) {
        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            match self.state {
                RxState::WaitStart => {
                    if byte == SOF {
                        self.state = RxState::Length;
                    } else if sleep_pending && byte == self.wake_byte {
                        self.stats.wakes += 1;
                        return (i + 1, Some(FramerOutput::Wake));
                    } else {
                        self.stats.discarded += 1;
                    }
                }
                RxState::Length => {
                    // A repeated SOF resynchronizes without leaving this state.
                    if byte != SOF {
                        self.begin_frame(byte);
                    }
                }
                RxState::Cmd0 => {
                    self.cmd0 = byte;
                    self.state = RxState::Cmd1;
                }
                RxState::Cmd1 => {
                    self.cmd1 = byte;
                    self.state = if self.len == 0 {
                        RxState::Fcs
                    } else {
                        RxState::Data
                    };
                }
                RxState::Data => {
                    let take = (self.len - self.filled).min(bytes.len() - i);
                    self.buf[self.filled..self.filled + take].copy_from_slice(&bytes[i..i + take]);
                    self.filled += take;
                    if self.filled == self.len {
                        self.state = RxState::Fcs;
                    }
                    i += take;
                    continue;
                }
                RxState::Fcs => {
                    let frame = self.finish_frame(byte);
                    self.reset();
                    if let Some(env) = frame {
                        return (i + 1, Some(FramerOutput::Frame(env)));
                    }
                }
            }
            i += 1;
        }
        (i, None)
    }

    fn begin_frame(&mut self, len: u8) {
        let len = usize::from(len);
        if len > MAX_PAYLOAD {
            self.stats.oversize += 1;
            warn!("uart: declared length {} exceeds buffer, frame dropped", len);
            self.reset();
            return;
        }
        self.len = len;
        self.filled = 0;
        self.state = RxState::Cmd0;
    }

    fn finish_frame(&mut self, claimed: u8) -> Option<Envelope> {
        let payload = &self.buf[..self.len];
        let fcs = update_fcs(compute_fcs(&[self.cmd0, self.cmd1]), payload);
        if fcs != claimed {
            self.stats.fcs_errors += 1;
            debug!("uart: fcs mismatch, frame dropped");
            return None;
        }
        let mut env = match Envelope::from_cmd(self.cmd0, self.cmd1) {
            Ok(env) => env,
            Err(_) => {
                self.stats.invalid_type += 1;
                debug!("uart: reserved type bits in cmd0 {}", self.cmd0);
                return None;
            }
        };
        // Length already bounded by begin_frame
        env.set_payload(payload).ok()?;
        self.stats.frames += 1;
        trace!("uart: frame {:?} complete", env.frame_type());
        Some(env)
    }
}

impl Default for UartFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoded frame bytes
pub type FrameBytes = Vec<u8, UART_MAX_FRAME>;

/// Encode `env` as `SOF | LEN | CMD0 | CMD1 | DATA | FCS`
///
/// # Errors
///
/// Returns [`EnvelopeError::PayloadTooLong`] if the declared length does
/// not fit the payload buffer.
pub fn encode_frame(env: &Envelope) -> Result<FrameBytes, EnvelopeError> {
    if !env.is_well_formed() {
        return Err(EnvelopeError::PayloadTooLong(env.len()));
    }
    let mut out = FrameBytes::new();
    let header = [SOF, env.len() as u8, env.cmd0(), env.command_id()];
    // Capacity is MAX_PAYLOAD plus the framing bytes
    let _ = out.extend_from_slice(&header);
    let _ = out.extend_from_slice(env.payload());
    let fcs = compute_fcs(&out[2..]);
    let _ = out.push(fcs);
    Ok(out)
}

/// Encoded frame being written to the UART
#[derive(Debug, Default)]
pub struct TxFrame {
    bytes: FrameBytes,
    sent: usize,
}

impl TxFrame {
    /// Start transmitting `bytes`
    #[must_use]
    pub const fn new(bytes: FrameBytes) -> Self {
        Self { bytes, sent: 0 }
    }

    /// Bytes not yet accepted by the driver
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.bytes[self.sent..]
    }

    /// Record that the driver accepted `n` more bytes
    pub fn advance(&mut self, n: usize) {
        self.sent = (self.sent + n).min(self.bytes.len());
    }

    /// Whether the whole frame has been written
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.sent == self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameType, Subsystem};

    #[test]
    fn encode_matches_wire_layout() {
        let env = Envelope::new(FrameType::AsynchronousRequest, Subsystem::SYS, 0x05, &[0xAA, 0xBB]).unwrap();
        let bytes = encode_frame(&env).unwrap();
        assert_eq!(&bytes[..], &[0xFE, 0x02, 0x41, 0x05, 0xAA, 0xBB, 0x41 ^ 0x05 ^ 0xAA ^ 0xBB]);
    }

    #[test]
    fn zero_length_frame_skips_data_state() {
        let mut framer = UartFramer::new();
        let mut got = None;
        framer.feed(&[0xFE, 0x00, 0x61, 0x02, 0x63], false, |out| got = Some(out));
        match got {
            Some(FramerOutput::Frame(env)) => assert!(env.is_empty()),
            other => panic!("expected frame, got {other:?}"),
        }
    }
}
