//! Communication Protocols
//!
//! Frame checksum, the UART byte-stream framer, the I2C/SPI transaction
//! engine and the command dispatcher that routes complete envelopes to
//! the upper layer.

pub mod dispatch;
pub mod fcs;
pub mod handshake;
pub mod uart;

pub use dispatch::{Dispatch, Dispatcher, DropReason, Handler, SyncReply};
pub use fcs::{compute_fcs, verify_fcs};
pub use handshake::{HandshakeEngine, HandshakeMode, ReadOutcome, SlotState, WriteOutcome};
pub use uart::{encode_frame, FramerOutput, RxState, UartFramer};
