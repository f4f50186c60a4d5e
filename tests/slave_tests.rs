//! Slave Bus Driver Tests
//!
//! Tests for the slave-mode server that feeds host transactions to the
//! handshake engine, and for its transport handle.
//! Run with: cargo test --test slave_tests

use std::cell::Cell;
use std::collections::VecDeque;

use embassy_futures::block_on;

use npi_firmware::config::NpiConfig;
use npi_firmware::link::HandshakeLink;
use npi_firmware::npi::{NpiContext, NpiShared};
use npi_firmware::protocol::dispatch::{Handler, SyncReply};
use npi_firmware::protocol::handshake::{HandshakeEngine, HandshakeMode, SlotState};
use npi_firmware::transport::sim::SimPins;
use npi_firmware::transport::slave::{BusCommand, SlaveBus, SlaveServer, SlaveState};
use npi_firmware::transport::{OpenParams, Transport, TransportError, TransportKind};
use npi_firmware::types::{Envelope, FrameType, Subsystem};

/// What the host does next
enum Step {
    Write(Vec<u8>),
    Read,
    Fail,
}

/// Scripted host on the other side of the bus
struct FakeBus<'a> {
    script: VecDeque<Step>,
    written: Vec<u8>,
    responses: Vec<Vec<u8>>,
    configured: Option<OpenParams>,
    pauses: u32,
    on_pause: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> FakeBus<'a> {
    fn new(script: Vec<Step>) -> Self {
        Self {
            script: script.into(),
            written: Vec::new(),
            responses: Vec::new(),
            configured: None,
            pauses: 0,
            on_pause: None,
        }
    }

    fn with_pause(mut self, hook: impl FnMut() + 'a) -> Self {
        self.on_pause = Some(Box::new(hook));
        self
    }
}

impl SlaveBus for FakeBus<'_> {
    fn configure(&mut self, params: OpenParams) -> Result<(), TransportError> {
        self.configured = Some(params);
        Ok(())
    }

    async fn listen(&mut self) -> Result<BusCommand, TransportError> {
        match self.script.pop_front() {
            Some(Step::Write(data)) => {
                self.written = data;
                Ok(BusCommand::Write)
            }
            Some(Step::Read) => Ok(BusCommand::Read),
            Some(Step::Fail) | None => Err(TransportError::Bus),
        }
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self.written.len().min(buf.len());
        buf[..n].copy_from_slice(&self.written[..n]);
        Ok(n)
    }

    async fn respond(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.responses.push(data.to_vec());
        Ok(())
    }

    async fn pause(&mut self) {
        self.pauses += 1;
        if let Some(hook) = self.on_pause.as_mut() {
            hook();
        }
    }
}

fn areq(cmd: u8, data: &[u8]) -> Envelope {
    Envelope::new(FrameType::AsynchronousRequest, Subsystem::APP, cmd, data).unwrap()
}

fn i2c_engine(shared: &NpiShared) -> HandshakeEngine<'_, SimPins> {
    HandshakeEngine::new(shared, HandshakeMode::I2c, SimPins::new())
}

/// Answers every request with its command id
#[derive(Default)]
struct Echo {
    requests: u32,
}

impl Handler for Echo {
    fn on_async(&mut self, _msg: &Envelope) {}

    fn on_sync(&mut self, msg: &mut Envelope) -> SyncReply {
        self.requests += 1;
        let id = msg.command_id();
        msg.set_payload(&[id]).unwrap();
        SyncReply::Reply
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

#[test]
fn test_control_open_records_params() {
    let state = SlaveState::new();
    assert!(!state.is_open());

    let mut control = state.control(TransportKind::I2c);
    assert_eq!(control.open(OpenParams::I2c { address: 0x41 }), Ok(()));
    assert!(state.is_open());
}

#[test]
fn test_control_rejects_mismatched_params() {
    let state = SlaveState::new();
    let mut control = state.control(TransportKind::I2c);
    assert_eq!(control.open(OpenParams::Spi), Err(TransportError::Config));
    assert_eq!(control.open(OpenParams::I2c { address: 0x80 }), Err(TransportError::Config));
    assert!(!state.is_open());

    let mut spi = state.control(TransportKind::Spi);
    assert_eq!(spi.open(OpenParams::Uart { baud_rate: 115_200 }), Err(TransportError::Config));
}

#[test]
fn test_control_suspend_and_resume() {
    let state = SlaveState::new();
    let mut control = state.control(TransportKind::Spi);
    control.suspend();
    assert!(state.is_suspended());
    control.resume();
    assert!(!state.is_suspended());
    assert_eq!(control.read(&mut [0; 4]), 0);
    assert_eq!(control.write(&[1, 2]), 0);
}

// =============================================================================
// Server Start
// =============================================================================

#[test]
fn test_start_waits_for_link_open() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let bus = FakeBus::new(vec![]).with_pause(|| {
        state.control(TransportKind::I2c).open(OpenParams::I2c { address: 0x41 }).unwrap();
    });
    let mut server = SlaveServer::new(bus, &engine, &state);

    assert_eq!(block_on(server.start()), Ok(()));
    assert_eq!(server.bus().pauses, 1);
    assert_eq!(server.bus().configured, Some(OpenParams::I2c { address: 0x41 }));
}

#[test]
fn test_start_configures_spi() {
    let shared = NpiShared::new();
    let engine = HandshakeEngine::new(&shared, HandshakeMode::Spi, SimPins::new());
    let state = SlaveState::new();
    state.control(TransportKind::Spi).open(OpenParams::Spi).unwrap();
    let mut server = SlaveServer::new(FakeBus::new(vec![]), &engine, &state);

    assert_eq!(block_on(server.start()), Ok(()));
    assert_eq!(server.bus().pauses, 0);
    assert_eq!(server.bus().configured, Some(OpenParams::Spi));
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_async_write_is_queued() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let bus = FakeBus::new(vec![Step::Write(vec![0x02, 0x49, 0x07, 0xAA, 0xBB])]);
    let mut server = SlaveServer::new(bus, &engine, &state);

    assert_eq!(block_on(server.serve_one()), Ok(()));
    assert!(!state.is_busy());
    let env = shared.rx.dequeue().unwrap();
    assert_eq!(env.command_id(), 0x07);
    assert_eq!(env.payload(), &[0xAA, 0xBB]);
}

#[test]
fn test_poll_answer_is_staged_for_read() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    shared.tx.enqueue(areq(0x05, &[9, 8])).unwrap();
    let bus = FakeBus::new(vec![Step::Write(vec![0, 0, 0]), Step::Read]);
    let mut server = SlaveServer::new(bus, &engine, &state);

    block_on(server.serve_one()).unwrap();
    assert!(server.bus().responses.is_empty());
    block_on(server.serve_one()).unwrap();

    assert_eq!(server.bus().responses, vec![vec![0x02, 0x49, 0x05, 9, 8]]);
    assert!(shared.tx.is_empty());
    assert_eq!(engine.stats().polls, 1);
}

#[test]
fn test_read_with_nothing_pending_returns_stub() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let mut server = SlaveServer::new(FakeBus::new(vec![Step::Read]), &engine, &state);

    block_on(server.serve_one()).unwrap();
    assert_eq!(server.bus().responses, vec![vec![0x00, 0x00, 0x00]]);
    assert_eq!(server.bus().pauses, 0);
}

#[test]
fn test_read_stretches_until_reply_written() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let busy_seen = Cell::new(false);
    let bus = FakeBus::new(vec![Step::Write(vec![0x00, 0x21, 0x03]), Step::Read]).with_pause(|| {
        busy_seen.set(state.is_busy());
        if let Some(mut req) = engine.take_request() {
            req.set_frame_type(FrameType::SynchronousResponse);
            req.set_payload(&[0x55]).unwrap();
            engine.complete_request(Some(req));
        }
    });
    let mut server = SlaveServer::new(bus, &engine, &state);

    block_on(server.serve_one()).unwrap();
    assert_eq!(engine.slot_state(), SlotState::Busy);
    block_on(server.serve_one()).unwrap();

    assert_eq!(server.bus().pauses, 1);
    assert!(busy_seen.get());
    assert!(!state.is_busy());
    assert_eq!(server.bus().responses, vec![vec![0x01, 0x61, 0x03, 0x55]]);
    assert_eq!(engine.slot_state(), SlotState::Free);
}

#[test]
fn test_write_held_while_request_in_slot() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let bus = FakeBus::new(vec![
        Step::Write(vec![0x00, 0x21, 0x03]),
        Step::Write(vec![0x01, 0x49, 0x04, 0x11]),
    ])
    .with_pause(|| {
        if engine.take_request().is_some() {
            engine.complete_request(None);
        }
    });
    let mut server = SlaveServer::new(bus, &engine, &state);

    block_on(server.serve_one()).unwrap();
    block_on(server.serve_one()).unwrap();

    assert_eq!(server.bus().pauses, 1);
    assert_eq!(engine.stats().stalls, 1);
    assert_eq!(shared.rx.dequeue().map(|e| e.command_id()), Some(0x04));
}

#[test]
fn test_bus_error_clears_busy() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let mut server = SlaveServer::new(FakeBus::new(vec![Step::Fail]), &engine, &state);

    assert_eq!(block_on(server.serve_one()), Err(TransportError::Bus));
    assert!(!state.is_busy());
}

// =============================================================================
// End to End
// =============================================================================

#[test]
fn test_request_answered_through_npi_task() {
    let shared = NpiShared::new();
    let engine = i2c_engine(&shared);
    let state = SlaveState::new();
    let link = HandshakeLink::new(state.control(TransportKind::I2c), &engine);
    let mut ctx = NpiContext::new(&shared, link, Echo::default(), NpiConfig::new(TransportKind::I2c));
    ctx.init().unwrap();
    assert!(state.is_open());

    // SYS request 0x02, then the host reads the answer
    let bus = FakeBus::new(vec![Step::Write(vec![0x00, 0x21, 0x02]), Step::Read]).with_pause(|| {
        ctx.process();
    });
    let mut server = SlaveServer::new(bus, &engine, &state);

    block_on(server.start()).unwrap();
    block_on(server.serve_one()).unwrap();
    block_on(server.serve_one()).unwrap();

    assert_eq!(server.bus().responses, vec![vec![0x01, 0x61, 0x02, 0x02]]);
    drop(server);
    assert_eq!(ctx.handler().requests, 1);
}
