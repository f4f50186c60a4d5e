//! Command Dispatcher Tests
//!
//! Tests for frame-type routing and in-place synchronous responses.
//! Run with: cargo test --test dispatch_tests

use npi_firmware::config::{HANDSHAKE_MAX_PAYLOAD, MAX_PAYLOAD};
use npi_firmware::protocol::dispatch::{Dispatch, Dispatcher, DropReason, Handler, SyncReply};
use npi_firmware::types::{Envelope, FrameType, Subsystem, SubsystemSet};

/// How the test handler answers synchronous requests
#[derive(Clone, Copy)]
enum Answer {
    /// Echo the request payload reversed
    Reverse,
    /// Decline
    Decline,
    /// Claim a raw length without touching the payload
    RawLength(u8),
    /// Fill the payload with `n` bytes
    Fill(usize),
}

struct Recorder {
    asyncs: Vec<Envelope>,
    syncs: Vec<Envelope>,
    answer: Answer,
}

impl Recorder {
    fn new(answer: Answer) -> Self {
        Self {
            asyncs: Vec::new(),
            syncs: Vec::new(),
            answer,
        }
    }
}

impl Handler for Recorder {
    fn on_async(&mut self, msg: &Envelope) {
        self.asyncs.push(msg.clone());
    }

    fn on_sync(&mut self, msg: &mut Envelope) -> SyncReply {
        self.syncs.push(msg.clone());
        match self.answer {
            Answer::Reverse => {
                let mut data = msg.payload().to_vec();
                data.reverse();
                msg.set_payload(&data).unwrap();
                SyncReply::Reply
            }
            Answer::Decline => SyncReply::NoReply,
            Answer::RawLength(len) => {
                msg.set_len(len);
                SyncReply::Reply
            }
            Answer::Fill(n) => {
                msg.set_payload(&vec![0x5A; n]).unwrap();
                SyncReply::Reply
            }
        }
    }
}

fn dispatcher(answer: Answer) -> Dispatcher<Recorder> {
    Dispatcher::new(Recorder::new(answer), SubsystemSet::all_assigned(), MAX_PAYLOAD)
}

fn env(frame_type: FrameType, subsystem: Subsystem, cmd: u8, data: &[u8]) -> Envelope {
    Envelope::new(frame_type, subsystem, cmd, data).unwrap()
}

// =============================================================================
// Asynchronous Requests
// =============================================================================

#[test]
fn test_async_request_delivered() {
    let mut d = dispatcher(Answer::Decline);
    let msg = env(FrameType::AsynchronousRequest, Subsystem::SYS, 0x05, &[0xAA, 0xBB]);

    assert_eq!(d.dispatch(msg.clone()), Dispatch::Consumed);
    assert_eq!(d.handler().asyncs, vec![msg]);
    assert!(d.handler().syncs.is_empty());
    assert_eq!(d.stats().async_delivered, 1);
}

// =============================================================================
// Synchronous Requests
// =============================================================================

#[test]
fn test_sync_request_rewritten_in_place() {
    let mut d = dispatcher(Answer::Reverse);
    let msg = env(FrameType::SynchronousRequest, Subsystem::UTIL, 0x10, &[1, 2, 3]);

    let Dispatch::Reply(reply) = d.dispatch(msg) else {
        panic!("expected a reply");
    };
    assert_eq!(reply.frame_type(), FrameType::SynchronousResponse);
    assert_eq!(reply.subsystem(), Subsystem::UTIL);
    assert_eq!(reply.command_id(), 0x10);
    assert_eq!(reply.payload(), &[3, 2, 1]);
    assert_eq!(reply.cmd0(), 0x67);
    assert_eq!(d.stats().replies, 1);
}

#[test]
fn test_handler_sees_request_type() {
    let mut d = dispatcher(Answer::Reverse);
    d.dispatch(env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[]));
    assert_eq!(d.handler().syncs[0].frame_type(), FrameType::SynchronousRequest);
}

#[test]
fn test_declined_sync_sends_nothing() {
    let mut d = dispatcher(Answer::Decline);
    let out = d.dispatch(env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::Unhandled));
    assert_eq!(d.stats().dropped, 1);
}

#[test]
fn test_oversize_reply_is_rejected() {
    let mut d = dispatcher(Answer::RawLength(200));
    let out = d.dispatch(env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[7]));
    assert_eq!(out, Dispatch::Dropped(DropReason::OversizeReply));
    assert_eq!(d.stats().replies, 0);
}

#[test]
fn test_reply_cap_follows_transport() {
    let mut d = Dispatcher::new(
        Recorder::new(Answer::Fill(HANDSHAKE_MAX_PAYLOAD + 1)),
        SubsystemSet::all_assigned(),
        HANDSHAKE_MAX_PAYLOAD,
    );
    let out = d.dispatch(env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::OversizeReply));

    d.handler_mut().answer = Answer::Fill(HANDSHAKE_MAX_PAYLOAD);
    let out = d.dispatch(env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[]));
    assert!(matches!(out, Dispatch::Reply(ref r) if r.len() == HANDSHAKE_MAX_PAYLOAD));
}

// =============================================================================
// Drops
// =============================================================================

#[test]
fn test_disabled_subsystem_dropped() {
    let mut d = Dispatcher::new(
        Recorder::new(Answer::Reverse),
        SubsystemSet::empty().with(Subsystem::SYS),
        MAX_PAYLOAD,
    );
    let out = d.dispatch(env(FrameType::SynchronousRequest, Subsystem::MAC, 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::UnknownSubsystem));
    assert!(d.handler().syncs.is_empty());

    d.set_subsystems(d.subsystems().with(Subsystem::MAC));
    assert!(matches!(
        d.dispatch(env(FrameType::SynchronousRequest, Subsystem::MAC, 1, &[])),
        Dispatch::Reply(_)
    ));
}

#[test]
fn test_unassigned_subsystem_dropped() {
    let mut d = dispatcher(Answer::Reverse);
    let out = d.dispatch(env(FrameType::AsynchronousRequest, Subsystem::new(0x1E), 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::UnknownSubsystem));
    assert!(d.handler().asyncs.is_empty());
}

#[test]
fn test_response_and_poll_frames_dropped() {
    let mut d = dispatcher(Answer::Reverse);
    let out = d.dispatch(env(FrameType::SynchronousResponse, Subsystem::SYS, 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::UnexpectedType));
    let out = d.dispatch(env(FrameType::Poll, Subsystem::SYS, 1, &[]));
    assert_eq!(out, Dispatch::Dropped(DropReason::UnexpectedType));
}

#[test]
fn test_malformed_length_dropped_before_handler() {
    let mut d = dispatcher(Answer::Reverse);
    let mut msg = env(FrameType::SynchronousRequest, Subsystem::SYS, 1, &[]);
    msg.set_len(255);
    assert_eq!(d.dispatch(msg), Dispatch::Dropped(DropReason::Malformed));
    assert!(d.handler().syncs.is_empty());
}

#[test]
fn test_handler_by_mutable_reference() {
    let mut recorder = Recorder::new(Answer::Decline);
    {
        let mut d = Dispatcher::new(&mut recorder, SubsystemSet::all_assigned(), MAX_PAYLOAD);
        d.dispatch(env(FrameType::AsynchronousRequest, Subsystem::APP, 9, &[1]));
    }
    assert_eq!(recorder.asyncs.len(), 1);
}
