//! Power Management Tests
//!
//! Tests for the sleep vote state machine and the wake race gate.
//! Run with: cargo test --test power_tests

use npi_firmware::power::{PowerAction, PowerCoordinator, PowerState, PowerVote, SleepGate};

/// One task pass with no wake interrupt in between
fn pass(pm: &mut PowerCoordinator, gate: &SleepGate, idle: bool) -> PowerAction {
    gate.arm();
    pm.update(idle, gate)
}

/// One task pass with the wake interrupt landing after the events were taken
fn pass_with_wake(pm: &mut PowerCoordinator, gate: &SleepGate, idle: bool) -> PowerAction {
    gate.arm();
    gate.clear();
    pm.update(idle, gate)
}

/// Drive the coordinator into a suspended `Conserve`
fn suspended(gate: &SleepGate) -> PowerCoordinator {
    let mut pm = PowerCoordinator::new();
    pm.request_sleep();
    pass(&mut pm, gate, true);
    pass(&mut pm, gate, true);
    assert!(pm.is_suspended());
    pm
}

// =============================================================================
// Sleep Gate Tests
// =============================================================================

#[test]
fn test_gate_starts_closed() {
    let gate = SleepGate::new();
    assert!(!gate.is_armed());
}

#[test]
fn test_gate_arm_and_clear() {
    let gate = SleepGate::new();
    gate.arm();
    assert!(gate.is_armed());
    gate.clear();
    assert!(!gate.is_armed());
}

// =============================================================================
// Idle Voting
// =============================================================================

#[test]
fn test_initial_state_holds() {
    let pm = PowerCoordinator::new();
    assert_eq!(pm.state(), PowerState::Hold);
    assert_eq!(pm.vote(), PowerVote::Hold);
    assert!(!pm.is_suspended());
}

#[test]
fn test_busy_transport_keeps_hold() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    for _ in 0..3 {
        assert_eq!(pass(&mut pm, &gate, false), PowerAction::None);
        assert_eq!(pm.state(), PowerState::Hold);
        assert!(!gate.is_armed());
    }
}

#[test]
fn test_idle_transport_conserves() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    assert_eq!(pass(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Conserve);
    assert_eq!(pm.vote(), PowerVote::Conserve);
    assert!(gate.is_armed());
    assert!(!pm.is_suspended());
}

#[test]
fn test_unarmed_gate_never_conserves() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    assert_eq!(pm.update(true, &gate), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Hold);
}

#[test]
fn test_activity_returns_to_hold() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pass(&mut pm, &gate, true);
    assert_eq!(pass(&mut pm, &gate, false), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Hold);
    assert!(!gate.is_armed());
}

// =============================================================================
// Requested Sleep
// =============================================================================

#[test]
fn test_requested_sleep_suspends_transport() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pm.request_sleep();

    assert_eq!(pass(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.state(), PowerState::EnterPending);
    assert_eq!(pm.vote(), PowerVote::Hold);
    assert!(pm.is_sleep_pending());
    assert!(!gate.is_armed());

    assert_eq!(pass(&mut pm, &gate, true), PowerAction::Suspend);
    assert_eq!(pm.state(), PowerState::Conserve);
    assert!(pm.is_suspended());
    assert!(gate.is_armed());
}

#[test]
fn test_sleep_request_while_conserving() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pass(&mut pm, &gate, true);
    pm.request_sleep();
    pass(&mut pm, &gate, true);
    assert_eq!(pm.state(), PowerState::EnterPending);
    assert_eq!(pass(&mut pm, &gate, true), PowerAction::Suspend);
}

#[test]
fn test_sleep_request_waits_for_idle() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pm.request_sleep();
    pass(&mut pm, &gate, false);
    assert_eq!(pm.state(), PowerState::Hold);
    assert!(!pm.is_sleep_pending());
}

// =============================================================================
// Wake
// =============================================================================

#[test]
fn test_wake_resumes_transport() {
    let gate = SleepGate::new();
    let mut pm = suspended(&gate);

    // Interrupt side
    gate.clear();
    // Task side, next pass
    gate.arm();
    pm.on_wake();
    assert_eq!(pm.state(), PowerState::ExitPending);
    assert_eq!(pm.vote(), PowerVote::Hold);

    assert_eq!(pm.update(true, &gate), PowerAction::Resume);
    assert_eq!(pm.state(), PowerState::Hold);
    assert!(!pm.is_suspended());
    assert!(!pm.is_sleep_pending());
    assert!(!gate.is_armed());
}

#[test]
fn test_wake_in_hold_is_harmless() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pm.on_wake();
    assert_eq!(pm.state(), PowerState::Hold);
    assert_eq!(pass(&mut pm, &gate, false), PowerAction::None);
}

#[test]
fn test_wake_racing_sleep_entry_never_suspends() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pm.request_sleep();
    pass(&mut pm, &gate, true);
    assert_eq!(pm.state(), PowerState::EnterPending);

    // Wake interrupt lands before the task commits to sleep
    assert_eq!(pass_with_wake(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Hold);
    assert!(!pm.is_suspended());
    assert!(!gate.is_armed());
}

#[test]
fn test_wake_during_idle_check_keeps_hold() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();

    // The wake lands after the events were taken but before the vote
    assert_eq!(pass_with_wake(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Hold);
    assert_eq!(pm.vote(), PowerVote::Hold);
    assert!(!gate.is_armed());

    // Following pass handles the wake and the link is still quiet
    pm.on_wake();
    assert_eq!(pass(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.state(), PowerState::Conserve);
}

#[test]
fn test_wake_while_conserving_revokes_vote() {
    let gate = SleepGate::new();
    let mut pm = PowerCoordinator::new();
    pass(&mut pm, &gate, true);
    assert_eq!(pm.vote(), PowerVote::Conserve);

    assert_eq!(pass_with_wake(&mut pm, &gate, true), PowerAction::None);
    assert_eq!(pm.vote(), PowerVote::Hold);
    assert!(!gate.is_armed());
}

#[test]
fn test_cleared_gate_while_suspended_resumes() {
    let gate = SleepGate::new();
    let mut pm = suspended(&gate);

    // Wake observed only through the gate
    assert_eq!(pass_with_wake(&mut pm, &gate, true), PowerAction::Resume);
    assert_eq!(pm.state(), PowerState::Hold);
}

#[test]
fn test_sleep_can_be_requested_again_after_wake() {
    let gate = SleepGate::new();
    let mut pm = suspended(&gate);
    pm.on_wake();
    pass(&mut pm, &gate, true);
    assert_eq!(pm.state(), PowerState::Hold);

    pm.request_sleep();
    pass(&mut pm, &gate, true);
    assert_eq!(pass(&mut pm, &gate, true), PowerAction::Suspend);
}
