//! # Session State Machine
//!
//! Process-wide run and session state, shared by the three loops, the
//! joystick dispatcher and the signal handler.
//!
//! All fields are atomics so readers never block. Mutation goes through the
//! named transition methods only:
//!
//! | Transition | Effect |
//! |------------|--------|
//! | [`SessionControl::start`] | `SessionState::Active` (idempotent) |
//! | [`SessionControl::stop`] | `SessionState::Ready` (idempotent) |
//! | [`SessionControl::terminate`] | `RunState::Terminating` (monotonic) |
//!
//! There is no wake-up: loops observe changes on their next tick.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, info};

use crate::input::{ButtonEvent, Direction};

/// Whether the process keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Loops keep ticking.
    Running,
    /// Loops finish their current tick and return. Never reverts.
    Terminating,
}

/// Whether the rider wants readings persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a start press; nothing is written.
    Ready,
    /// Recording into a session store.
    Active,
}

/// What the acquisition loop did on its most recent tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session, nothing attempted.
    Idle,
    /// A reading was appended.
    Stored,
    /// No usable 3D fix, or the poll itself failed.
    NoFix,
    /// The append failed.
    WriteFailed,
}

const RUNNING: u8 = 0;
const TERMINATING: u8 = 1;

const READY: u8 = 0;
const ACTIVE: u8 = 1;

impl TickOutcome {
    fn to_u8(self) -> u8 {
        match self {
            TickOutcome::Idle => 0,
            TickOutcome::Stored => 1,
            TickOutcome::NoFix => 2,
            TickOutcome::WriteFailed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TickOutcome::Stored,
            2 => TickOutcome::NoFix,
            3 => TickOutcome::WriteFailed,
            _ => TickOutcome::Idle,
        }
    }
}

/// Shared run/session state.
///
/// Wrap in an `Arc` and hand a clone to every task that needs it.
///
/// # Examples
///
/// ```
/// use picycle::session::state::{RunState, SessionControl, SessionState};
///
/// let control = SessionControl::new();
/// control.start();
/// assert_eq!(control.session_state(), SessionState::Active);
///
/// control.terminate();
/// control.start();
/// assert_eq!(control.run_state(), RunState::Terminating);
/// ```
#[derive(Debug)]
pub struct SessionControl {
    run: AtomicU8,
    session: AtomicU8,
    recording: AtomicBool,
    fault: AtomicBool,
    outcome: AtomicU8,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    /// Running, Ready, not recording, no fault.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run: AtomicU8::new(RUNNING),
            session: AtomicU8::new(READY),
            recording: AtomicBool::new(false),
            fault: AtomicBool::new(false),
            outcome: AtomicU8::new(TickOutcome::Idle.to_u8()),
        }
    }

    /// Start press: begin (or keep) recording.
    pub fn start(&self) {
        if self.session.swap(ACTIVE, Ordering::SeqCst) == READY {
            info!("Session start requested");
        }
    }

    /// Stop press: end the current recording segment.
    pub fn stop(&self) {
        if self.session.swap(READY, Ordering::SeqCst) == ACTIVE {
            info!("Session stop requested");
        }
    }

    /// Terminate press or OS signal: shut every loop down.
    pub fn terminate(&self) {
        if self.run.swap(TERMINATING, Ordering::SeqCst) == RUNNING {
            info!("Termination requested");
        }
    }

    /// Routes a joystick event to its transition.
    ///
    /// Left starts, right stops, down terminates. Releases, holds and the
    /// remaining directions are ignored.
    pub fn apply(&self, event: ButtonEvent) {
        if !event.pressed {
            return;
        }

        match event.direction {
            Direction::Left => self.start(),
            Direction::Right => self.stop(),
            Direction::Down => self.terminate(),
            other => debug!(direction = ?other, "Ignoring unmapped joystick press"),
        }
    }

    pub fn run_state(&self) -> RunState {
        match self.run.load(Ordering::SeqCst) {
            RUNNING => RunState::Running,
            _ => RunState::Terminating,
        }
    }

    pub fn session_state(&self) -> SessionState {
        match self.session.load(Ordering::SeqCst) {
            ACTIVE => SessionState::Active,
            _ => SessionState::Ready,
        }
    }

    /// Shorthand for `run_state() == RunState::Running`.
    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// True while the acquisition loop holds an open session store.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub(crate) fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    /// True once an unrecoverable error has taken over the display.
    pub fn is_faulted(&self) -> bool {
        self.fault.load(Ordering::SeqCst)
    }

    pub(crate) fn raise_fault(&self) {
        self.fault.store(true, Ordering::SeqCst);
    }

    pub fn last_outcome(&self) -> TickOutcome {
        TickOutcome::from_u8(self.outcome.load(Ordering::SeqCst))
    }

    pub(crate) fn report(&self, outcome: TickOutcome) {
        self.outcome.store(outcome.to_u8(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(direction: Direction) -> ButtonEvent {
        ButtonEvent { direction, pressed: true }
    }

    fn release(direction: Direction) -> ButtonEvent {
        ButtonEvent { direction, pressed: false }
    }

    #[test]
    fn test_initial_state() {
        let control = SessionControl::new();
        assert_eq!(control.run_state(), RunState::Running);
        assert_eq!(control.session_state(), SessionState::Ready);
        assert!(!control.is_recording());
        assert!(!control.is_faulted());
        assert_eq!(control.last_outcome(), TickOutcome::Idle);
    }

    #[test]
    fn test_start_is_idempotent() {
        let control = SessionControl::new();
        control.start();
        control.start();
        assert_eq!(control.session_state(), SessionState::Active);
    }

    #[test]
    fn test_stop_when_ready_is_noop() {
        let control = SessionControl::new();
        control.stop();
        assert_eq!(control.session_state(), SessionState::Ready);
    }

    #[test]
    fn test_session_toggles_repeatedly() {
        let control = SessionControl::new();
        for _ in 0..3 {
            control.start();
            assert_eq!(control.session_state(), SessionState::Active);
            control.stop();
            assert_eq!(control.session_state(), SessionState::Ready);
        }
    }

    #[test]
    fn test_terminate_is_monotonic() {
        let control = SessionControl::new();
        control.terminate();

        for event in [
            press(Direction::Left),
            press(Direction::Right),
            press(Direction::Up),
            press(Direction::Middle),
            press(Direction::Down),
        ] {
            control.apply(event);
            assert_eq!(control.run_state(), RunState::Terminating);
        }
    }

    #[test]
    fn test_last_session_event_wins() {
        // Deterministic pseudo-random event sequences; the final session
        // state must match the last start/stop press in each.
        let directions = [Direction::Left, Direction::Right, Direction::Down, Direction::Up];
        let mut seed: u32 = 0x2545_f491;

        for _ in 0..200 {
            let control = SessionControl::new();
            let mut expected = SessionState::Ready;

            for _ in 0..16 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let direction = directions[(seed % 4) as usize];
                let pressed = seed & 0x10 != 0;

                control.apply(ButtonEvent { direction, pressed });

                if pressed {
                    match direction {
                        Direction::Left => expected = SessionState::Active,
                        Direction::Right => expected = SessionState::Ready,
                        _ => {}
                    }
                }
            }

            assert_eq!(control.session_state(), expected);
        }
    }

    #[test]
    fn test_releases_are_ignored() {
        let control = SessionControl::new();
        control.apply(release(Direction::Left));
        assert_eq!(control.session_state(), SessionState::Ready);

        control.apply(release(Direction::Down));
        assert_eq!(control.run_state(), RunState::Running);
    }

    #[test]
    fn test_apply_maps_directions() {
        let control = SessionControl::new();

        control.apply(press(Direction::Left));
        assert_eq!(control.session_state(), SessionState::Active);

        control.apply(press(Direction::Right));
        assert_eq!(control.session_state(), SessionState::Ready);

        control.apply(press(Direction::Up));
        control.apply(press(Direction::Middle));
        assert_eq!(control.run_state(), RunState::Running);

        control.apply(press(Direction::Down));
        assert_eq!(control.run_state(), RunState::Terminating);
    }

    #[test]
    fn test_session_state_survives_terminate() {
        let control = SessionControl::new();
        control.start();
        control.terminate();
        assert_eq!(control.session_state(), SessionState::Active);
        assert!(!control.is_running());
    }

    #[test]
    fn test_tick_outcome_round_trip() {
        let control = SessionControl::new();
        for outcome in [
            TickOutcome::Stored,
            TickOutcome::NoFix,
            TickOutcome::WriteFailed,
            TickOutcome::Idle,
        ] {
            control.report(outcome);
            assert_eq!(control.last_outcome(), outcome);
        }
    }

    #[test]
    fn test_fault_latches() {
        let control = SessionControl::new();
        control.raise_fault();
        assert!(control.is_faulted());
    }
}
