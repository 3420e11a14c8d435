//! # Input Module
//!
//! Sense HAT joystick input.
//!
//! This module handles:
//! - Joystick detection and connection via evdev
//! - Translating key events into [`ButtonEvent`]s
//! - Delivering events to the [`SessionControl`] transitions

pub mod joystick;

use std::sync::Arc;

use evdev::{InputEvent, InputEventKind, Key};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::state::SessionControl;

/// evdev key value for a fresh press.
const KEY_VALUE_PRESSED: i32 = 1;

/// Joystick direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
    /// Joystick pushed straight in.
    Middle,
}

/// One joystick transition.
///
/// `pressed` is true only for the initial press; releases and auto-repeat
/// holds arrive with `pressed == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub direction: Direction,
    pub pressed: bool,
}

/// Maps a joystick key code to its direction.
pub fn direction_for(key: Key) -> Option<Direction> {
    match key {
        Key::KEY_LEFT => Some(Direction::Left),
        Key::KEY_RIGHT => Some(Direction::Right),
        Key::KEY_UP => Some(Direction::Up),
        Key::KEY_DOWN => Some(Direction::Down),
        Key::KEY_ENTER => Some(Direction::Middle),
        _ => None,
    }
}

/// Converts a raw evdev event into a [`ButtonEvent`].
///
/// Returns `None` for sync events and keys the joystick does not emit.
pub fn button_event(event: &InputEvent) -> Option<ButtonEvent> {
    match event.kind() {
        InputEventKind::Key(key) => direction_for(key).map(|direction| ButtonEvent {
            direction,
            pressed: event.value() == KEY_VALUE_PRESSED,
        }),
        _ => None,
    }
}

/// Applies joystick events to the shared state until the channel closes or
/// the process starts terminating.
pub async fn dispatch(mut events: mpsc::Receiver<ButtonEvent>, control: Arc<SessionControl>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Joystick event");
        control.apply(event);

        if !control.is_running() {
            break;
        }
    }

    debug!("Joystick dispatcher stopped");
}
