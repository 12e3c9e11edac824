// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard input from the controlling terminal
//!
//! Puts the terminal in raw mode so single key presses arrive without
//! waiting for Enter. Raw mode is restored when the input is dropped.

use crate::errors::PipelineResult;
use crate::input::{InputSource, KeyCode, KeyEvent, Modifiers};
use crossterm::event::{self, Event, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tracing::{debug, warn};

pub struct TerminalInput {
    raw: bool,
}

impl TerminalInput {
    pub fn new() -> PipelineResult<Self> {
        enable_raw_mode()?;
        debug!("Terminal raw mode enabled");
        Ok(Self { raw: true })
    }
}

impl InputSource for TerminalInput {
    fn poll_key(&mut self) -> PipelineResult<Option<KeyEvent>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && let Some(event) = convert_key(key.code, key.modifiers)
            {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

impl Drop for TerminalInput {
    fn drop(&mut self) {
        if self.raw {
            if let Err(e) = disable_raw_mode() {
                warn!(error = %e, "Failed to restore terminal mode");
            }
            self.raw = false;
        }
    }
}

fn convert_key(code: event::KeyCode, modifiers: KeyModifiers) -> Option<KeyEvent> {
    let code = match code {
        event::KeyCode::Char(c) => KeyCode::Char(c),
        event::KeyCode::Esc => KeyCode::Esc,
        event::KeyCode::Enter => KeyCode::Enter,
        event::KeyCode::Up => KeyCode::Up,
        event::KeyCode::Down => KeyCode::Down,
        event::KeyCode::Left => KeyCode::Left,
        event::KeyCode::Right => KeyCode::Right,
        _ => return None,
    };
    Some(KeyEvent::new(code, convert_modifiers(modifiers)))
}

fn convert_modifiers(modifiers: KeyModifiers) -> Modifiers {
    let mut out = Modifiers::NONE;
    if modifiers.contains(KeyModifiers::SHIFT) {
        out = out | Modifiers::SHIFT;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        out = out | Modifiers::CONTROL;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        out = out | Modifiers::ALT;
    }
    out
}
