// SPDX-License-Identifier: GPL-3.0-only

//! Key events and their routing to effects
//!
//! Events arrive from an [`InputSource`] between ticks and are offered to
//! each effect of the chain in order. Effect handlers only stage parameter
//! changes; the pipeline commits them at the next tick boundary.

use crate::effects::EffectChain;
use crate::errors::PipelineResult;
use std::collections::VecDeque;
use std::ops::BitOr;
use tracing::trace;

/// Key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Esc,
    Enter,
    Up,
    Down,
    Left,
    Right,
}

/// Modifier bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(0b001);
    pub const CONTROL: Modifiers = Modifiers(0b010);
    pub const ALT: Modifiers = Modifiers(0b100);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

/// A discrete key press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub const fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    /// Plain character press without modifiers
    pub const fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::NONE)
    }

    /// The character, if this is a character key
    pub fn as_char(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c) => Some(c),
            _ => None,
        }
    }

    /// Shift held, or an upper-case letter delivered without the flag
    pub fn is_shifted(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
            || matches!(self.code, KeyCode::Char(c) if c.is_ascii_uppercase())
    }
}

/// Behaviour applied by the scheduler to keys no effect claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    /// Stop the scheduler after the current tick
    Stop,
    /// Save the last emitted frame
    Snapshot,
}

impl DefaultAction {
    pub fn for_key(event: &KeyEvent) -> Option<Self> {
        match event.code {
            KeyCode::Esc => Some(DefaultAction::Stop),
            KeyCode::Char('c') if event.modifiers.contains(Modifiers::CONTROL) => {
                Some(DefaultAction::Stop)
            }
            KeyCode::Char('q') => Some(DefaultAction::Stop),
            KeyCode::Char('p') => Some(DefaultAction::Snapshot),
            _ => None,
        }
    }
}

/// Offers key events to the effects of a chain
pub struct InputRouter;

impl InputRouter {
    /// Offer `event` to each effect in chain order
    ///
    /// Returns `true` as soon as one effect claims the event; later effects
    /// never see it. Returns `false` when no effect handled it.
    pub fn dispatch(chain: &mut EffectChain, event: &KeyEvent) -> bool {
        for (index, effect) in chain.iter_mut().enumerate() {
            if effect.handle_key(event) {
                trace!(index, effect = effect.name(), ?event, "Key handled");
                return true;
            }
        }
        false
    }
}

/// Source of key events polled by the scheduler between ticks
pub trait InputSource {
    /// Next pending event, without blocking
    fn poll_key(&mut self) -> PipelineResult<Option<KeyEvent>>;
}

/// Input source that never yields events
#[derive(Debug, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn poll_key(&mut self) -> PipelineResult<Option<KeyEvent>> {
        Ok(None)
    }
}

/// Input source replaying a fixed queue of events
#[derive(Debug, Default)]
pub struct QueuedInput {
    events: VecDeque<KeyEvent>,
}

impl QueuedInput {
    pub fn new(events: impl IntoIterator<Item = KeyEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn push(&mut self, event: KeyEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl InputSource for QueuedInput {
    fn poll_key(&mut self) -> PipelineResult<Option<KeyEvent>> {
        Ok(self.events.pop_front())
    }
}
