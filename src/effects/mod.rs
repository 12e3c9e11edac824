// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel frame effects
//!
//! The effect set is closed: [`Effect`] is an enum over the two variants and
//! the chain dispatches on it directly. Every parameter is held in a
//! [`Staged`] cell so key handlers and setters never change what the
//! transform reads until the pipeline commits at a tick boundary.

mod chain;
mod pixelize;
mod row_offset;

pub use chain::{BufferSlot, ChainOutput, EffectChain};
pub use pixelize::Pixelize;
pub use row_offset::{Channel, ChannelRowOffset};

use crate::errors::PipelineError;
use crate::frame::Frame;
use crate::input::KeyEvent;
use std::fmt;
use std::str::FromStr;

/// Parameter value with a pending replacement
///
/// `get` always returns the committed value; `stage` only records the next
/// one and `commit` swaps it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged<T> {
    active: T,
    pending: Option<T>,
}

impl<T: Clone + PartialEq> Staged<T> {
    pub fn new(value: T) -> Self {
        Self {
            active: value,
            pending: None,
        }
    }

    /// Committed value, the one transforms read
    pub fn get(&self) -> &T {
        &self.active
    }

    /// Value that will be active after the next commit
    pub fn staged(&self) -> &T {
        self.pending.as_ref().unwrap_or(&self.active)
    }

    pub fn stage(&mut self, value: T) {
        self.pending = if value == self.active {
            None
        } else {
            Some(value)
        };
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Make the staged value active; returns whether anything changed
    pub fn commit(&mut self) -> bool {
        match self.pending.take() {
            Some(value) => {
                self.active = value;
                true
            }
            None => false,
        }
    }
}

/// Which effect variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Pixelize,
    RowOffset,
}

impl EffectKind {
    pub const ALL: [EffectKind; 2] = [EffectKind::Pixelize, EffectKind::RowOffset];

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::Pixelize => "pixelize",
            EffectKind::RowOffset => "rowoffset",
        }
    }

    /// Human-readable key bindings
    pub fn key_help(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            EffectKind::Pixelize => &[("+ / =", "grow blocks"), ("-", "shrink blocks")],
            EffectKind::RowOffset => &[
                ("r / g / b", "shift red / green / blue down one row"),
                ("R / G / B", "shift red / green / blue back up one row"),
            ],
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for EffectKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pixelize" | "pixelate" => Ok(EffectKind::Pixelize),
            "rowoffset" | "row-offset" | "coloroffset" | "color-offset" => {
                Ok(EffectKind::RowOffset)
            }
            other => Err(PipelineError::Config(format!(
                "unknown effect '{}' (expected one of: {})",
                other,
                EffectKind::ALL.map(|k| k.display_name()).join(", ")
            ))),
        }
    }
}

/// One stage of an effect chain
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Pixelize(Pixelize),
    ChannelRowOffset(ChannelRowOffset),
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Pixelize(_) => EffectKind::Pixelize,
            Effect::ChannelRowOffset(_) => EffectKind::RowOffset,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Write the transform of `input` into `output`
    ///
    /// Both frames must have the same shape and must not be the same buffer.
    pub fn apply(&self, input: &Frame, output: &mut Frame) {
        debug_assert_eq!(input.shape(), output.shape());
        match self {
            Effect::Pixelize(effect) => effect.apply(input, output),
            Effect::ChannelRowOffset(effect) => effect.apply(input, output),
        }
    }

    /// Offer a key press; returns whether this effect claimed it
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        match self {
            Effect::Pixelize(effect) => effect.handle_key(event),
            Effect::ChannelRowOffset(effect) => effect.handle_key(event),
        }
    }

    /// Make staged parameters visible to `apply`
    pub fn commit(&mut self) -> bool {
        match self {
            Effect::Pixelize(effect) => effect.commit(),
            Effect::ChannelRowOffset(effect) => effect.commit(),
        }
    }

    /// Committed parameters by name
    pub fn parameters(&self) -> Vec<(&'static str, usize)> {
        match self {
            Effect::Pixelize(effect) => vec![("block_size", effect.block_size())],
            Effect::ChannelRowOffset(effect) => {
                let [red, green, blue] = effect.offsets();
                vec![
                    ("offset_red", red),
                    ("offset_green", green),
                    ("offset_blue", blue),
                ]
            }
        }
    }
}

impl From<Pixelize> for Effect {
    fn from(effect: Pixelize) -> Self {
        Effect::Pixelize(effect)
    }
}

impl From<ChannelRowOffset> for Effect {
    fn from(effect: ChannelRowOffset) -> Self {
        Effect::ChannelRowOffset(effect)
    }
}

/// Clamp a signed request into a parameter range starting at `min`
pub(crate) fn clamp_param(value: i64, min: usize) -> usize {
    usize::try_from(value).unwrap_or(0).max(min)
}
