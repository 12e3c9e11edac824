// SPDX-License-Identifier: GPL-3.0-only

//! Per-channel cyclic vertical shift

use super::{Staged, clamp_param};
use crate::frame::{CHANNELS, Frame};
use crate::input::{KeyCode, KeyEvent};
use std::fmt;
use tracing::debug;

/// Colour channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; CHANNELS] = [Channel::Red, Channel::Green, Channel::Blue];

    pub const fn index(&self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    fn from_key(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'r' => Some(Channel::Red),
            'g' => Some(Channel::Green),
            'b' => Some(Channel::Blue),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Red => write!(f, "red"),
            Channel::Green => write!(f, "green"),
            Channel::Blue => write!(f, "blue"),
        }
    }
}

/// Shifts each channel up by its own number of rows, wrapping around
///
/// `output[i, j, c] = input[(i + offset_c) mod height, j, c]`. Columns are
/// never touched and channels never mix, so two instances compose by adding
/// their offsets modulo the height.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRowOffset {
    offsets: Staged<[usize; CHANNELS]>,
}

impl Default for ChannelRowOffset {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl ChannelRowOffset {
    pub fn new(red: usize, green: usize, blue: usize) -> Self {
        Self {
            offsets: Staged::new([red, green, blue]),
        }
    }

    /// Offsets `0, step, 2·step` for red, green, blue
    pub fn staggered(step: usize) -> Self {
        Self::new(0, step, step.saturating_mul(2))
    }

    /// Committed offsets in red, green, blue order
    pub fn offsets(&self) -> [usize; CHANNELS] {
        *self.offsets.get()
    }

    pub fn offset(&self, channel: Channel) -> usize {
        self.offsets.get()[channel.index()]
    }

    /// Offsets after the next commit
    pub fn pending_offsets(&self) -> [usize; CHANNELS] {
        *self.offsets.staged()
    }

    /// Stage a new offset for one channel, clamped to at least zero
    pub fn set_offset(&mut self, channel: Channel, offset: i64) {
        let mut next = self.pending_offsets();
        next[channel.index()] = clamp_param(offset, 0);
        self.offsets.stage(next);
    }

    /// Stage a relative change for one channel
    pub fn shift(&mut self, channel: Channel, delta: i64) {
        let current = i64::try_from(self.pending_offsets()[channel.index()]).unwrap_or(i64::MAX);
        self.set_offset(channel, current.saturating_add(delta));
    }

    pub(super) fn commit(&mut self) -> bool {
        let changed = self.offsets.commit();
        if changed {
            let [red, green, blue] = self.offsets();
            debug!(red, green, blue, "Row offsets committed");
        }
        changed
    }

    pub(super) fn handle_key(&mut self, event: &KeyEvent) -> bool {
        let KeyCode::Char(c) = event.code else {
            return false;
        };
        let Some(channel) = Channel::from_key(c) else {
            return false;
        };
        let delta = if event.is_shifted() { -1 } else { 1 };
        self.shift(channel, delta);
        true
    }

    pub(super) fn apply(&self, input: &Frame, output: &mut Frame) {
        let height = input.height();
        if height == 0 {
            return;
        }
        let offsets = self.offsets().map(|o| o % height);

        if offsets[0] == offsets[1] && offsets[1] == offsets[2] {
            for row in 0..height {
                output
                    .row_mut(row)
                    .copy_from_slice(input.row((row + offsets[0]) % height));
            }
            return;
        }

        for row in 0..height {
            let dst = output.row_mut(row);
            for (channel, offset) in offsets.iter().enumerate() {
                let src = input.row((row + offset) % height);
                for px in (channel..dst.len()).step_by(CHANNELS) {
                    dst[px] = src[px];
                }
            }
        }
    }
}
