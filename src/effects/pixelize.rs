// SPDX-License-Identifier: GPL-3.0-only

//! Block pixelation

use super::{Staged, clamp_param};
use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::frame::{CHANNELS, ChannelMap, Frame};
use crate::input::{KeyCode, KeyEvent};
use tracing::debug;

/// Replaces every `block_size × block_size` block with its top-left pixel
///
/// Output pixel `(i, j, c)` reads input pixel
/// `(⌊i/b⌋·b, ⌊j/b⌋·b, map(c))`. Blocks at the right and bottom edges are
/// truncated, never skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixelize {
    block_size: Staged<usize>,
    channel_map: ChannelMap,
}

impl Default for Pixelize {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl Pixelize {
    /// Values below one are clamped to one
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: Staged::new(block_size.max(1)),
            channel_map: ChannelMap::Identity,
        }
    }

    pub fn with_channel_map(mut self, channel_map: ChannelMap) -> Self {
        self.channel_map = channel_map;
        self
    }

    /// Committed block size
    pub fn block_size(&self) -> usize {
        *self.block_size.get()
    }

    /// Block size after the next commit
    pub fn pending_block_size(&self) -> usize {
        *self.block_size.staged()
    }

    pub fn channel_map(&self) -> ChannelMap {
        self.channel_map
    }

    /// Stage a new block size, clamped to at least one
    pub fn set_block_size(&mut self, block_size: i64) {
        self.block_size.stage(clamp_param(block_size, 1));
    }

    pub(super) fn commit(&mut self) -> bool {
        let changed = self.block_size.commit();
        if changed {
            debug!(block_size = self.block_size(), "Pixelize block size committed");
        }
        changed
    }

    pub(super) fn handle_key(&mut self, event: &KeyEvent) -> bool {
        let current = self.pending_block_size() as i64;
        match event.code {
            KeyCode::Char('+') | KeyCode::Char('=') => self.set_block_size(current + 1),
            KeyCode::Char('-') => self.set_block_size(current - 1),
            _ => return false,
        }
        true
    }

    pub(super) fn apply(&self, input: &Frame, output: &mut Frame) {
        let block = self.block_size();
        let width = input.width();
        let map = self.channel_map;

        for row in 0..input.height() {
            let src = input.row((row / block) * block);
            let dst = output.row_mut(row);
            for col in 0..width {
                let src_px = ((col / block) * block) * CHANNELS;
                let dst_px = col * CHANNELS;
                for channel in 0..CHANNELS {
                    dst[dst_px + channel] = src[src_px + map.source_channel(channel)];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameShape;

    #[test]
    fn test_block_size_clamps_to_one() {
        let mut effect = Pixelize::new(0);
        assert_eq!(effect.block_size(), 1);

        effect.set_block_size(-3);
        effect.commit();
        assert_eq!(effect.block_size(), 1);
    }

    #[test]
    fn test_keys_stage_without_committing() {
        let mut effect = Pixelize::new(4);
        assert!(effect.handle_key(&KeyEvent::char('+')));
        assert!(effect.handle_key(&KeyEvent::char('=')));
        assert_eq!(effect.block_size(), 4);
        assert_eq!(effect.pending_block_size(), 6);

        assert!(effect.commit());
        assert_eq!(effect.block_size(), 6);
        assert!(!effect.handle_key(&KeyEvent::char('x')));
    }

    #[test]
    fn test_decrement_floors_at_one() {
        let mut effect = Pixelize::new(1);
        assert!(effect.handle_key(&KeyEvent::char('-')));
        assert!(!effect.commit());
        assert_eq!(effect.block_size(), 1);
    }

    #[test]
    fn test_partial_edge_blocks() {
        // 3 wide with block 2: column 2 starts its own truncated block
        let shape = FrameShape::new(3, 1);
        let input = Frame::from_bytes(shape, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]).unwrap();
        let mut output = Frame::new(shape);
        Pixelize::new(2).apply(&input, &mut output);
        assert_eq!(output.as_bytes(), &[1, 1, 1, 1, 1, 1, 3, 3, 3]);
    }

    #[test]
    fn test_reversed_map_with_unit_blocks_swaps_channels() {
        let shape = FrameShape::new(2, 1);
        let input = Frame::from_bytes(shape, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut output = Frame::new(shape);
        Pixelize::new(1)
            .with_channel_map(ChannelMap::Reversed)
            .apply(&input, &mut output);
        assert_eq!(output.as_bytes(), &[3, 2, 1, 6, 5, 4]);
    }
}
