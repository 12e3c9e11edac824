// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-shape packed pixel buffers
//!
//! A [`Frame`] is `height × width × 3` bytes in row-major order, one byte
//! per channel. Frames are allocated once per pipeline buffer slot and then
//! rewritten in place on every tick.

use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channels per pixel
pub const CHANNELS: usize = 3;

/// Width and height of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: usize,
    pub height: usize,
}

impl FrameShape {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Size in bytes of a packed frame with this shape
    pub const fn byte_len(&self) -> usize {
        self.width * self.height * CHANNELS
    }

    /// Bytes per row
    pub const fn row_len(&self) -> usize {
        self.width * CHANNELS
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Channel permutation between two colour conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMap {
    /// Channels keep their position
    #[default]
    Identity,
    /// Channel `c` is read from `2 - c` (RGB <-> BGR)
    Reversed,
}

impl ChannelMap {
    /// Input channel that feeds output channel `channel`
    #[inline]
    pub const fn source_channel(&self, channel: usize) -> usize {
        match self {
            ChannelMap::Identity => channel,
            ChannelMap::Reversed => CHANNELS - 1 - channel,
        }
    }
}

/// One packed 8-bit RGB (or BGR) image
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    shape: FrameShape,
    data: Vec<u8>,
}

impl Frame {
    /// Allocate a black frame
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            data: vec![0; shape.byte_len()],
        }
    }

    /// Wrap existing packed bytes
    pub fn from_bytes(shape: FrameShape, data: Vec<u8>) -> PipelineResult<Self> {
        if data.len() != shape.byte_len() {
            return Err(PipelineError::Config(format!(
                "{} bytes cannot hold a {} frame ({} bytes expected)",
                data.len(),
                shape,
                shape.byte_len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Build a frame by evaluating `f(row, col, channel)` for every byte
    pub fn from_fn(shape: FrameShape, mut f: impl FnMut(usize, usize, usize) -> u8) -> Self {
        let mut frame = Self::new(shape);
        for row in 0..shape.height {
            let line = frame.row_mut(row);
            for col in 0..shape.width {
                for channel in 0..CHANNELS {
                    line[col * CHANNELS + channel] = f(row, col, channel);
                }
            }
        }
        frame
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of `(row, col, channel)`
    #[inline]
    pub fn offset(&self, row: usize, col: usize, channel: usize) -> usize {
        (row * self.shape.width + col) * CHANNELS + channel
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: usize) -> u8 {
        self.data[self.offset(row, col, channel)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: u8) {
        let idx = self.offset(row, col, channel);
        self.data[idx] = value;
    }

    /// Packed bytes of one row
    #[inline]
    pub fn row(&self, row: usize) -> &[u8] {
        let len = self.shape.row_len();
        &self.data[row * len..(row + 1) * len]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [u8] {
        let len = self.shape.row_len();
        &mut self.data[row * len..(row + 1) * len]
    }

    /// Overwrite the whole frame from a packed buffer of the same size
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> PipelineResult<()> {
        if bytes.len() != self.data.len() {
            return Err(PipelineError::Config(format!(
                "cannot copy {} bytes into a {} frame",
                bytes.len(),
                self.shape
            )));
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite the frame from rows that are `stride` bytes apart
    ///
    /// Drivers may pad rows; only the first `width * 3` bytes of each row are
    /// pixel data.
    pub fn copy_from_strided(&mut self, bytes: &[u8], stride: usize) -> PipelineResult<()> {
        let row_len = self.shape.row_len();
        if stride == row_len {
            return self.copy_from_bytes(&bytes[..bytes.len().min(self.data.len())]);
        }
        if stride < row_len || bytes.len() < stride * self.shape.height.saturating_sub(1) + row_len {
            return Err(PipelineError::FormatNotSupported(format!(
                "stride {} with {} bytes cannot hold a {} frame",
                stride,
                bytes.len(),
                self.shape
            )));
        }
        for row in 0..self.shape.height {
            let start = row * stride;
            self.row_mut(row)
                .copy_from_slice(&bytes[start..start + row_len]);
        }
        Ok(())
    }

    /// Permute channels in place
    pub fn apply_channel_map(&mut self, map: ChannelMap) {
        if map == ChannelMap::Reversed {
            for px in self.data.chunks_exact_mut(CHANNELS) {
                px.swap(0, CHANNELS - 1);
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({}, {} bytes)", self.shape, self.data.len())
    }
}
