// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic frame source
//!
//! Produces a gradient that scrolls one pixel per frame over a coarse
//! checkerboard, so both effects have visible structure to work on without
//! a camera attached.

use super::{FrameSource, SourceRead};
use crate::constants::frame_interval;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{CHANNELS, Frame, FrameShape};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Edge length of the checkerboard squares
const CHECKER: usize = 32;

#[derive(Debug)]
pub struct TestPatternSource {
    shape: FrameShape,
    frame_index: u64,
    open: bool,
    /// Pacing like a camera; `None` produces frames on demand
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(shape: FrameShape) -> Self {
        debug!(%shape, "Test pattern source created");
        Self {
            shape,
            frame_index: 0,
            open: true,
            interval: None,
            next_due: None,
        }
    }

    /// Deliver at most `fps` frames per second
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = Some(frame_interval(fps));
        self
    }

    /// Sleep until the next frame is due; `false` if that is beyond `wait`
    fn wait_for_frame(&mut self, wait: Duration) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            let remaining = due - now;
            if remaining > wait {
                thread::sleep(wait);
                return false;
            }
            thread::sleep(remaining);
        }
        self.next_due = Some(due.max(now) + interval);
        true
    }

    /// Frames produced so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn render(&self, frame: &mut Frame) {
        let t = self.frame_index as usize;
        for row in 0..self.shape.height {
            let line = frame.row_mut(row);
            for col in 0..self.shape.width {
                let px = col * CHANNELS;
                let checker = ((row / CHECKER) + (col / CHECKER)) % 2 == 0;
                line[px] = ((col + t) % 256) as u8;
                line[px + 1] = ((row + t) % 256) as u8;
                line[px + 2] = if checker { 224 } else { 32 };
            }
        }
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn read_into(&mut self, frame: &mut Frame, wait: Duration) -> PipelineResult<SourceRead> {
        if !self.open {
            return Err(PipelineError::Closed);
        }
        if !self.wait_for_frame(wait) {
            return Ok(SourceRead::Unavailable);
        }
        self.render(frame);
        self.frame_index += 1;
        Ok(SourceRead::Frame)
    }

    fn close(&mut self) {
        self.open = false;
    }
}
