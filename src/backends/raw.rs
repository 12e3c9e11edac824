// SPDX-License-Identifier: GPL-3.0-only

//! Raw rgb24 sinks
//!
//! Frames are written back to back with no header, the layout `ffplay -f
//! rawvideo -pixel_format rgb24 -video_size WxH -` expects.

use super::FrameSink;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{Frame, FrameShape};
use std::io::Write;
use tracing::{debug, warn};

/// Writes packed frames to any writer
pub struct RawSink<W: Write> {
    name: String,
    shape: FrameShape,
    writer: Option<W>,
    frames: u64,
}

impl<W: Write> RawSink<W> {
    pub fn new(name: impl Into<String>, shape: FrameShape, writer: W) -> Self {
        Self {
            name: name.into(),
            shape,
            writer: Some(writer),
            frames: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Give back the writer, flushing nothing further
    pub fn into_inner(mut self) -> Option<W> {
        self.writer.take()
    }
}

impl<W: Write> FrameSink for RawSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn emit(&mut self, frame: &Frame) -> PipelineResult<()> {
        if frame.shape() != self.shape {
            return Err(PipelineError::SinkRejected(format!(
                "{} expects {} frames, got {}",
                self.name,
                self.shape,
                frame.shape()
            )));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::SinkRejected(format!("{} is closed", self.name)))?;
        writer
            .write_all(frame.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| PipelineError::SinkRejected(format!("{}: {}", self.name, e)))?;
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(sink = %self.name, error = %e, "Flush on close failed");
            }
            debug!(sink = %self.name, frames = self.frames, "Raw sink closed");
        }
    }
}

impl<W: Write> Drop for RawSink<W> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Discards frames, counting them
#[derive(Debug)]
pub struct NullSink {
    shape: FrameShape,
    frames: u64,
    open: bool,
}

impl NullSink {
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            frames: 0,
            open: true,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn emit(&mut self, _frame: &Frame) -> PipelineResult<()> {
        if !self.open {
            return Err(PipelineError::SinkRejected("null sink is closed".into()));
        }
        self.frames += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}
