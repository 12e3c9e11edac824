// SPDX-License-Identifier: GPL-3.0-only

//! v4l2loopback output

use super::{PixelOrder, device_error, inspect_format, open_device, rgb24_format};
use crate::backends::FrameSink;
use crate::constants::V4L2_BUFFER_COUNT;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{Frame, FrameShape};
use std::path::Path;
use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::OutputStream;
use v4l::video::Output;

/// Output device fed with packed RGB frames
///
/// Consumers of the loopback device see the frames as a camera.
pub struct V4l2Sink {
    name: String,
    shape: FrameShape,
    stride: usize,
    stream: Option<MmapStream<'static>>,
}

impl V4l2Sink {
    pub fn open(path: &Path, shape: FrameShape) -> PipelineResult<Self> {
        let name = path.display().to_string();
        let dev = open_device(path)?;

        let format = Output::set_format(&dev, &rgb24_format(shape))
            .map_err(|e| device_error(&name, "set output format", e))?;
        let (actual, order, stride) = inspect_format(&name, &format)?;
        if order != PixelOrder::Rgb {
            return Err(PipelineError::FormatNotSupported(format!(
                "{} only accepts {}",
                name, format.fourcc
            )));
        }
        if actual != shape {
            // Loopback devices fix their size on the first writer; report what it kept
            warn!(device = %name, requested = %shape, actual = %actual, "Output size differs");
        }

        let stream = MmapStream::with_buffers(&dev, Type::VideoOutput, V4L2_BUFFER_COUNT)
            .map_err(|e| device_error(&name, "create output stream", e))?;

        info!(device = %name, shape = %actual, "V4L2 output stream started");

        Ok(Self {
            name,
            shape: actual,
            stride,
            stream: Some(stream),
        })
    }
}

impl FrameSink for V4l2Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn emit(&mut self, frame: &Frame) -> PipelineResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PipelineError::SinkRejected(format!("{} is closed", self.name)))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| PipelineError::SinkRejected(format!("{}: {}", self.name, e)))?;

        let row_len = self.shape.row_len();
        let needed = self.stride * (self.shape.height.saturating_sub(1)) + row_len;
        if buf.len() < needed {
            return Err(PipelineError::SinkRejected(format!(
                "{} buffer holds {} bytes, frame needs {}",
                self.name,
                buf.len(),
                needed
            )));
        }
        for row in 0..self.shape.height {
            let start = row * self.stride;
            buf[start..start + row_len].copy_from_slice(frame.row(row));
        }
        meta.bytesused = (self.stride * self.shape.height).min(buf.len()) as u32;
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(device = %self.name, "V4L2 output stream stopped");
        }
    }
}

impl Drop for V4l2Sink {
    fn drop(&mut self) {
        self.close();
    }
}
