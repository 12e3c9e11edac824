// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources and sinks
//!
//! The pipeline only talks to devices through the [`FrameSource`] and
//! [`FrameSink`] traits. Concrete backends:
//!
//! ```text
//!  source                                   sink
//! ┌──────────────────┐                    ┌──────────────────┐
//! │ V4L2 capture     │                    │ V4L2 output      │
//! │ test pattern     │ ──▶ Pipeline ──▶   │ raw rgb24 writer │
//! │ threaded wrapper │                    │ null             │
//! └──────────────────┘                    └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`v4l2`]: capture from a camera, output to a v4l2loopback device
//! - [`test_pattern`]: synthetic frames for hardware-free runs
//! - [`raw`]: packed frames to any writer, or nowhere
//! - [`handoff`]: capture on a dedicated thread behind a latest-frame slot

pub mod handoff;
pub mod raw;
pub mod test_pattern;
pub mod v4l2;

use crate::config::{DeviceSpec, PipelineConfig};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{Frame, FrameShape};
use std::fs::File;
use std::io::{self, BufWriter};
use std::time::Duration;
use tracing::info;

/// Outcome of one source read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// The frame buffer now holds a complete new frame
    Frame,
    /// Nothing arrived within the wait policy; the buffer is untouched
    Unavailable,
}

/// Producer of frames
pub trait FrameSource {
    /// Device identifier used in logs and errors
    fn name(&self) -> &str;

    /// Shape the device actually delivers
    ///
    /// Fixed from `open` until `close`.
    fn shape(&self) -> FrameShape;

    /// Read the next frame into `frame`
    ///
    /// # Arguments
    /// * `frame` - Destination buffer, already shaped like [`Self::shape`]
    /// * `wait` - Longest time to block for a frame
    ///
    /// # Returns
    /// * `Ok(SourceRead::Frame)` - `frame` was overwritten with a new frame
    /// * `Ok(SourceRead::Unavailable)` - nothing ready in time, `frame` untouched
    /// * `Err(PipelineError)` - the device failed and cannot continue
    fn read_into(&mut self, frame: &mut Frame, wait: Duration) -> PipelineResult<SourceRead>;

    /// Release the device
    ///
    /// Idempotent. Reads after `close` fail with [`PipelineError::Closed`].
    fn close(&mut self);
}

/// Consumer of frames
pub trait FrameSink {
    /// Device identifier used in logs and errors
    fn name(&self) -> &str;

    /// Shape fixed when the sink was opened
    fn shape(&self) -> FrameShape;

    /// Deliver one frame
    ///
    /// The frame must match [`Self::shape`] exactly. Any error is final for
    /// the stream.
    fn emit(&mut self, frame: &Frame) -> PipelineResult<()>;

    /// Release the device
    ///
    /// Idempotent. Emits after `close` fail.
    fn close(&mut self);
}

/// Check that a device delivers the shape the pipeline buffers were sized for
pub fn ensure_shape(device: &str, expected: FrameShape, actual: FrameShape) -> PipelineResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(PipelineError::ShapeMismatch {
            device: device.to_string(),
            expected,
            actual,
        })
    }
}

/// Open a frame source
///
/// # Arguments
/// * `spec` - Which device to open
/// * `shape` - Requested frame shape
/// * `fps` - Requested frame rate; devices may ignore it
pub fn open_source(
    spec: &DeviceSpec,
    shape: FrameShape,
    fps: u32,
) -> PipelineResult<Box<dyn FrameSource>> {
    info!(source = %spec, %shape, fps, "Opening frame source");
    match spec {
        DeviceSpec::V4l2(path) => Ok(Box::new(v4l2::V4l2Source::open(path, shape, fps)?)),
        DeviceSpec::TestPattern => Ok(Box::new(
            test_pattern::TestPatternSource::new(shape).with_fps(fps),
        )),
        DeviceSpec::Stdout | DeviceSpec::Null | DeviceSpec::File(_) => Err(
            PipelineError::Config(format!("'{}' cannot be used as a frame source", spec)),
        ),
    }
}

/// Open a frame sink
pub fn open_sink(spec: &DeviceSpec, shape: FrameShape) -> PipelineResult<Box<dyn FrameSink>> {
    info!(sink = %spec, %shape, "Opening frame sink");
    match spec {
        DeviceSpec::V4l2(path) => Ok(Box::new(v4l2::V4l2Sink::open(path, shape)?)),
        DeviceSpec::Stdout => Ok(Box::new(raw::RawSink::new(
            "stdout",
            shape,
            BufWriter::new(io::stdout()),
        ))),
        DeviceSpec::File(path) => {
            let file = File::create(path).map_err(|e| PipelineError::DeviceOpen {
                device: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Box::new(raw::RawSink::new(
                path.display().to_string(),
                shape,
                BufWriter::new(file),
            )))
        }
        DeviceSpec::Null => Ok(Box::new(raw::NullSink::new(shape))),
        DeviceSpec::TestPattern => Err(PipelineError::Config(format!(
            "'{}' cannot be used as a frame sink",
            spec
        ))),
    }
}

/// Open the source described by `config`, on its own thread when requested
pub fn open_configured_source(config: &PipelineConfig) -> PipelineResult<Box<dyn FrameSource>> {
    let shape = config.shape();
    let fps = config.fps;
    if !config.threaded_capture {
        return open_source(&config.source, shape, fps);
    }

    let spec = config.source.clone();
    let threaded = handoff::ThreadedSource::spawn(
        &spec.to_string(),
        shape,
        config.wait_policy(),
        move || open_source(&spec, shape, fps),
    )?;
    Ok(Box::new(threaded))
}
