// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture and v4l2loopback output
//!
//! Both directions negotiate packed 24-bit RGB through memory-mapped
//! streams. The driver may round the requested size; whatever it settles on
//! is reported as the device shape and checked by the pipeline.

mod capture;
mod output;

pub use capture::V4l2Source;
pub use output::V4l2Sink;

use crate::constants::{FOURCC_BGR24, FOURCC_RGB24};
use crate::errors::PipelineError;
use crate::frame::{CHANNELS, FrameShape};
use std::path::Path;
use v4l::{Device, Format, FourCC};

/// Byte order of a negotiated 24-bit format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
}

impl PixelOrder {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(FOURCC_RGB24) {
            Some(PixelOrder::Rgb)
        } else if fourcc == FourCC::new(FOURCC_BGR24) {
            Some(PixelOrder::Bgr)
        } else {
            None
        }
    }
}

/// Format requesting packed RGB at `shape`
fn rgb24_format(shape: FrameShape) -> Format {
    Format::new(
        shape.width as u32,
        shape.height as u32,
        FourCC::new(FOURCC_RGB24),
    )
}

/// Open a device node, mapping failures to [`PipelineError::DeviceOpen`]
fn open_device(path: &Path) -> Result<Device, PipelineError> {
    Device::with_path(path).map_err(|e| PipelineError::DeviceOpen {
        device: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Validate a negotiated format and return its shape, pixel order and stride
fn inspect_format(
    device: &str,
    format: &Format,
) -> Result<(FrameShape, PixelOrder, usize), PipelineError> {
    let order = PixelOrder::from_fourcc(format.fourcc).ok_or_else(|| {
        PipelineError::FormatNotSupported(format!(
            "{} negotiated {} instead of RGB3/BGR3",
            device, format.fourcc
        ))
    })?;
    let shape = FrameShape::new(format.width as usize, format.height as usize);
    let stride = match format.stride as usize {
        0 => shape.row_len(),
        stride => stride,
    };
    if stride < shape.width * CHANNELS {
        return Err(PipelineError::FormatNotSupported(format!(
            "{} reports stride {} for {} pixels per row",
            device, stride, shape.width
        )));
    }
    Ok((shape, order, stride))
}

fn device_error(device: &str, context: &str, err: std::io::Error) -> PipelineError {
    PipelineError::DeviceOpen {
        device: device.to_string(),
        reason: format!("{}: {}", context, err),
    }
}
