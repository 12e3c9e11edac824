// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the effects pipeline
//!
//! Only two conditions are recoverable: [`PipelineError::SourceUnavailable`]
//! is absorbed by `Pipeline::tick` as a skipped tick, and out-of-range
//! effect parameters are clamped by their setters and never surface here.
//! Everything else terminates the scheduler after both device handles are
//! released.

use crate::frame::FrameShape;
use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main pipeline error type
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No frame was ready within the wait policy (recoverable per tick)
    SourceUnavailable,
    /// The source stayed unavailable for too many consecutive ticks
    SourceFatal {
        /// Number of consecutive ticks without a frame
        consecutive_misses: u32,
    },
    /// A device reported dimensions that differ from the pipeline buffers
    ShapeMismatch {
        /// Device identifier
        device: String,
        /// Shape of the pipeline buffers
        expected: FrameShape,
        /// Shape the device reported
        actual: FrameShape,
    },
    /// The sink refused a frame
    SinkRejected(String),
    /// A device could not be opened
    DeviceOpen {
        /// Device identifier
        device: String,
        /// Underlying reason
        reason: String,
    },
    /// The device negotiated a pixel format the pipeline cannot consume
    FormatNotSupported(String),
    /// The pipeline has already released its devices
    Closed,
    /// Invalid configuration
    Config(String),
    /// Generic I/O failure outside the device path
    Io(String),
    /// Saving a snapshot failed
    Snapshot(String),
}

impl PipelineError {
    /// Whether the scheduler should keep running after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::SourceUnavailable)
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SourceUnavailable => write!(f, "No frame available from source"),
            PipelineError::SourceFatal { consecutive_misses } => write!(
                f,
                "Source unavailable for {} consecutive ticks",
                consecutive_misses
            ),
            PipelineError::ShapeMismatch {
                device,
                expected,
                actual,
            } => write!(
                f,
                "Shape mismatch on {}: expected {}, device reports {}",
                device, expected, actual
            ),
            PipelineError::SinkRejected(msg) => write!(f, "Sink rejected frame: {}", msg),
            PipelineError::DeviceOpen { device, reason } => {
                write!(f, "Failed to open {}: {}", device, reason)
            }
            PipelineError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            PipelineError::Closed => write!(f, "Pipeline devices already released"),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
            PipelineError::Snapshot(msg) => write!(f, "Snapshot failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Snapshot(err.to_string())
    }
}
