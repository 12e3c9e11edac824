// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default capture width in pixels
pub const DEFAULT_WIDTH: u32 = 640;

/// Default capture height in pixels
pub const DEFAULT_HEIGHT: u32 = 480;

/// Default target frame rate
pub const DEFAULT_FPS: u32 = 30;

/// Ticks between two frame-rate reports
pub const DEFAULT_REPORT_INTERVAL: u64 = 300;

/// Consecutive ticks without a frame before the source is declared dead
///
/// Three seconds at the default frame rate.
pub const DEFAULT_MAX_CONSECUTIVE_MISSES: u32 = 90;

/// Default block edge for Pixelize and row step for the staggered row offset
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Number of mmap buffers requested from V4L2 devices
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// Packed 24-bit RGB
pub const FOURCC_RGB24: &[u8; 4] = b"RGB3";

/// Packed 24-bit BGR
pub const FOURCC_BGR24: &[u8; 4] = b"BGR3";

/// Application directory name used for snapshots
pub const APP_DIR_NAME: &str = "webcam-toy";

/// Duration of one tick at the given frame rate
///
/// A zero frame rate is treated as one frame per second.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}
