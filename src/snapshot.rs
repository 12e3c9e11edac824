// SPDX-License-Identifier: GPL-3.0-only

//! PNG snapshots of emitted frames

use crate::constants::APP_DIR_NAME;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::Frame;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default snapshot directory: `~/Pictures/webcam-toy`
///
/// Falls back to the home directory, then the working directory, when no
/// pictures directory is configured for the user.
pub fn default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Write `frame` as `IMG_<timestamp>.png` inside `dir`
pub fn save_png(frame: &Frame, dir: &Path) -> PipelineResult<PathBuf> {
    let img: image::RgbImage = image::ImageBuffer::from_raw(
        frame.width() as u32,
        frame.height() as u32,
        frame.as_bytes().to_vec(),
    )
    .ok_or_else(|| PipelineError::Snapshot("frame does not fit an RGB image".into()))?;

    std::fs::create_dir_all(dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let filepath = dir.join(format!("IMG_{}.png", timestamp));

    img.save(&filepath)?;
    info!(path = %filepath.display(), "Snapshot saved");

    Ok(filepath)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameShape;

    #[test]
    fn test_save_png_round_trips_pixels() {
        let dir = std::env::temp_dir().join(format!("webcam-toy-snapshot-{}", std::process::id()));
        let frame = Frame::from_fn(FrameShape::new(3, 2), |r, c, ch| (r * 50 + c * 10 + ch) as u8);

        let path = save_png(&frame, &dir).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (3, 2));
        assert_eq!(loaded.as_raw().as_slice(), frame.as_bytes());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
