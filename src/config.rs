// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_MAX_CONSECUTIVE_MISSES,
    DEFAULT_REPORT_INTERVAL, DEFAULT_WIDTH, frame_interval,
};
use crate::effects::{ChannelRowOffset, Effect, EffectChain, EffectKind, Pixelize};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{ChannelMap, FrameShape};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Where frames come from or go to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    /// A V4L2 device node (`/dev/videoN`)
    V4l2(PathBuf),
    /// Synthetic moving gradient
    TestPattern,
    /// Raw rgb24 frames on standard output
    Stdout,
    /// Discard every frame
    Null,
    /// Raw rgb24 frames appended to a file
    File(PathBuf),
}

impl FromStr for DeviceSpec {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = match s.trim() {
            "" => return Err(PipelineError::Config("empty device name".into())),
            "test" | "testpattern" | "test-pattern" => DeviceSpec::TestPattern,
            "-" | "stdout" => DeviceSpec::Stdout,
            "null" => DeviceSpec::Null,
            path if path.starts_with("/dev/video") => DeviceSpec::V4l2(PathBuf::from(path)),
            path => DeviceSpec::File(PathBuf::from(path)),
        };
        Ok(spec)
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::V4l2(path) | DeviceSpec::File(path) => write!(f, "{}", path.display()),
            DeviceSpec::TestPattern => write!(f, "test"),
            DeviceSpec::Stdout => write!(f, "stdout"),
            DeviceSpec::Null => write!(f, "null"),
        }
    }
}

/// One chain entry as written in a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectConfig {
    Pixelize {
        #[serde(default = "default_block_size")]
        block_size: usize,
        #[serde(default)]
        channel_map: ChannelMap,
    },
    RowOffset {
        #[serde(default)]
        red: usize,
        #[serde(default)]
        green: usize,
        #[serde(default)]
        blue: usize,
    },
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl EffectConfig {
    /// Default parameters for an effect kind
    ///
    /// `step` is the block size for Pixelize and the per-channel spacing of
    /// the staggered row offset.
    pub fn from_kind(kind: EffectKind, step: usize) -> Self {
        match kind {
            EffectKind::Pixelize => EffectConfig::Pixelize {
                block_size: step,
                channel_map: ChannelMap::Identity,
            },
            EffectKind::RowOffset => EffectConfig::RowOffset {
                red: 0,
                green: step,
                blue: step.saturating_mul(2),
            },
        }
    }

    pub fn build(&self) -> Effect {
        match *self {
            EffectConfig::Pixelize {
                block_size,
                channel_map,
            } => Pixelize::new(block_size).with_channel_map(channel_map).into(),
            EffectConfig::RowOffset { red, green, blue } => {
                ChannelRowOffset::new(red, green, blue).into()
            }
        }
    }
}

/// Everything needed to open and run a pipeline
///
/// Read once at startup; nothing here is ever written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame source
    pub source: DeviceSpec,
    /// Frame sink
    pub sink: DeviceSpec,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target ticks per second
    pub fps: u32,
    /// Ticks between frame-rate reports
    pub report_interval: u64,
    /// Consecutive skipped ticks tolerated before the source is considered dead
    pub max_consecutive_misses: u32,
    /// Longest wait for a source frame; one frame interval when unset
    pub wait_policy_ms: Option<u64>,
    /// Channel permutation applied just before each frame is emitted
    pub sink_channel_map: ChannelMap,
    /// Capture on a dedicated thread
    pub threaded_capture: bool,
    /// Effect chain in application order
    pub effects: Vec<EffectConfig>,
    /// Where snapshots are written; the pictures directory when unset
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: DeviceSpec::V4l2(PathBuf::from("/dev/video0")),
            sink: DeviceSpec::V4l2(PathBuf::from("/dev/video2")),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            report_interval: DEFAULT_REPORT_INTERVAL,
            max_consecutive_misses: DEFAULT_MAX_CONSECUTIVE_MISSES,
            wait_policy_ms: None,
            sink_channel_map: ChannelMap::Identity,
            threaded_capture: false,
            effects: vec![EffectConfig::from_kind(
                EffectKind::RowOffset,
                DEFAULT_BLOCK_SIZE,
            )],
            snapshot_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load_from(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded pipeline config");
        config.validate()?;
        Ok(config)
    }

    /// Reject values no pipeline can run with
    pub fn validate(&self) -> PipelineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::Config(format!(
                "frame size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(PipelineError::Config("fps must be at least 1".into()));
        }
        if self.report_interval == 0 {
            return Err(PipelineError::Config(
                "report interval must be at least 1".into(),
            ));
        }
        if self.max_consecutive_misses == 0 {
            return Err(PipelineError::Config(
                "max consecutive misses must be at least 1".into(),
            ));
        }
        if self.source == self.sink && matches!(self.source, DeviceSpec::V4l2(_)) {
            return Err(PipelineError::Config(format!(
                "{} cannot be both source and sink",
                self.source
            )));
        }
        Ok(())
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width as usize, self.height as usize)
    }

    /// Scheduler tick period
    pub fn period(&self) -> Duration {
        frame_interval(self.fps)
    }

    /// Longest time one tick waits for a source frame
    pub fn wait_policy(&self) -> Duration {
        self.wait_policy_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.period())
    }

    /// Instantiate the configured effect chain
    pub fn build_chain(&self) -> EffectChain {
        self.effects.iter().map(EffectConfig::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_spec_parsing() {
        assert_eq!(
            "/dev/video0".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::V4l2(PathBuf::from("/dev/video0"))
        );
        assert_eq!("test".parse::<DeviceSpec>().unwrap(), DeviceSpec::TestPattern);
        assert_eq!("-".parse::<DeviceSpec>().unwrap(), DeviceSpec::Stdout);
        assert_eq!("null".parse::<DeviceSpec>().unwrap(), DeviceSpec::Null);
        assert_eq!(
            "out.rgb".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::File(PathBuf::from("out.rgb"))
        );
        assert!("".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn test_wait_policy_defaults_to_frame_interval() {
        let mut config = PipelineConfig {
            fps: 25,
            ..Default::default()
        };
        assert_eq!(config.wait_policy(), Duration::from_millis(40));
        config.wait_policy_ms = Some(5);
        assert_eq!(config.wait_policy(), Duration::from_millis(5));
    }

    #[test]
    fn test_same_v4l2_device_both_ends_rejected() {
        let config = PipelineConfig {
            source: DeviceSpec::V4l2(PathBuf::from("/dev/video0")),
            sink: DeviceSpec::V4l2(PathBuf::from("/dev/video0")),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_staggered_row_offset_from_kind() {
        assert_eq!(
            EffectConfig::from_kind(EffectKind::RowOffset, 8),
            EffectConfig::RowOffset {
                red: 0,
                green: 8,
                blue: 16
            }
        );
    }

    #[test]
    fn test_huge_offset_step_saturates() {
        let step = usize::MAX / 2 + 1;
        assert_eq!(
            EffectConfig::from_kind(EffectKind::RowOffset, step),
            EffectConfig::RowOffset {
                red: 0,
                green: step,
                blue: usize::MAX
            }
        );
    }
}
