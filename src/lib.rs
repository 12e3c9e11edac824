// SPDX-License-Identifier: GPL-3.0-only

//! Webcam Toy - real-time effects between a camera and a virtual camera
//!
//! Frames are pulled from a source, run through an ordered chain of
//! per-pixel effects and pushed to a sink at a fixed rate.
//!
//! # Architecture
//!
//! - [`frame`]: fixed-shape packed RGB buffers
//! - [`effects`]: Pixelize, ChannelRowOffset and the effect chain
//! - [`pipeline`]: one capture → apply → emit tick, and the scheduler driving it
//! - [`input`]: key events and their routing to effects
//! - [`backends`]: V4L2 capture/output, test pattern, raw writers, threaded capture
//! - [`config`]: startup configuration
//!
//! # Example
//!
//! ```ignore
//! let config = PipelineConfig::default();
//! let mut pipeline = Pipeline::open(&config, config.build_chain())?;
//! Scheduler::new(config.period()).run(&mut pipeline, &mut NoInput)?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod effects;
pub mod errors;
pub mod frame;
pub mod input;
pub mod pipeline;
pub mod snapshot;
pub mod terminal;

// Re-export commonly used types
pub use config::{DeviceSpec, EffectConfig, PipelineConfig};
pub use effects::{Channel, ChannelRowOffset, Effect, EffectChain, EffectKind, Pixelize};
pub use errors::{PipelineError, PipelineResult};
pub use frame::{ChannelMap, Frame, FrameShape};
pub use input::{InputRouter, KeyCode, KeyEvent, Modifiers};
pub use pipeline::{Pipeline, Scheduler, StopHandle, TickOutcome};
