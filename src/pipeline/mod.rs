// SPDX-License-Identifier: GPL-3.0-only

//! One capture → effects → emit cycle
//!
//! A [`Pipeline`] exclusively owns its source, its sink, two frame buffers
//! and the effect chain. Buffers are sized once at construction and reused
//! on every tick.
//!
//! ```text
//!   commit staged parameters
//!            │
//!            ▼
//!   source ──▶ buffer[0] ──▶ chain (ping-pong with buffer[1]) ──▶ channel map ──▶ sink
//! ```

pub mod scheduler;

pub use scheduler::{Scheduler, StopHandle};

use crate::backends::{self, FrameSink, FrameSource, SourceRead, ensure_shape};
use crate::config::PipelineConfig;
use crate::effects::{BufferSlot, EffectChain};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{ChannelMap, Frame, FrameShape};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of a tick that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was emitted; it lives in `slot`
    Emitted(BufferSlot),
    /// No frame was ready; nothing was emitted
    Skipped {
        /// Skipped ticks in a row, this one included
        consecutive_misses: u32,
    },
}

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub emitted: u64,
    pub skipped: u64,
    pub parameter_commits: u64,
}

/// Frames-per-second measured over windows of a fixed number of ticks
///
/// Every tick closes in on the next report, skipped or not; the rate counts
/// only the frames that were emitted inside the window.
#[derive(Debug, Clone)]
pub struct FrameRateCounter {
    interval: u64,
    ticks: u64,
    frames: u64,
    window_frames: u64,
    window_start: Instant,
    fps: Option<f64>,
}

impl FrameRateCounter {
    pub fn new(interval: u64) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: u64, start: Instant) -> Self {
        Self {
            interval: interval.max(1),
            ticks: 0,
            frames: 0,
            window_frames: 0,
            window_start: start,
            fps: None,
        }
    }

    /// Count one tick; returns the new rate when a window closes
    pub fn record(&mut self, emitted: bool) -> Option<f64> {
        self.record_at(Instant::now(), emitted)
    }

    pub fn record_at(&mut self, now: Instant, emitted: bool) -> Option<f64> {
        self.ticks += 1;
        if emitted {
            self.frames += 1;
            self.window_frames += 1;
        }
        if self.ticks % self.interval != 0 {
            return None;
        }
        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.window_frames as f64 / elapsed
        } else {
            f64::INFINITY
        };
        self.window_start = now;
        self.window_frames = 0;
        self.fps = Some(fps);
        Some(fps)
    }

    /// Rate measured over the last complete window
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// Capture, effect chain and sink driven one tick at a time
pub struct Pipeline {
    source: Option<Box<dyn FrameSource>>,
    sink: Option<Box<dyn FrameSink>>,
    /// `[source, scratch]`, indexed by [`BufferSlot::index`]
    buffers: [Frame; 2],
    chain: EffectChain,
    shape: FrameShape,
    wait: Duration,
    sink_channel_map: ChannelMap,
    max_consecutive_misses: u32,
    consecutive_misses: u32,
    rate: FrameRateCounter,
    last_output: Option<BufferSlot>,
    stats: PipelineStats,
}

impl Pipeline {
    /// Open the configured devices and build a pipeline around them
    ///
    /// If the sink cannot be opened the already opened source is released
    /// before the error is returned.
    pub fn open(config: &PipelineConfig, chain: EffectChain) -> PipelineResult<Self> {
        config.validate()?;
        let mut source = backends::open_configured_source(config)?;
        let sink = match backends::open_sink(&config.sink, config.shape()) {
            Ok(sink) => sink,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        Self::new(source, sink, chain, config)
    }

    /// Build a pipeline around already opened devices
    ///
    /// Both devices must deliver the configured shape. On mismatch both are
    /// closed and [`PipelineError::ShapeMismatch`] is returned.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        mut sink: Box<dyn FrameSink>,
        chain: EffectChain,
        config: &PipelineConfig,
    ) -> PipelineResult<Self> {
        let shape = config.shape();
        let checked = ensure_shape(source.name(), shape, source.shape())
            .and_then(|()| ensure_shape(sink.name(), shape, sink.shape()));
        if let Err(e) = checked {
            error!(error = %e, "Device shape does not match pipeline buffers");
            source.close();
            sink.close();
            return Err(e);
        }

        info!(
            source = source.name(),
            sink = sink.name(),
            %shape,
            effects = chain.len(),
            "Pipeline ready"
        );

        Ok(Self {
            source: Some(source),
            sink: Some(sink),
            buffers: [Frame::new(shape), Frame::new(shape)],
            chain,
            shape,
            wait: config.wait_policy(),
            sink_channel_map: config.sink_channel_map,
            max_consecutive_misses: config.max_consecutive_misses.max(1),
            consecutive_misses: 0,
            rate: FrameRateCounter::new(config.report_interval),
            last_output: None,
            stats: PipelineStats::default(),
        })
    }

    /// Run one capture → apply → emit cycle
    ///
    /// Staged effect parameters are committed first, so every change made
    /// before this call is visible to this tick's chain and nothing changes
    /// while it runs. A missing frame skips the tick; too many in a row
    /// escalate to [`PipelineError::SourceFatal`]. Any error returned here
    /// has already released both devices.
    pub fn tick(&mut self) -> PipelineResult<TickOutcome> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        self.stats.ticks += 1;

        let committed = self.chain.commit_pending();
        if committed > 0 {
            debug!(committed, "Effect parameters committed");
            self.stats.parameter_commits += committed as u64;
        }

        let read = match self.source.as_mut() {
            Some(source) => source.read_into(&mut self.buffers[0], self.wait),
            None => Err(PipelineError::Closed),
        };
        match read {
            Ok(SourceRead::Frame) => self.consecutive_misses = 0,
            Ok(SourceRead::Unavailable) => return self.record_miss(),
            Err(e) if e.is_recoverable() => return self.record_miss(),
            Err(e) => {
                error!(error = %e, "Source failed");
                self.close();
                return Err(e);
            }
        }

        let [source_buf, scratch_buf] = &mut self.buffers;
        let output = self.chain.apply(source_buf, scratch_buf);
        output.frame.apply_channel_map(self.sink_channel_map);
        let slot = output.slot;

        let emitted = match self.sink.as_mut() {
            Some(sink) => sink.emit(output.frame),
            None => Err(PipelineError::Closed),
        };
        if let Err(e) = emitted {
            let err = match e {
                PipelineError::SinkRejected(_) => e,
                other => PipelineError::SinkRejected(other.to_string()),
            };
            error!(error = %err, "Sink rejected frame");
            self.close();
            return Err(err);
        }

        self.last_output = Some(slot);
        self.stats.emitted += 1;
        self.report_rate(true);

        Ok(TickOutcome::Emitted(slot))
    }

    fn report_rate(&mut self, emitted: bool) {
        if let Some(fps) = self.rate.record(emitted) {
            let fps = (fps * 10.0).round() / 10.0;
            info!(
                tick = self.stats.ticks,
                frame = self.stats.emitted,
                fps,
                "Rendering"
            );
        }
    }

    fn record_miss(&mut self) -> PipelineResult<TickOutcome> {
        self.consecutive_misses += 1;
        self.stats.skipped += 1;

        if self.consecutive_misses >= self.max_consecutive_misses {
            let err = PipelineError::SourceFatal {
                consecutive_misses: self.consecutive_misses,
            };
            error!(error = %err, "Giving up on source");
            self.close();
            return Err(err);
        }
        self.report_rate(false);

        if self.consecutive_misses == 1 {
            debug!("No frame from source, skipping tick");
        } else if self.consecutive_misses % 30 == 0 {
            warn!(
                consecutive_misses = self.consecutive_misses,
                limit = self.max_consecutive_misses,
                "Source still not delivering frames"
            );
        }

        Ok(TickOutcome::Skipped {
            consecutive_misses: self.consecutive_misses,
        })
    }

    /// Release both devices
    ///
    /// Idempotent; later ticks fail with [`PipelineError::Closed`].
    pub fn close(&mut self) {
        let mut released = false;
        if let Some(mut source) = self.source.take() {
            source.close();
            released = true;
        }
        if let Some(mut sink) = self.sink.take() {
            sink.close();
            released = true;
        }
        if released {
            info!(
                emitted = self.stats.emitted,
                skipped = self.stats.skipped,
                "Pipeline devices released"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none() && self.sink.is_none()
    }

    /// Most recently emitted frame, exactly as the sink received it
    pub fn last_output(&self) -> Option<&Frame> {
        self.last_output.map(|slot| &self.buffers[slot.index()])
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Chain access for routing input
    ///
    /// Effect setters only stage values, so changes made here apply from the
    /// next tick on.
    pub fn chain_mut(&mut self) -> &mut EffectChain {
        &mut self.chain
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// Rate measured over the last complete report window
    pub fn fps(&self) -> Option<f64> {
        self.rate.fps()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}
