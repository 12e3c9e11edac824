// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-rate, single-threaded tick loop

use super::{Pipeline, PipelineStats};
use crate::errors::PipelineResult;
use crate::input::{DefaultAction, InputRouter, InputSource};
use crate::snapshot;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cloneable flag that stops a running scheduler between ticks
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Calls [`Pipeline::tick`] once per period until stopped
///
/// Input events are drained and routed between ticks, never during one. A
/// tick that overruns its period starts the next one immediately instead of
/// trying to catch up.
pub struct Scheduler {
    period: Duration,
    stop: StopHandle,
    max_ticks: Option<u64>,
    snapshot_dir: PathBuf,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            stop: StopHandle::new(),
            max_ticks: None,
            snapshot_dir: snapshot::default_snapshot_dir(),
        }
    }

    /// Stop on its own after this many ticks, skipped ones included
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = dir;
        self
    }

    /// Handle for stopping the loop from a signal handler or another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run until stopped, a tick limit is reached, or a fatal error
    ///
    /// The pipeline is closed before this returns, whatever the outcome.
    pub fn run(
        &mut self,
        pipeline: &mut Pipeline,
        input: &mut dyn InputSource,
    ) -> PipelineResult<PipelineStats> {
        info!(period_ms = self.period.as_millis() as u64, "Scheduler started");

        let result = self.run_loop(pipeline, input);
        pipeline.close();

        match &result {
            Ok(()) => info!("Scheduler stopped"),
            Err(e) => warn!(error = %e, "Scheduler stopped on error"),
        }
        result.map(|()| pipeline.stats())
    }

    fn run_loop(
        &mut self,
        pipeline: &mut Pipeline,
        input: &mut dyn InputSource,
    ) -> PipelineResult<()> {
        let mut ticks: u64 = 0;
        let mut deadline = Instant::now();

        loop {
            self.drain_input(pipeline, input)?;

            if self.stop.is_stopped() {
                debug!(ticks, "Stop requested");
                return Ok(());
            }
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                debug!(ticks, "Tick limit reached");
                return Ok(());
            }

            pipeline.tick()?;
            ticks += 1;

            deadline += self.period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            } else {
                deadline = now;
            }
        }
    }

    fn drain_input(
        &self,
        pipeline: &mut Pipeline,
        input: &mut dyn InputSource,
    ) -> PipelineResult<()> {
        while let Some(event) = input.poll_key()? {
            if InputRouter::dispatch(pipeline.chain_mut(), &event) {
                continue;
            }
            match DefaultAction::for_key(&event) {
                Some(DefaultAction::Stop) => {
                    info!("Stop key pressed");
                    self.stop.stop();
                }
                Some(DefaultAction::Snapshot) => self.save_snapshot(pipeline),
                None => debug!(?event, "Unhandled key"),
            }
        }
        Ok(())
    }

    fn save_snapshot(&self, pipeline: &Pipeline) {
        let Some(frame) = pipeline.last_output() else {
            warn!("No frame emitted yet, nothing to save");
            return;
        };
        if let Err(e) = snapshot::save_png(frame, &self.snapshot_dir) {
            warn!(error = %e, "Failed to save snapshot");
        }
    }
}
