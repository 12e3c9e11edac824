// SPDX-License-Identifier: GPL-3.0-only
//! Capture on a dedicated thread
//!
//! The capture thread owns the real source and publishes each complete frame
//! into a [`FrameSlot`] holding at most one frame. A newer frame replaces an
//! unread one, so the pipeline always renders the most recent capture and
//! never sees a half-written buffer. Buffers are swapped in and out of the
//! slot, never reallocated.

use super::{FrameSource, SourceRead};
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{Frame, FrameShape};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// ```ignore
/// let controller = CaptureLoopController::start_with_init(
///     "capture",
///     || open_camera(),
///     |camera| {
///         publish(camera.read());
///         LoopAction::Continue
///     },
/// );
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Start a loop whose state is created on the loop thread
    ///
    /// `init_fn` runs once on the new thread; if it fails the thread exits
    /// without calling `loop_fn`. The state never crosses threads, so it
    /// does not need to be `Send`.
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> Self
    where
        I: FnOnce() -> PipelineResult<S> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Capture loop thread started, initializing...");

            let mut state = match init_fn() {
                Ok(s) => s,
                Err(e) => {
                    warn!(name = %name_clone, error = %e, "Initialization failed");
                    return;
                }
            };

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                if loop_fn(&mut state) == LoopAction::Stop {
                    debug!(name = %name_clone, "Loop requested stop");
                    break;
                }
            }

            info!(name = %name_clone, "Capture loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread without signalling it
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

struct SlotState {
    frame: Frame,
    fresh: bool,
    failure: Option<PipelineError>,
    replaced: u64,
}

/// Single-writer, single-reader handoff of the latest frame
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new(shape: FrameShape) -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: Frame::new(shape),
                fresh: false,
                failure: None,
                replaced: 0,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand over a complete frame
    ///
    /// `frame` receives the slot's previous buffer in exchange.
    pub fn publish(&self, frame: &mut Frame) {
        let mut state = self.lock();
        mem::swap(&mut state.frame, frame);
        if state.fresh {
            state.replaced += 1;
        }
        state.fresh = true;
        drop(state);
        self.ready.notify_one();
    }

    /// Record that the producer stopped for good
    pub fn fail(&self, err: PipelineError) {
        self.lock().failure = Some(err);
        self.ready.notify_all();
    }

    /// Take the newest frame, waiting up to `wait` for one to arrive
    ///
    /// A pending producer failure is reported once the last published frame
    /// has been taken.
    pub fn take_latest(&self, frame: &mut Frame, wait: Duration) -> PipelineResult<SourceRead> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, wait, |s| !s.fresh && s.failure.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        if state.fresh {
            mem::swap(&mut state.frame, frame);
            state.fresh = false;
            return Ok(SourceRead::Frame);
        }
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(SourceRead::Unavailable),
        }
    }

    /// Frames overwritten before the reader took them
    pub fn replaced(&self) -> u64 {
        self.lock().replaced
    }
}

/// Capture-side state living on the loop thread
struct CaptureWorker {
    source: Box<dyn FrameSource>,
    scratch: Frame,
    slot: Arc<FrameSlot>,
    wait: Duration,
}

impl CaptureWorker {
    fn step(&mut self) -> LoopAction {
        match self.source.read_into(&mut self.scratch, self.wait) {
            Ok(SourceRead::Frame) => {
                self.slot.publish(&mut self.scratch);
                LoopAction::Continue
            }
            Ok(SourceRead::Unavailable) | Err(PipelineError::SourceUnavailable) => {
                LoopAction::Continue
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Capture thread stopping");
                self.slot.fail(e);
                LoopAction::Stop
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.source.close();
    }
}

/// Source that reads on its own thread and serves the latest frame
pub struct ThreadedSource {
    name: String,
    shape: FrameShape,
    slot: Arc<FrameSlot>,
    controller: Option<CaptureLoopController>,
}

impl ThreadedSource {
    /// Open a source on a new capture thread
    ///
    /// `open` runs on the capture thread. This call blocks until it has
    /// finished, so an open failure is reported here rather than on the first
    /// read. The opened source must deliver `shape`.
    pub fn spawn<O>(name: &str, shape: FrameShape, wait: Duration, open: O) -> PipelineResult<Self>
    where
        O: FnOnce() -> PipelineResult<Box<dyn FrameSource>> + Send + 'static,
    {
        let slot = Arc::new(FrameSlot::new(shape));
        let worker_slot = Arc::clone(&slot);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<PipelineResult<()>>(1);

        let init = move || {
            let opened = open().and_then(|source| {
                super::ensure_shape(source.name(), shape, source.shape()).map(|()| source)
            });
            match opened {
                Ok(source) => {
                    // The receiver only disappears if spawn already gave up
                    let _ = ready_tx.send(Ok(()));
                    Ok(CaptureWorker {
                        source,
                        scratch: Frame::new(shape),
                        slot: worker_slot,
                        wait,
                    })
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.clone()));
                    Err(e)
                }
            }
        };

        let mut controller =
            CaptureLoopController::start_with_init(name, init, CaptureWorker::step);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                name: format!("{} (threaded)", name),
                shape,
                slot,
                controller: Some(controller),
            }),
            Ok(Err(e)) => {
                controller.join();
                Err(e)
            }
            Err(_) => {
                controller.join();
                Err(PipelineError::DeviceOpen {
                    device: name.to_string(),
                    reason: "capture thread exited during open".into(),
                })
            }
        }
    }

    /// Frames the capture thread produced faster than they were consumed
    pub fn dropped_frames(&self) -> u64 {
        self.slot.replaced()
    }
}

impl FrameSource for ThreadedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn read_into(&mut self, frame: &mut Frame, wait: Duration) -> PipelineResult<SourceRead> {
        if self.controller.is_none() {
            return Err(PipelineError::Closed);
        }
        self.slot.take_latest(frame, wait)
    }

    fn close(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!(
                source = %self.name,
                dropped = self.slot.replaced(),
                "Threaded capture stopped"
            );
        }
    }
}

impl Drop for ThreadedSource {
    fn drop(&mut self) {
        self.close();
    }
}
