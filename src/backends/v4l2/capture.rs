// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera capture

use super::{PixelOrder, device_error, inspect_format, open_device, rgb24_format};
use crate::backends::{FrameSource, SourceRead};
use crate::constants::V4L2_BUFFER_COUNT;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame::{ChannelMap, Frame, FrameShape};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::video::capture::Parameters;

/// Driver side of a capture stream
///
/// `next_filled` hands the previously returned buffer back to the driver
/// before dequeuing, the way `v4l`'s `CaptureStream::next` does.
/// `reclaim` dequeues without queueing anything.
trait CaptureQueue {
    fn next_filled(&mut self) -> io::Result<(&[u8], usize)>;
    fn reclaim(&mut self) -> io::Result<()>;
}

impl CaptureQueue for MmapStream<'static> {
    fn next_filled(&mut self) -> io::Result<(&[u8], usize)> {
        let (buf, meta) = CaptureStream::next(self)?;
        Ok((buf, meta.bytesused as usize))
    }

    fn reclaim(&mut self) -> io::Result<()> {
        CaptureStream::dequeue(self).map(|_| ())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

/// Dequeue the next filled buffer, `None` if nothing arrived in time
///
/// A timed-out dequeue leaves every buffer queued, including the one `next`
/// would hand back again. `stalled` records that, and the following read
/// reclaims a buffer first so nothing is queued twice. The frame in the
/// reclaimed buffer is dropped.
fn dequeue_filled<'q, Q: CaptureQueue>(
    queue: &'q mut Q,
    stalled: &mut bool,
) -> io::Result<Option<(&'q [u8], usize)>> {
    if *stalled {
        match queue.reclaim() {
            Ok(()) => *stalled = false,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    match queue.next_filled() {
        Ok(filled) => Ok(Some(filled)),
        Err(e) if is_timeout(&e) => {
            *stalled = true;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Copy one captured buffer into `frame` as RGB
///
/// Buffers too short for the negotiated format count as a missed frame and
/// leave `frame` untouched.
fn fill_frame(
    frame: &mut Frame,
    buf: &[u8],
    bytesused: usize,
    stride: usize,
    order: PixelOrder,
) -> SourceRead {
    let used = match bytesused {
        0 => buf.len(),
        n => n.min(buf.len()),
    };
    let shape = frame.shape();
    let needed = stride * shape.height.saturating_sub(1) + shape.row_len();
    if used < needed {
        debug!(used, needed, "Short capture buffer, skipping frame");
        return SourceRead::Unavailable;
    }
    if let Err(e) = frame.copy_from_strided(&buf[..used], stride) {
        debug!(error = %e, "Capture buffer does not fit frame, skipping");
        return SourceRead::Unavailable;
    }
    if order == PixelOrder::Bgr {
        frame.apply_channel_map(ChannelMap::Reversed);
    }
    SourceRead::Frame
}

/// Camera opened for packed 24-bit capture
///
/// Frames always leave this source in RGB order, whichever of RGB3 or BGR3
/// the driver settled on.
pub struct V4l2Source {
    name: String,
    shape: FrameShape,
    stride: usize,
    order: PixelOrder,
    stream: Option<MmapStream<'static>>,
    timeout: Option<Duration>,
    stalled: bool,
}

impl V4l2Source {
    /// Open `path` and negotiate RGB3 at `shape` and `fps`
    ///
    /// The returned source reports the shape the driver accepted, which may
    /// differ from the request.
    pub fn open(path: &Path, shape: FrameShape, fps: u32) -> PipelineResult<Self> {
        let name = path.display().to_string();
        let dev = open_device(path)?;

        let current = Capture::format(&dev).map_err(|e| device_error(&name, "query format", e))?;
        debug!(
            device = %name,
            width = current.width,
            height = current.height,
            fourcc = %current.fourcc,
            "Current capture format"
        );

        let format = match Capture::set_format(&dev, &rgb24_format(shape)) {
            Ok(format) => format,
            Err(e) => {
                warn!(device = %name, error = %e, "Could not set RGB3, keeping device format");
                current
            }
        };
        let (actual, order, stride) = inspect_format(&name, &format)?;
        if order == PixelOrder::Bgr {
            info!(device = %name, "Camera delivers BGR, reordering to RGB on capture");
        }

        match Capture::set_params(&dev, &Parameters::with_fps(fps)) {
            Ok(params) => debug!(device = %name, interval = %params.interval, "Frame interval set"),
            Err(e) => warn!(device = %name, error = %e, "Could not set frame rate"),
        }

        let stream = MmapStream::with_buffers(&dev, Type::VideoCapture, V4L2_BUFFER_COUNT)
            .map_err(|e| device_error(&name, "create capture stream", e))?;

        info!(device = %name, shape = %actual, stride, "V4L2 capture stream started");

        Ok(Self {
            name,
            shape: actual,
            stride,
            order,
            stream: Some(stream),
            timeout: None,
            stalled: false,
        })
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn read_into(&mut self, frame: &mut Frame, wait: Duration) -> PipelineResult<SourceRead> {
        let stream = self.stream.as_mut().ok_or(PipelineError::Closed)?;
        if self.timeout != Some(wait) {
            stream.set_timeout(wait);
            self.timeout = Some(wait);
        }

        match dequeue_filled(stream, &mut self.stalled) {
            Ok(Some((buf, bytesused))) => Ok(fill_frame(
                frame,
                buf,
                bytesused,
                self.stride,
                self.order,
            )),
            Ok(None) => Ok(SourceRead::Unavailable),
            Err(e) => {
                warn!(device = %self.name, error = %e, "Capture failed");
                Err(PipelineError::DeviceOpen {
                    device: self.name.clone(),
                    reason: format!("capture: {}", e),
                })
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!(device = %self.name, "V4L2 capture stream stopped");
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Buffer queue that rejects double queueing like the kernel does
    struct FakeDriver {
        buffers: Vec<Vec<u8>>,
        queued: Vec<bool>,
        filled: VecDeque<usize>,
        held: Option<usize>,
        started: bool,
    }

    impl FakeDriver {
        fn new(count: usize, len: usize) -> Self {
            Self {
                buffers: vec![vec![0; len]; count],
                queued: vec![false; count],
                filled: VecDeque::new(),
                held: None,
                started: false,
            }
        }

        /// Camera fills the oldest queued buffer that is still empty
        fn deliver(&mut self, value: u8) {
            let index = (0..self.buffers.len())
                .find(|i| self.queued[*i] && !self.filled.contains(i))
                .unwrap();
            self.buffers[index].fill(value);
            self.filled.push_back(index);
        }

        fn queue(&mut self, index: usize) -> io::Result<()> {
            if self.queued[index] {
                return Err(io::Error::from_raw_os_error(22));
            }
            self.queued[index] = true;
            Ok(())
        }

        fn dequeue(&mut self) -> io::Result<usize> {
            let index = self
                .filled
                .pop_front()
                .ok_or_else(|| io::Error::new(ErrorKind::TimedOut, "VIDIOC_DQBUF"))?;
            self.queued[index] = false;
            self.held = Some(index);
            Ok(index)
        }
    }

    impl CaptureQueue for FakeDriver {
        fn next_filled(&mut self) -> io::Result<(&[u8], usize)> {
            if !self.started {
                for index in 0..self.buffers.len() {
                    self.queue(index)?;
                }
                self.started = true;
            } else {
                self.queue(self.held.unwrap_or(0))?;
            }
            let index = self.dequeue()?;
            Ok((&self.buffers[index], self.buffers[index].len()))
        }

        fn reclaim(&mut self) -> io::Result<()> {
            self.dequeue().map(|_| ())
        }
    }

    fn read(driver: &mut FakeDriver, stalled: &mut bool) -> io::Result<Option<u8>> {
        dequeue_filled(driver, stalled).map(|filled| filled.map(|(buf, _)| buf[0]))
    }

    #[test]
    fn test_plain_requeue_after_timeout_is_rejected() {
        let mut driver = FakeDriver::new(2, 4);
        assert!(driver.next_filled().is_err_and(|e| is_timeout(&e)));
        driver.deliver(1);
        assert!(driver.next_filled().is_err_and(|e| !is_timeout(&e)));
    }

    #[test]
    fn test_timeout_then_frame_is_not_fatal() {
        let mut driver = FakeDriver::new(3, 4);
        let mut stalled = false;

        // Stream starts before the camera has produced anything
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), None);
        assert!(stalled);

        // The first buffer back is reclaimed and dropped
        driver.deliver(1);
        driver.deliver(2);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), Some(2));
        assert!(!stalled);

        driver.deliver(3);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), Some(3));

        assert_eq!(read(&mut driver, &mut stalled).unwrap(), None);
        driver.deliver(4);
        driver.deliver(5);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), Some(5));

        driver.deliver(6);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), Some(6));
    }

    #[test]
    fn test_repeated_timeouts_stay_recoverable() {
        let mut driver = FakeDriver::new(2, 4);
        let mut stalled = false;

        assert_eq!(read(&mut driver, &mut stalled).unwrap(), None);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), None);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), None);

        driver.deliver(5);
        driver.deliver(6);
        assert_eq!(read(&mut driver, &mut stalled).unwrap(), Some(6));
    }

    #[test]
    fn test_bgr_capture_is_reordered_to_rgb() {
        let shape = FrameShape::new(2, 1);
        let mut frame = Frame::new(shape);
        let bgr = [30, 20, 10, 60, 50, 40];

        let read = fill_frame(&mut frame, &bgr, bgr.len(), shape.row_len(), PixelOrder::Bgr);
        assert_eq!(read, SourceRead::Frame);
        assert_eq!(frame.as_bytes(), &[10, 20, 30, 40, 50, 60]);

        fill_frame(&mut frame, &bgr, 0, shape.row_len(), PixelOrder::Rgb);
        assert_eq!(frame.as_bytes(), &bgr);
    }

    #[test]
    fn test_short_buffer_is_a_missed_frame() {
        let shape = FrameShape::new(4, 2);
        let mut frame = Frame::from_fn(shape, |_, _, _| 9);
        let buf = [0u8; 20];

        let read = fill_frame(&mut frame, &buf, buf.len(), shape.row_len(), PixelOrder::Rgb);
        assert_eq!(read, SourceRead::Unavailable);
        assert!(frame.as_bytes().iter().all(|&b| b == 9));
    }

    #[test]
    fn test_padded_rows_are_copied_without_padding() {
        let shape = FrameShape::new(1, 2);
        let mut frame = Frame::new(shape);
        let buf = [1, 2, 3, 0, 4, 5, 6, 0];

        let read = fill_frame(&mut frame, &buf, buf.len(), 4, PixelOrder::Rgb);
        assert_eq!(read, SourceRead::Frame);
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }
}
