// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the pipeline, scheduler and input routing

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use webcam_toy::backends::{FrameSink, FrameSource, SourceRead};
use webcam_toy::effects::BufferSlot;
use webcam_toy::input::{NoInput, QueuedInput};
use webcam_toy::{
    ChannelMap, ChannelRowOffset, DeviceSpec, Effect, EffectChain, Frame, FrameShape,
    InputRouter, KeyEvent, Pipeline, PipelineConfig, PipelineError, Pixelize, Scheduler,
    TickOutcome,
};

const SHAPE: FrameShape = FrameShape::new(2, 4);

#[derive(Debug, Default)]
struct DeviceLog {
    source_closed: bool,
    sink_closed: bool,
    emitted: Vec<Frame>,
}

type SharedLog = Rc<RefCell<DeviceLog>>;

/// Replays a script of reads; `None` means no frame this tick
struct ScriptedSource {
    shape: FrameShape,
    script: VecDeque<Option<Frame>>,
    log: SharedLog,
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn read_into(&mut self, frame: &mut Frame, _wait: Duration) -> Result<SourceRead, PipelineError> {
        match self.script.pop_front() {
            Some(Some(next)) => {
                frame.copy_from_bytes(next.as_bytes())?;
                Ok(SourceRead::Frame)
            }
            Some(None) => Ok(SourceRead::Unavailable),
            // Script exhausted: keep producing the same frame forever
            None => {
                frame.copy_from_bytes(&vec![7; self.shape.byte_len()])?;
                Ok(SourceRead::Frame)
            }
        }
    }

    fn close(&mut self) {
        self.log.borrow_mut().source_closed = true;
    }
}

struct MemorySink {
    shape: FrameShape,
    fail_after: Option<usize>,
    log: SharedLog,
}

impl FrameSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn shape(&self) -> FrameShape {
        self.shape
    }

    fn emit(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let mut log = self.log.borrow_mut();
        if self.fail_after.is_some_and(|n| log.emitted.len() >= n) {
            return Err(PipelineError::SinkRejected("device unplugged".into()));
        }
        log.emitted.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.log.borrow_mut().sink_closed = true;
    }
}

fn test_config(max_misses: u32) -> PipelineConfig {
    PipelineConfig {
        source: DeviceSpec::TestPattern,
        sink: DeviceSpec::Null,
        width: SHAPE.width as u32,
        height: SHAPE.height as u32,
        fps: 1000,
        max_consecutive_misses: max_misses,
        effects: Vec::new(),
        ..Default::default()
    }
}

fn row_frame(seed: u8) -> Frame {
    Frame::from_fn(SHAPE, |row, col, ch| seed + (row * 10 + col * 3 + ch) as u8)
}

fn build(
    script: Vec<Option<Frame>>,
    chain: EffectChain,
    config: &PipelineConfig,
    fail_after: Option<usize>,
) -> (Result<Pipeline, PipelineError>, SharedLog) {
    build_shaped(script, chain, config, SHAPE, SHAPE, fail_after)
}

fn build_shaped(
    script: Vec<Option<Frame>>,
    chain: EffectChain,
    config: &PipelineConfig,
    source_shape: FrameShape,
    sink_shape: FrameShape,
    fail_after: Option<usize>,
) -> (Result<Pipeline, PipelineError>, SharedLog) {
    let log = SharedLog::default();
    let source = ScriptedSource {
        shape: source_shape,
        script: script.into(),
        log: Rc::clone(&log),
    };
    let sink = MemorySink {
        shape: sink_shape,
        fail_after,
        log: Rc::clone(&log),
    };
    let pipeline = Pipeline::new(Box::new(source), Box::new(sink), chain, config);
    (pipeline, log)
}

#[test]
fn test_tick_emits_transformed_frame() {
    let mut chain = EffectChain::new();
    chain.push(ChannelRowOffset::new(1, 0, 0));
    let config = test_config(3);
    let (pipeline, log) = build(vec![Some(row_frame(0))], chain, &config, None);
    let mut pipeline = pipeline.unwrap();

    assert_eq!(
        pipeline.tick().unwrap(),
        TickOutcome::Emitted(BufferSlot::Scratch)
    );

    let log = log.borrow();
    assert_eq!(log.emitted.len(), 1);
    let input = row_frame(0);
    assert_eq!(log.emitted[0].get(0, 0, 0), input.get(1, 0, 0));
    assert_eq!(log.emitted[0].get(0, 0, 1), input.get(0, 0, 1));
    assert_eq!(pipeline.last_output(), Some(&log.emitted[0]));
}

#[test]
fn test_empty_chain_emits_source_buffer() {
    let config = test_config(3);
    let (pipeline, log) = build(vec![Some(row_frame(5))], EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    assert_eq!(
        pipeline.tick().unwrap(),
        TickOutcome::Emitted(BufferSlot::Source)
    );
    assert_eq!(log.borrow().emitted, vec![row_frame(5)]);
}

#[test]
fn test_sink_channel_map_applied_before_emit() {
    let config = PipelineConfig {
        sink_channel_map: ChannelMap::Reversed,
        ..test_config(3)
    };
    let (pipeline, log) = build(vec![Some(row_frame(0))], EffectChain::new(), &config, None);
    pipeline.unwrap().tick().unwrap();

    let mut expected = row_frame(0);
    expected.apply_channel_map(ChannelMap::Reversed);
    assert_eq!(log.borrow().emitted, vec![expected]);
}

#[test]
fn test_misses_below_threshold_skip_without_emitting() {
    let config = test_config(3);
    let script = vec![None, None, Some(row_frame(1)), None, None];
    let (pipeline, log) = build(script, EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    assert_eq!(
        pipeline.tick().unwrap(),
        TickOutcome::Skipped {
            consecutive_misses: 1
        }
    );
    assert_eq!(
        pipeline.tick().unwrap(),
        TickOutcome::Skipped {
            consecutive_misses: 2
        }
    );
    assert!(log.borrow().emitted.is_empty());

    // A frame resets the run of misses
    assert!(matches!(pipeline.tick().unwrap(), TickOutcome::Emitted(_)));
    assert_eq!(pipeline.consecutive_misses(), 0);
    pipeline.tick().unwrap();
    pipeline.tick().unwrap();

    let stats = pipeline.stats();
    assert_eq!((stats.ticks, stats.emitted, stats.skipped), (5, 1, 4));
    assert_eq!(log.borrow().emitted.len(), 1);
    assert!(!log.borrow().source_closed);
}

#[test]
fn test_rate_window_counts_skipped_ticks() {
    let config = PipelineConfig {
        report_interval: 3,
        ..test_config(10)
    };
    let script = vec![None, Some(row_frame(1)), None];
    let (pipeline, _log) = build(script, EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    pipeline.tick().unwrap();
    pipeline.tick().unwrap();
    assert_eq!(pipeline.fps(), None);

    // Third tick is skipped but still completes the window
    pipeline.tick().unwrap();
    assert!(pipeline.fps().is_some());
}

#[test]
fn test_misses_at_threshold_are_fatal_and_release_devices() {
    let config = test_config(3);
    let (pipeline, log) = build(vec![None, None, None], EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    pipeline.tick().unwrap();
    pipeline.tick().unwrap();
    assert_eq!(
        pipeline.tick(),
        Err(PipelineError::SourceFatal {
            consecutive_misses: 3
        })
    );

    let log = log.borrow();
    assert!(log.source_closed);
    assert!(log.sink_closed);
    assert!(log.emitted.is_empty());
    assert!(pipeline.is_closed());
    assert_eq!(pipeline.tick(), Err(PipelineError::Closed));
}

#[test]
fn test_sink_failure_is_fatal_and_releases_devices() {
    let config = test_config(3);
    let (pipeline, log) = build(Vec::new(), EffectChain::new(), &config, Some(2));
    let mut pipeline = pipeline.unwrap();

    pipeline.tick().unwrap();
    pipeline.tick().unwrap();
    assert!(matches!(
        pipeline.tick(),
        Err(PipelineError::SinkRejected(_))
    ));
    assert!(log.borrow().source_closed);
    assert!(log.borrow().sink_closed);
}

#[test]
fn test_shape_mismatch_at_open_releases_devices() {
    let config = test_config(3);
    let (pipeline, log) = build_shaped(
        Vec::new(),
        EffectChain::new(),
        &config,
        FrameShape::new(4, 4),
        SHAPE,
        None,
    );

    match pipeline {
        Err(PipelineError::ShapeMismatch {
            device,
            expected,
            actual,
        }) => {
            assert_eq!(device, "scripted");
            assert_eq!(expected, SHAPE);
            assert_eq!(actual, FrameShape::new(4, 4));
        }
        other => panic!("expected shape mismatch, got {:?}", other.map(|_| ())),
    }
    assert!(log.borrow().source_closed);
    assert!(log.borrow().sink_closed);
}

#[test]
fn test_sink_shape_mismatch_at_open() {
    let config = test_config(3);
    let (pipeline, log) = build_shaped(
        Vec::new(),
        EffectChain::new(),
        &config,
        SHAPE,
        FrameShape::new(2, 2),
        None,
    );
    assert!(matches!(
        pipeline,
        Err(PipelineError::ShapeMismatch { ref device, .. }) if device == "memory"
    ));
    assert!(log.borrow().source_closed);
}

#[test]
fn test_scheduler_stops_after_max_ticks_and_closes() {
    let config = test_config(3);
    let (pipeline, log) = build(Vec::new(), EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    let mut scheduler = Scheduler::new(Duration::from_millis(1)).with_max_ticks(Some(4));
    let stats = scheduler.run(&mut pipeline, &mut NoInput).unwrap();

    assert_eq!(stats.ticks, 4);
    assert_eq!(stats.emitted, 4);
    assert_eq!(log.borrow().emitted.len(), 4);
    assert!(log.borrow().source_closed);
    assert!(log.borrow().sink_closed);
}

#[test]
fn test_scheduler_propagates_fatal_error() {
    let config = test_config(2);
    let (pipeline, log) = build(vec![None, None], EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    let mut scheduler = Scheduler::new(Duration::from_millis(1)).with_max_ticks(Some(10));
    let result = scheduler.run(&mut pipeline, &mut NoInput);
    assert_eq!(
        result,
        Err(PipelineError::SourceFatal {
            consecutive_misses: 2
        })
    );
    assert!(log.borrow().source_closed);
}

#[test]
fn test_quit_key_stops_before_next_tick() {
    let config = test_config(3);
    let (pipeline, log) = build(Vec::new(), EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    let mut input = QueuedInput::new([KeyEvent::char('q')]);
    let mut scheduler = Scheduler::new(Duration::from_millis(1)).with_max_ticks(Some(10));
    let stats = scheduler.run(&mut pipeline, &mut input).unwrap();

    assert_eq!(stats.ticks, 0);
    assert!(log.borrow().emitted.is_empty());
    assert!(log.borrow().sink_closed);
}

#[test]
fn test_stop_handle_stops_scheduler() {
    let config = test_config(3);
    let (pipeline, _log) = build(Vec::new(), EffectChain::new(), &config, None);
    let mut pipeline = pipeline.unwrap();

    let mut scheduler = Scheduler::new(Duration::from_millis(1));
    scheduler.stop_handle().stop();
    let stats = scheduler.run(&mut pipeline, &mut NoInput).unwrap();
    assert_eq!(stats.ticks, 0);
    assert!(pipeline.is_closed());
}

#[test]
fn test_key_applies_from_next_tick() {
    let mut chain = EffectChain::new();
    chain.push(Pixelize::new(1));
    let config = test_config(3);
    let script = vec![Some(row_frame(0)), Some(row_frame(0))];
    let (pipeline, log) = build(script, chain, &config, None);
    let mut pipeline = pipeline.unwrap();

    pipeline.tick().unwrap();
    assert!(InputRouter::dispatch(
        pipeline.chain_mut(),
        &KeyEvent::char('+')
    ));
    pipeline.tick().unwrap();

    let log = log.borrow();
    assert_eq!(log.emitted[0], row_frame(0));
    let input = row_frame(0);
    assert_eq!(log.emitted[1].get(1, 1, 0), input.get(0, 0, 0));
    assert_eq!(pipeline.stats().parameter_commits, 1);
}

#[test]
fn test_router_stops_at_first_handler() {
    let mut chain = EffectChain::new();
    chain.push(ChannelRowOffset::default());
    chain.push(ChannelRowOffset::default());
    chain.push(Pixelize::new(2));

    assert!(InputRouter::dispatch(&mut chain, &KeyEvent::char('r')));
    assert!(InputRouter::dispatch(&mut chain, &KeyEvent::char('+')));
    assert!(!InputRouter::dispatch(&mut chain, &KeyEvent::char('z')));
    chain.commit_pending();

    let offsets: Vec<_> = chain
        .iter()
        .filter_map(|effect| match effect {
            Effect::ChannelRowOffset(e) => Some(e.offsets()),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![[1, 0, 0], [0, 0, 0]]);
    match chain.get(2) {
        Some(Effect::Pixelize(p)) => assert_eq!(p.block_size(), 3),
        other => panic!("unexpected effect {:?}", other),
    }
}

#[test]
fn test_open_test_pattern_to_null() {
    let config = PipelineConfig {
        width: 16,
        height: 8,
        ..test_config(3)
    };
    let mut pipeline = Pipeline::open(&config, config.build_chain()).unwrap();
    let stats = Scheduler::new(Duration::from_millis(1))
        .with_max_ticks(Some(3))
        .run(&mut pipeline, &mut NoInput)
        .unwrap();
    assert_eq!(stats.emitted, 3);
}

#[test]
fn test_open_threaded_test_pattern() {
    let config = PipelineConfig {
        threaded_capture: true,
        wait_policy_ms: Some(500),
        ..test_config(3)
    };
    let mut pipeline = Pipeline::open(&config, config.build_chain()).unwrap();
    assert!(matches!(pipeline.tick().unwrap(), TickOutcome::Emitted(_)));
    pipeline.close();
}

#[test]
fn test_open_rejects_pattern_as_sink() {
    let config = PipelineConfig {
        sink: DeviceSpec::TestPattern,
        ..test_config(3)
    };
    assert!(matches!(
        Pipeline::open(&config, EffectChain::new()),
        Err(PipelineError::Config(_))
    ));
}
