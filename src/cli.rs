// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - `run`: open the devices and drive the pipeline until stopped
//! - `effects`: print the available effects and their keys

use crate::RunArgs;
use std::io::IsTerminal;
use tracing::{info, warn};
use webcam_toy::config::EffectConfig;
use webcam_toy::constants::DEFAULT_BLOCK_SIZE;
use webcam_toy::input::{InputSource, NoInput};
use webcam_toy::terminal::TerminalInput;
use webcam_toy::{ChannelMap, EffectKind, Pipeline, PipelineConfig, Scheduler};

/// Print every effect with its key bindings
pub fn list_effects() {
    println!("Effects:");
    println!();
    for kind in EffectKind::ALL {
        println!("  {}", kind.display_name());
        for (keys, action) in kind.key_help() {
            println!("      {:<12} {}", keys, action);
        }
        println!();
    }
    println!("Other keys:");
    println!("      {:<12} {}", "p", "save a PNG snapshot of the last frame");
    println!("      {:<12} {}", "q / Esc", "quit");
}

/// Build the configuration from an optional file plus command-line overrides
fn build_config(args: &RunArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(source) = &args.source {
        config.source = source.clone();
    }
    if let Some(sink) = &args.sink {
        config.sink = sink.clone();
    }
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if args.reverse_channels {
        config.sink_channel_map = ChannelMap::Reversed;
    }
    if args.threaded {
        config.threaded_capture = true;
    }

    if !args.effects.is_empty() {
        config.effects = args
            .effects
            .iter()
            .map(|&kind| {
                let step = match kind {
                    EffectKind::Pixelize => args.block_size,
                    EffectKind::RowOffset => args.offset_step,
                };
                EffectConfig::from_kind(kind, step.unwrap_or(DEFAULT_BLOCK_SIZE))
            })
            .collect();
    } else {
        for effect in &mut config.effects {
            match effect {
                EffectConfig::Pixelize { block_size, .. } => {
                    if let Some(size) = args.block_size {
                        *block_size = size;
                    }
                }
                EffectConfig::RowOffset { red, green, blue } => {
                    if let Some(step) = args.offset_step {
                        (*red, *green, *blue) = (0, step, step.saturating_mul(2));
                    }
                }
            }
        }
    }

    config.validate()?;
    Ok(config)
}

/// Open the configured devices and run until stopped
pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    info!(
        source = %config.source,
        sink = %config.sink,
        width = config.width,
        height = config.height,
        fps = config.fps,
        "Starting webcam toy"
    );

    let mut pipeline = Pipeline::open(&config, config.build_chain())?;

    let mut scheduler = Scheduler::new(config.period()).with_max_ticks(args.frames);
    if let Some(dir) = &config.snapshot_dir {
        scheduler = scheduler.with_snapshot_dir(dir.clone());
    }

    let stop = scheduler.stop_handle();
    ctrlc::set_handler(move || stop.stop())?;

    let mut input: Box<dyn InputSource> = if !args.no_keys && std::io::stdin().is_terminal() {
        match TerminalInput::new() {
            Ok(terminal) => Box::new(terminal),
            Err(e) => {
                warn!(error = %e, "Keyboard input unavailable");
                Box::new(NoInput)
            }
        }
    } else {
        Box::new(NoInput)
    };

    let result = scheduler.run(&mut pipeline, input.as_mut());
    // Restore the terminal before anything is printed
    drop(input);

    let stats = result?;
    info!(
        ticks = stats.ticks,
        emitted = stats.emitted,
        skipped = stats.skipped,
        "Finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use webcam_toy::DeviceSpec;

    #[test]
    fn test_effect_flags_build_chain_in_order() {
        let args = RunArgs {
            source: Some(DeviceSpec::TestPattern),
            sink: Some(DeviceSpec::Null),
            effects: vec![EffectKind::Pixelize, EffectKind::RowOffset],
            block_size: Some(4),
            offset_step: Some(3),
            ..Default::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(
            config.effects,
            vec![
                EffectConfig::Pixelize {
                    block_size: 4,
                    channel_map: ChannelMap::Identity
                },
                EffectConfig::RowOffset {
                    red: 0,
                    green: 3,
                    blue: 6
                },
            ]
        );
    }

    #[test]
    fn test_offset_step_adjusts_default_chain() {
        let args = RunArgs {
            source: Some(DeviceSpec::TestPattern),
            sink: Some(DeviceSpec::Null),
            offset_step: Some(2),
            reverse_channels: true,
            ..Default::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(
            config.effects,
            vec![EffectConfig::RowOffset {
                red: 0,
                green: 2,
                blue: 4
            }]
        );
        assert_eq!(config.sink_channel_map, ChannelMap::Reversed);
    }

    #[test]
    fn test_huge_offset_step_does_not_overflow() {
        let args = RunArgs {
            source: Some(DeviceSpec::TestPattern),
            sink: Some(DeviceSpec::Null),
            offset_step: Some(usize::MAX),
            ..Default::default()
        };
        let config = build_config(&args).unwrap();
        assert_eq!(
            config.effects,
            vec![EffectConfig::RowOffset {
                red: 0,
                green: usize::MAX,
                blue: usize::MAX
            }]
        );
    }
}
