//! Apollon Player - loop playback with real-time pitch shifting
//!
//! Headless front end for apollon-core. It:
//! 1. Starts the engine context on the configured output device
//! 2. Reads commands from stdin on a background thread
//! 3. Polls the controller and prints load progress and transport status
//!
//! Usage: `apollon-player [file]`

mod commands;
mod config;

use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use apollon_core::audio::get_available_output_devices;
use apollon_core::context::EngineContext;
use apollon_core::control::{ControlEvent, TransportStatus};
use crossbeam::channel::{self, RecvTimeoutError};

use commands::{Command, SeekTarget};
use config::PlayerConfig;

/// How often the controller is polled while waiting for input
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("apollon-player starting up");

    // Waveform peaks run on rayon; build the pool before audio starts
    rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .thread_name(|i| format!("rayon-peaks-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let config_path = PlayerConfig::default_path();
    let mut config = PlayerConfig::load(&config_path);

    let mut context = EngineContext::start(
        &config.audio,
        &config.waveform.window_sizes,
        config.playback,
    )
    .context("Could not start audio output")?;

    println!("Apollon Player");
    if let Some(stream) = context.stream() {
        println!(
            "Output: {} @ {} Hz, {} frames ({:.1} ms)",
            stream.device_name(),
            stream.sample_rate(),
            stream.buffer_size(),
            stream.latency_ms()
        );
    }
    println!("Type 'help' for commands.");

    let (line_tx, line_rx) = channel::unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    if let Some(arg) = std::env::args().nth(1) {
        let path = config.resolve_path(&arg);
        context.controller_mut().load(Some(path));
    }

    loop {
        match line_rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match commands::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    if let Err(e) = execute(&mut context, &config, command) {
                        eprintln!("Error: {:#}", e);
                    }
                }
                Err(commands::ParseError::Empty) => {}
                Err(e) => eprintln!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for event in context.controller_mut().poll() {
            report(event, &mut config, &config_path);
        }
    }

    if let Err(e) = config.save(&config_path) {
        log::warn!("Failed to save config: {:#}", e);
    }

    drop(context);
    println!("Apollon Player stopped.");
    Ok(())
}

fn execute(context: &mut EngineContext, config: &PlayerConfig, command: Command) -> Result<()> {
    let controller = context.controller_mut();
    match command {
        Command::Play => controller.play()?,
        Command::Pause => controller.stop()?,
        Command::Toggle => controller.toggle_play()?,
        Command::Seek(SeekTarget::Seconds(seconds)) => controller.seek_seconds(seconds)?,
        Command::Seek(SeekTarget::Fraction(fraction)) => controller.seek_fraction(fraction)?,
        Command::Pitch(semitones) => {
            let effective = controller.set_pitch(semitones);
            println!("Pitch: {:+.2} st", effective);
        }
        Command::PitchReset => {
            controller.reset_pitch();
            println!("Pitch: +0.00 st");
        }
        Command::LoopEnabled(enabled) => controller.set_loop_enabled(enabled)?,
        Command::LoopRange { start, end } => {
            let rate = controller.status().sample_rate as f64;
            let to_frames = |seconds: f64| (seconds.max(0.0) * rate) as usize;
            controller.set_loop_range(to_frames(start), to_frames(end))?;
        }
        Command::Load(path) => {
            controller.load(path.map(|p| config.resolve_path(&p)));
        }
        Command::Unload => controller.unload()?,
        Command::Status => print_status(&controller.status()),
        Command::Devices => {
            let devices = get_available_output_devices();
            if devices.is_empty() {
                println!("No output devices found");
            }
            for device in devices {
                println!("  {}", device);
            }
        }
        Command::Bounce => {
            let proxy = context.render_proxy()?;
            println!(
                "Rendered {} frames at {:+.2} st to {}",
                proxy.frames,
                proxy.semitones,
                proxy.path.display()
            );
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn report(event: ControlEvent, config: &mut PlayerConfig, config_path: &Path) {
    match event {
        ControlEvent::LoadProgress(fraction) => {
            print!("\rLoading File: {:>3}%", (fraction * 100.0).round() as u32);
            let _ = std::io::stdout().flush();
        }
        ControlEvent::FileLoaded {
            path,
            frames,
            sample_rate,
        } => {
            println!();
            println!(
                "Loaded {} ({:.2} s)",
                path.display(),
                frames as f64 / sample_rate.max(1) as f64
            );
            if config.remember_directory(&path) {
                if let Err(e) = config.save(config_path) {
                    log::warn!("Failed to save config: {:#}", e);
                }
            }
        }
        ControlEvent::LoadFailed { path, error } => {
            println!();
            eprintln!("Could not load {}: {}", path.display(), error);
        }
        ControlEvent::EngineBusy { path } => {
            println!();
            eprintln!("Engine busy, {} was not loaded; try again", path.display());
        }
        ControlEvent::WaveformReady => log::debug!("Waveform summary ready"),
        ControlEvent::DeviceLost => eprintln!("Audio device lost; playback stopped"),
    }
}

fn print_status(status: &TransportStatus) {
    let Some(name) = &status.file_name else {
        println!("No file loaded");
        return;
    };
    let rate = status.sample_rate.max(1) as f64;
    println!(
        "{} | {:?} | {:.2}/{:.2} s | loop {} {:.2}-{:.2} s ({:.0}%) | pitch {:+.2} st | wraps {} | resets {}",
        name,
        status.state,
        status.position_seconds(),
        status.duration_seconds(),
        if status.loop_enabled { "on" } else { "off" },
        status.loop_range.start() as f64 / rate,
        status.loop_range.end() as f64 / rate,
        status.cursor_fraction * 100.0,
        status.semitones,
        status.wrap_count,
        status.reset_count
    );
    if status.device_errors > 0 {
        println!("Device errors: {}", status.device_errors);
    }
}
