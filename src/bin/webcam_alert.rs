//! webcam_alert - single-loop detection with spoken safety alerts
//!
//! One thread runs the capture -> detect -> classify loop; a background
//! worker drains the speech queue so the loop never waits on playback.
//! Type `q` + Enter to stop, `r` + Enter to reset alert cooldowns.
//!
//! Frames come from a directory of stills (`--images`) or from a synthetic
//! pattern that keeps the stub backend's motion detector busy.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use sightguard::{
    DetectorBackend, Engine, EngineConfig, EspeakSink, LogSink, SpeechQueue, SpeechSink,
    StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of still images to loop over instead of synthetic frames.
    #[arg(long)]
    images: Option<PathBuf>,
    /// Frames per second for the capture loop.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Stop after this many frames (0 = run until 'q').
    #[arg(long, default_value_t = 0)]
    frames: u64,
    /// Speak alerts with espeak-ng instead of logging them.
    #[arg(long)]
    speak: bool,
    /// Synthetic frame width.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Synthetic frame height.
    #[arg(long, default_value_t = 480)]
    height: u32,
}

enum Key {
    Quit,
    Reset,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let engine = Engine::new(EngineConfig::default());
    let mut backend = StubBackend::new();
    backend.warm_up()?;
    let class_names = backend.class_names().to_vec();

    let sink: Box<dyn SpeechSink> = if args.speak && EspeakSink::available() {
        Box::new(EspeakSink::default())
    } else {
        if args.speak {
            log::warn!("espeak-ng not found, logging alerts instead");
        }
        Box::new(LogSink)
    };
    let speech = SpeechQueue::spawn(sink);
    let keys = spawn_key_reader();

    let frames = match &args.images {
        Some(dir) => load_images(dir)?,
        None => synthetic_frames(args.width, args.height),
    };
    log::info!(
        "loop running over {} frames at {} fps ('q' quits, 'r' resets cooldowns)",
        frames.len(),
        args.fps
    );

    let interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let mut processed = 0u64;
    'outer: loop {
        for (pixels, width, height) in &frames {
            let tick = Instant::now();
            match keys.try_recv() {
                Ok(Key::Quit) => break 'outer,
                Ok(Key::Reset) => {
                    engine.reset_cooldowns();
                    log::info!("cooldowns reset");
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break 'outer,
            }

            let output = match backend.detect(pixels, *width, *height) {
                Ok(output) => output,
                Err(err) => {
                    log::warn!("detection error: {:#}", err);
                    continue;
                }
            };
            let result = engine.process_frame(
                &output.detections,
                &class_names,
                *width,
                *height,
                output.inference_time,
            );
            for alert in &result.alerts {
                speech.say(alert.clone());
            }

            processed += 1;
            if args.frames > 0 && processed >= args.frames {
                break 'outer;
            }
            if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    log::info!("stopping after {} frames", processed);
    speech.stop();
    Ok(())
}

fn spawn_key_reader() -> mpsc::Receiver<Key> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "q" => {
                    let _ = tx.send(Key::Quit);
                    break;
                }
                "r" => {
                    let _ = tx.send(Key::Reset);
                }
                _ => {}
            }
        }
    });
    rx
}

/// A short cycle of differently-filled frames; every transition registers as
/// motion for the stub backend.
fn synthetic_frames(width: u32, height: u32) -> Vec<(Vec<u8>, u32, u32)> {
    (0u8..4)
        .map(|i| {
            (
                vec![i.wrapping_mul(60); (width * height * 3) as usize],
                width,
                height,
            )
        })
        .collect()
}

fn load_images(dir: &Path) -> Result<Vec<(Vec<u8>, u32, u32)>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to read {}: {}", dir.display(), e))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.path());

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry.path();
        match image::open(&path) {
            Ok(img) => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                frames.push((rgb.into_raw(), width, height));
            }
            Err(err) => log::warn!("skipping {}: {}", path.display(), err),
        }
    }
    if frames.is_empty() {
        return Err(anyhow!("no decodable images in {}", dir.display()));
    }
    Ok(frames)
}
