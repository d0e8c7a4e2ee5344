//! ksync - tap-to-sync karaoke subtitle builder
//!
//! Loads a lyric file, runs a wall-clock simulation of the backing track
//! (play the actual audio in your player of choice and hit Enter here in
//! time with it), and records one timeline entry per tap until the lyrics
//! or the track run out. The result is written as an SRT subtitle file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ksync_common::config::resolve_output_folder;
use ksync_common::events::SyncEvent;
use ksync_engine::clock::WallClock;
use ksync_engine::config::Config;
use ksync_engine::input::{Key, KeyMultiplexer, KeyStateSource, QueuedKeySource};
use ksync_engine::lyrics::LyricSheet;
use ksync_engine::session::SyncPhase;
use ksync_engine::SyncEngine;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the key multiplexer is ticked.
const INPUT_TICK_INTERVAL: Duration = Duration::from_millis(33);

/// Command-line arguments for ksync
#[derive(Parser, Debug)]
#[command(name = "ksync")]
#[command(about = "Tap-to-sync karaoke subtitle builder")]
#[command(version)]
struct Args {
    /// Lyric text file to synchronize
    #[arg(short, long, env = "KSYNC_LYRICS")]
    lyrics: PathBuf,

    /// Length of the backing track in seconds
    #[arg(short, long, env = "KSYNC_DURATION")]
    duration: f64,

    /// Destination SRT file (defaults to the lyric file name in the
    /// configured output folder)
    #[arg(short, long, env = "KSYNC_OUTPUT")]
    output: Option<PathBuf>,

    /// Key that registers a line (every line break on stdin counts as one
    /// press of this key)
    #[arg(short, long, default_value = "enter", env = "KSYNC_TAP_KEY")]
    key: Key,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ksync=info,ksync_engine=info,ksync_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    anyhow::ensure!(
        args.duration > 0.0,
        "Track duration must be positive, got {}",
        args.duration
    );

    let output_path = args.output.clone().unwrap_or_else(|| {
        let stem = args
            .lyrics
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "lyrics".into());
        let mut name = PathBuf::from(stem);
        name.set_extension("srt");
        resolve_output_folder(None, "KSYNC_OUTPUT_FOLDER").join(name)
    });
    let config = Config {
        lyrics_path: args.lyrics,
        playback_duration_secs: args.duration,
        output_path,
        tap_key: args.key,
    };

    let sheet = LyricSheet::load(&config.lyrics_path).with_context(|| {
        format!("Failed to load lyrics from {}", config.lyrics_path.display())
    })?;
    anyhow::ensure!(
        !sheet.is_empty(),
        "Lyric file {} contains no usable lines",
        config.lyrics_path.display()
    );
    info!(
        "Loaded {} lyric lines from {}",
        sheet.len(),
        config.lyrics_path.display()
    );
    info!("Subtitles will be written to {}", config.output_path.display());
    info!(
        "Press {} (send a line on stdin) in time with the music to register each lyric line",
        config.tap_key
    );

    // Input plumbing: stdin feeds the key source, a tick loop drives the
    // multiplexer
    let source = Arc::new(QueuedKeySource::new());
    let mux = Arc::new(KeyMultiplexer::new(
        Arc::clone(&source) as Arc<dyn KeyStateSource>
    ));

    let feeder_source = Arc::clone(&source);
    let tap_key = config.tap_key;
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_line)) = lines.next_line().await {
            feeder_source.push(tap_key);
        }
    });

    let tick_mux = Arc::clone(&mux);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(INPUT_TICK_INTERVAL);
        loop {
            tick.tick().await;
            tick_mux.tick();
        }
    });

    // Engine + session
    let engine = SyncEngine::new(Arc::clone(&mux), config.tap_key, 100);
    let mut events = engine.events().subscribe();

    let clock = Arc::new(WallClock::new(Duration::from_secs_f64(
        config.playback_duration_secs,
    )));
    engine.start(sheet.into_lines(), clock).await;
    anyhow::ensure!(
        engine.phase().await == SyncPhase::Synchronizing,
        "Synchronization failed to start"
    );

    // Follow the session until it reaches a terminal phase
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SyncEvent::LineRegistered { position, line_index, .. }) => {
                    info!("Line {} registered at {}", line_index + 1, position);
                }
                Ok(SyncEvent::SyncFinished { .. }) => {
                    info!("Synchronization finished");
                    break;
                }
                Ok(SyncEvent::SyncStopped { .. }) => {
                    warn!("Synchronization stopped before completion");
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            },
            _ = signal::ctrl_c() => {
                warn!("Interrupt received, cancelling synchronization");
                engine.cancel().await;
            }
        }
    }

    engine.export_timeline(&config.output_path).await;
    engine.dispose().await;

    info!("Done");
    Ok(())
}
