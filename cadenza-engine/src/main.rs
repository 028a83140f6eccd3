//! Cadenza command-line player
//!
//! Plays a list of files or URLs through the playback engine, optionally
//! with looping background streams underneath, and reports engine events
//! as log lines or JSON.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cadenza_common::events::{EngineEvent, EngineState, EventBus, TrackChangeKind};
use cadenza_common::human_time::{format_ms, format_progress};
use cadenza_common::EngineSettings;
use cadenza_engine::consumer::consumer_ref;
use cadenza_engine::media_url::parse_location;
use cadenza_engine::pipeline::{PipelineId, SimulatedPipelineFactory};
use cadenza_engine::playback::spawn_engine;
use cadenza_engine::{AudioBuffer, BufferConsumer, EngineHandle};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Command-line arguments for cadenza
#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(about = "Play files and streams through the Cadenza playback engine")]
#[command(version)]
struct Args {
    /// Files or URLs to play, in order
    #[arg(required = true)]
    locations: Vec<String>,

    /// Engine settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Crossfade on manual track changes
    #[arg(long)]
    crossfade: bool,

    /// Crossfade between consecutive tracks
    #[arg(long)]
    autocrossfade: bool,

    /// Fade duration in milliseconds; also fades out on stop
    #[arg(long)]
    fadeout_ms: Option<u64>,

    /// Main volume, 0-100
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// Looping background stream (repeatable)
    #[arg(short, long)]
    background: Vec<String>,

    /// Print engine events as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply_to(&self, settings: &mut EngineSettings) {
        if self.crossfade {
            settings.crossfade_enabled = true;
        }
        if self.autocrossfade {
            settings.autocrossfade_enabled = true;
        }
        if let Some(fadeout_ms) = self.fadeout_ms {
            settings.fadeout_duration_ms = fadeout_ms;
            settings.fadeout_enabled = true;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
    }
}

/// Counts decoded frames delivered by the current pipeline
#[derive(Debug, Default)]
struct FrameCounter {
    frames: AtomicU64,
}

impl BufferConsumer for FrameCounter {
    fn consume_buffer(&self, buffer: &AudioBuffer, _source: PipelineId) {
        self.frames
            .fetch_add(buffer.frames() as u64, Ordering::Relaxed);
    }
}

/// Tracks to play and the one currently loaded
#[derive(Debug)]
struct Playlist {
    urls: Vec<Url>,
    position: usize,
}

impl Playlist {
    fn new(urls: Vec<Url>) -> Self {
        Self { urls, position: 0 }
    }

    fn current(&self) -> Option<&Url> {
        self.urls.get(self.position)
    }

    fn peek_next(&self) -> Option<&Url> {
        self.urls.get(self.position + 1)
    }

    fn advance(&mut self) -> Option<&Url> {
        if self.position < self.urls.len() {
            self.position += 1;
        }
        self.current()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadenza_engine=debug,cadenza=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = EngineSettings::load_or_default(args.config.as_deref())
        .context("Failed to load engine settings")?;
    args.apply_to(&mut settings);
    let settings = settings.validated();

    let urls = args
        .locations
        .iter()
        .map(|location| {
            parse_location(location).with_context(|| format!("Invalid location '{}'", location))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut playlist = Playlist::new(urls);

    info!("Starting cadenza with {} track(s)", playlist.urls.len());

    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    let autocrossfade = settings.autocrossfade_enabled;
    let (engine, engine_task) = spawn_engine(Box::new(SimulatedPipelineFactory::new()), settings, bus);

    let counter = Arc::new(FrameCounter::default());
    engine
        .add_buffer_consumer(consumer_ref(&counter))
        .await
        .context("Failed to register buffer consumer")?;

    for location in &args.background {
        let url = parse_location(location)
            .with_context(|| format!("Invalid background location '{}'", location))?;
        match engine.add_background_stream(url).await {
            Ok(id) => info!("Background stream {} started for {}", id, location),
            Err(e) => warn!("Background stream {} not started: {}", location, e),
        }
    }

    if !start_current(&engine, &mut playlist, TrackChangeKind::Manual).await {
        engine.shutdown().await.ok();
        bail!("None of the given tracks could be played");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                engine.stop().await.ok();
                break;
            }
            received = events.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} engine events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                report(&event, args.json)?;

                match event {
                    EngineEvent::TrackAboutToEnd { .. } => {
                        let Some(next) = playlist.peek_next().cloned() else {
                            continue;
                        };
                        if autocrossfade {
                            playlist.advance();
                            if let Err(e) = engine.load(next.clone(), TrackChangeKind::Auto).await {
                                warn!("Could not crossfade into {}: {}", next, e);
                            } else {
                                engine.play(0).await.ok();
                            }
                        } else {
                            engine.preload_next(next).await.ok();
                        }
                    }
                    EngineEvent::TrackEnded { .. } => {
                        playlist.advance();
                        if !start_current(&engine, &mut playlist, TrackChangeKind::Auto).await {
                            info!("End of playlist");
                            break;
                        }
                    }
                    EngineEvent::Error { .. } => {
                        // The engine dropped the track; move on to the next one
                        let status = engine.status().await?;
                        if status.state == EngineState::Idle {
                            playlist.advance();
                            if !start_current(&engine, &mut playlist, TrackChangeKind::Auto).await {
                                info!("End of playlist");
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    engine.shutdown().await.ok();
    engine_task.await.context("Engine task failed")?;

    info!(
        "Delivered {} frames to buffer consumers",
        counter.frames.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Load and play the playlist's current track, skipping tracks that fail
///
/// A track the current pipeline already continued into (gapless) is not
/// restarted. Returns false once the playlist is exhausted.
async fn start_current(engine: &EngineHandle, playlist: &mut Playlist, kind: TrackChangeKind) -> bool {
    while let Some(url) = playlist.current().cloned() {
        match engine.load(url.clone(), kind).await {
            Ok(()) => {
                let playing = matches!(
                    engine.status().await,
                    Ok(status) if status.state == EngineState::Playing
                );
                if playing {
                    return true;
                }
                match engine.play(0).await {
                    Ok(()) => return true,
                    Err(e) => warn!("Could not play {}: {}", url, e),
                }
            }
            Err(e) => warn!("Could not load {}: {}", url, e),
        }
        playlist.advance();
    }
    false
}

fn report(event: &EngineEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        EngineEvent::StateChanged { state, .. } => info!("State: {}", state),
        EngineEvent::Tick {
            position_ms,
            length_ms,
            ..
        } => debug!("{}", format_progress(*position_ms, *length_ms)),
        EngineEvent::MetaData { bundle, .. } => {
            let title = if bundle.title.is_empty() { "(untitled)" } else { bundle.title.as_str() };
            info!(
                "Now playing: {} {} [{}]",
                title,
                if bundle.artist.is_empty() {
                    String::new()
                } else {
                    format!("by {}", bundle.artist)
                },
                format_ms(bundle.length_ms)
            );
        }
        EngineEvent::TrackAboutToEnd { .. } => debug!("Track about to end"),
        EngineEvent::TrackEnded { .. } => info!("Track ended"),
        EngineEvent::Error { message, .. } => warn!("Engine error: {}", message),
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
