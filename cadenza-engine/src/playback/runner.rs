//! Engine event loop
//!
//! One task owns the [`PlaybackEngine`] and handles, one at a time,
//! commands from [`EngineHandle`]s, events from pipelines and ticks of the
//! polling timer. Nothing else touches engine state.

use super::engine::{BackgroundStreamId, EngineStatus, PlaybackEngine};
use crate::consumer::ConsumerRef;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineEvent, PipelineFactory};
use cadenza_common::config::EngineSettings;
use cadenza_common::events::{EventBus, TrackChangeKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

type Reply<T> = oneshot::Sender<T>;

/// Request sent to the engine task
#[derive(Debug)]
pub enum EngineCommand {
    Load {
        url: Url,
        kind: TrackChangeKind,
        reply: Reply<Result<()>>,
    },
    Play {
        offset_ms: u64,
        reply: Reply<Result<()>>,
    },
    Pause {
        reply: Reply<Result<()>>,
    },
    Unpause {
        reply: Reply<Result<()>>,
    },
    Stop {
        reply: Reply<()>,
    },
    Seek {
        position_ms: u64,
        reply: Reply<Result<()>>,
    },
    SetVolume {
        percent: u8,
        reply: Reply<()>,
    },
    SetEqualizerEnabled {
        enabled: bool,
        reply: Reply<()>,
    },
    SetEqualizerParameters {
        preamp: i32,
        band_gains: Vec<i32>,
        reply: Reply<()>,
    },
    AddBackgroundStream {
        url: Url,
        reply: Reply<Result<BackgroundStreamId>>,
    },
    StopBackgroundStream {
        id: BackgroundStreamId,
        reply: Reply<()>,
    },
    AddBufferConsumer {
        consumer: ConsumerRef,
        reply: Reply<()>,
    },
    RemoveBufferConsumer {
        consumer: ConsumerRef,
        reply: Reply<()>,
    },
    PreloadNext {
        url: Url,
        reply: Reply<Result<()>>,
    },
    ReloadSettings {
        settings: Box<EngineSettings>,
        reply: Reply<()>,
    },
    Status {
        reply: Reply<EngineStatus>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle for driving the engine task
///
/// Every method waits for the engine to handle the request. Once the
/// engine task has exited they fail with `Error::EngineStopped`.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }

    pub async fn load(&self, url: Url, kind: TrackChangeKind) -> Result<()> {
        self.request(|reply| EngineCommand::Load { url, kind, reply })
            .await?
    }

    pub async fn play(&self, offset_ms: u64) -> Result<()> {
        self.request(|reply| EngineCommand::Play { offset_ms, reply })
            .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Pause { reply }).await?
    }

    pub async fn unpause(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Unpause { reply }).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Stop { reply }).await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<()> {
        self.request(|reply| EngineCommand::Seek { position_ms, reply })
            .await?
    }

    pub async fn set_volume(&self, percent: u8) -> Result<()> {
        self.request(|reply| EngineCommand::SetVolume { percent, reply })
            .await
    }

    pub async fn set_equalizer_enabled(&self, enabled: bool) -> Result<()> {
        self.request(|reply| EngineCommand::SetEqualizerEnabled { enabled, reply })
            .await
    }

    pub async fn set_equalizer_parameters(&self, preamp: i32, band_gains: Vec<i32>) -> Result<()> {
        self.request(|reply| EngineCommand::SetEqualizerParameters {
            preamp,
            band_gains,
            reply,
        })
        .await
    }

    pub async fn add_background_stream(&self, url: Url) -> Result<BackgroundStreamId> {
        self.request(|reply| EngineCommand::AddBackgroundStream { url, reply })
            .await?
    }

    pub async fn stop_background_stream(&self, id: BackgroundStreamId) -> Result<()> {
        self.request(|reply| EngineCommand::StopBackgroundStream { id, reply })
            .await
    }

    pub async fn add_buffer_consumer(&self, consumer: ConsumerRef) -> Result<()> {
        self.request(|reply| EngineCommand::AddBufferConsumer { consumer, reply })
            .await
    }

    pub async fn remove_buffer_consumer(&self, consumer: ConsumerRef) -> Result<()> {
        self.request(|reply| EngineCommand::RemoveBufferConsumer { consumer, reply })
            .await
    }

    pub async fn preload_next(&self, url: Url) -> Result<()> {
        self.request(|reply| EngineCommand::PreloadNext { url, reply })
            .await?
    }

    pub async fn reload_settings(&self, settings: EngineSettings) -> Result<()> {
        self.request(|reply| EngineCommand::ReloadSettings {
            settings: Box::new(settings),
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }

    /// Release all pipelines and end the engine task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| EngineCommand::Shutdown { reply }).await
    }
}

/// Run the engine until `Shutdown` or until every handle is dropped
pub async fn run_engine(
    mut engine: PlaybackEngine,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    mut pipeline_events: mpsc::UnboundedReceiver<PipelineEvent>,
) {
    info!("Engine loop started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All engine handles dropped");
                    break;
                };
                if !handle_command(&mut engine, command) {
                    break;
                }
            }
            Some(event) = pipeline_events.recv() => {
                engine.handle_pipeline_event(event);
            }
            _ = engine.timer_tick() => {}
        }
    }

    engine.shutdown();
    info!("Engine loop stopped");
}

/// Apply one command; returns false when the loop should end
fn handle_command(engine: &mut PlaybackEngine, command: EngineCommand) -> bool {
    // A dropped reply receiver just means the caller stopped waiting
    match command {
        EngineCommand::Load { url, kind, reply } => {
            let _ = reply.send(engine.load(&url, kind));
        }
        EngineCommand::Play { offset_ms, reply } => {
            let _ = reply.send(engine.play(offset_ms));
        }
        EngineCommand::Pause { reply } => {
            let _ = reply.send(engine.pause());
        }
        EngineCommand::Unpause { reply } => {
            let _ = reply.send(engine.unpause());
        }
        EngineCommand::Stop { reply } => {
            engine.stop();
            let _ = reply.send(());
        }
        EngineCommand::Seek { position_ms, reply } => {
            let _ = reply.send(engine.seek(position_ms));
        }
        EngineCommand::SetVolume { percent, reply } => {
            engine.set_volume(percent);
            let _ = reply.send(());
        }
        EngineCommand::SetEqualizerEnabled { enabled, reply } => {
            engine.set_equalizer_enabled(enabled);
            let _ = reply.send(());
        }
        EngineCommand::SetEqualizerParameters {
            preamp,
            band_gains,
            reply,
        } => {
            engine.set_equalizer_parameters(preamp, band_gains);
            let _ = reply.send(());
        }
        EngineCommand::AddBackgroundStream { url, reply } => {
            let _ = reply.send(engine.add_background_stream(&url));
        }
        EngineCommand::StopBackgroundStream { id, reply } => {
            engine.stop_background_stream(id);
            let _ = reply.send(());
        }
        EngineCommand::AddBufferConsumer { consumer, reply } => {
            engine.add_buffer_consumer(consumer);
            let _ = reply.send(());
        }
        EngineCommand::RemoveBufferConsumer { consumer, reply } => {
            engine.remove_buffer_consumer(&consumer);
            let _ = reply.send(());
        }
        EngineCommand::PreloadNext { url, reply } => {
            let _ = reply.send(engine.preload_next(&url));
        }
        EngineCommand::ReloadSettings { settings, reply } => {
            engine.reload_settings(*settings);
            let _ = reply.send(());
        }
        EngineCommand::Status { reply } => {
            let _ = reply.send(engine.status());
        }
        EngineCommand::Shutdown { reply } => {
            engine.shutdown();
            let _ = reply.send(());
            return false;
        }
    }
    true
}

/// Build an engine and spawn its loop on the current runtime
pub fn spawn_engine(
    factory: Box<dyn PipelineFactory>,
    settings: EngineSettings,
    events: EventBus,
) -> (EngineHandle, JoinHandle<()>) {
    let (engine, pipeline_events) = PlaybackEngine::new(factory, settings, events);
    let (tx, commands) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_engine(engine, commands, pipeline_events));
    (EngineHandle::new(tx), task)
}
