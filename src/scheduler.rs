//! Frame scheduler
//!
//! Drives a [`SurfaceProcessor`] at a fixed cadence on a dedicated thread.
//! Contact events go straight into the shared [`ContactSurface`]; every other
//! mutation arrives as an [`EngineCommand`] and is applied between ticks, so a
//! frame always sees a consistent state.

use crate::activation::ContentKind;
use crate::contacts::ContactSurface;
use crate::error::TrackingError;
use crate::pipeline::SurfaceProcessor;
use crate::projector::FrameSnapshot;
use crate::tracker::InstanceId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Presentation-side requests applied by the frame thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Activate {
        instance_id: InstanceId,
        effect_key: String,
    },
    Deactivate {
        instance_id: InstanceId,
    },
    ContentChanged {
        instance_id: InstanceId,
        kind: ContentKind,
    },
    Reset,
    SetDebug {
        enabled: bool,
    },
}

impl EngineCommand {
    /// Apply the command to a processor
    pub fn apply(self, processor: &mut SurfaceProcessor) -> Result<(), TrackingError> {
        match self {
            EngineCommand::Activate {
                instance_id,
                effect_key,
            } => processor.request_activation(&instance_id, &effect_key),
            EngineCommand::Deactivate { instance_id } => {
                processor.request_deactivation(&instance_id);
                Ok(())
            }
            EngineCommand::ContentChanged { instance_id, kind } => {
                processor.content_changed(&instance_id, kind)
            }
            EngineCommand::Reset => {
                processor.reset();
                Ok(())
            }
            EngineCommand::SetDebug { enabled } => {
                processor.set_debug(enabled);
                Ok(())
            }
        }
    }
}

enum Message {
    Command(EngineCommand),
    Stop,
}

/// Cloneable sender for [`EngineCommand`]s
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<Message>,
}

impl CommandSender {
    /// Queue a command for the next gap between ticks
    pub fn send(&self, command: EngineCommand) -> Result<(), TrackingError> {
        self.tx
            .send(Message::Command(command))
            .map_err(|_| TrackingError::SchedulerStopped)
    }
}

pub struct FrameScheduler {
    surface: ContactSurface,
    commands: CommandSender,
    worker: JoinHandle<SurfaceProcessor>,
}

impl FrameScheduler {
    /// Move `processor` onto a frame thread ticking every `interval`.
    /// Each snapshot is handed to `sink` on that thread.
    pub fn start<F>(
        processor: SurfaceProcessor,
        interval: Duration,
        mut sink: F,
    ) -> Result<Self, TrackingError>
    where
        F: FnMut(FrameSnapshot) + Send + 'static,
    {
        let surface = processor.surface();
        let (tx, rx) = mpsc::channel::<Message>();
        let session_id = processor.session_id();

        let worker = thread::Builder::new()
            .name("frame-scheduler".to_string())
            .spawn(move || {
                let mut processor = processor;
                loop {
                    let deadline = Instant::now() + interval;
                    loop {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        match rx.recv_timeout(remaining) {
                            Ok(Message::Command(command)) => {
                                debug!(?command, "applying command");
                                if let Err(e) = command.apply(&mut processor) {
                                    warn!(error = %e, "command rejected");
                                }
                            }
                            Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => {
                                info!(frames = processor.frame(), "frame scheduler stopped");
                                return processor;
                            }
                            Err(RecvTimeoutError::Timeout) => break,
                        }
                    }
                    sink(processor.tick(Utc::now()));
                }
            })
            .map_err(|_| TrackingError::SchedulerStopped)?;

        info!(%session_id, interval_ms = interval.as_millis() as u64, "frame scheduler started");
        Ok(Self {
            surface,
            commands: CommandSender { tx },
            worker,
        })
    }

    /// Handle for feeding contact events
    pub fn surface(&self) -> ContactSurface {
        self.surface.clone()
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn send(&self, command: EngineCommand) -> Result<(), TrackingError> {
        self.commands.send(command)
    }

    /// Stop ticking and take the processor back
    pub fn stop(self) -> Result<SurfaceProcessor, TrackingError> {
        // the thread may already have exited on its own
        let _ = self.commands.tx.send(Message::Stop);
        self.worker.join().map_err(|_| TrackingError::SchedulerStopped)
    }
}
