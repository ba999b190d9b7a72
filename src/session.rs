//! UI-facing facade over the playback scheduler
//!
//! The three inputs are synchronous: they update the observable snapshot
//! where they can and queue a command. A single driver task applies the
//! queued commands in order against the [`PlaybackScheduler`].

use crate::task::TaskGuard;
use crate::telemetry::TelemetryFrame;
use crate::{EngineConfig, PatternSpec, PlaybackScheduler};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// What the UI shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub is_playing: bool,
    pub tempo: u32,
    pub pattern_text: String,
    pub last_error: Option<String>,
}

enum Command {
    Play { spec: PatternSpec, toggle: u64 },
    Stop,
    Tempo { cpm: u32, toggle: u64 },
    Flush(oneshot::Sender<()>),
}

/// Whether the user last asked to play, and how many toggles led there
#[derive(Debug, Default)]
struct Intent {
    playing: bool,
    toggles: u64,
}

pub struct PlaygroundSession {
    scheduler: Arc<PlaybackScheduler>,
    config: EngineConfig,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    intent: Arc<Mutex<Intent>>,
    commands: mpsc::UnboundedSender<Command>,
    _driver: TaskGuard,
}

impl PlaygroundSession {
    /// Must be called from within a tokio runtime
    pub fn new(scheduler: Arc<PlaybackScheduler>) -> Self {
        let config = scheduler.resources().config().clone();
        let (snapshot, _) = watch::channel(SessionSnapshot {
            is_playing: false,
            tempo: config.default_tempo,
            pattern_text: config.default_pattern.clone(),
            last_error: None,
        });
        let snapshot = Arc::new(snapshot);
        let intent = Arc::new(Mutex::new(Intent::default()));

        let (commands, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(
            scheduler.clone(),
            snapshot.clone(),
            intent.clone(),
            rx,
        ));

        PlaygroundSession {
            scheduler,
            config,
            snapshot,
            intent,
            commands,
            _driver: TaskGuard::new(driver),
        }
    }

    /// Store the text for the next start; a playing pattern keeps playing
    pub fn set_pattern_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.snapshot.send_modify(|s| s.pattern_text = text);
    }

    /// Clamp and store the tempo; applied live when playing
    pub fn set_tempo(&self, cpm: u32) {
        let cpm = self.config.clamp_tempo(cpm);
        self.snapshot.send_modify(|s| s.tempo = cpm);
        let toggle = self.intent.lock().toggles;
        self.send(Command::Tempo { cpm, toggle });
    }

    pub fn toggle_play(&self) {
        let mut intent = self.intent.lock();
        intent.playing = !intent.playing;
        intent.toggles += 1;
        // Queued under the lock so commands keep toggle order
        if intent.playing {
            let spec = self.current_spec();
            self.send(Command::Play {
                spec,
                toggle: intent.toggles,
            });
        } else {
            self.send(Command::Stop);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn telemetry(&self) -> watch::Receiver<TelemetryFrame> {
        self.scheduler.telemetry()
    }

    pub fn scheduler(&self) -> &Arc<PlaybackScheduler> {
        &self.scheduler
    }

    /// Wait until every command queued so far has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx));
        let _ = rx.await;
    }

    fn current_spec(&self) -> PatternSpec {
        let snapshot = self.snapshot.borrow();
        let text = if snapshot.pattern_text.trim().is_empty() {
            self.config.default_pattern.clone()
        } else {
            snapshot.pattern_text.clone()
        };
        PatternSpec::new(text, snapshot.tempo)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Session driver has stopped, command dropped");
        }
    }
}

async fn drive(
    scheduler: Arc<PlaybackScheduler>,
    snapshot: Arc<watch::Sender<SessionSnapshot>>,
    intent: Arc<Mutex<Intent>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Play { spec, toggle } => {
                snapshot.send_modify(|s| s.last_error = None);
                let result = scheduler.start(spec).await;
                settle(&snapshot, &intent, toggle, result);
            }
            Command::Stop => {
                scheduler.stop().await;
                snapshot.send_modify(|s| s.is_playing = false);
            }
            Command::Tempo { cpm, toggle } => {
                let result = scheduler.retempo(cpm).await;
                if scheduler.state().is_playing() || result.is_err() {
                    settle(&snapshot, &intent, toggle, result);
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Session driver finished");
}

fn settle(
    snapshot: &watch::Sender<SessionSnapshot>,
    intent: &Mutex<Intent>,
    toggle: u64,
    result: crate::Result<()>,
) {
    match result {
        Ok(()) => snapshot.send_modify(|s| s.is_playing = true),
        Err(e) => {
            let mut intent = intent.lock();
            // A later toggle already decided what the user wants
            if intent.toggles == toggle {
                intent.playing = false;
            }
            drop(intent);
            snapshot.send_modify(|s| {
                s.is_playing = false;
                s.last_error = Some(format!("Playback error: {}", e));
            });
        }
    }
}
