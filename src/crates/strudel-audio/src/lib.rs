//! Native sound path for live Strudel pattern playback
//!
//! This crate provides:
//! - An [`OutputBus`] that mixes the single bound [`Source`] and keeps a
//!   rolling analysis window of what was played
//! - A cpal-backed [`AudioEngine`] that drives the bus from a dedicated thread
//! - An [`Analyser`] producing spectrum and waveform snapshots of the bus
//! - Synthesized drum and tone [`Voice`]s, triggered by the pattern [`Scheduler`]

pub mod analyser;
pub mod bus;
pub mod engine;
pub mod scheduler;
pub mod voice;

pub use analyser::{Analyser, AnalyserSettings};
pub use bus::{BindingId, OutputBus, Source};
pub use engine::{AudioEngine, EngineOptions, EngineState};
pub use scheduler::{Scheduler, SchedulerMonitor, TempoHandle};
pub use voice::{Timbre, Voice};

/// Audio playback errors
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Invalid audio configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;
