//! Live pattern playback with real-time audio telemetry
//!
//! - [`AudioResourceManager`] acquires the audio output once per process and
//!   attaches the analysis tap
//! - [`PlaybackScheduler`] runs the Idle/Starting/Playing/Stopping/Failed
//!   lifecycle, keeping at most one compiled pattern bound to the output
//! - [`telemetry`] samples the tap every frame while playing and derives
//!   level, spectrum bars, waveform and beat phase
//! - [`PlaygroundSession`] is the synchronous facade a UI drives
//!
//! ```no_run
//! use std::sync::Arc;
//! use strudel_live::{AudioResourceManager, MiniCompiler, PlaybackScheduler, PlaygroundSession};
//!
//! # async fn run() {
//! let resources = AudioResourceManager::global();
//! let compiler = Arc::new(MiniCompiler::new(resources.config().max_voices));
//! let session = PlaygroundSession::new(Arc::new(PlaybackScheduler::new(resources, compiler)));
//!
//! session.set_pattern_text("bd hh sn hh");
//! session.set_tempo(120);
//! session.toggle_play();
//! session.flush().await;
//! assert!(session.snapshot().is_playing);
//! # }
//! ```

pub mod compiler;
pub mod config;
pub mod error;
pub mod resource;
pub mod scheduler;
pub mod session;
pub mod telemetry;

mod task;

pub use compiler::{CompiledPattern, MiniCompiler, PatternCompiler};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use resource::{
    AudioBackend, AudioResourceHandle, AudioResourceManager, CpalBackend, OutputDevice,
    OutputPort, ResourceState,
};
pub use scheduler::{PatternSpec, PlaybackScheduler, SchedulerState};
pub use session::{PlaygroundSession, SessionSnapshot};
pub use telemetry::{TelemetryFrame, TelemetrySample, TelemetryStatus, TelemetryTap};
