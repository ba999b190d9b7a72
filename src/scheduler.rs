//! Playback lifecycle: Idle, Starting, Playing, Stopping, Failed
//!
//! Every transition runs under one async mutex, so a `start`, `stop` or
//! `retempo` that arrives while another transition is in flight waits for it
//! to settle. At most one compiled pattern is bound to the output at a time:
//! a new start always stops the previous pattern before compiling the next.

use crate::telemetry::{SamplingSession, TelemetryFrame, TelemetrySampler};
use crate::{
    AudioResourceHandle, AudioResourceManager, CompiledPattern, EngineError, PatternCompiler,
    Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// What to play: pattern text plus tempo in cycles per minute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub text: String,
    pub tempo_cpm: u32,
}

impl PatternSpec {
    pub fn new(text: impl Into<String>, tempo_cpm: u32) -> Self {
        PatternSpec {
            text: text.into(),
            tempo_cpm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Starting,
    Playing,
    Stopping,
    Failed(EngineError),
}

impl SchedulerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, SchedulerState::Playing)
    }
}

/// The pattern currently bound to the output, with its telemetry session
struct Bound {
    spec: PatternSpec,
    pattern: Box<dyn CompiledPattern>,
    // Dropped before `pattern` is stopped, so telemetry goes idle first
    sampling: Option<SamplingSession>,
}

pub struct PlaybackScheduler {
    resources: Arc<AudioResourceManager>,
    compiler: Arc<dyn PatternCompiler>,
    sampler: TelemetrySampler,
    bound: Mutex<Option<Bound>>,
    state: watch::Sender<SchedulerState>,
}

impl PlaybackScheduler {
    pub fn new(resources: Arc<AudioResourceManager>, compiler: Arc<dyn PatternCompiler>) -> Self {
        let sampler = TelemetrySampler::new(resources.config());
        let (state, _) = watch::channel(SchedulerState::Idle);

        PlaybackScheduler {
            resources,
            compiler,
            sampler,
            bound: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn telemetry(&self) -> watch::Receiver<TelemetryFrame> {
        self.sampler.subscribe()
    }

    /// Live telemetry frames published so far
    pub fn frames_sampled(&self) -> u64 {
        self.sampler.frames_sampled()
    }

    /// Period of the beat timer while playing
    pub fn beat_period(&self) -> Option<Duration> {
        self.sampler.beat_period()
    }

    pub fn resources(&self) -> &Arc<AudioResourceManager> {
        &self.resources
    }

    /// Stop whatever is playing, then bring `spec` up
    ///
    /// On failure the state becomes `Failed` and nothing is left bound.
    pub async fn start(&self, spec: PatternSpec) -> Result<()> {
        let mut bound = self.bound.lock().await;
        self.start_locked(&mut bound, spec).await
    }

    /// Stop and unbind the current pattern. Always ends in `Idle`
    pub async fn stop(&self) {
        let mut bound = self.bound.lock().await;
        if bound.is_none() && *self.state.borrow() == SchedulerState::Idle {
            return;
        }
        self.state.send_replace(SchedulerState::Stopping);
        self.release(&mut bound);
        self.state.send_replace(SchedulerState::Idle);
        info!("Playback stopped");
    }

    /// Change the tempo of the playing pattern
    ///
    /// Applied in place when the compiled pattern supports it, otherwise the
    /// pattern is stopped and started again at the new tempo. Does nothing
    /// unless playing.
    pub async fn retempo(&self, cpm: u32) -> Result<()> {
        let mut bound = self.bound.lock().await;
        let Some(current) = bound.as_mut() else {
            debug!(cpm, "Not playing, tempo change deferred to next start");
            return Ok(());
        };
        if current.spec.tempo_cpm == cpm {
            return Ok(());
        }

        if current.pattern.supports_live_tempo() {
            current.pattern.bind_tempo(cpm);
            current.spec.tempo_cpm = cpm;
            if let Some(sampling) = current.sampling.as_mut() {
                sampling.retempo(cpm);
            }
            info!(cpm, "Tempo changed live");
            return Ok(());
        }

        let spec = PatternSpec {
            tempo_cpm: cpm,
            ..current.spec.clone()
        };
        info!(cpm, "Restarting pattern at new tempo");
        self.start_locked(&mut bound, spec).await
    }

    async fn start_locked(&self, bound: &mut Option<Bound>, spec: PatternSpec) -> Result<()> {
        self.release(bound);
        self.state.send_replace(SchedulerState::Starting);
        info!(pattern = %spec.text, cpm = spec.tempo_cpm, "Starting playback");

        // Reverts a cancelled start to Idle and stops whatever it had bound
        let mut pending = StartingGuard {
            state: &self.state,
            pattern: None,
            armed: true,
        };

        match self.bring_up(&spec, &mut pending).await {
            Ok((handle, pattern)) => {
                let sampling = self.sampler.start(handle, spec.tempo_cpm);
                *bound = Some(Bound {
                    spec,
                    pattern,
                    sampling: Some(sampling),
                });
                pending.armed = false;
                self.state.send_replace(SchedulerState::Playing);
                info!("Playback running");
                Ok(())
            }
            Err(e) => {
                pending.armed = false;
                warn!(error = %e, "Playback failed to start");
                self.state.send_replace(SchedulerState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    async fn bring_up(
        &self,
        spec: &PatternSpec,
        pending: &mut StartingGuard<'_>,
    ) -> Result<(Arc<AudioResourceHandle>, Box<dyn CompiledPattern>)> {
        let handle = self.resources.ensure_ready().await?;
        self.resources.resume_if_suspended(&handle).await?;

        let mut pattern = self.compiler.compile(&spec.text).await?;
        pattern.bind_tempo(spec.tempo_cpm);

        let pattern = pending.pattern.insert(pattern);
        if let Err(e) = pattern.start(handle.output()).await {
            pending.stop_pattern();
            return Err(match e {
                EngineError::Playback(_) => e,
                other => EngineError::Playback(other.to_string()),
            });
        }

        let Some(pattern) = pending.pattern.take() else {
            return Err(EngineError::Playback(
                "pattern released before start settled".into(),
            ));
        };
        Ok((handle, pattern))
    }

    /// Stop the bound pattern, if any. Stop errors are logged and swallowed
    fn release(&self, bound: &mut Option<Bound>) {
        let Some(mut old) = bound.take() else {
            return;
        };
        drop(old.sampling.take());
        if let Err(e) = old.pattern.stop() {
            warn!(error = %e, pattern = %old.spec.text, "Error stopping pattern");
        }
        debug!(pattern = %old.spec.text, "Released pattern");
    }
}

struct StartingGuard<'a> {
    state: &'a watch::Sender<SchedulerState>,
    /// Pattern whose `start` is still in flight
    pattern: Option<Box<dyn CompiledPattern>>,
    armed: bool,
}

impl StartingGuard<'_> {
    fn stop_pattern(&mut self) {
        if let Some(mut pattern) = self.pattern.take() {
            if let Err(e) = pattern.stop() {
                warn!(error = %e, "Error stopping pattern after failed start");
            }
        }
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Start abandoned before it settled");
            self.stop_pattern();
            self.state.send_replace(SchedulerState::Idle);
        }
    }
}
