//! Fake audio backend and pattern compiler for lifecycle tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strudel_audio::{BindingId, OutputBus, Source};
use strudel_live::{
    AudioBackend, AudioResourceManager, CompiledPattern, EngineConfig, EngineError, OutputDevice,
    OutputPort, PatternCompiler, PlaybackScheduler, ResourceState, Result,
};

pub fn test_config() -> EngineConfig {
    EngineConfig {
        fft_size: 256,
        spectrum_bars: 16,
        ..EngineConfig::default()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub opens: AtomicUsize,
    pub fail_open: AtomicBool,
    pub start_suspended: bool,
    pub refuse_resume: bool,
    pub open_delay: Duration,
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn open(&self, config: &EngineConfig) -> Result<Arc<dyn OutputDevice>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::InitializationFailed(
                "permission denied".to_string(),
            ));
        }
        let state = if self.start_suspended {
            ResourceState::Suspended
        } else {
            ResourceState::Running
        };
        Ok(Arc::new(FakeDevice {
            bus: Arc::new(OutputBus::new(48_000, config.fft_size, 1.0)),
            state: Mutex::new(state),
            refuse_resume: self.refuse_resume,
        }))
    }
}

pub struct FakeDevice {
    bus: Arc<OutputBus>,
    state: Mutex<ResourceState>,
    refuse_resume: bool,
}

#[async_trait]
impl OutputDevice for FakeDevice {
    fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    async fn resume(&self) -> Result<()> {
        if self.refuse_resume {
            return Err(EngineError::ResourceUnavailable(
                "autoplay blocked".to_string(),
            ));
        }
        *self.state.lock() = ResourceState::Running;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.bus.sample_rate()
    }

    fn bus(&self) -> Arc<OutputBus> {
        self.bus.clone()
    }
}

/// Everything the fake patterns did, shared across all of them
#[derive(Default)]
pub struct Ledger {
    pub compiled: Mutex<Vec<String>>,
    pub tempos: Mutex<Vec<u32>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub sounding: AtomicUsize,
    pub max_sounding: AtomicUsize,
}

impl Ledger {
    pub fn sounding(&self) -> usize {
        self.sounding.load(Ordering::SeqCst)
    }

    pub fn max_sounding(&self) -> usize {
        self.max_sounding.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn compiled(&self) -> Vec<String> {
        self.compiled.lock().clone()
    }

    pub fn tempos(&self) -> Vec<u32> {
        self.tempos.lock().clone()
    }
}

#[derive(Default)]
pub struct FakeCompiler {
    pub ledger: Arc<Ledger>,
    pub compile_delay: Duration,
    /// Held inside `start` after the pattern is already bound
    pub start_delay: Duration,
    pub live_tempo: bool,
    pub fail_start: bool,
    pub noisy_stop: bool,
}

#[async_trait]
impl PatternCompiler for FakeCompiler {
    async fn compile(&self, text: &str) -> Result<Box<dyn CompiledPattern>> {
        if !self.compile_delay.is_zero() {
            tokio::time::sleep(self.compile_delay).await;
        }
        if text.contains("((") {
            return Err(EngineError::Parse(format!("unbalanced group in '{}'", text)));
        }
        self.ledger.compiled.lock().push(text.to_string());
        Ok(Box::new(FakePattern {
            ledger: self.ledger.clone(),
            start_delay: self.start_delay,
            live_tempo: self.live_tempo,
            fail_start: self.fail_start,
            noisy_stop: self.noisy_stop,
            binding: None,
        }))
    }
}

struct Hum;

impl Source for Hum {
    fn render(&mut self, out: &mut [f32], _channels: usize, _sample_rate: u32) {
        for sample in out {
            *sample += 0.1;
        }
    }
}

struct FakePattern {
    ledger: Arc<Ledger>,
    start_delay: Duration,
    live_tempo: bool,
    fail_start: bool,
    noisy_stop: bool,
    binding: Option<(OutputPort, BindingId)>,
}

#[async_trait]
impl CompiledPattern for FakePattern {
    fn bind_tempo(&mut self, cpm: u32) {
        self.ledger.tempos.lock().push(cpm);
    }

    fn supports_live_tempo(&self) -> bool {
        self.live_tempo
    }

    async fn start(&mut self, output: &OutputPort) -> Result<()> {
        self.ledger.starts.fetch_add(1, Ordering::SeqCst);
        let id = output.bind(Box::new(Hum));
        self.binding = Some((output.clone(), id));

        let now = self.ledger.sounding.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.max_sounding.fetch_max(now, Ordering::SeqCst);

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        if self.fail_start {
            return Err(EngineError::Playback("scheduler rejected pattern".to_string()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some((output, id)) = self.binding.take() {
            output.unbind(id);
            self.ledger.sounding.fetch_sub(1, Ordering::SeqCst);
            self.ledger.stops.fetch_add(1, Ordering::SeqCst);
        }
        if self.noisy_stop {
            return Err(EngineError::Playback("stop threw".to_string()));
        }
        Ok(())
    }
}

pub struct Rig {
    pub backend: Arc<FakeBackend>,
    pub ledger: Arc<Ledger>,
    pub resources: Arc<AudioResourceManager>,
    pub scheduler: Arc<PlaybackScheduler>,
}

pub fn rig(backend: FakeBackend, compiler: FakeCompiler) -> Rig {
    let backend = Arc::new(backend);
    let ledger = compiler.ledger.clone();
    let resources = Arc::new(AudioResourceManager::new(backend.clone(), test_config()));
    let scheduler = Arc::new(PlaybackScheduler::new(
        resources.clone(),
        Arc::new(compiler),
    ));
    Rig {
        backend,
        ledger,
        resources,
        scheduler,
    }
}

pub fn default_rig() -> Rig {
    rig(
        FakeBackend::default(),
        FakeCompiler {
            live_tempo: true,
            ..FakeCompiler::default()
        },
    )
}
