//! The process-wide audio output and its analysis tap
//!
//! [`AudioResourceManager::ensure_ready`] acquires the output device at most
//! once. Concurrent callers share the in-flight attempt and every later caller
//! gets the memoized handle back. A failed attempt is not memoized, so the
//! next call tries again.

use crate::telemetry::TelemetryTap;
use crate::{EngineConfig, EngineError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use strudel_audio::{Analyser, AudioEngine, BindingId, EngineState, OutputBus, Source};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Lifecycle of the shared output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Nothing acquired yet
    Uninitialized,
    /// Acquired, but the device is not pulling audio
    Suspended,
    Running,
}

/// An opened output device
#[async_trait]
pub trait OutputDevice: Send + Sync {
    fn state(&self) -> ResourceState;

    /// Start pulling audio. Fails with [`EngineError::ResourceUnavailable`]
    /// when the platform refuses
    async fn resume(&self) -> Result<()>;

    fn sample_rate(&self) -> u32;

    /// The bus the device plays
    fn bus(&self) -> Arc<OutputBus>;
}

/// Opens output devices
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Failures surface as [`EngineError::InitializationFailed`]
    async fn open(&self, config: &EngineConfig) -> Result<Arc<dyn OutputDevice>>;
}

/// The system's default output, through cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

#[async_trait]
impl AudioBackend for CpalBackend {
    async fn open(&self, config: &EngineConfig) -> Result<Arc<dyn OutputDevice>> {
        let options = config.engine_options();
        let engine = tokio::task::spawn_blocking(move || AudioEngine::open(options))
            .await
            .map_err(|e| EngineError::InitializationFailed(e.to_string()))?
            .map_err(|e| EngineError::InitializationFailed(e.to_string()))?;

        Ok(Arc::new(CpalDevice {
            engine: Arc::new(engine),
        }))
    }
}

struct CpalDevice {
    engine: Arc<AudioEngine>,
}

#[async_trait]
impl OutputDevice for CpalDevice {
    fn state(&self) -> ResourceState {
        match self.engine.state() {
            EngineState::Suspended => ResourceState::Suspended,
            EngineState::Running => ResourceState::Running,
        }
    }

    async fn resume(&self) -> Result<()> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.resume())
            .await
            .map_err(|e| EngineError::ResourceUnavailable(e.to_string()))?
            .map_err(|e| EngineError::ResourceUnavailable(e.to_string()))
    }

    fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    fn bus(&self) -> Arc<OutputBus> {
        self.engine.bus().clone()
    }
}

/// Bind and unbind access to the output, without access to the bus itself
#[derive(Clone)]
pub struct OutputPort {
    bus: Arc<OutputBus>,
}

impl OutputPort {
    /// Replace whatever is bound with `source`
    pub fn bind(&self, source: Box<dyn Source>) -> BindingId {
        self.bus.bind(source)
    }

    /// Remove the binding if it is still the current one
    pub fn unbind(&self, id: BindingId) -> bool {
        self.bus.unbind(id)
    }

    pub fn bound(&self) -> Option<BindingId> {
        self.bus.bound()
    }

    pub fn sample_rate(&self) -> u32 {
        self.bus.sample_rate()
    }
}

/// The acquired output plus its one telemetry tap
pub struct AudioResourceHandle {
    device: Arc<dyn OutputDevice>,
    output: OutputPort,
    tap: TelemetryTap,
}

impl AudioResourceHandle {
    fn attach(device: Arc<dyn OutputDevice>, config: &EngineConfig) -> Result<Self> {
        let bus = device.bus();
        let analyser = Analyser::new(bus.clone(), config.analyser_settings())
            .map_err(|e| EngineError::InitializationFailed(e.to_string()))?;

        Ok(AudioResourceHandle {
            device,
            output: OutputPort { bus },
            tap: TelemetryTap::new(analyser),
        })
    }

    pub fn state(&self) -> ResourceState {
        self.device.state()
    }

    /// Seconds of audio rendered so far; never decreases
    pub fn current_time(&self) -> f64 {
        self.output.bus.current_time()
    }

    pub fn sample_rate(&self) -> u32 {
        self.device.sample_rate()
    }

    pub fn output(&self) -> &OutputPort {
        &self.output
    }

    pub fn tap(&self) -> &TelemetryTap {
        &self.tap
    }
}

type Attempt = Arc<OnceCell<Result<Arc<AudioResourceHandle>>>>;

static GLOBAL: OnceLock<Arc<AudioResourceManager>> = OnceLock::new();

/// Owner of the single audio output for the process
pub struct AudioResourceManager {
    backend: Arc<dyn AudioBackend>,
    config: EngineConfig,
    attempt: Mutex<Attempt>,
    acquisitions: AtomicUsize,
}

impl AudioResourceManager {
    pub fn new(backend: Arc<dyn AudioBackend>, config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Audio manager created with an invalid configuration");
        }
        AudioResourceManager {
            backend,
            config,
            attempt: Mutex::new(Arc::new(OnceCell::new())),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// The process-wide manager on the default cpal output
    pub fn global() -> Arc<Self> {
        Self::init_global(EngineConfig::default())
    }

    /// Create the process-wide manager with `config`, or return the existing one
    pub fn init_global(config: EngineConfig) -> Arc<Self> {
        let manager = GLOBAL.get_or_init(|| Arc::new(Self::new(Arc::new(CpalBackend), config.clone())));
        if manager.config != config {
            warn!("Global audio manager already exists, ignoring new configuration");
        }
        manager.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Acquire the output once and return the shared handle
    pub async fn ensure_ready(&self) -> Result<Arc<AudioResourceHandle>> {
        let attempt = self.attempt.lock().clone();
        let result = attempt.get_or_init(|| self.acquire()).await.clone();

        if result.is_err() {
            let mut current = self.attempt.lock();
            if Arc::ptr_eq(&current, &attempt) {
                *current = Arc::new(OnceCell::new());
            }
        }
        result
    }

    /// Resume the device if it reports suspended
    pub async fn resume_if_suspended(&self, handle: &AudioResourceHandle) -> Result<()> {
        if handle.state() != ResourceState::Suspended {
            return Ok(());
        }
        debug!("Resuming suspended audio output");
        handle.device.resume().await.map_err(|e| match e {
            EngineError::ResourceUnavailable(_) => e,
            other => EngineError::ResourceUnavailable(other.to_string()),
        })?;
        info!("Audio output running");
        Ok(())
    }

    pub fn state(&self) -> ResourceState {
        match self.attempt.lock().get() {
            Some(Ok(handle)) => handle.state(),
            _ => ResourceState::Uninitialized,
        }
    }

    /// Number of acquisition sequences that completed successfully
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Forget the memoized handle so the next `ensure_ready` acquires again
    ///
    /// Holders of the old handle keep it alive until they drop it.
    pub fn reset(&self) {
        *self.attempt.lock() = Arc::new(OnceCell::new());
        debug!("Audio resource manager reset");
    }

    async fn acquire(&self) -> Result<Arc<AudioResourceHandle>> {
        info!("Acquiring audio output");
        let device = self.backend.open(&self.config).await.map_err(|e| {
            warn!(error = %e, "Audio output acquisition failed");
            match e {
                EngineError::InitializationFailed(_) => e,
                other => EngineError::InitializationFailed(other.to_string()),
            }
        })?;

        let handle = AudioResourceHandle::attach(device, &self.config)?;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        info!(
            sample_rate = handle.sample_rate(),
            fft_size = handle.tap().fft_size(),
            "Audio output ready"
        );
        Ok(Arc::new(handle))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    struct Tone {
        phase: f32,
    }

    impl Source for Tone {
        fn render(&mut self, out: &mut [f32], channels: usize, sample_rate: u32) {
            for frame in out.chunks_mut(channels) {
                self.phase = (self.phase + 1_000.0 / sample_rate as f32).fract();
                let value = 0.5 * (std::f32::consts::TAU * self.phase).sin();
                for sample in frame {
                    *sample += value;
                }
            }
        }
    }

    struct StaticDevice {
        bus: Arc<OutputBus>,
    }

    #[async_trait]
    impl OutputDevice for StaticDevice {
        fn state(&self) -> ResourceState {
            ResourceState::Running
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        fn sample_rate(&self) -> u32 {
            self.bus.sample_rate()
        }

        fn bus(&self) -> Arc<OutputBus> {
            self.bus.clone()
        }
    }

    /// A handle whose analysis window already holds a 1 kHz tone
    pub(crate) fn handle_with_tone(config: &EngineConfig) -> Arc<AudioResourceHandle> {
        let bus = Arc::new(OutputBus::new(48_000, config.fft_size, 1.0));
        bus.bind(Box::new(Tone { phase: 0.0 }));
        let mut block = vec![0.0; config.fft_size * 2];
        bus.render(&mut block, 2);

        let device = Arc::new(StaticDevice { bus });
        Arc::new(AudioResourceHandle::attach(device, config).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingBackend {
        opens: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AudioBackend for CountingBackend {
        async fn open(&self, _config: &EngineConfig) -> Result<Arc<dyn OutputDevice>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(EngineError::InitializationFailed("no device".into()));
            }
            Ok(Arc::new(NullDevice {
                bus: Arc::new(OutputBus::new(8_000, 256, 1.0)),
            }))
        }
    }

    struct NullDevice {
        bus: Arc<OutputBus>,
    }

    #[async_trait]
    impl OutputDevice for NullDevice {
        fn state(&self) -> ResourceState {
            ResourceState::Running
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn bus(&self) -> Arc<OutputBus> {
            self.bus.clone()
        }
    }

    fn manager(fail: bool) -> (Arc<CountingBackend>, AudioResourceManager) {
        let backend = Arc::new(CountingBackend {
            opens: AtomicUsize::new(0),
            fail,
        });
        let config = EngineConfig {
            fft_size: 256,
            spectrum_bars: 16,
            ..EngineConfig::default()
        };
        (backend.clone(), AudioResourceManager::new(backend, config))
    }

    #[tokio::test]
    async fn test_starts_uninitialized() {
        let (_, manager) = manager(false);
        assert_eq!(manager.state(), ResourceState::Uninitialized);
        manager.ensure_ready().await.unwrap();
        assert_eq!(manager.state(), ResourceState::Running);
    }

    #[tokio::test]
    async fn test_repeated_calls_reuse_handle() {
        let (backend, manager) = manager(false);
        let first = manager.ensure_ready().await.unwrap();
        let second = manager.ensure_ready().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_retryable() {
        let (backend, manager) = manager(true);
        let err = manager.ensure_ready().await.err().unwrap();
        assert!(matches!(err, EngineError::InitializationFailed(_)));
        assert!(manager.ensure_ready().await.is_err());
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
        assert_eq!(manager.acquisitions(), 0);
    }

    #[tokio::test]
    async fn test_reset_forces_new_acquisition() {
        let (backend, manager) = manager(false);
        let first = manager.ensure_ready().await.unwrap();
        manager.reset();
        assert_eq!(manager.state(), ResourceState::Uninitialized);
        let second = manager.ensure_ready().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_output_port_binds_one_source() {
        struct Silence;
        impl Source for Silence {
            fn render(&mut self, _out: &mut [f32], _channels: usize, _sample_rate: u32) {}
        }

        let (_, manager) = manager(false);
        let handle = manager.ensure_ready().await.unwrap();
        let first = handle.output().bind(Box::new(Silence));
        let second = handle.output().bind(Box::new(Silence));
        assert_eq!(handle.output().bound(), Some(second));
        assert!(!handle.output().unbind(first));
        assert!(handle.output().unbind(second));
        assert_eq!(handle.output().bound(), None);
    }
}
